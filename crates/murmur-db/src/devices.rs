//! Device registry queries.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

/// One registered device.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub mac_addr: String,
    pub created_at: String,
    pub last_seen: String,
    pub memory: Option<String>,
}

/// Looks up a device by MAC address.
pub fn get_device(conn: &Connection, mac_addr: &str) -> Result<Option<Device>, rusqlite::Error> {
    conn.query_row(
        "SELECT mac_addr, created_at, last_seen, memory FROM devices WHERE mac_addr = ?1",
        [mac_addr],
        |row| {
            Ok(Device {
                mac_addr: row.get(0)?,
                created_at: row.get(1)?,
                last_seen: row.get(2)?,
                memory: row.get(3)?,
            })
        },
    )
    .optional()
}

/// Registers a device, or stamps `last_seen` if it already exists.
/// Called on every successful `registerTools`.
pub fn upsert_device(conn: &Connection, mac_addr: &str) -> Result<(), rusqlite::Error> {
    let inserted = conn.execute(
        "INSERT INTO devices (mac_addr) VALUES (?1)
         ON CONFLICT(mac_addr) DO UPDATE SET last_seen = datetime('now')",
        [mac_addr],
    )?;
    if inserted > 0 {
        info!(mac_addr, "device registered");
    }
    Ok(())
}

/// Loads the device's long-term conversation memory, if any.
pub fn load_memory(conn: &Connection, mac_addr: &str) -> Result<Option<String>, rusqlite::Error> {
    Ok(get_device(conn, mac_addr)?.and_then(|d| d.memory))
}

/// Saves the device's long-term conversation memory.
pub fn save_memory(conn: &Connection, mac_addr: &str, memory: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE devices SET memory = ?2 WHERE mac_addr = ?1",
        [mac_addr, memory],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_migrations;

    fn connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn upsert_registers_then_touches() {
        let conn = connection();

        assert!(get_device(&conn, "aa:bb:cc:dd:ee:ff").unwrap().is_none());

        upsert_device(&conn, "aa:bb:cc:dd:ee:ff").unwrap();
        let device = get_device(&conn, "aa:bb:cc:dd:ee:ff").unwrap().unwrap();
        assert_eq!(device.mac_addr, "aa:bb:cc:dd:ee:ff");
        assert!(device.memory.is_none());

        // Re-registration must not fail or duplicate.
        upsert_device(&conn, "aa:bb:cc:dd:ee:ff").unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn memory_round_trips() {
        let conn = connection();
        upsert_device(&conn, "11:22:33:44:55:66").unwrap();

        assert!(load_memory(&conn, "11:22:33:44:55:66").unwrap().is_none());

        save_memory(&conn, "11:22:33:44:55:66", "likes jazz").unwrap();
        assert_eq!(
            load_memory(&conn, "11:22:33:44:55:66").unwrap().as_deref(),
            Some("likes jazz")
        );
    }
}
