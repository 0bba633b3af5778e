//! Device registry persistence for the murmur gateway.
//!
//! SQLite with WAL mode behind an `r2d2` pool; the schema ships as embedded
//! migrations so it cannot drift from the code. The registry records every
//! device that has ever registered (keyed by MAC address), when it was last
//! seen, and its long-term conversation memory.
//!
//! All helpers are synchronous `rusqlite` calls; async callers wrap them in
//! `spawn_blocking`.

mod devices;
mod migrations;
mod pool;

pub use devices::{get_device, load_memory, save_memory, upsert_device, Device};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbSettings, PoolError};
