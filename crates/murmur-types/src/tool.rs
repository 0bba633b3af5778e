//! Tool descriptors and the closed dispatch variant.
//!
//! A tool is a named capability the reasoning step may select. Devices
//! declare their tools at registration time; the server contributes a
//! built-in set. Descriptors are immutable for the lifetime of a session and
//! replaced wholesale on re-registration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a tool runs (`main_type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolHost {
    /// Runs in-process on the server.
    Local,
    /// Delegated to the connected device.
    Remote,
}

/// How a tool resolves (`sub_type` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    /// Must resolve before the dispatch step completes.
    Sync,
    /// Reports "processing" immediately and resolves out-of-band.
    Async,
}

/// The four dispatch combinations. Closed on purpose: new combinations are
/// added by extending this enum, not by runtime lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    LocalSync,
    LocalAsync,
    RemoteSync,
    RemoteAsync,
}

/// A callable capability declared by the device or built into the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name; device-declared names shadow built-ins on collision
    /// because lookup scans device tools first.
    pub name: String,

    /// Planning context for the intent classifier.
    #[serde(default)]
    pub description: String,

    /// JSON-schema-like parameter specification with a `required` subset.
    #[serde(default)]
    pub parameters: Value,

    pub main_type: ToolHost,
    pub sub_type: ToolMode,

    /// Graph step names to run after this tool is selected. Absent means
    /// the default plan (`["chat", "notify_listen"]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_process: Option<Vec<String>>,
}

impl ToolDescriptor {
    pub fn kind(&self) -> ToolKind {
        match (self.main_type, self.sub_type) {
            (ToolHost::Local, ToolMode::Sync) => ToolKind::LocalSync,
            (ToolHost::Local, ToolMode::Async) => ToolKind::LocalAsync,
            (ToolHost::Remote, ToolMode::Sync) => ToolKind::RemoteSync,
            (ToolHost::Remote, ToolMode::Async) => ToolKind::RemoteAsync,
        }
    }
}

/// Finds a descriptor by name; first match wins, so callers pass
/// device-declared tools ahead of built-ins.
pub fn find_tool<'a>(tools: &'a [ToolDescriptor], name: &str) -> Option<&'a ToolDescriptor> {
    tools.iter().find(|t| t.name == name)
}
