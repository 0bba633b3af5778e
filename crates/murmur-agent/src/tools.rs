//! Server-side (local) tool implementations and their registry.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_types::ToolDescriptor;
use serde_json::Value;

use crate::{AgentError, DeviceLink};

/// A tool that runs in-process on the server.
///
/// Async implementations receive the device link so their eventual effect
/// (typically an audio push) can reach the connection after the graph run
/// that spawned them has finished.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn invoke(
        &self,
        args: Value,
        link: Option<Arc<dyn DeviceLink>>,
    ) -> Result<String, AgentError>;
}

/// The server's built-in tool set, fixed at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn LocalTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn LocalTool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LocalTool>> {
        self.tools
            .iter()
            .find(|t| t.descriptor().name == name)
            .cloned()
    }

    /// Descriptors in registration order, for appending after the
    /// device-declared set.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }
}
