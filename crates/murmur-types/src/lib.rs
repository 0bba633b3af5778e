//! Shared protocol and data types for the murmur gateway.
//!
//! Every wire payload exchanged with a device — JSON-RPC control envelopes,
//! tool descriptors declared at registration, and the chat message history
//! consumed by the reasoning capability — is defined here so the server,
//! agent, and capability crates agree on one vocabulary.

pub mod message;
pub mod rpc;
pub mod tool;

pub use message::{ChatMessage, Role, ToolCall};
pub use rpc::InboundFrame;
pub use tool::{find_tool, ToolDescriptor, ToolHost, ToolKind, ToolMode};
