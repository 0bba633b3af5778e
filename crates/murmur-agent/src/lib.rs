//! The agent execution graph for the murmur gateway.
//!
//! One graph run processes one transcribed utterance to completion:
//! `entry → intent → {tool | chat | music | notify_listen}`. The intent step
//! asks the reasoning capability to answer directly or select tools; the
//! selected tools' post-process lists are merged into a fixed plan; a driver
//! loop then executes the plan's steps in order, with the cursor owned by
//! the driver and only ever increasing.
//!
//! Steps never abort the run. Tool failures become tool-result messages in
//! the history (errors are data once inside the graph), reasoning failures
//! degrade to a fallback reply, and a run with no bound device link reduces
//! every side effect to a logged no-op — the device should always receive
//! *some* closing response when one can be produced.

mod error;
mod graph;
mod link;
mod llm;
mod ollama;
pub mod prompts;
mod state;
mod tools;

pub use error::AgentError;
pub use graph::AgentGraph;
pub use link::{DeviceLink, TextStream};
pub use llm::ReasoningClient;
pub use ollama::OllamaClient;
pub use state::{merge_post_process, AgentRun, Step, DEFAULT_PLAN};
pub use tools::{LocalTool, ToolRegistry};
