//! The reasoning capability seam.

use async_trait::async_trait;
use murmur_types::{ChatMessage, ToolDescriptor};

use crate::{AgentError, TextStream};

/// The LLM behind the graph. `decide` powers the intent step, `reply` the
/// chat step; keeping them as separate methods leaves a split deployment
/// (different models for classification and generation) a construction-time
/// choice.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Asks the model to answer directly or select tools. The returned
    /// assistant message carries the selection in `tool_calls`.
    async fn decide(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChatMessage, AgentError>;

    /// Streams the spoken reply for the accumulated history.
    async fn reply(&self, system: &str, history: &[ChatMessage])
        -> Result<TextStream, AgentError>;
}
