//! The seam between a graph run and the device connection.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use murmur_types::ToolDescriptor;
use serde_json::Value;

/// A lazily produced sequence of reply text chunks.
pub type TextStream = BoxStream<'static, String>;

/// Everything a graph run may do to the connection that owns it.
///
/// Implemented by the server's session layer. Detached tool tasks hold their
/// own `Arc<dyn DeviceLink>` — never a borrow of the run that spawned them,
/// which may already have terminated by the time they fire.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Device-declared tools followed by the server's built-ins.
    fn effective_tools(&self) -> Vec<ToolDescriptor>;

    /// Sends a control event (a request with no `id`) to the device.
    /// Send failures are logged and swallowed by the implementation.
    async fn send_event(&self, method: &str, params: Value);

    /// Sends an `mcp/tool/execute` request and registers a pending handle
    /// for its out-of-band result. Returns the generated correlation id.
    async fn dispatch_remote_tool(&self, name: &str, args: &Value) -> String;

    /// Pushes a reply text stream through the response delivery pipeline
    /// (synthesis + framing). Returns the concatenated spoken text.
    async fn deliver_text(&self, text: TextStream) -> String;

    /// Pushes already-synthesized PCM through the delivery framing
    /// (music playback path).
    async fn deliver_pcm(&self, pcm: Bytes);
}
