//! JSON-RPC control envelope parsing and construction.
//!
//! Control messages travel as text frames on the device WebSocket:
//! `{"jsonrpc":"2.0","method":<string>,"params":{...},"id"?:<string>}`.
//! Responses mirror `id` and carry either `result` or `error`. A frame with
//! an `id` and a `result`/`error` but no `method` is a device-side tool
//! result answering an earlier `mcp/tool/execute` request.

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Protocol version carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method names recognized on the device connection.
pub mod methods {
    /// Device → server: identify and declare callable tools.
    pub const REGISTER_TOOLS: &str = "registerTools";
    /// Device → server: a recording window begins.
    pub const AUDIO_START_STREAM: &str = "audio/start_stream";
    /// Device → server: a recording window ends (`params.reason` optional).
    pub const AUDIO_END_STREAM: &str = "audio/end_stream";
    /// Server → device: stop transmitting, endpointing fired.
    pub const AUDIO_STOP_STREAM: &str = "mcp/audio/stop_stream";
    /// Server → device: a binary audio run follows.
    pub const SERVER_START_AUDIO: &str = "mcp/server/start_audio";
    /// Server → device: the turn is over, resume listening.
    pub const SERVER_END_AUDIO: &str = "mcp/server/end_audio";
    /// Server → device: execute a delegated tool.
    pub const TOOL_EXECUTE: &str = "mcp/tool/execute";
}

/// A decoded inbound text frame.
///
/// All fields are optional so that any syntactically valid JSON object
/// decodes; callers classify the frame afterwards and drop what they do not
/// recognize (malformed frames never close the connection).
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl InboundFrame {
    /// Parses a text frame. Invalid JSON or a non-object payload is an error.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// True when this frame answers an earlier server-issued request
    /// (a tool result): it carries an `id` plus `result` or `error`, and no
    /// `method`.
    pub fn is_tool_result(&self) -> bool {
        self.method.is_none() && self.id.is_some() && (self.result.is_some() || self.error.is_some())
    }

    /// The `params` object, or an empty object when absent.
    pub fn params_object(&self) -> Value {
        self.params.clone().unwrap_or_else(|| json!({}))
    }
}

/// Builds a server-initiated event (a request with no `id`).
pub fn event(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
        "params": params,
    })
}

/// Builds the success reply to a `registerTools` request, echoing its `id`.
pub fn registration_ack(request_id: Option<&str>) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": request_id,
        "result": {
            "status": "registered",
            "message": "Tools were successfully registered.",
        },
    })
}

/// Builds an `mcp/tool/execute` request for delegated execution on the
/// device, with a generated correlation id the device echoes in its reply.
///
/// Returns `(correlation_id, frame)`.
pub fn tool_execute_request(tool_name: &str, tool_input: &Value) -> (String, Value) {
    let call_id = format!("tool-call-{}", Uuid::new_v4());
    let frame = json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": methods::TOOL_EXECUTE,
        "params": {
            "tool_name": tool_name,
            "tool_input": tool_input,
        },
        "id": call_id,
    });
    (call_id, frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_frame() {
        let frame = InboundFrame::parse(
            r#"{"jsonrpc":"2.0","method":"audio/end_stream","params":{"reason":"timeout"}}"#,
        )
        .expect("valid frame should parse");

        assert_eq!(frame.method.as_deref(), Some("audio/end_stream"));
        assert_eq!(
            frame.params_object().get("reason").and_then(Value::as_str),
            Some("timeout")
        );
        assert!(!frame.is_tool_result());
    }

    #[test]
    fn classifies_tool_result_frame() {
        let frame =
            InboundFrame::parse(r#"{"jsonrpc":"2.0","id":"tool-call-1","result":{"ok":true}}"#)
                .expect("valid frame should parse");

        assert!(frame.is_tool_result());
        assert_eq!(frame.id.as_deref(), Some("tool-call-1"));
    }

    #[test]
    fn method_less_frame_without_result_is_not_a_tool_result() {
        let frame = InboundFrame::parse(r#"{"jsonrpc":"2.0","id":"x"}"#).unwrap();
        assert!(!frame.is_tool_result());
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn event_has_no_id() {
        let ev = event(methods::SERVER_START_AUDIO, json!({}));
        assert_eq!(ev["jsonrpc"], JSONRPC_VERSION);
        assert_eq!(ev["method"], methods::SERVER_START_AUDIO);
        assert!(ev.get("id").is_none());
    }

    #[test]
    fn registration_ack_echoes_id() {
        let ack = registration_ack(Some("req-7"));
        assert_eq!(ack["id"], "req-7");
        assert_eq!(ack["result"]["status"], "registered");
    }

    #[test]
    fn tool_execute_request_carries_generated_id() {
        let (call_id, frame) = tool_execute_request("set_volume", &json!({"level": 3}));
        assert!(call_id.starts_with("tool-call-"));
        assert_eq!(frame["id"], Value::String(call_id));
        assert_eq!(frame["method"], methods::TOOL_EXECUTE);
        assert_eq!(frame["params"]["tool_name"], "set_volume");
        assert_eq!(frame["params"]["tool_input"]["level"], 3);
    }
}
