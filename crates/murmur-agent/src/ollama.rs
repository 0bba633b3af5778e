//! `ReasoningClient` implementation for the Ollama chat API.

use async_trait::async_trait;
use futures_util::StreamExt;
use murmur_types::{ChatMessage, Role, ToolCall, ToolDescriptor};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::{AgentError, ReasoningClient, TextStream};

/// Client for an Ollama server (`/api/chat`).
///
/// Intent classification uses a non-streaming call with tool definitions;
/// reply generation streams NDJSON chunks.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            http: reqwest::Client::new(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    /// Flattens the history into the wire shape the chat API expects.
    fn request_messages(system: &str, history: &[ChatMessage]) -> Vec<Value> {
        let mut messages = vec![json!({"role": "system", "content": system})];
        messages.extend(history.iter().map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            json!({"role": role, "content": m.content})
        }));
        messages
    }

    fn tool_definitions(tools: &[ToolDescriptor]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }
}

/// Pulls complete NDJSON lines out of `buf` and collects their non-empty
/// `message.content` fields.
fn drain_content_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        match serde_json::from_slice::<Value>(&line) {
            Ok(value) => {
                if let Some(content) = value
                    .pointer("/message/content")
                    .and_then(Value::as_str)
                    .filter(|c| !c.is_empty())
                {
                    out.push(content.to_string());
                }
            }
            Err(e) => warn!("skipping malformed chat stream line: {e}"),
        }
    }
    out
}

#[async_trait]
impl ReasoningClient for OllamaClient {
    async fn decide(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ChatMessage, AgentError> {
        let mut body = json!({
            "model": self.model,
            "messages": Self::request_messages(system, history),
            "stream": false,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(Self::tool_definitions(tools));
        }

        let response = self.http.post(self.chat_url()).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::Reasoner(format!(
                "chat endpoint returned {}",
                response.status()
            )));
        }

        let value: Value = response.json().await?;
        let message = value
            .get("message")
            .ok_or_else(|| AgentError::Reasoner("response has no message".to_string()))?;

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // The API does not assign call ids; generate them so tool results
        // can be correlated in the history.
        let tool_calls = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| {
                        let function = c.get("function")?;
                        let name = function.get("name")?.as_str()?.to_string();
                        let arguments = function
                            .get("arguments")
                            .cloned()
                            .unwrap_or_else(|| json!({}));
                        Some(ToolCall {
                            id: format!("call-{}", Uuid::new_v4()),
                            name,
                            arguments,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ChatMessage {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        })
    }

    async fn reply(
        &self,
        system: &str,
        history: &[ChatMessage],
    ) -> Result<TextStream, AgentError> {
        let body = json!({
            "model": self.model,
            "messages": Self::request_messages(system, history),
            "stream": true,
        });

        let response = self.http.post(self.chat_url()).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::Reasoner(format!(
                "chat endpoint returned {}",
                response.status()
            )));
        }

        let stream = response
            .bytes_stream()
            .scan(Vec::<u8>::new(), |buf, chunk| {
                let chunks = match chunk {
                    Ok(bytes) => {
                        buf.extend_from_slice(&bytes);
                        drain_content_lines(buf)
                    }
                    Err(e) => {
                        warn!("chat stream transport error: {e}");
                        Vec::new()
                    }
                };
                futures_util::future::ready(Some(chunks))
            })
            .flat_map(futures_util::stream::iter)
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_complete_lines_only() {
        let mut buf = Vec::new();
        buf.extend_from_slice(br#"{"message":{"content":"hel"},"done":false}"#);
        buf.push(b'\n');
        buf.extend_from_slice(br#"{"message":{"content":"lo"},"done":false}"#);
        buf.push(b'\n');
        buf.extend_from_slice(br#"{"message":{"content":"tail"#);

        let chunks = drain_content_lines(&mut buf);
        assert_eq!(chunks, vec!["hel", "lo"]);
        // The partial line stays buffered.
        assert!(buf.starts_with(br#"{"message""#));
    }

    #[test]
    fn skips_done_line_with_empty_content() {
        let mut buf = Vec::new();
        buf.extend_from_slice(br#"{"message":{"content":""},"done":true}"#);
        buf.push(b'\n');
        assert!(drain_content_lines(&mut buf).is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn malformed_line_is_skipped() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"not json\n");
        buf.extend_from_slice(br#"{"message":{"content":"ok"},"done":false}"#);
        buf.push(b'\n');
        assert_eq!(drain_content_lines(&mut buf), vec!["ok"]);
    }

    #[test]
    fn chat_url_normalizes_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", "qwen2.5:7b");
        assert_eq!(client.chat_url(), "http://localhost:11434/api/chat");
    }
}
