//! Text-to-speech over HTTP.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::json;
use tracing::error;

use crate::{AudioStream, VoiceError};

/// Maximum text input size (64 KiB). Synthesis cost grows with input size;
/// anything larger is a protocol abuse, not a spoken reply.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// 100 ms of 16 kHz 16-bit mono silence, substituted when synthesis fails
/// so the outbound frame protocol stays intact.
const SILENCE_CHUNK_BYTES: usize = 3_200;

/// Synthesizes one text chunk into a lazy stream of PCM audio chunks.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, VoiceError>;
}

/// Client for a streaming synthesis endpoint: POST `{"text": ...}`, raw
/// 16 kHz mono s16le PCM in the response body.
#[derive(Debug, Clone)]
pub struct HttpTts {
    url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpTts {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    fn silence() -> AudioStream {
        futures_util::stream::iter([Ok(Bytes::from(vec![0u8; SILENCE_CHUNK_BYTES]))]).boxed()
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpTts {
    async fn synthesize(&self, text: &str) -> Result<AudioStream, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let mut request = self.http.post(&self.url).json(&json!({ "text": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        // Failures degrade to a short silence chunk rather than an error:
        // the caller is mid-delivery and the device expects the framed
        // stream to complete either way.
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                error!("TTS request failed: {e}");
                return Ok(Self::silence());
            }
        };
        if !response.status().is_success() {
            error!(status = %response.status(), "TTS endpoint rejected synthesis request");
            return Ok(Self::silence());
        }

        let stream = response
            .bytes_stream()
            .filter_map(|chunk| async move {
                match chunk {
                    Ok(bytes) if bytes.is_empty() => None,
                    Ok(bytes) => Some(Ok(bytes)),
                    Err(e) => Some(Err(VoiceError::from(e))),
                }
            })
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_text_is_rejected() {
        let tts = HttpTts::new("http://127.0.0.1:1/speech", None);
        let text = "a".repeat(MAX_TTS_INPUT_BYTES + 1);
        match tts.synthesize(&text).await {
            Err(VoiceError::Tts(msg)) => assert!(msg.contains("maximum size")),
            Ok(_) => panic!("expected Tts error, got Ok(stream)"),
            Err(other) => panic!("expected Tts error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_silence() {
        // Port 1 refuses connections; the stream must still carry one
        // silence chunk so delivery framing completes.
        let tts = HttpTts::new("http://127.0.0.1:1/speech", None);
        let mut stream = tts.synthesize("hello").await.expect("silence fallback");

        let chunk = stream
            .next()
            .await
            .expect("one chunk")
            .expect("chunk is ok");
        assert_eq!(chunk.len(), SILENCE_CHUNK_BYTES);
        assert!(chunk.iter().all(|b| *b == 0));
        assert!(stream.next().await.is_none());
    }
}
