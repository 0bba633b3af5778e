//! Speech-to-text over HTTP.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::VoiceError;

/// Maximum audio upload size (10 MiB). Prevents OOM from runaway recordings.
const MAX_ASR_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Transcribes one complete utterance.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// `wav` is a complete WAV file (see [`crate::wav::wrap_pcm`]).
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, VoiceError>;
}

/// Client for a FunASR-style recognition endpoint.
///
/// Uploads the recording as a multipart form (`files` + `keys` + `lang`)
/// and reads the transcription from `result[0].text`.
#[derive(Debug, Clone)]
pub struct HttpAsr {
    url: String,
    http: reqwest::Client,
}

impl HttpAsr {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SpeechRecognizer for HttpAsr {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, VoiceError> {
        if wav.len() > MAX_ASR_INPUT_BYTES {
            return Err(VoiceError::Asr(format!(
                "audio exceeds maximum size: {} bytes (limit: {} bytes)",
                wav.len(),
                MAX_ASR_INPUT_BYTES
            )));
        }

        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Asr(format!("invalid mime type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("files", part)
            .text("keys", "utterance.wav")
            .text("lang", "auto");

        let response = self.http.post(&self.url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(VoiceError::Asr(format!(
                "recognition endpoint returned {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        let text = body
            .get("result")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .and_then(|first| first.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        debug!(chars = text.len(), "transcription received");
        Ok(text)
    }
}
