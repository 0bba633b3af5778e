use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("ASR error: {0}")]
    Asr(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("music source error: {0}")]
    Music(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
