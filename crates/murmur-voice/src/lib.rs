//! Speech capability clients for the murmur gateway.
//!
//! ASR, TTS, and the music search-and-transcode helper are external
//! services; this crate holds the trait seams the gateway consumes them
//! through and thin HTTP implementations of each. Model inference never
//! happens in-process.
//!
//! All audio at these boundaries is raw little-endian 16-bit PCM mono at
//! 16 kHz, matching the device wire format; the ASR hand-off wraps the
//! drained recording in an in-memory WAV container.

mod asr;
mod error;
mod music;
mod tts;
pub mod wav;

pub use asr::{HttpAsr, SpeechRecognizer};
pub use error::VoiceError;
pub use music::{HttpMusicSource, MusicSource};
pub use tts::{HttpTts, SpeechSynthesizer};

use bytes::Bytes;
use futures_util::stream::BoxStream;

/// A lazily produced sequence of synthesized audio chunks.
pub type AudioStream = BoxStream<'static, Result<Bytes, VoiceError>>;
