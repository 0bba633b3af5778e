//! Streaming voice-activity endpointing for the murmur gateway.
//!
//! The [`Endpointer`] consumes raw 16-bit PCM frames from a live recording
//! and decides when the speaker has stopped talking: it slices the stream
//! into fixed analysis windows, asks a [`SpeechScorer`] for a speech
//! probability per window, and accumulates consecutive silence once speech
//! has been heard. Leading silence — before the first above-threshold
//! window — never counts toward the stop condition, so a user can take
//! their time before speaking.
//!
//! One engine instance covers exactly one recording window; callers discard
//! it on stop or abort and create a fresh one for the next utterance. A
//! recording that never contains speech never stops on its own — the client
//! is expected to end the stream explicitly (e.g. a listening timeout).

mod engine;
mod scorer;

pub use engine::{Decision, EndpointConfig, Endpointer};
pub use scorer::{EnergyScorer, SpeechScorer};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndpointError {
    /// The scorer could not produce a probability for a window.
    #[error("speech scorer failed: {0}")]
    Scorer(String),

    /// Only 8 kHz and 16 kHz input is supported.
    #[error("unsupported sample rate: {0}")]
    SampleRate(u32),
}
