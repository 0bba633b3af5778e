//! The endpointing state machine.

use std::sync::Arc;

use tracing::debug;

use crate::{EndpointError, SpeechScorer};

/// Tunables for one recording window.
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    /// Speech probability above which a window counts as speech.
    pub threshold: f32,

    /// Input sample rate in Hz; 8000 or 16000.
    pub sample_rate: u32,

    /// Consecutive silence (after speech) that ends the utterance.
    pub min_silence_ms: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            sample_rate: 16_000,
            min_silence_ms: 1_000,
        }
    }
}

/// Verdict for the frame just fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep recording.
    Continue,
    /// The speaker has stopped; end the recording window.
    Stop,
}

/// Per-recording-window endpointing state.
///
/// Holds no cross-utterance state: create on `audio/start_stream`, discard
/// on stop or abort.
pub struct Endpointer {
    scorer: Arc<dyn SpeechScorer>,
    config: EndpointConfig,
    window_size: usize,
    min_silence_samples: usize,
    /// Carries partial windows between frames.
    buffer: Vec<f32>,
    speech_detected: bool,
    silent_samples: usize,
}

impl Endpointer {
    pub fn new(
        scorer: Arc<dyn SpeechScorer>,
        config: EndpointConfig,
    ) -> Result<Self, EndpointError> {
        let window_size = match config.sample_rate {
            16_000 => 512,
            8_000 => 256,
            other => return Err(EndpointError::SampleRate(other)),
        };
        let min_silence_samples =
            (config.sample_rate as usize * config.min_silence_ms as usize) / 1_000;

        Ok(Self {
            scorer,
            config,
            window_size,
            min_silence_samples,
            buffer: Vec::new(),
            speech_detected: false,
            silent_samples: 0,
        })
    }

    /// Whether any window has scored above the speech threshold so far.
    pub fn speech_detected(&self) -> bool {
        self.speech_detected
    }

    /// Feeds one frame of little-endian 16-bit PCM mono audio.
    ///
    /// Accumulates into the rolling buffer and scores every full analysis
    /// window available. Empty input always yields [`Decision::Continue`].
    pub fn feed(&mut self, frame: &[u8]) -> Result<Decision, EndpointError> {
        if frame.is_empty() {
            return Ok(Decision::Continue);
        }

        self.buffer.reserve(frame.len() / 2);
        for sample in frame.chunks_exact(2) {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            self.buffer.push(value as f32 / 32_768.0);
        }

        while self.buffer.len() >= self.window_size {
            let rest = self.buffer.split_off(self.window_size);
            let window = std::mem::replace(&mut self.buffer, rest);

            let probability = self.scorer.score(&window)?;

            if probability > self.config.threshold {
                if !self.speech_detected {
                    debug!(probability, "speech onset detected");
                }
                self.speech_detected = true;
                self.silent_samples = 0;
            } else if self.speech_detected {
                self.silent_samples += self.window_size;
            }
            // Pre-speech silence is ignored entirely.

            if self.speech_detected && self.silent_samples >= self.min_silence_samples {
                debug!(
                    silence_ms = self.config.min_silence_ms,
                    "trailing silence reached, stopping recording"
                );
                return Ok(Decision::Stop);
            }
        }

        Ok(Decision::Continue)
    }
}
