//! The speech-probability seam and the built-in energy baseline.

use crate::EndpointError;

/// Scores one fixed-size analysis window of f32 samples (range [-1, 1])
/// with the probability that it contains speech.
///
/// Model inference lives behind this trait; the engine treats it as a
/// black box. Implementations must be cheap enough to call once per window
/// (32 ms of audio at 16 kHz) on the connection task.
pub trait SpeechScorer: Send + Sync {
    fn score(&self, window: &[f32]) -> Result<f32, EndpointError>;
}

/// RMS-energy baseline scorer.
///
/// Maps the window's root-mean-square amplitude onto [0, 1] against a
/// reference level. Not a real VAD model — it cannot tell speech from other
/// sound — but it keeps the gateway functional without an external model
/// process and behaves deterministically in tests.
#[derive(Debug, Clone)]
pub struct EnergyScorer {
    /// RMS amplitude treated as "certainly speech" (score 1.0).
    reference: f32,
}

impl EnergyScorer {
    pub fn new(reference: f32) -> Self {
        Self { reference }
    }
}

impl Default for EnergyScorer {
    fn default() -> Self {
        // Normal speech into a near-field mic lands well above this;
        // room noise stays well below.
        Self { reference: 0.05 }
    }
}

impl SpeechScorer for EnergyScorer {
    fn score(&self, window: &[f32]) -> Result<f32, EndpointError> {
        if window.is_empty() || self.reference <= 0.0 {
            return Ok(0.0);
        }
        let mean_square: f32 =
            window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32;
        let rms = mean_square.sqrt();
        Ok((rms / self.reference).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_scores_zero() {
        let scorer = EnergyScorer::default();
        let window = vec![0.0f32; 512];
        assert_eq!(scorer.score(&window).unwrap(), 0.0);
    }

    #[test]
    fn loud_window_saturates_at_one() {
        let scorer = EnergyScorer::default();
        let window = vec![0.5f32; 512];
        assert_eq!(scorer.score(&window).unwrap(), 1.0);
    }

    #[test]
    fn quiet_window_scores_between() {
        let scorer = EnergyScorer::new(0.1);
        let window = vec![0.05f32; 512];
        let score = scorer.score(&window).unwrap();
        assert!(score > 0.4 && score < 0.6, "got {score}");
    }

    #[test]
    fn empty_window_scores_zero() {
        let scorer = EnergyScorer::default();
        assert_eq!(scorer.score(&[]).unwrap(), 0.0);
    }
}
