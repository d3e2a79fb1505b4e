//! RMS loudness estimation
//!
//! One fixed transform: windowed RMS to a log amplitude scale. No
//! filtering, no weighting curve, no spectral analysis.

use crate::audio::{SampleBlock, SampleFormat};

/// Stateless converter from sample blocks to decibel-like readings
///
/// The scale is relative loudness, not calibrated SPL: `20*log10(rms)`
/// over the format's native amplitude, floored before the logarithm so
/// silence never yields -infinity, offset per format so i16 and f32
/// streams read the same, and clamped so readings are never negative.
#[derive(Debug, Clone, Copy)]
pub struct LevelEstimator {
    rms_floor: f64,
    offset: f64,
}

impl LevelEstimator {
    pub fn new(format: SampleFormat) -> Self {
        Self {
            rms_floor: format.rms_floor(),
            offset: format.calibration_offset(),
        }
    }

    /// Loudness of one block, in dB, always finite and `>= 0`
    ///
    /// Empty blocks are the stall signal and belong to the supervisor,
    /// not here; they are rejected in debug builds and read as silence
    /// in release builds.
    pub fn level(&self, block: &SampleBlock) -> f32 {
        debug_assert!(!block.is_empty(), "empty block passed to estimator");
        if block.is_empty() {
            return 0.0;
        }

        let n = block.len() as f64;
        let sum_sq: f64 = match block {
            SampleBlock::I16(samples) => samples
                .iter()
                .map(|&s| {
                    let s = s as f64;
                    s * s
                })
                .sum(),
            SampleBlock::F32(samples) => samples
                .iter()
                .map(|&s| {
                    let s = s as f64;
                    s * s
                })
                .sum(),
        };

        let rms = (sum_sq / n).sqrt();
        let db = 20.0 * rms.max(self.rms_floor).log10() + self.offset;
        db.max(0.0) as f32
    }
}
