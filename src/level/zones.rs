//! Loudness zone classification
//!
//! Maps a reading onto a stepped indicator: five buckets below a
//! configured limit plus an over-limit flag. Pure and recomputed per
//! call; nothing is stored between readings.

use crate::constants::ZONE_BUCKETS;

/// Discrete loudness zone for a single reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    /// How many buckets the reading activates, from quietest up
    pub active_buckets: usize,
    /// Whether the reading exceeds the configured limit
    pub over_limit: bool,
}

/// Classifies readings against a fixed limit
///
/// Bucket `k` activates iff `level > limit / 5 * k` (strictly greater),
/// so activation is prefix-closed: a bucket is never active unless every
/// quieter bucket is too.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdClassifier {
    limit: f32,
    step: f32,
}

impl ThresholdClassifier {
    pub fn new(limit: f32) -> Self {
        Self {
            limit,
            step: limit / ZONE_BUCKETS as f32,
        }
    }

    pub fn limit(&self) -> f32 {
        self.limit
    }

    /// Activation threshold of bucket `k`
    pub fn threshold(&self, bucket: usize) -> f32 {
        self.step * bucket as f32
    }

    /// Classify one reading
    pub fn classify(&self, level: f32) -> Zone {
        let active_buckets = (0..ZONE_BUCKETS)
            .take_while(|&k| level > self.threshold(k))
            .count();

        Zone {
            active_buckets,
            over_limit: level > self.limit,
        }
    }
}
