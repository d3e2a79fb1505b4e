//! Shared last-value loudness slot
//!
//! One writer (the supervisor), any number of readers. A single f32 is
//! published through an atomic bit store: last write wins, no torn
//! reads, no queue, no history.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Observable current loudness value
#[derive(Clone, Debug)]
pub struct LevelPublisher {
    level_bits: Arc<AtomicU32>,
}

impl LevelPublisher {
    /// Create a publisher reading 0.0 until the first publish
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(0.0f32.to_bits())),
        }
    }

    /// Overwrite the current value
    pub fn publish(&self, level: f32) {
        self.level_bits.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Latest published value
    pub fn current(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }
}

impl Default for LevelPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_silent() {
        assert_eq!(LevelPublisher::new().current(), 0.0);
    }

    #[test]
    fn last_write_wins() {
        let publisher = LevelPublisher::new();
        publisher.publish(12.5);
        publisher.publish(48.25);
        assert_eq!(publisher.current(), 48.25);
    }

    #[test]
    fn clones_share_the_slot() {
        let writer = LevelPublisher::new();
        let reader = writer.clone();
        writer.publish(33.0);
        assert_eq!(reader.current(), 33.0);
    }
}
