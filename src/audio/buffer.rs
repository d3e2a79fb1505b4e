//! Sample blocks and the lock-free chunk queue
//!
//! The cpal callback produces callback-sized blocks on the capture thread;
//! the supervisor drains them on its own task. A single-producer
//! single-consumer ring keeps the callback allocation-free apart from the
//! block itself.

use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Sample encoding of a capture stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// 16-bit signed integer samples, native amplitude scale
    I16,
    /// 32-bit float samples normalized to [-1.0, 1.0]
    F32,
}

impl SampleFormat {
    /// Largest representable amplitude for the format
    pub fn full_scale(self) -> f64 {
        match self {
            SampleFormat::I16 => i16::MAX as f64,
            SampleFormat::F32 => 1.0,
        }
    }

    /// RMS floor applied before the logarithm so silence never
    /// produces -infinity
    pub fn rms_floor(self) -> f64 {
        match self {
            SampleFormat::I16 => 1e-7,
            SampleFormat::F32 => 1e-9,
        }
    }

    /// Additive calibration offset in dB
    ///
    /// I16 readings already sit on the raw amplitude scale (full scale
    /// ~90.3 dB). F32 readings are shifted up by 20*log10(32767) so both
    /// formats share one display scale.
    pub fn calibration_offset(self) -> f64 {
        match self {
            SampleFormat::I16 => 0.0,
            SampleFormat::F32 => 20.0 * (i16::MAX as f64).log10(),
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleFormat::I16 => write!(f, "i16"),
            SampleFormat::F32 => write!(f, "f32"),
        }
    }
}

/// One block of mono samples in the stream's native format
///
/// Ephemeral: produced by the capture callback or assembled by a read,
/// consumed by the level estimator, never stored.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBlock {
    I16(Vec<i16>),
    F32(Vec<f32>),
}

impl SampleBlock {
    /// Empty block in the given format
    pub fn empty(format: SampleFormat) -> Self {
        match format {
            SampleFormat::I16 => SampleBlock::I16(Vec::new()),
            SampleFormat::F32 => SampleBlock::F32(Vec::new()),
        }
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            SampleBlock::I16(_) => SampleFormat::I16,
            SampleBlock::F32(_) => SampleFormat::F32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleBlock::I16(s) => s.len(),
            SampleBlock::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append samples from `other`, which must share this block's format
    pub fn append(&mut self, other: &mut SampleBlock) {
        match (self, other) {
            (SampleBlock::I16(a), SampleBlock::I16(b)) => a.append(b),
            (SampleBlock::F32(a), SampleBlock::F32(b)) => a.append(b),
            _ => unreachable!("mixed sample formats in one stream"),
        }
    }

    /// Split off and return everything past `at`, leaving `self` with the
    /// first `at` samples. No-op returning an empty block if `at` is past
    /// the end.
    pub fn split_off(&mut self, at: usize) -> SampleBlock {
        if at >= self.len() {
            return SampleBlock::empty(self.format());
        }
        match self {
            SampleBlock::I16(s) => SampleBlock::I16(s.split_off(at)),
            SampleBlock::F32(s) => SampleBlock::F32(s.split_off(at)),
        }
    }
}

/// Lock-free SPSC queue of sample blocks
///
/// Producer is the cpal callback, consumer is the supervisor's read.
/// Overflow drops the newest block and counts it; metering only cares
/// about the freshest audio, so dropped blocks are not an error.
pub struct ChunkQueue {
    queue: ArrayQueue<SampleBlock>,
    overflow_count: AtomicUsize,
}

impl ChunkQueue {
    /// Create a new queue holding at most `capacity` blocks
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
        }
    }

    /// Push a block; returns false (and counts) when the queue is full
    pub fn push(&self, block: SampleBlock) -> bool {
        match self.queue.push(block) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop the oldest block, if any
    pub fn pop(&self) -> Option<SampleBlock> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Blocks dropped because the consumer fell behind
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a chunk queue
pub type SharedChunkQueue = Arc<ChunkQueue>;

/// Create a new shared chunk queue
pub fn create_shared_queue(capacity: usize) -> SharedChunkQueue {
    Arc::new(ChunkQueue::new(capacity))
}
