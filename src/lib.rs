//! # Noise Meter
//!
//! Real-time microphone loudness metering with automatic stream recovery.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        CAPTURE THREAD                            │
//! │  ┌────────────┐    cpal callback     ┌──────────────────────┐    │
//! │  │ Microphone │ ───────────────────▶ │ ChunkQueue (lock-    │    │
//! │  │  (cpal)    │    SampleBlocks      │ free SPSC ring)      │    │
//! │  └────────────┘                      └──────────┬───────────┘    │
//! └─────────────────────────────────────────────────┼────────────────┘
//!                                                   │ read()
//! ┌─────────────────────────────────────────────────▼────────────────┐
//! │                      SUPERVISOR TASK (tokio)                     │
//! │  ┌─────────────────┐   ┌────────────────┐   ┌────────────────┐   │
//! │  │ StreamSupervisor│──▶│ LevelEstimator │──▶│ LevelPublisher │   │
//! │  │ (stall detect + │   │ (RMS → dB)     │   │ (atomic f32)   │   │
//! │  │  recovery loop) │   └────────────────┘   └───────┬────────┘   │
//! │  └─────────────────┘                                │            │
//! └─────────────────────────────────────────────────────┼────────────┘
//!                                                       │ current()
//!                          ┌────────────────────┐       │
//!                          │ ThresholdClassifier│ ◀─────┘
//!                          │ (level → zones)    │    host UI polls
//!                          └────────────────────┘
//! ```
//!
//! The supervisor is the sole owner of the device handle and the sole
//! writer of the published level. Stalls (zero-sample reads from a live
//! device) are handled internally: the handle is released, the loop backs
//! off, and the device is reopened with the same configuration.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod level;

pub use engine::{MeterEngine, SupervisorState};
pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for capture (CD rate, universally supported)
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

    /// Capture is always mono; loudness has no use for stereo
    pub const CHANNELS: u16 = 1;

    /// Default samples per read (100 ms at the default rate)
    pub const DEFAULT_BLOCK_SIZE: usize = 4_410;

    /// Default pause between reads in milliseconds
    pub const DEFAULT_READ_INTERVAL_MS: u64 = 100;

    /// Default backoff before reopening a stalled device, in milliseconds
    pub const DEFAULT_RECOVERY_BACKOFF_MS: u64 = 500;

    /// Default loudness limit for zone classification
    pub const DEFAULT_LIMIT_DB: f32 = 40.0;

    /// Number of loudness zones below the limit
    pub const ZONE_BUCKETS: usize = 5;

    /// Chunk queue capacity (in callback-sized blocks)
    pub const CHUNK_QUEUE_CAPACITY: usize = 256;
}
