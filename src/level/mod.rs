//! Loudness estimation, publication, and classification

pub mod estimator;
pub mod publisher;
pub mod zones;

pub use estimator::LevelEstimator;
pub use publisher::LevelPublisher;
pub use zones::{ThresholdClassifier, Zone};
