//! Engine facade: the host-facing two-signal interface
//!
//! Hosts see exactly `start` and `stop` plus read-only observers. All
//! platform concerns (which device, how recovery works) stay behind the
//! facade; the only caller-visible failure is the initial open.

pub mod supervisor;

pub use supervisor::{StateCell, StreamSupervisor, SupervisorState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::audio::source::{CpalSourceFactory, SampleSourceFactory};
use crate::config::{EngineConfig, MeterConfig};
use crate::error::Result;
use crate::level::{LevelEstimator, LevelPublisher, ThresholdClassifier, Zone};

/// The metering engine
///
/// `start` opens the device and launches the supervisor task; `stop`
/// signals it and waits for the handle to be released. Between the two,
/// any number of readers may poll [`level`](Self::level),
/// [`state`](Self::state), and [`zone`](Self::zone); the reference
/// cadence is the engine's own read interval (default 100 ms).
pub struct MeterEngine {
    factory: Arc<dyn SampleSourceFactory>,
    estimator: LevelEstimator,
    publisher: LevelPublisher,
    state: StateCell,
    classifier: ThresholdClassifier,
    engine_config: EngineConfig,
    block_size: usize,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl MeterEngine {
    /// Engine over the configured cpal microphone
    pub fn new(config: &MeterConfig) -> Self {
        let factory = Arc::new(CpalSourceFactory::new(config.audio.clone()));
        Self::with_factory(config, factory)
    }

    /// Engine over a custom source factory (embedding, tests)
    pub fn with_factory(config: &MeterConfig, factory: Arc<dyn SampleSourceFactory>) -> Self {
        Self {
            factory,
            estimator: LevelEstimator::new(config.audio.format),
            publisher: LevelPublisher::new(),
            state: StateCell::new(),
            classifier: ThresholdClassifier::new(config.display.limit_db),
            engine_config: config.engine.clone(),
            block_size: config.audio.block_size,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Open the device and launch the acquisition loop
    ///
    /// An open failure (no device, permission revoked, busy hardware) is
    /// returned to the host and nothing is retried; the host may call
    /// `start` again later. Starting an already-started engine is a
    /// no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }

        self.state.set(SupervisorState::Starting);
        let source = match self.factory.open() {
            Ok(source) => source,
            Err(e) => {
                self.state.set(SupervisorState::Stopped);
                return Err(e.into());
            }
        };

        self.running.store(true, Ordering::SeqCst);
        let supervisor = StreamSupervisor::new(
            self.factory.clone(),
            source,
            self.estimator,
            self.publisher.clone(),
            self.state.clone(),
            self.running.clone(),
            &self.engine_config,
            self.block_size,
        );
        self.task = Some(tokio::spawn(supervisor.run()));

        tracing::info!("metering engine started");
        Ok(())
    }

    /// Signal the loop to stop and wait for the device to be released
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            let _ = task.await;
            tracing::info!("metering engine stopped");
        }
    }

    /// Latest published loudness reading
    pub fn level(&self) -> f32 {
        self.publisher.current()
    }

    /// Current supervisor state
    pub fn state(&self) -> SupervisorState {
        self.state.get()
    }

    /// Zone classification of the latest reading
    pub fn zone(&self) -> Zone {
        self.classifier.classify(self.level())
    }

    pub fn classifier(&self) -> &ThresholdClassifier {
        &self.classifier
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::SampleBlock;
    use crate::audio::source::SampleSource;
    use crate::error::{AudioError, Error};

    /// Source that always produces steady audio
    struct SteadySource;

    impl SampleSource for SteadySource {
        fn read(&mut self, max_samples: usize, _blocking: bool) -> std::result::Result<SampleBlock, AudioError> {
            Ok(SampleBlock::I16(vec![3000; max_samples]))
        }
    }

    struct SteadyFactory;

    impl SampleSourceFactory for SteadyFactory {
        fn open(&self) -> std::result::Result<Box<dyn SampleSource>, AudioError> {
            Ok(Box::new(SteadySource))
        }
    }

    /// Factory standing in for a missing or denied device
    struct UnavailableFactory;

    impl SampleSourceFactory for UnavailableFactory {
        fn open(&self) -> std::result::Result<Box<dyn SampleSource>, AudioError> {
            Err(AudioError::DeviceNotFound("microphone".to_string()))
        }
    }

    fn fast_config() -> MeterConfig {
        let mut config = MeterConfig::default();
        config.engine.read_interval_ms = 2;
        config.engine.recovery_backoff_ms = 5;
        config.audio.block_size = 64;
        config
    }

    #[tokio::test]
    async fn start_poll_stop_round_trip() {
        let config = fast_config();
        let mut engine = MeterEngine::with_factory(&config, Arc::new(SteadyFactory));

        engine.start().unwrap();
        assert!(engine.is_started());

        // Double start is a no-op
        engine.start().unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while engine.level() == 0.0 {
            assert!(std::time::Instant::now() < deadline);
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        assert_eq!(engine.state(), SupervisorState::Running);
        assert!(engine.zone().active_buckets > 0);

        engine.stop().await;
        assert!(!engine.is_started());
        assert_eq!(engine.state(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn open_failure_surfaces_to_the_host() {
        let config = fast_config();
        let mut engine = MeterEngine::with_factory(&config, Arc::new(UnavailableFactory));

        let err = engine.start().unwrap_err();
        assert!(matches!(err, Error::Audio(AudioError::DeviceNotFound(_))));
        assert!(!engine.is_started());
        assert_eq!(engine.state(), SupervisorState::Stopped);
    }

    /// Fails the first open, succeeds afterwards
    struct LateFactory {
        failed_once: AtomicBool,
    }

    impl SampleSourceFactory for LateFactory {
        fn open(&self) -> std::result::Result<Box<dyn SampleSource>, AudioError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(AudioError::DeviceNotFound("not yet granted".to_string()));
            }
            Ok(Box::new(SteadySource))
        }
    }

    #[tokio::test]
    async fn host_may_retry_start_after_failure() {
        let config = fast_config();
        let factory = Arc::new(LateFactory {
            failed_once: AtomicBool::new(false),
        });
        let mut engine = MeterEngine::with_factory(&config, factory);

        // First start fails, e.g. before capture permission was granted
        assert!(engine.start().is_err());
        assert_eq!(engine.state(), SupervisorState::Stopped);

        // The same engine starts cleanly once the device appears
        engine.start().unwrap();
        assert!(engine.is_started());
        engine.stop().await;
        assert_eq!(engine.state(), SupervisorState::Stopped);
    }
}
