//! The acquisition loop and its stall-recovery state machine
//!
//! One supervisor task owns the device handle, pulls a block per pass,
//! publishes the estimated level, and heals the stream when it stops
//! producing. Recovery is a black-box policy: release the handle, back
//! off, reopen with identical configuration. Stalls repeat without
//! bound; a permanently missing device becomes a steady retry, never a
//! fatal error.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::audio::source::{SampleSource, SampleSourceFactory};
use crate::config::EngineConfig;
use crate::level::{LevelEstimator, LevelPublisher};

/// Lifecycle state of the acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SupervisorState {
    /// Device opened, waiting for the first productive read
    Starting = 0,
    /// Stream producing, levels publishing
    Running = 1,
    /// A read came back empty; transient, leads straight to recovery
    Stalled = 2,
    /// Handle released, waiting out the backoff or retrying the open
    Recovering = 3,
    /// Stop signal honored, handle released, loop terminated
    Stopped = 4,
}

impl SupervisorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SupervisorState::Starting,
            1 => SupervisorState::Running,
            2 => SupervisorState::Stalled,
            3 => SupervisorState::Recovering,
            _ => SupervisorState::Stopped,
        }
    }
}

/// Shared observable state slot, same single-writer discipline as the
/// level publisher
#[derive(Clone, Debug)]
pub struct StateCell {
    state: Arc<AtomicU8>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(SupervisorState::Stopped as u8)),
        }
    }

    pub fn set(&self, state: SupervisorState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn get(&self) -> SupervisorState {
        SupervisorState::from_u8(self.state.load(Ordering::Relaxed))
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// The acquisition loop
///
/// Constructed with an already-open source so open failures surface to
/// the host through [`MeterEngine::start`](crate::engine::MeterEngine::start)
/// instead of dying silently inside the task.
pub struct StreamSupervisor {
    factory: Arc<dyn SampleSourceFactory>,
    source: Option<Box<dyn SampleSource>>,
    estimator: LevelEstimator,
    publisher: LevelPublisher,
    state: StateCell,
    running: Arc<AtomicBool>,
    block_size: usize,
    read_interval: Duration,
    backoff: Duration,
}

impl StreamSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        factory: Arc<dyn SampleSourceFactory>,
        source: Box<dyn SampleSource>,
        estimator: LevelEstimator,
        publisher: LevelPublisher,
        state: StateCell,
        running: Arc<AtomicBool>,
        config: &EngineConfig,
        block_size: usize,
    ) -> Self {
        Self {
            factory,
            source: Some(source),
            estimator,
            publisher,
            state,
            running,
            block_size,
            read_interval: config.read_interval(),
            backoff: config.recovery_backoff(),
        }
    }

    /// Run until the stop flag clears
    ///
    /// The flag is checked at the top of every pass, immediately after
    /// each sleep, so stop takes effect within one pacing or backoff
    /// interval.
    pub async fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            match self.source.as_mut() {
                Some(source) => {
                    match source.read(self.block_size, false) {
                        Ok(block) if !block.is_empty() => {
                            self.publisher.publish(self.estimator.level(&block));
                            if self.state.get() != SupervisorState::Running {
                                tracing::debug!("stream producing, entering RUNNING");
                                self.state.set(SupervisorState::Running);
                            }
                        }
                        Ok(_) => self.on_stall("zero-sample read"),
                        Err(e) => self.on_stall(&e.to_string()),
                    }
                    sleep(self.read_interval).await;
                }
                None => self.reopen_after_backoff().await,
            }
        }

        // Release the handle before reporting the terminal state
        self.source = None;
        self.state.set(SupervisorState::Stopped);
        tracing::debug!("supervisor stopped");
    }

    /// Running -> Stalled -> Recovering, all within one pass
    fn on_stall(&mut self, reason: &str) {
        tracing::warn!(reason, "input stream stalled, recreating device");

        // Zero out first so no reader holds a stale loud value
        self.publisher.publish(0.0);
        self.state.set(SupervisorState::Stalled);

        // Old handle goes before any new one is created
        self.source = None;
        self.state.set(SupervisorState::Recovering);
    }

    async fn reopen_after_backoff(&mut self) {
        sleep(self.backoff).await;
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        match self.factory.open() {
            Ok(source) => {
                tracing::info!("capture device reopened");
                // Stays Recovering until the new handle's first
                // productive read
                self.source = Some(source);
            }
            Err(e) => {
                tracing::warn!(error = %e, "reopen failed, retrying after backoff");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::SampleBlock;
    use crate::error::AudioError;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Shared open/release ledger for handle-leak assertions
    #[derive(Default)]
    struct SourceLog {
        attempts: AtomicUsize,
        opens: AtomicUsize,
        releases: AtomicUsize,
    }

    struct MockSource {
        reads: VecDeque<SampleBlock>,
        log: Arc<SourceLog>,
    }

    impl SampleSource for MockSource {
        fn read(&mut self, max_samples: usize, _blocking: bool) -> Result<SampleBlock, AudioError> {
            // Past the script, keep producing steady audio
            Ok(self
                .reads
                .pop_front()
                .unwrap_or_else(|| SampleBlock::I16(vec![1000; max_samples])))
        }
    }

    impl Drop for MockSource {
        fn drop(&mut self) {
            self.log.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Factory handing out scripted sources, optionally failing every
    /// open past a cutoff
    struct MockFactory {
        log: Arc<SourceLog>,
        scripts: Mutex<VecDeque<VecDeque<SampleBlock>>>,
        open_limit: Option<usize>,
    }

    impl MockFactory {
        fn new(scripts: Vec<Vec<SampleBlock>>) -> Self {
            Self {
                log: Arc::new(SourceLog::default()),
                scripts: Mutex::new(scripts.into_iter().map(VecDeque::from).collect()),
                open_limit: None,
            }
        }

        fn with_open_limit(mut self, limit: usize) -> Self {
            self.open_limit = Some(limit);
            self
        }
    }

    impl SampleSourceFactory for MockFactory {
        fn open(&self) -> Result<Box<dyn SampleSource>, AudioError> {
            self.log.attempts.fetch_add(1, Ordering::SeqCst);

            if let Some(limit) = self.open_limit {
                if self.log.opens.load(Ordering::SeqCst) >= limit {
                    return Err(AudioError::DeviceNotFound("device gone".to_string()));
                }
            }

            // Every prior handle must already be released
            let opens = self.log.opens.fetch_add(1, Ordering::SeqCst);
            assert_eq!(
                opens,
                self.log.releases.load(Ordering::SeqCst),
                "a second handle was opened while one was still live"
            );

            let reads = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
            Ok(Box::new(MockSource {
                reads,
                log: self.log.clone(),
            }))
        }
    }

    fn spawn_supervisor(
        factory: Arc<MockFactory>,
        read_interval_ms: u64,
        backoff_ms: u64,
    ) -> (
        LevelPublisher,
        StateCell,
        Arc<AtomicBool>,
        tokio::task::JoinHandle<()>,
    ) {
        let publisher = LevelPublisher::new();
        let state = StateCell::new();
        let running = Arc::new(AtomicBool::new(true));
        state.set(SupervisorState::Starting);

        let source = factory.open().expect("initial open");
        let supervisor = StreamSupervisor::new(
            factory,
            source,
            LevelEstimator::new(crate::audio::SampleFormat::I16),
            publisher.clone(),
            state.clone(),
            running.clone(),
            &EngineConfig {
                read_interval_ms,
                recovery_backoff_ms: backoff_ms,
            },
            64,
        );

        let task = tokio::spawn(supervisor.run());
        (publisher, state, running, task)
    }

    async fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while !cond() {
            assert!(Instant::now() < deadline, "condition not met in time");
            sleep(Duration::from_millis(1)).await;
        }
    }

    fn data(n: usize) -> SampleBlock {
        SampleBlock::I16(vec![2000; n])
    }

    fn empty() -> SampleBlock {
        SampleBlock::I16(Vec::new())
    }

    #[tokio::test]
    async fn stall_triggers_one_recovery_episode() {
        // First source produces, stalls; its replacement produces forever
        let factory = Arc::new(MockFactory::new(vec![vec![data(64), empty()]]));
        let log = factory.log.clone();

        let (publisher, state, running, task) = spawn_supervisor(factory, 2, 40);

        // During the backoff the published level must read zero
        wait_for(
            || state.get() == SupervisorState::Recovering,
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(publisher.current(), 0.0);
        assert_eq!(log.releases.load(Ordering::SeqCst), 1);

        // The replacement handle brings the loop back to RUNNING
        wait_for(
            || state.get() == SupervisorState::Running,
            Duration::from_secs(2),
        )
        .await;
        wait_for(|| publisher.current() > 0.0, Duration::from_secs(2)).await;

        // Exactly one new handle per stall episode
        assert_eq!(log.opens.load(Ordering::SeqCst), 2);
        assert_eq!(log.releases.load(Ordering::SeqCst), 1);

        running.store(false, Ordering::SeqCst);
        task.await.unwrap();

        assert_eq!(state.get(), SupervisorState::Stopped);
        assert_eq!(
            log.opens.load(Ordering::SeqCst),
            log.releases.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn stop_during_paced_delay_exits_promptly() {
        let factory = Arc::new(MockFactory::new(vec![]));
        let log = factory.log.clone();

        let (_publisher, state, running, task) = spawn_supervisor(factory, 50, 500);

        wait_for(
            || state.get() == SupervisorState::Running,
            Duration::from_secs(2),
        )
        .await;

        // Stop lands while the loop sleeps between reads
        running.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_millis(150), task)
            .await
            .expect("loop did not exit within one pacing interval")
            .unwrap();

        assert_eq!(state.get(), SupervisorState::Stopped);
        assert_eq!(
            log.opens.load(Ordering::SeqCst),
            log.releases.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn missing_device_keeps_retrying_until_stopped() {
        // One good source, then every reopen fails
        let factory =
            Arc::new(MockFactory::new(vec![vec![data(64), empty()]]).with_open_limit(1));
        let log = factory.log.clone();

        let (publisher, state, running, task) = spawn_supervisor(factory, 2, 5);

        // Several failed attempts accumulate; the loop never gives up
        wait_for(
            || log.attempts.load(Ordering::SeqCst) >= 4,
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(state.get(), SupervisorState::Recovering);
        assert_eq!(publisher.current(), 0.0);

        // Stop works from RECOVERING too
        running.store(false, Ordering::SeqCst);
        task.await.unwrap();
        assert_eq!(state.get(), SupervisorState::Stopped);
        assert_eq!(
            log.opens.load(Ordering::SeqCst),
            log.releases.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn repeated_stalls_each_recreate_the_device() {
        // Two consecutive stall episodes
        let factory = Arc::new(MockFactory::new(vec![
            vec![data(64), empty()],
            vec![data(64), empty()],
        ]));
        let log = factory.log.clone();

        let (_publisher, state, running, task) = spawn_supervisor(factory, 2, 5);

        wait_for(
            || log.opens.load(Ordering::SeqCst) == 3,
            Duration::from_secs(2),
        )
        .await;
        wait_for(
            || state.get() == SupervisorState::Running,
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(log.releases.load(Ordering::SeqCst), 2);

        running.store(false, Ordering::SeqCst);
        task.await.unwrap();
        assert_eq!(
            log.opens.load(Ordering::SeqCst),
            log.releases.load(Ordering::SeqCst)
        );
    }
}
