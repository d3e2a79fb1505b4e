//! Sample acquisition from input devices
//!
//! A [`SampleSource`] hands out fixed-size blocks of mono PCM. The cpal
//! implementation runs the stream on a dedicated capture thread (cpal
//! streams are not `Send`) and bridges its callback into a lock-free
//! queue that `read` drains. Dropping the source stops the thread and
//! releases the stream; there is no separate close call to forget.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::buffer::{create_shared_queue, SampleBlock, SampleFormat, SharedChunkQueue};
use crate::audio::device::{default_input_device, get_input_device};
use crate::config::AudioConfig;
use crate::constants::CHANNELS;
use crate::error::AudioError;

/// How long `open` waits for the capture thread to report readiness
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval for blocking reads
const BLOCKING_POLL: Duration = Duration::from_millis(5);

/// Ceiling on a blocking read; a healthy device fills a block orders of
/// magnitude faster
const BLOCKING_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A live mono PCM input stream
///
/// A non-blocking read that returns an empty block is the stall signal:
/// the device is nominally running but has stopped producing data. It is
/// not an error at this layer.
pub trait SampleSource: Send {
    /// Pull up to `max_samples` samples.
    ///
    /// Blocking mode waits until `max_samples` are available or the
    /// stream reports a failure. Non-blocking mode returns immediately
    /// with whatever is queued, possibly an empty block.
    fn read(&mut self, max_samples: usize, blocking: bool) -> Result<SampleBlock, AudioError>;
}

/// Opens fresh [`SampleSource`] handles with a fixed configuration
///
/// The supervisor holds one of these so stall recovery can recreate the
/// device with settings identical to the original open.
pub trait SampleSourceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn SampleSource>, AudioError>;
}

/// Factory for cpal-backed microphone sources
pub struct CpalSourceFactory {
    config: AudioConfig,
}

impl CpalSourceFactory {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

impl SampleSourceFactory for CpalSourceFactory {
    fn open(&self) -> Result<Box<dyn SampleSource>, AudioError> {
        CpalSource::open(&self.config).map(|s| Box::new(s) as Box<dyn SampleSource>)
    }
}

/// Microphone source backed by a cpal input stream
pub struct CpalSource {
    /// Capture thread keeps running while set
    running: Arc<AtomicBool>,

    /// Callback-to-reader bridge
    queue: SharedChunkQueue,

    /// Samples left over from the previous read
    pending: SampleBlock,

    /// Channel for stream errors raised by the cpal error callback
    error_rx: Receiver<AudioError>,

    /// Capture thread handle
    thread_handle: Option<JoinHandle<()>>,

    format: SampleFormat,
}

impl CpalSource {
    /// Open the configured device and start capturing
    ///
    /// Device resolution, stream build, and playback start all happen
    /// before this returns; any of them failing is an open error the
    /// caller sees directly.
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let device = match &config.device {
            Some(name) => get_input_device(name)?,
            None => default_input_device()?,
        };

        if !device.supports_rate(config.sample_rate) {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} does not support {} Hz input",
                device.name, config.sample_rate
            )));
        }

        tracing::debug!(
            device = %device.name,
            sample_rate = config.sample_rate,
            format = %config.format,
            "opening capture stream"
        );

        let queue = create_shared_queue(config.queue_capacity);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let running = Arc::new(AtomicBool::new(true));

        let stream_config = StreamConfig {
            channels: CHANNELS,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let format = config.format;
        let thread_queue = queue.clone();
        let thread_running = running.clone();

        let handle = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                capture_thread(
                    device.into_inner(),
                    stream_config,
                    format,
                    thread_queue,
                    thread_running,
                    error_tx,
                    ready_tx,
                );
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                return Err(AudioError::StreamError(
                    "timed out waiting for capture stream".to_string(),
                ));
            }
        }

        Ok(Self {
            running,
            queue,
            pending: SampleBlock::empty(format),
            error_rx,
            thread_handle: Some(handle),
            format,
        })
    }

    /// Move queued chunks into `out` until it holds `max_samples`,
    /// stashing any excess for the next read
    fn drain_into(&mut self, out: &mut SampleBlock, max_samples: usize) {
        while out.len() < max_samples {
            match self.queue.pop() {
                Some(mut chunk) => out.append(&mut chunk),
                None => break,
            }
        }
        if out.len() > max_samples {
            self.pending = out.split_off(max_samples);
        }
    }
}

impl SampleSource for CpalSource {
    fn read(&mut self, max_samples: usize, blocking: bool) -> Result<SampleBlock, AudioError> {
        if let Ok(err) = self.error_rx.try_recv() {
            return Err(err);
        }

        let mut out = std::mem::replace(&mut self.pending, SampleBlock::empty(self.format));
        self.drain_into(&mut out, max_samples);

        if blocking {
            let deadline = Instant::now() + BLOCKING_READ_TIMEOUT;
            while out.len() < max_samples {
                if let Ok(err) = self.error_rx.try_recv() {
                    return Err(err);
                }
                if Instant::now() >= deadline {
                    return Err(AudioError::StreamError(
                        "blocking read timed out".to_string(),
                    ));
                }
                thread::sleep(BLOCKING_POLL);
                self.drain_into(&mut out, max_samples);
            }
        }

        Ok(out)
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        tracing::debug!("capture stream released");
    }
}

/// Body of the capture thread: build the stream, report readiness, then
/// hold the stream alive until the running flag clears
fn capture_thread(
    device: cpal::Device,
    stream_config: StreamConfig,
    format: SampleFormat,
    queue: SharedChunkQueue,
    running: Arc<AtomicBool>,
    error_tx: crossbeam_channel::Sender<AudioError>,
    ready_tx: crossbeam_channel::Sender<Result<(), AudioError>>,
) {
    let err_fn = {
        let error_tx = error_tx.clone();
        move |err: cpal::StreamError| {
            let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
        }
    };

    let stream = match format {
        SampleFormat::I16 => {
            let running = running.clone();
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if running.load(Ordering::Relaxed) {
                        let _ = queue.push(SampleBlock::I16(data.to_vec()));
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::F32 => {
            let running = running.clone();
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if running.load(Ordering::Relaxed) {
                        let _ = queue.push(SampleBlock::F32(data.to_vec()));
                    }
                },
                err_fn,
                None,
            )
        }
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::CpalError(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::CpalError(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(10));
    }

    // Stream is dropped here, stopping capture
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_device_fails() {
        let config = AudioConfig {
            device: Some("definitely-not-a-real-device".to_string()),
            ..AudioConfig::default()
        };
        let result = CpalSource::open(&config);
        assert!(matches!(result, Err(AudioError::DeviceNotFound(_))));
    }

    #[test]
    fn open_default_device_if_present() {
        // Systems without audio hardware legitimately fail here
        let config = AudioConfig::default();
        match CpalSource::open(&config) {
            Ok(mut source) => {
                let block = source.read(config.block_size, false).unwrap();
                assert!(block.len() <= config.block_size);
            }
            Err(e) => {
                tracing::debug!("no capture device available: {}", e);
            }
        }
    }
}
