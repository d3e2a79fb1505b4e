//! Audio acquisition subsystem

pub mod buffer;
pub mod device;
pub mod source;

pub use buffer::{ChunkQueue, SampleBlock, SampleFormat};
pub use device::{default_input_device, get_input_device, list_input_devices, InputDevice};
pub use source::{CpalSource, CpalSourceFactory, SampleSource, SampleSourceFactory};
