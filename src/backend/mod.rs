//! Output backends.
//!
//! The player never talks to an audio API directly. It asks an
//! [`OutputBackend`] to open a stream bound to a render callback and keeps
//! the returned [`StreamHandle`] alive for as long as the stream should run.
//! [`CpalBackend`] is the default implementation.

mod cpal_output;

pub use cpal_output::CpalBackend;

use crate::device::OutputDeviceInfo;
use crate::error::Result;

/// Fills one quantum of interleaved stereo f32 samples. Called from the
/// audio thread; must not block.
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Receives asynchronous stream failures reported by the backend.
pub type StreamErrorCallback = Box<dyn FnMut(String) + Send + 'static>;

/// Parameters for opening an output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Index into [`OutputBackend::output_devices`]; `None` = system default
    pub device: Option<usize>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Exact callback size in frames, or `None` to let the device choose
    pub block_size: Option<u32>,
}

/// A running output stream.
///
/// Implementations stop delivering callbacks once `abort` returns or the
/// value is dropped.
pub trait ActiveStream {
    fn abort(&mut self);
}

/// Something that can enumerate output devices and open streams on them.
pub trait OutputBackend: Send + Sync {
    fn output_devices(&self) -> Result<Vec<OutputDeviceInfo>>;

    /// Open and start a stream. `render` is invoked once per quantum until
    /// the returned handle is dropped.
    fn open_stream(
        &self,
        request: &StreamRequest,
        render: RenderCallback,
        on_error: StreamErrorCallback,
    ) -> Result<StreamHandle>;
}

/// Exclusive owner of one open stream. Dropping it aborts the stream.
pub struct StreamHandle {
    stream: Option<Box<dyn ActiveStream>>,
}

impl StreamHandle {
    pub fn new(stream: Box<dyn ActiveStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Stop the stream now. Idempotent.
    pub fn abort(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
