mod default_loader;
mod load_options;
mod loader;

use crate::error::{Result, StemPlayError};
pub use default_loader::{SUPPORTED_EXTENSIONS, SymphoniaLoader, is_supported_audio_file};
pub use load_options::LoadOptions;
pub use loader::TrackLoader;
use std::sync::Arc;
use std::time::Duration;

/// Immutable decoded PCM for one source file.
///
/// Cloning is cheap: all clones share the same sample storage, which is never
/// mutated after construction. Playback positions live in
/// [`PlaybackCursor`](crate::playback::PlaybackCursor), not here.
///
/// # Data Format
/// Samples are stored **INTERLEAVED**, frame by frame:
/// - Stereo: `[L0, R0, L1, R1, ...]`
/// - Mono: `[M0, M1, M2, ...]`
///
/// Total length is always `total_frames * channels`.
#[derive(Debug, Clone)]
pub struct TrackBuffer {
    inner: Arc<TrackBufferInner>,
}

#[derive(Debug)]
struct TrackBufferInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    total_frames: usize,
}

impl TrackBuffer {
    /// Wraps interleaved samples. Trailing samples that do not fill a whole
    /// frame are dropped.
    pub fn new(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(StemPlayError::AudioFormat(
                "Track must have at least one channel".into(),
            ));
        }
        if sample_rate == 0 {
            return Err(StemPlayError::AudioFormat("Sample rate must be non-zero".into()));
        }

        let total_frames = samples.len() / channels as usize;
        samples.truncate(total_frames * channels as usize);

        Ok(Self {
            inner: Arc::new(TrackBufferInner {
                samples,
                sample_rate,
                channels,
                total_frames,
            }),
        })
    }

    /// Build a buffer from per-frame channel arrays, e.g. `[[l, r], [l, r]]`.
    pub fn from_frames<const C: usize>(frames: &[[f32; C]], sample_rate: u32) -> Result<Self> {
        let samples = frames.iter().flatten().copied().collect();
        Self::new(samples, sample_rate, C as u16)
    }

    /// Build a mono buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(samples, sample_rate, 1)
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.inner.total_frames == 0
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.inner.total_frames as f64 / self.inner.sample_rate as f64)
    }

    /// Interleaved samples of a single frame.
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let channels = self.inner.channels as usize;
        let start = index.checked_mul(channels)?;
        self.inner.samples.get(start..start + channels)
    }

    /// True if both handles point at the same sample storage.
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
