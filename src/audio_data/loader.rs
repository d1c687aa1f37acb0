use crate::audio_data::{LoadOptions, TrackBuffer};
use crate::error::Result;
use std::path::Path;

/// Decodes one audio file into a [`TrackBuffer`].
///
/// StemPlay ships [`SymphoniaLoader`](crate::audio_data::SymphoniaLoader), but
/// any decoder can be plugged into a [`TrackCache`](crate::TrackCache) by
/// implementing this trait.
///
/// # Example
///
/// ```ignore
/// use stemplay::audio_data::{LoadOptions, TrackBuffer, TrackLoader};
/// use stemplay::error::Result;
/// use std::path::Path;
///
/// struct SilenceLoader;
///
/// impl TrackLoader for SilenceLoader {
///     fn load(&self, _path: &Path, _options: &LoadOptions) -> Result<TrackBuffer> {
///         TrackBuffer::mono(vec![0.0; 48_000], 48_000)
///     }
/// }
/// ```
pub trait TrackLoader: Send + Sync {
    /// Decodes `path`, honoring `options.max_duration` when set.
    ///
    /// # Errors
    ///
    /// Returns a `StemPlayError` if the file is missing, has an unsupported
    /// format, or cannot be decoded.
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<TrackBuffer>;
}
