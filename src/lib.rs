//! Multi-track backing-track playback: several decoded stems mixed in real
//! time with per-track gain, played once in full or looped as a preview.

pub mod audio_data;
pub mod backend;
pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod mixer;
pub mod playback;
pub mod player;
pub mod volume;

mod session;

#[cfg(test)]
mod test_support;

pub use audio_data::{LoadOptions, SymphoniaLoader, TrackBuffer, TrackLoader};
pub use cache::{DEFAULT_PREVIEW_DURATION, TrackCache, TrackSet};
pub use config::PlayerDesc;
pub use device::{OutputDeviceInfo, list_output_devices};
pub use error::{Result, StemPlayError};
pub use events::PlaybackEvent;
pub use playback::PlaybackMode;
pub use player::AudioPlayer;
pub use session::SessionOutcome;
pub use volume::VolumeTable;
