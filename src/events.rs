//! Event types for StemPlay

use crossbeam_channel::{Sender, TrySendError};

/// Notifications emitted by an [`AudioPlayer`](crate::AudioPlayer) and its
/// stream. Drain them with [`AudioPlayer::poll_events`](crate::AudioPlayer::poll_events).
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// An output stream is running. `device` is `None` for the system default.
    StreamOpened { attempt: u32, device: Option<usize> },
    /// A preview finished one pass and restarted from the top.
    Looped { count: u64 },
    /// Every track ran out in full mode.
    Finished,
    /// Playback was stopped by the caller.
    Stopped,
    /// The preferred output device could not be used; the default is used instead.
    DeviceFallback { requested: String, reason: String },
    /// Opening or running a stream failed; another attempt may follow.
    StreamFailed { attempt: u32, error: String },
    /// Every open attempt failed; playback did not start.
    RetriesExhausted { attempts: u32 },
}

impl PlaybackEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceFallback { .. } | Self::StreamFailed { .. } | Self::RetriesExhausted { .. }
        )
    }

    /// True for events after which nothing is playing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Stopped | Self::RetriesExhausted { .. }
        )
    }
}

/// Queue an event without blocking. A full queue drops the event.
pub(crate) fn emit(events: &Sender<PlaybackEvent>, event: PlaybackEvent) {
    if let Err(TrySendError::Full(event)) = events.try_send(event) {
        log::debug!("Event queue full, dropping {:?}", event);
    }
}
