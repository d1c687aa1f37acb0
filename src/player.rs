//! The playback controller.

use crate::backend::{CpalBackend, OutputBackend};
use crate::cache::{TrackCache, TrackSet};
use crate::config::PlayerDesc;
use crate::device::resolve_output_device;
use crate::error::Result;
use crate::events::{PlaybackEvent, emit};
use crate::playback::PlaybackMode;
use crate::session::{
    PlaybackStatus, SessionContext, SessionOutcome, SessionSignal, spawn_session,
};
use crate::volume::VolumeTable;
use crossbeam_channel::{Receiver, Sender};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

struct ActiveSession {
    epoch: u64,
    signal: Arc<SessionSignal>,
    // Never joined; dropping the handle detaches the thread.
    _thread: JoinHandle<SessionOutcome>,
}

/// Plays one set of tracks, mixed, on an output device.
///
/// `AudioPlayer` owns the start/stop state machine. Its methods never fail:
/// problems are logged and reported as [`PlaybackEvent`]s, and the only
/// effect visible through [`is_playing`](Self::is_playing) is that audio
/// does not play.
///
/// ```no_run
/// use stemplay::{AudioPlayer, PlaybackMode, PlayerDesc, TrackCache};
///
/// let cache = TrackCache::new();
/// let files = ["song/drums.ogg", "song/guitar.ogg"];
/// let mut player = AudioPlayer::new(&cache, &files, PlaybackMode::Full, PlayerDesc::default());
///
/// player.set_volume("song/guitar.ogg", 0.5);
/// player.play();
/// while player.is_playing() {
///     std::thread::sleep(std::time::Duration::from_millis(16));
/// }
/// ```
pub struct AudioPlayer {
    tracks: Arc<TrackSet>,
    mode: PlaybackMode,
    volumes: VolumeTable,
    desc: PlayerDesc,
    device: Option<usize>,
    backend: Arc<dyn OutputBackend>,
    status: Arc<PlaybackStatus>,
    session: Option<ActiveSession>,
    epoch: u64,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
}

impl AudioPlayer {
    /// Player on the default cpal host.
    pub fn new<P: AsRef<Path>>(
        cache: &TrackCache,
        files: &[P],
        mode: PlaybackMode,
        desc: PlayerDesc,
    ) -> Self {
        Self::with_backend(cache, files, mode, desc, Arc::new(CpalBackend))
    }

    /// Player on a custom output backend.
    ///
    /// Tracks come from `cache`, loading them if needed. The preferred output
    /// device is resolved once, here; if it cannot be used the player falls
    /// back to the system default and emits [`PlaybackEvent::DeviceFallback`].
    pub fn with_backend<P: AsRef<Path>>(
        cache: &TrackCache,
        files: &[P],
        mode: PlaybackMode,
        desc: PlayerDesc,
        backend: Arc<dyn OutputBackend>,
    ) -> Self {
        let desc = match desc.validate() {
            Ok(()) => desc,
            Err(e) => {
                log::warn!("{}; using default player settings", e);
                PlayerDesc {
                    output_device: desc.output_device,
                    ..PlayerDesc::default()
                }
            }
        };

        let tracks = cache.get_or_load(files, mode);
        let volumes = VolumeTable::new(tracks.track_ids());
        let (events_tx, events_rx) = crossbeam_channel::bounded(desc.event_capacity);

        let device = match desc.output_device.as_deref() {
            None => None,
            Some(requested) => match Self::resolve_device(backend.as_ref(), requested) {
                Ok(device) => device,
                Err(e) => {
                    log::warn!(
                        "Cannot use output device '{}': {}. Falling back to default device",
                        requested,
                        e
                    );
                    emit(
                        &events_tx,
                        PlaybackEvent::DeviceFallback {
                            requested: requested.to_string(),
                            reason: e.to_string(),
                        },
                    );
                    None
                }
            },
        };

        log::debug!(
            "Player created: {} tracks, {:?} mode, device {:?}",
            tracks.len(),
            mode,
            device
        );

        Self {
            tracks,
            mode,
            volumes,
            desc,
            device,
            backend,
            status: Arc::new(PlaybackStatus::default()),
            session: None,
            epoch: 0,
            events_tx,
            events_rx,
        }
    }

    fn resolve_device(backend: &dyn OutputBackend, requested: &str) -> Result<Option<usize>> {
        let devices = backend.output_devices()?;
        resolve_output_device(Some(requested), &devices)
    }

    /// Start playback from the top, stopping any session in progress first.
    ///
    /// Returns immediately; the stream is opened on a background thread.
    /// Does nothing when no track loaded.
    pub fn play(&mut self) {
        self.stop();

        let Some(sample_rate) = self.tracks.sample_rate().filter(|_| !self.tracks.is_empty())
        else {
            log::warn!("No playable tracks; playback not started");
            return;
        };

        self.epoch += 1;
        let epoch = self.epoch;
        let signal = Arc::new(SessionSignal::default());
        self.status.activate(epoch);

        let ctx = SessionContext {
            epoch,
            tracks: self.tracks.clone(),
            sample_rate,
            mode: self.mode,
            volumes: self.volumes.clone(),
            desc: self.desc.clone(),
            device: self.device,
            backend: self.backend.clone(),
            status: self.status.clone(),
            signal: signal.clone(),
            events: self.events_tx.clone(),
        };

        match spawn_session(ctx) {
            Ok(thread) => {
                log::debug!("Playback session {} started", epoch);
                self.session = Some(ActiveSession {
                    epoch,
                    signal,
                    _thread: thread,
                });
            }
            Err(e) => {
                log::error!("Failed to spawn playback thread: {}", e);
                self.status.finish(epoch);
            }
        }
    }

    /// Stop playback. Safe to call at any time, any number of times.
    ///
    /// Does not wait for the stream thread: it is told to shut down and left
    /// to close the stream on its own.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        session.signal.request_shutdown();
        if self.status.finish(session.epoch) {
            self.status.deactivate();
            log::debug!("Playback session {} stopped", session.epoch);
            emit(&self.events_tx, PlaybackEvent::Stopped);
        }
    }

    /// Set one track's gain. Unknown tracks are logged and ignored.
    pub fn set_volume(&self, track: impl AsRef<Path>, gain: f32) -> bool {
        self.volumes.set(track, gain)
    }

    /// Set several gains at once; returns how many were applied.
    pub fn set_volumes<I, P>(&self, volumes: I) -> usize
    where
        I: IntoIterator<Item = (P, f32)>,
        P: AsRef<Path>,
    {
        self.volumes.set_many(volumes)
    }

    pub fn is_playing(&self) -> bool {
        self.status.is_playing()
    }

    /// Seconds since playback started, by wall clock; 0 when not playing.
    pub fn get_time(&self) -> f64 {
        self.status.elapsed().as_secs_f64()
    }

    /// How the most recent session ended, once it has.
    pub fn last_outcome(&self) -> Option<SessionOutcome> {
        self.status.outcome(self.epoch)
    }

    /// Drain pending events without blocking.
    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        self.events_rx.try_iter().collect()
    }

    /// A receiver for consuming events on another thread.
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn volumes(&self) -> &VolumeTable {
        &self.volumes
    }

    /// The device streams are opened on; `None` is the system default.
    pub fn output_device(&self) -> Option<usize> {
        self.device
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
