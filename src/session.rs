//! The stream-owning side of a playback session.
//!
//! Every `play()` spawns one session thread. It opens the output stream,
//! retries on failure, then parks on a condition variable until the caller
//! asks for shutdown or the stream reports its own end. Stream handles are
//! created and dropped on this thread only, because several audio APIs do
//! not allow a stream to move between threads.
//!
//! Two counters keep stale work out of newer sessions:
//! - the *epoch* identifies a `play()` call; [`PlaybackStatus`] only accepts
//!   a finish notification for the epoch that is currently active;
//! - the *attempt* identifies one stream inside a session; callbacks from an
//!   attempt that already ended render silence.

use crate::backend::{OutputBackend, RenderCallback, StreamErrorCallback, StreamRequest};
use crate::cache::TrackSet;
use crate::config::PlayerDesc;
use crate::events::{PlaybackEvent, emit};
use crate::mixer::{Mixer, RenderStatus};
use crate::playback::{OUTPUT_CHANNELS, PlaybackMode};
use crate::volume::VolumeTable;
use crossbeam_channel::Sender;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Full-mode playback ran out of frames.
    Completed,
    /// The caller stopped playback.
    Stopped,
    /// No stream could be kept running within the attempt budget.
    RetriesExhausted { attempts: u32 },
}

/// Shared `is_playing` / clock state of one player.
///
/// `active_epoch == 0` means idle; any other value is the epoch of the
/// session that currently owns playback.
#[derive(Debug, Default)]
pub(crate) struct PlaybackStatus {
    active_epoch: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    last_outcome: Mutex<Option<(u64, SessionOutcome)>>,
}

impl PlaybackStatus {
    pub fn activate(&self, epoch: u64) {
        *lock(&self.started_at) = Some(Instant::now());
        self.active_epoch.store(epoch, Ordering::SeqCst);
    }

    /// Stream-finished notification. Clears playback only if `epoch` is still
    /// the active session; returns whether it did.
    pub fn finish(&self, epoch: u64) -> bool {
        self.active_epoch
            .compare_exchange(epoch, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn deactivate(&self) {
        self.active_epoch.store(0, Ordering::SeqCst);
        *lock(&self.started_at) = None;
    }

    pub fn is_playing(&self) -> bool {
        self.active_epoch.load(Ordering::SeqCst) != 0
    }

    pub fn is_active(&self, epoch: u64) -> bool {
        self.active_epoch.load(Ordering::SeqCst) == epoch
    }

    pub fn restart_clock(&self, epoch: u64) {
        let mut started_at = lock(&self.started_at);
        if self.is_active(epoch) {
            *started_at = Some(Instant::now());
        }
    }

    pub fn elapsed(&self) -> Duration {
        if !self.is_playing() {
            return Duration::ZERO;
        }
        lock(&self.started_at)
            .map(|start| start.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn record_outcome(&self, epoch: u64, outcome: SessionOutcome) {
        *lock(&self.last_outcome) = Some((epoch, outcome));
    }

    pub fn outcome(&self, epoch: u64) -> Option<SessionOutcome> {
        lock(&self.last_outcome)
            .as_ref()
            .filter(|(e, _)| *e == epoch)
            .map(|(_, outcome)| outcome.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    /// All tracks exhausted in full mode.
    Drained,
    /// The callback or the backend reported an error.
    Failed(String),
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Wake {
    Shutdown,
    Ended(StreamEnd),
}

#[derive(Debug, Default)]
struct SignalState {
    shutdown: bool,
    ended: Option<(u32, StreamEnd)>,
}

/// Cross-thread shutdown flag plus per-attempt end-of-stream notification.
#[derive(Debug, Default)]
pub(crate) struct SessionSignal {
    shutdown: AtomicBool,
    ended_attempt: AtomicU32,
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl SessionSignal {
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        lock(&self.state).shutdown = true;
        self.cond.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Report that the stream of `attempt` ended. Only the first report per
    /// attempt counts; later ones return false.
    pub fn end_stream(&self, attempt: u32, end: StreamEnd) -> bool {
        if self.ended_attempt.swap(attempt, Ordering::SeqCst) == attempt {
            return false;
        }
        lock(&self.state).ended = Some((attempt, end));
        self.cond.notify_all();
        true
    }

    pub fn has_ended(&self, attempt: u32) -> bool {
        self.ended_attempt.load(Ordering::SeqCst) == attempt
    }

    /// Block until shutdown is requested or the stream of `attempt` ends.
    /// Shutdown wins if both are pending.
    pub fn wait(&self, attempt: u32) -> Wake {
        let guard = lock(&self.state);
        let mut state = self
            .cond
            .wait_while(guard, |state| {
                !state.shutdown && !matches!(&state.ended, Some((a, _)) if *a == attempt)
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.shutdown {
            return Wake::Shutdown;
        }
        match state.ended.take() {
            Some((_, end)) => Wake::Ended(end),
            None => Wake::Shutdown,
        }
    }
}

/// Everything a session thread needs, moved onto that thread.
pub(crate) struct SessionContext {
    pub epoch: u64,
    pub tracks: Arc<TrackSet>,
    pub sample_rate: u32,
    pub mode: PlaybackMode,
    pub volumes: VolumeTable,
    pub desc: PlayerDesc,
    pub device: Option<usize>,
    pub backend: Arc<dyn OutputBackend>,
    pub status: Arc<PlaybackStatus>,
    pub signal: Arc<SessionSignal>,
    pub events: Sender<PlaybackEvent>,
}

pub(crate) fn spawn_session(ctx: SessionContext) -> std::io::Result<JoinHandle<SessionOutcome>> {
    thread::Builder::new()
        .name(format!("stemplay-stream-{}", ctx.epoch))
        .spawn(move || run_session(ctx))
}

pub(crate) fn run_session(ctx: SessionContext) -> SessionOutcome {
    let outcome = drive_stream(&ctx);
    ctx.status.record_outcome(ctx.epoch, outcome.clone());
    if ctx.status.finish(ctx.epoch) {
        log::debug!("Session {} ended: {:?}", ctx.epoch, outcome);
    }
    outcome
}

/// Open, watch and, if needed, reopen the output stream.
fn drive_stream(ctx: &SessionContext) -> SessionOutcome {
    let attempts = ctx.desc.max_open_attempts;
    let mut device = ctx.device;

    for attempt in 1..=attempts {
        if ctx.signal.is_shutdown() {
            return SessionOutcome::Stopped;
        }

        let request = StreamRequest {
            device,
            sample_rate: ctx.sample_rate,
            channels: OUTPUT_CHANNELS as u16,
            block_size: ctx
                .desc
                .fixed_block_size
                .then_some(ctx.desc.block_size as u32),
        };

        let error = match ctx.backend.open_stream(
            &request,
            render_callback(ctx, attempt),
            error_callback(ctx, attempt),
        ) {
            Ok(mut stream) => {
                if attempt > 1 {
                    ctx.status.restart_clock(ctx.epoch);
                }
                log::info!("Output stream opened (attempt {}/{})", attempt, attempts);
                emit(&ctx.events, PlaybackEvent::StreamOpened { attempt, device });

                // wait() checks shutdown first, so a stop() that raced with
                // the open is honored before the stream gets going.
                match ctx.signal.wait(attempt) {
                    Wake::Shutdown => {
                        stream.abort();
                        log::debug!("Audio playback stopped");
                        return SessionOutcome::Stopped;
                    }
                    Wake::Ended(StreamEnd::Drained) => {
                        stream.abort();
                        log::info!("Audio playback finished");
                        return SessionOutcome::Completed;
                    }
                    Wake::Ended(StreamEnd::Failed(error)) => {
                        stream.abort();
                        log::error!("Error during audio playback: {}", error);
                        error
                    }
                }
            }
            Err(e) => {
                log::error!(
                    "Failed to open output stream (attempt {}/{}): {}",
                    attempt,
                    attempts,
                    e
                );
                e.to_string()
            }
        };

        emit(&ctx.events, PlaybackEvent::StreamFailed { attempt, error });

        if device.take().is_some() && attempt < attempts {
            log::info!("Attempting to use default device");
        }
    }

    log::error!("Maximum retry count reached; playback did not start");
    emit(&ctx.events, PlaybackEvent::RetriesExhausted { attempts });
    SessionOutcome::RetriesExhausted { attempts }
}

/// The per-quantum closure handed to the backend: a fresh mixer for this
/// attempt plus the guards that keep it from outliving its session.
fn render_callback(ctx: &SessionContext, attempt: u32) -> RenderCallback {
    let mut mixer = Mixer::new(&ctx.tracks, ctx.mode, ctx.volumes.clone(), &ctx.desc);
    let signal = ctx.signal.clone();
    let status = ctx.status.clone();
    let events = ctx.events.clone();
    let epoch = ctx.epoch;

    Box::new(move |out: &mut [f32]| {
        if signal.is_shutdown() || signal.has_ended(attempt) || !status.is_active(epoch) {
            out.fill(0.0);
            return;
        }

        let rendered = panic::catch_unwind(AssertUnwindSafe(|| mixer.render(out)));
        let error = match rendered {
            Ok(Ok(RenderStatus::Playing)) => return,
            Ok(Ok(RenderStatus::Looped)) => {
                emit(
                    &events,
                    PlaybackEvent::Looped {
                        count: mixer.loop_count(),
                    },
                );
                return;
            }
            Ok(Ok(RenderStatus::Finished)) => {
                status.finish(epoch);
                signal.end_stream(attempt, StreamEnd::Drained);
                emit(&events, PlaybackEvent::Finished);
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("mixer panicked: {}", panic_message(payload.as_ref())),
        };

        out.fill(0.0);
        log::error!("Error in audio callback: {}", error);
        signal.end_stream(attempt, StreamEnd::Failed(error));
    })
}

fn error_callback(ctx: &SessionContext, attempt: u32) -> StreamErrorCallback {
    let signal = ctx.signal.clone();
    Box::new(move |error: String| {
        signal.end_stream(attempt, StreamEnd::Failed(error));
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_only_clears_active_epoch() {
        let status = PlaybackStatus::default();
        status.activate(2);
        assert!(!status.finish(1));
        assert!(status.is_playing());
        assert!(status.finish(2));
        assert!(!status.is_playing());
        assert!(!status.finish(2));
        assert_eq!(status.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_outcome_is_scoped_to_epoch() {
        let status = PlaybackStatus::default();
        status.record_outcome(3, SessionOutcome::Completed);
        assert_eq!(status.outcome(3), Some(SessionOutcome::Completed));
        assert_eq!(status.outcome(4), None);
    }

    #[test]
    fn test_stream_end_is_reported_once_per_attempt() {
        let signal = SessionSignal::default();
        assert!(signal.end_stream(1, StreamEnd::Drained));
        assert!(!signal.end_stream(1, StreamEnd::Failed("late".into())));
        assert!(signal.has_ended(1));
        assert!(!signal.has_ended(2));
        assert_eq!(signal.wait(1), Wake::Ended(StreamEnd::Drained));
    }

    #[test]
    fn test_wait_ignores_other_attempts_and_wakes_on_shutdown() {
        let signal = Arc::new(SessionSignal::default());
        signal.end_stream(1, StreamEnd::Failed("old".into()));

        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait(2))
        };
        thread::sleep(Duration::from_millis(20));
        signal.request_shutdown();

        assert_eq!(waiter.join().unwrap(), Wake::Shutdown);
        assert!(signal.is_shutdown());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
