//! Per-track gain table shared between the caller and the audio callback.

use crate::playback::CursorSet;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

/// Gain applied to every track until told otherwise.
pub const DEFAULT_GAIN: f32 = 1.0;

/// Thread-safe `track -> gain` map.
///
/// The key set is fixed at construction to the tracks of one player; writes
/// for any other key are ignored with a warning. Gains must be finite and
/// non-negative but are not clamped above, so values over `1.0` amplify.
#[derive(Debug, Clone, Default)]
pub struct VolumeTable {
    gains: Arc<Mutex<HashMap<PathBuf, f32>>>,
}

impl VolumeTable {
    /// Table with [`DEFAULT_GAIN`] for every id.
    pub fn new<I, P>(track_ids: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let gains = track_ids
            .into_iter()
            .map(|id| (id.as_ref().to_path_buf(), DEFAULT_GAIN))
            .collect();
        Self {
            gains: Arc::new(Mutex::new(gains)),
        }
    }

    /// Set one track's gain. Returns false (and changes nothing) for an
    /// unknown track or an invalid gain.
    pub fn set(&self, track: impl AsRef<Path>, gain: f32) -> bool {
        let track = track.as_ref();
        if !is_valid_gain(gain) {
            log::warn!(
                "Ignoring invalid volume {} for track '{}'",
                gain,
                track.display()
            );
            return false;
        }

        let mut gains = self.lock();
        match gains.get_mut(track) {
            Some(current) => {
                *current = gain;
                log::info!("Volume for track '{}' set to {}", track.display(), gain);
                true
            }
            None => {
                log::warn!("Track '{}' not found. Cannot set volume.", track.display());
                false
            }
        }
    }

    /// Apply several gains under one lock. Unknown tracks and invalid gains
    /// are skipped individually. Returns how many entries were applied.
    pub fn set_many<I, P>(&self, volumes: I) -> usize
    where
        I: IntoIterator<Item = (P, f32)>,
        P: AsRef<Path>,
    {
        let mut gains = self.lock();
        let mut applied = 0;
        for (track, gain) in volumes {
            let track = track.as_ref();
            if !is_valid_gain(gain) {
                log::warn!(
                    "Ignoring invalid volume {} for track '{}'",
                    gain,
                    track.display()
                );
                continue;
            }
            match gains.get_mut(track) {
                Some(current) => {
                    *current = gain;
                    applied += 1;
                }
                None => {
                    log::warn!("Track '{}' not found. Cannot set volume.", track.display());
                }
            }
        }
        applied
    }

    pub fn get(&self, track: impl AsRef<Path>) -> Option<f32> {
        self.lock().get(track.as_ref()).copied()
    }

    pub fn contains(&self, track: impl AsRef<Path>) -> bool {
        self.lock().contains_key(track.as_ref())
    }

    /// Copy of the whole table.
    pub fn snapshot(&self) -> HashMap<PathBuf, f32> {
        self.lock().clone()
    }

    /// Copy the gain of each cursor into `out` (same order), without blocking.
    ///
    /// Returns false if the table was busy; `out` is then left untouched so
    /// the caller keeps the previous quantum's gains.
    pub(crate) fn try_fill_gains(&self, cursors: &CursorSet, out: &mut [f32]) -> bool {
        let gains = match self.gains.try_lock() {
            Ok(gains) => gains,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        for (slot, cursor) in out.iter_mut().zip(cursors.iter()) {
            *slot = gains.get(cursor.id()).copied().unwrap_or(DEFAULT_GAIN);
        }
        true
    }

    /// Blocking counterpart of [`try_fill_gains`](Self::try_fill_gains),
    /// for use off the audio thread.
    pub(crate) fn fill_gains(&self, cursors: &CursorSet, out: &mut [f32]) {
        let gains = self.lock();
        for (slot, cursor) in out.iter_mut().zip(cursors.iter()) {
            *slot = gains.get(cursor.id()).copied().unwrap_or(DEFAULT_GAIN);
        }
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, f32>> {
        self.gains.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_valid_gain(gain: f32) -> bool {
    gain.is_finite() && gain >= 0.0
}
