//! Decoded-track cache shared between players.
//!
//! A [`TrackCache`] is an explicit service: whoever manages song assets owns
//! one and hands it to every [`AudioPlayer`](crate::AudioPlayer) it creates.
//! Entries are keyed by the sorted, de-duplicated file set plus the
//! [`PlaybackMode`], because preview loads are truncated and full loads are not.

use crate::audio_data::{LoadOptions, SymphoniaLoader, TrackBuffer, TrackLoader};
use crate::playback::PlaybackMode;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

/// Default length of preview loads.
pub const DEFAULT_PREVIEW_DURATION: Duration = Duration::from_secs(30);

/// Identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    files: Vec<PathBuf>,
    mode: PlaybackMode,
}

impl CacheKey {
    pub fn new<P: AsRef<Path>>(files: &[P], mode: PlaybackMode) -> Self {
        let mut files: Vec<PathBuf> = files.iter().map(|p| p.as_ref().to_path_buf()).collect();
        files.sort();
        files.dedup();
        Self { files, mode }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }
}

/// The playable result of one load request: decoded tracks keyed by source
/// path, plus the session sample rate.
///
/// The session rate is taken from the first track in path order, not in the
/// order the caller listed the files. Requests that differ only in file order
/// share one cache entry, so they must also agree on the rate.
#[derive(Debug, Clone, Default)]
pub struct TrackSet {
    tracks: BTreeMap<PathBuf, TrackBuffer>,
    sample_rate: Option<u32>,
}

impl TrackSet {
    /// Build a set from already decoded buffers. The first buffer inserted
    /// sets the session rate.
    pub fn from_buffers<I>(buffers: I) -> Self
    where
        I: IntoIterator<Item = (PathBuf, TrackBuffer)>,
    {
        let mut set = Self::default();
        for (path, buffer) in buffers {
            set.insert(path, buffer);
        }
        set
    }

    fn insert(&mut self, path: PathBuf, buffer: TrackBuffer) {
        match self.sample_rate {
            None => self.sample_rate = Some(buffer.sample_rate()),
            Some(rate) if rate != buffer.sample_rate() => {
                log::warn!(
                    "{} is {} Hz but the session runs at {} Hz; it will play at the wrong speed",
                    path.display(),
                    buffer.sample_rate(),
                    rate
                );
            }
            Some(_) => {}
        }
        self.tracks.insert(path, buffer);
    }

    /// Sample rate of the session, or `None` when nothing loaded.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&TrackBuffer> {
        self.tracks.get(path.as_ref())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.tracks.contains_key(path.as_ref())
    }

    /// Tracks in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &TrackBuffer)> {
        self.tracks.iter().map(|(path, buffer)| (path.as_path(), buffer))
    }

    pub fn track_ids(&self) -> impl Iterator<Item = &Path> {
        self.tracks.keys().map(PathBuf::as_path)
    }
}

type Slot = Arc<OnceLock<Arc<TrackSet>>>;

/// Loads and caches [`TrackSet`]s.
///
/// Concurrent requests for the same key block on a single load and receive
/// the same `Arc`. Buffers are immutable; callers build their own cursors.
pub struct TrackCache {
    loader: Arc<dyn TrackLoader>,
    preview_duration: Duration,
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl Default for TrackCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackCache {
    /// Cache backed by the Symphonia decoder.
    pub fn new() -> Self {
        Self::with_loader(Arc::new(SymphoniaLoader))
    }

    pub fn with_loader(loader: Arc<dyn TrackLoader>) -> Self {
        Self {
            loader,
            preview_duration: DEFAULT_PREVIEW_DURATION,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Length of the prefix kept for preview loads.
    pub fn preview_duration(mut self, duration: Duration) -> Self {
        self.preview_duration = duration;
        self
    }

    /// Returns the tracks for `files` in `mode`, loading them on first use.
    ///
    /// Files that fail to load are logged and left out. A request in which
    /// nothing loads returns an empty set, which is not cached so that a
    /// later request can retry.
    pub fn get_or_load<P: AsRef<Path>>(&self, files: &[P], mode: PlaybackMode) -> Arc<TrackSet> {
        let key = CacheKey::new(files, mode);

        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(key.clone()).or_default().clone()
        };

        let mut loaded_here = false;
        let set = slot
            .get_or_init(|| {
                loaded_here = true;
                Arc::new(self.load_set(&key))
            })
            .clone();

        if !loaded_here {
            log::debug!("Using cached audio for {:?} ({:?})", key.files(), mode);
        }

        if set.is_empty() {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.get(&key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                slots.remove(&key);
            }
        }

        set
    }

    /// True if a completed entry exists for this exact request.
    pub fn contains<P: AsRef<Path>>(&self, files: &[P], mode: PlaybackMode) -> bool {
        let key = CacheKey::new(files, mode);
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry. Sets already handed out stay alive.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        log::debug!("Clearing {} cached track set(s)", slots.len());
        slots.clear();
    }

    fn load_set(&self, key: &CacheKey) -> TrackSet {
        let options = match key.mode() {
            PlaybackMode::Preview => LoadOptions::new().max_duration(self.preview_duration),
            PlaybackMode::Full => LoadOptions::new(),
        };

        log::info!(
            "Loading {} file(s) for {:?} playback",
            key.files().len(),
            key.mode()
        );

        let mut set = TrackSet::default();
        for path in key.files() {
            match self.loader.load(path, &options) {
                Ok(buffer) => set.insert(path.clone(), buffer),
                Err(e) => log::error!("Failed to load {}: {}", path.display(), e),
            }
        }

        if set.is_empty() {
            log::warn!("No playable tracks in {:?}", key.files());
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryLoader;
    use std::thread;

    fn loader() -> Arc<MemoryLoader> {
        Arc::new(
            MemoryLoader::new()
                .with_track("song/guitar.ogg", TrackBuffer::mono(vec![0.5; 100], 100).unwrap())
                .with_track("song/vocals.ogg", TrackBuffer::mono(vec![0.25; 200], 100).unwrap()),
        )
    }

    #[test]
    fn test_key_is_sorted_and_deduplicated() {
        let a = CacheKey::new(&["b.ogg", "a.ogg", "b.ogg"], PlaybackMode::Preview);
        let b = CacheKey::new(&["a.ogg", "b.ogg"], PlaybackMode::Preview);
        assert_eq!(a, b);
        assert_ne!(a, CacheKey::new(&["a.ogg", "b.ogg"], PlaybackMode::Full));
    }

    #[test]
    fn test_session_rate_follows_path_order() {
        let loader = Arc::new(
            MemoryLoader::new()
                .with_track("b/drums.wav", TrackBuffer::mono(vec![0.0; 10], 44_100).unwrap())
                .with_track("a/bass.wav", TrackBuffer::mono(vec![0.0; 10], 48_000).unwrap()),
        );
        let cache = TrackCache::with_loader(loader);

        let set = cache.get_or_load(&["b/drums.wav", "a/bass.wav"], PlaybackMode::Full);
        assert_eq!(set.len(), 2);
        assert_eq!(set.sample_rate(), Some(48_000));
    }

    #[test]
    fn test_repeat_requests_share_buffers() {
        let loader = loader();
        let cache = TrackCache::with_loader(loader.clone());

        let first = cache.get_or_load(&["song/guitar.ogg", "song/vocals.ogg"], PlaybackMode::Full);
        let second = cache.get_or_load(&["song/vocals.ogg", "song/guitar.ogg"], PlaybackMode::Full);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.load_count(), 2);
        assert_eq!(first.sample_rate(), Some(100));
        assert!(cache.contains(&["song/guitar.ogg", "song/vocals.ogg"], PlaybackMode::Full));
    }

    #[test]
    fn test_preview_is_truncated_and_keyed_separately() {
        let loader = loader();
        let cache = TrackCache::with_loader(loader.clone()).preview_duration(Duration::from_secs(1));

        let preview = cache.get_or_load(&["song/vocals.ogg"], PlaybackMode::Preview);
        let full = cache.get_or_load(&["song/vocals.ogg"], PlaybackMode::Full);

        assert_eq!(preview.get("song/vocals.ogg").unwrap().total_frames(), 100);
        assert_eq!(full.get("song/vocals.ogg").unwrap().total_frames(), 200);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_file_is_dropped() {
        let cache = TrackCache::with_loader(loader());
        let set = cache.get_or_load(&["song/guitar.ogg", "song/missing.ogg"], PlaybackMode::Full);
        assert_eq!(set.len(), 1);
        assert!(set.contains("song/guitar.ogg"));
        assert!(!set.contains("song/missing.ogg"));
    }

    #[test]
    fn test_nothing_playable_is_empty_and_not_cached() {
        let cache = TrackCache::with_loader(loader());
        let set = cache.get_or_load(&["nope.ogg"], PlaybackMode::Preview);
        assert!(set.is_empty());
        assert_eq!(set.sample_rate(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_forces_reload() {
        let loader = loader();
        let cache = TrackCache::with_loader(loader.clone());

        let before = cache.get_or_load(&["song/guitar.ogg"], PlaybackMode::Full);
        cache.clear();
        assert!(cache.is_empty());
        let after = cache.get_or_load(&["song/guitar.ogg"], PlaybackMode::Full);

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(loader.load_count(), 2);
    }

    #[test]
    fn test_concurrent_requests_load_once() {
        let loader = loader();
        let cache = Arc::new(TrackCache::with_loader(loader.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || {
                    cache.get_or_load(&["song/guitar.ogg", "song/vocals.ogg"], PlaybackMode::Preview)
                })
            })
            .collect();
        let sets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(sets.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(loader.load_count(), 2);
    }
}
