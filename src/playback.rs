//! Playback modes and per-session cursors.
//!
//! - [`PlaybackMode`]: preview (bounded, auto-looping) vs. full (single pass)
//! - [`PlaybackCursor`]: remaining-frames view over one [`TrackBuffer`]
//! - [`CursorSet`]: every cursor of a session, in a stable order
//!
//! Cursors never copy PCM: they hold a shared handle to the immutable origin
//! buffer plus a read offset. Rewinding a cursor is therefore equivalent to
//! cloning a fresh one from the origin.

use crate::audio_data::TrackBuffer;
use crate::cache::TrackSet;
use std::path::{Path, PathBuf};

/// Number of interleaved output channels produced by the mixer.
pub const OUTPUT_CHANNELS: usize = 2;

/// How a track set is loaded and what happens when it runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackMode {
    /// Bounded-length load; all tracks restart together once every one is exhausted
    Preview,
    /// Complete decode; the stream ends once every track is exhausted
    #[default]
    Full,
}

impl PlaybackMode {
    pub fn is_preview(self) -> bool {
        matches!(self, Self::Preview)
    }
}

/// Mutable read position over one track for one playback session.
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    id: PathBuf,
    origin: TrackBuffer,
    position: usize,
}

impl PlaybackCursor {
    pub fn new(id: PathBuf, origin: TrackBuffer) -> Self {
        Self {
            id,
            origin,
            position: 0,
        }
    }

    pub fn id(&self) -> &Path {
        &self.id
    }

    pub fn origin(&self) -> &TrackBuffer {
        &self.origin
    }

    /// Frames consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Frames left to play.
    pub fn remaining(&self) -> usize {
        self.origin.total_frames() - self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Return to the start of the origin buffer.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Add up to `out.len() / 2` frames, scaled by `gain`, into the stereo
    /// slice `out` and advance past them. Returns the number of frames consumed.
    ///
    /// Mono sources are duplicated to both channels; sources with more than
    /// two channels contribute their first two.
    pub fn mix_into(&mut self, out: &mut [f32], gain: f32) -> usize {
        let frames = (out.len() / OUTPUT_CHANNELS).min(self.remaining());
        if frames == 0 {
            return 0;
        }

        let channels = self.origin.channels() as usize;
        let start = self.position * channels;
        let source = &self.origin.samples()[start..start + frames * channels];
        let dest = &mut out[..frames * OUTPUT_CHANNELS];

        if channels == 1 {
            for (frame, &sample) in dest.chunks_exact_mut(OUTPUT_CHANNELS).zip(source) {
                let scaled = sample * gain;
                frame[0] += scaled;
                frame[1] += scaled;
            }
        } else {
            for (frame, src) in dest
                .chunks_exact_mut(OUTPUT_CHANNELS)
                .zip(source.chunks_exact(channels))
            {
                frame[0] += src[0] * gain;
                frame[1] += src[1] * gain;
            }
        }

        self.position += frames;
        frames
    }
}

/// All cursors of one playback session.
#[derive(Debug, Clone, Default)]
pub struct CursorSet {
    cursors: Vec<PlaybackCursor>,
}

impl CursorSet {
    /// Fresh cursors at position zero for every track in `tracks`.
    pub fn from_tracks(tracks: &TrackSet) -> Self {
        Self {
            cursors: tracks
                .iter()
                .map(|(id, buffer)| PlaybackCursor::new(id.to_path_buf(), buffer.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlaybackCursor> {
        self.cursors.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlaybackCursor> {
        self.cursors.iter_mut()
    }

    /// Largest number of frames any cursor can still supply.
    pub fn max_remaining(&self) -> usize {
        self.cursors
            .iter()
            .map(PlaybackCursor::remaining)
            .max()
            .unwrap_or(0)
    }

    /// Length of the longest origin buffer, i.e. the preview loop period.
    pub fn max_origin_frames(&self) -> usize {
        self.cursors
            .iter()
            .map(|c| c.origin().total_frames())
            .max()
            .unwrap_or(0)
    }

    /// True when no cursor has frames left (vacuously true for an empty set).
    pub fn all_exhausted(&self) -> bool {
        self.cursors.iter().all(PlaybackCursor::is_exhausted)
    }

    pub fn rewind_all(&mut self) {
        for cursor in &mut self.cursors {
            cursor.rewind();
        }
    }
}
