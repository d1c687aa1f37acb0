// Mixer module - the real-time render step.
// One call per quantum: sums every cursor, scaled by its gain, into a stereo buffer.

use crate::cache::TrackSet;
use crate::config::PlayerDesc;
use crate::error::{Result, StemPlayError};
use crate::playback::{CursorSet, OUTPUT_CHANNELS, PlaybackMode};
use crate::volume::{DEFAULT_GAIN, VolumeTable};

/// What the stream should do after a quantum has been rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// Keep going.
    Playing,
    /// Keep going; the preview wrapped around at least once in this quantum.
    Looped,
    /// Full mode ran dry. The buffer just written is the last one.
    Finished,
}

/// Mixing state owned by a single stream.
///
/// Holds the session's cursors plus pre-sized scratch buffers, so `render`
/// does not allocate unless the host asks for a larger quantum than
/// `PlayerDesc::block_size`.
#[derive(Debug)]
pub struct Mixer {
    cursors: CursorSet,
    mode: PlaybackMode,
    volumes: VolumeTable,
    gains: Vec<f32>,
    accum: Vec<f32>,
    max_loop_refills: usize,
    loop_count: u64,
}

impl Mixer {
    pub fn new(tracks: &TrackSet, mode: PlaybackMode, volumes: VolumeTable, desc: &PlayerDesc) -> Self {
        let cursors = CursorSet::from_tracks(tracks);
        let mut gains = vec![DEFAULT_GAIN; cursors.len()];
        volumes.fill_gains(&cursors, &mut gains);
        Self {
            cursors,
            mode,
            volumes,
            gains,
            accum: vec![0.0; desc.block_size * OUTPUT_CHANNELS],
            max_loop_refills: desc.max_loop_refills,
            loop_count: 0,
        }
    }

    pub fn cursors(&self) -> &CursorSet {
        &self.cursors
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Completed preview passes since this mixer was built.
    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }

    /// Render one quantum of interleaved stereo into `out`.
    ///
    /// Every cursor with frames left adds `sample * gain` into the quantum.
    /// Shorter tracks simply fall silent. When every cursor is dry before the
    /// quantum is full:
    /// - preview: all cursors rewind and filling resumes at the same offset.
    ///   At most `max_loop_refills` rewinds in a row may yield no frames;
    /// - full: the rest of the quantum stays silent.
    ///
    /// In full mode, `Finished` is returned from the quantum that consumed
    /// the last frame.
    pub fn render(&mut self, out: &mut [f32]) -> Result<RenderStatus> {
        if out.len() % OUTPUT_CHANNELS != 0 {
            return Err(StemPlayError::Callback(format!(
                "Output buffer of {} samples is not a whole number of stereo frames",
                out.len()
            )));
        }
        let frames = out.len() / OUTPUT_CHANNELS;

        if self.accum.len() < out.len() {
            log::debug!(
                "Mixer: growing accumulation buffer to {} frames",
                frames
            );
            self.accum.resize(out.len(), 0.0);
        }

        let Self {
            cursors,
            mode,
            volumes,
            gains,
            accum,
            max_loop_refills,
            loop_count,
        } = self;

        let accum = &mut accum[..out.len()];
        accum.fill(0.0);
        volumes.try_fill_gains(cursors, gains);

        let mut filled = 0;
        let mut refills = 0;
        let mut looped = false;

        while filled < frames {
            let span = cursors.max_remaining().min(frames - filled);
            if span > 0 {
                let region = &mut accum[filled * OUTPUT_CHANNELS..(filled + span) * OUTPUT_CHANNELS];
                for (cursor, &gain) in cursors.iter_mut().zip(gains.iter()) {
                    cursor.mix_into(region, gain);
                }
                filled += span;
                refills = 0;
                continue;
            }

            // Every cursor is dry and the quantum still has room.
            if !mode.is_preview() || refills >= *max_loop_refills || cursors.max_origin_frames() == 0 {
                break;
            }
            cursors.rewind_all();
            refills += 1;
            *loop_count += 1;
            looped = true;
        }

        out.copy_from_slice(accum);

        if !mode.is_preview() && cursors.all_exhausted() {
            return Ok(RenderStatus::Finished);
        }
        Ok(if looped {
            RenderStatus::Looped
        } else {
            RenderStatus::Playing
        })
    }
}
