use crate::{
    audio_data::{LoadOptions, TrackBuffer, TrackLoader},
    error::{Result, StemPlayError},
};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// File extensions (lowercase) the default loader will attempt to decode.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac"];

/// True if `path` carries one of [`SUPPORTED_EXTENSIONS`], case-insensitively.
pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Default loader built on the Symphonia decoder library.
///
/// Decodes MP3, WAV, OGG/Vorbis and FLAC into interleaved f32 PCM at the
/// file's native rate and channel count. When `max_duration` is set, decoding
/// stops as soon as enough frames are available, so preview loads only pay
/// for the prefix they keep.
///
/// # Examples
///
/// ```ignore
/// use stemplay::audio_data::{LoadOptions, SymphoniaLoader, TrackLoader};
///
/// let buffer = SymphoniaLoader.load("song/guitar.ogg".as_ref(), &LoadOptions::default())?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaLoader;

impl TrackLoader for SymphoniaLoader {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<TrackBuffer> {
        if !is_supported_audio_file(path) {
            return Err(StemPlayError::AudioFormat(format!(
                "Not an audio file: {}",
                path.display()
            )));
        }

        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let detected = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                StemPlayError::AudioLoading(format!("Failed to detect audio format: {:?}", e))
            })?;

        let mut format = detected.format;

        let track = format.default_track().ok_or_else(|| {
            StemPlayError::AudioLoading("No default audio track found".to_string())
        })?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| StemPlayError::AudioLoading("Sample rate not found".to_string()))?;
        let mut channels = codec_params.channels.map(|c| c.count() as u16);

        let mut decoder = get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| {
                StemPlayError::AudioLoading(format!("Failed to create decoder: {:?}", e))
            })?;

        let max_frames = options.max_frames(sample_rate);
        let mut samples: Vec<f32> = Vec::new();

        loop {
            if let (Some(max), Some(ch)) = (max_frames, channels) {
                if samples.len() >= max * ch as usize {
                    break;
                }
            }

            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(_)) => break, // end-of-file
                Err(Error::ResetRequired) => break,
                Err(e) => {
                    return Err(StemPlayError::AudioLoading(format!(
                        "Error reading packet: {:?}",
                        e
                    )));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::IoError(_)) => break,
                Err(Error::DecodeError(e)) => {
                    log::debug!("Skipping corrupt packet in {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => {
                    return Err(StemPlayError::AudioLoading(format!(
                        "Error decoding packet: {:?}",
                        e
                    )));
                }
            };

            let spec = *decoded.spec();
            channels.get_or_insert(spec.channels.count() as u16);

            // Always convert to f32
            let mut tmp = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            tmp.copy_interleaved_ref(decoded);
            samples.extend_from_slice(tmp.samples());
        }

        let channels = channels.ok_or_else(|| {
            StemPlayError::AudioLoading("Channel count not found".to_string())
        })?;

        if let Some(max) = max_frames {
            samples.truncate(max * channels as usize);
        }

        log::debug!(
            "Decoded {}: {} samples, {} Hz, {} channel(s)",
            path.display(),
            samples.len(),
            sample_rate,
            channels
        );

        TrackBuffer::new(samples, sample_rate, channels)
    }
}
