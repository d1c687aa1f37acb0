use crate::backend::{
    ActiveStream, OutputBackend, RenderCallback, StreamErrorCallback, StreamHandle, StreamRequest,
};
use crate::device::OutputDeviceInfo;
use crate::error::{Result, StemPlayError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};

/// Scratch size used when the device picks its own buffer size.
const DEFAULT_SCRATCH_FRAMES: usize = 1024;

/// Output backend on top of the platform's default cpal host.
///
/// Device indices follow the host's enumeration order, which is also the
/// order reported by [`OutputBackend::output_devices`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl CpalBackend {
    fn device(&self, index: Option<usize>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match index {
            Some(index) => host
                .output_devices()
                .map_err(|e| {
                    StemPlayError::AudioDevice(format!("Failed to enumerate devices: {}", e))
                })?
                .nth(index)
                .ok_or_else(|| {
                    StemPlayError::AudioDevice(format!("Output device {} not found", index))
                }),
            None => host.default_output_device().ok_or_else(|| {
                StemPlayError::AudioDevice("No default output device available".into())
            }),
        }
    }

    /// Create a stream for a device whose native format is `T`. The mixer
    /// renders f32 into a reusable scratch buffer that is converted on copy.
    fn build_converting_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut render: RenderCallback,
        on_error: StreamErrorCallback,
        scratch_frames: usize,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut scratch = vec![0.0f32; scratch_frames * config.channels as usize];

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if scratch.len() < data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    let buffer = &mut scratch[..data.len()];
                    render(buffer);
                    for (sample, &value) in data.iter_mut().zip(buffer.iter()) {
                        *sample = T::from_sample(value);
                    }
                },
                error_handler(on_error),
                None,
            )
            .map_err(|e| StemPlayError::StreamOpen(format!("Failed to build stream: {}", e)))
    }
}

fn error_handler(mut on_error: StreamErrorCallback) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        log::error!("Audio stream error: {}", err);
        on_error(err.to_string());
    }
}

impl OutputBackend for CpalBackend {
    fn output_devices(&self) -> Result<Vec<OutputDeviceInfo>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| StemPlayError::AudioDevice(format!("Failed to enumerate devices: {}", e)))?
            .enumerate()
            .map(|(index, device)| OutputDeviceInfo {
                index,
                name: device
                    .name()
                    .unwrap_or_else(|_| "Unknown Device".to_string()),
            })
            .collect::<Vec<_>>();

        log::debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn open_stream(
        &self,
        request: &StreamRequest,
        mut render: RenderCallback,
        on_error: StreamErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.device(request.device)?;
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());

        let default_config = device.default_output_config().map_err(|e| {
            StemPlayError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let config = cpal::StreamConfig {
            channels: request.channels,
            sample_rate: cpal::SampleRate(request.sample_rate),
            buffer_size: match request.block_size {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };
        let scratch_frames = request
            .block_size
            .map(|frames| frames as usize)
            .unwrap_or(DEFAULT_SCRATCH_FRAMES);

        let stream = match default_config.sample_format() {
            cpal::SampleFormat::F32 => device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render(data),
                    error_handler(on_error),
                    None,
                )
                .map_err(|e| {
                    StemPlayError::StreamOpen(format!("Failed to build stream: {}", e))
                })?,
            cpal::SampleFormat::I16 => Self::build_converting_stream::<i16>(
                &device,
                &config,
                render,
                on_error,
                scratch_frames,
            )?,
            cpal::SampleFormat::U16 => Self::build_converting_stream::<u16>(
                &device,
                &config,
                render,
                on_error,
                scratch_frames,
            )?,
            cpal::SampleFormat::I32 => Self::build_converting_stream::<i32>(
                &device,
                &config,
                render,
                on_error,
                scratch_frames,
            )?,
            other => {
                return Err(StemPlayError::AudioFormat(format!(
                    "Unsupported sample format {:?} on {}",
                    other, device_name
                )));
            }
        };

        stream
            .play()
            .map_err(|e| StemPlayError::StreamOpen(format!("Failed to start stream: {}", e)))?;

        log::info!(
            "Output stream opened on '{}' ({} Hz, {} ch, {:?})",
            device_name,
            request.sample_rate,
            request.channels,
            default_config.sample_format()
        );

        Ok(StreamHandle::new(Box::new(CpalStream {
            stream: Some(stream),
        })))
    }
}

struct CpalStream {
    stream: Option<cpal::Stream>,
}

impl ActiveStream for CpalStream {
    fn abort(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::debug!("Failed to pause stream before closing: {}", e);
            }
            // Dropping the stream closes it and stops further callbacks.
            drop(stream);
        }
    }
}
