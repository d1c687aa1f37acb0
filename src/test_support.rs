//! In-memory doubles for the decoder and the output backend.

use crate::audio_data::{LoadOptions, TrackBuffer, TrackLoader};
use crate::backend::{
    ActiveStream, OutputBackend, RenderCallback, StreamErrorCallback, StreamHandle, StreamRequest,
};
use crate::device::OutputDeviceInfo;
use crate::error::{Result, StemPlayError};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Route `log` output through the test harness. Safe to call repeatedly.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serves preset buffers by path and counts every load request.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    tracks: HashMap<PathBuf, TrackBuffer>,
    loads: AtomicUsize,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, path: impl Into<PathBuf>, buffer: TrackBuffer) -> Self {
        self.tracks.insert(path.into(), buffer);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl TrackLoader for MemoryLoader {
    fn load(&self, path: &Path, options: &LoadOptions) -> Result<TrackBuffer> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let buffer = self.tracks.get(path).ok_or_else(|| {
            StemPlayError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })?;

        match options.max_frames(buffer.sample_rate()) {
            Some(max) if max < buffer.total_frames() => {
                let channels = buffer.channels();
                TrackBuffer::new(
                    buffer.samples()[..max * channels as usize].to_vec(),
                    buffer.sample_rate(),
                    channels,
                )
            }
            _ => Ok(buffer.clone()),
        }
    }
}

struct OpenStream {
    id: usize,
    render: RenderCallback,
    on_error: StreamErrorCallback,
}

#[derive(Default)]
struct ManualState {
    requests: Vec<StreamRequest>,
    opened: usize,
    current: Option<OpenStream>,
    failing_opens: usize,
    opens_blocked: bool,
}

type Shared = Arc<(Mutex<ManualState>, Condvar)>;

fn lock(shared: &Shared) -> MutexGuard<'_, ManualState> {
    shared.0.lock().unwrap()
}

/// Output backend driven by the test: callbacks run only when the test calls
/// [`render`](Self::render).
///
/// Streams are numbered from 1 in the order they open successfully. Only the
/// most recently opened stream can be rendered.
pub struct ManualBackend {
    devices: Vec<OutputDeviceInfo>,
    failing_devices: Vec<usize>,
    shared: Shared,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self {
            devices: vec![OutputDeviceInfo {
                index: 0,
                name: "Manual Output".into(),
            }],
            failing_devices: Vec::new(),
            shared: Shared::default(),
        }
    }

    pub fn with_devices(mut self, names: &[&str]) -> Self {
        self.devices = names
            .iter()
            .enumerate()
            .map(|(index, name)| OutputDeviceInfo {
                index,
                name: name.to_string(),
            })
            .collect();
        self
    }

    /// Every open on this device index fails.
    pub fn failing_device(mut self, index: usize) -> Self {
        self.failing_devices.push(index);
        self
    }

    /// The next `count` opens fail regardless of device.
    pub fn failing_opens(self, count: usize) -> Self {
        lock(&self.shared).failing_opens = count;
        self
    }

    /// Opens stall inside `open_stream` until [`release_opens`](Self::release_opens).
    pub fn blocking_opens(self) -> Self {
        lock(&self.shared).opens_blocked = true;
        self
    }

    pub fn release_opens(&self) {
        lock(&self.shared).opens_blocked = false;
        self.shared.1.notify_all();
    }

    /// Wait until at least `count` opens have been attempted.
    pub fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        let (state, cond) = &*self.shared;
        let (_state, result) = cond
            .wait_timeout_while(state.lock().unwrap(), timeout, |s| s.requests.len() < count)
            .unwrap();
        !result.timed_out()
    }

    /// Every open attempt so far, failed ones included.
    pub fn requests(&self) -> Vec<StreamRequest> {
        lock(&self.shared).requests.clone()
    }

    /// Wait until stream number `nth` is the open stream.
    pub fn wait_for_stream(&self, nth: usize, timeout: Duration) -> bool {
        let (state, cond) = &*self.shared;
        let (_state, result) = cond
            .wait_timeout_while(state.lock().unwrap(), timeout, |s| {
                !s.current.as_ref().is_some_and(|c| c.id == nth)
            })
            .unwrap();
        !result.timed_out()
    }

    /// Wait until no stream is open.
    pub fn wait_for_close(&self, timeout: Duration) -> bool {
        let (state, cond) = &*self.shared;
        let (_state, result) = cond
            .wait_timeout_while(state.lock().unwrap(), timeout, |s| s.current.is_some())
            .unwrap();
        !result.timed_out()
    }

    /// Run one callback of `frames` stereo frames on the open stream.
    pub fn render(&self, frames: usize) -> Option<Vec<f32>> {
        self.render_samples(frames * 2)
    }

    pub fn render_samples(&self, samples: usize) -> Option<Vec<f32>> {
        let mut state = lock(&self.shared);
        let stream = state.current.as_mut()?;
        let mut out = vec![0.0; samples];
        (stream.render)(&mut out);
        Some(out)
    }

    /// Report an asynchronous failure on the open stream.
    pub fn fail_stream(&self, error: &str) {
        let mut state = lock(&self.shared);
        if let Some(stream) = state.current.as_mut() {
            (stream.on_error)(error.to_string());
        }
    }
}

impl OutputBackend for ManualBackend {
    fn output_devices(&self) -> Result<Vec<OutputDeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn open_stream(
        &self,
        request: &StreamRequest,
        render: RenderCallback,
        on_error: StreamErrorCallback,
    ) -> Result<StreamHandle> {
        let mut state = lock(&self.shared);
        state.requests.push(request.clone());
        self.shared.1.notify_all();
        let mut state = self
            .shared
            .1
            .wait_while(state, |s| s.opens_blocked)
            .unwrap();

        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(StemPlayError::StreamOpen("scripted open failure".into()));
        }
        if let Some(index) = request.device {
            if self.failing_devices.contains(&index) || index >= self.devices.len() {
                return Err(StemPlayError::AudioDevice(format!(
                    "Output device {} unavailable",
                    index
                )));
            }
        }

        state.opened += 1;
        let id = state.opened;
        state.current = Some(OpenStream {
            id,
            render,
            on_error,
        });
        self.shared.1.notify_all();

        Ok(StreamHandle::new(Box::new(ManualStream {
            id,
            shared: self.shared.clone(),
        })))
    }
}

struct ManualStream {
    id: usize,
    shared: Shared,
}

impl ActiveStream for ManualStream {
    fn abort(&mut self) {
        let mut state = lock(&self.shared);
        if state.current.as_ref().is_some_and(|c| c.id == self.id) {
            state.current = None;
        }
        self.shared.1.notify_all();
    }
}
