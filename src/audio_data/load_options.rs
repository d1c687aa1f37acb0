use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Maximum duration to decode (None = decode the entire file)
    pub max_duration: Option<Duration>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Frame limit implied by `max_duration` at the given rate.
    pub fn max_frames(&self, sample_rate: u32) -> Option<usize> {
        self.max_duration
            .map(|d| (d.as_secs_f64() * sample_rate as f64) as usize)
    }
}
