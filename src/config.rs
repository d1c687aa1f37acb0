//! Configuration for StemPlay

use crate::error::{Result, StemPlayError};

/// Tunables for one [`AudioPlayer`](crate::AudioPlayer).
#[derive(Debug, Clone)]
pub struct PlayerDesc {
    /// Frames per quantum; used to pre-size the mixing buffers
    pub block_size: usize,
    /// Ask the device for exactly `block_size` frames per callback
    pub fixed_block_size: bool,
    /// Preferred output device in `"<index>:<name>"` form (None = system default)
    pub output_device: Option<String>,
    /// Total stream-open attempts per `play()`, including the first one
    pub max_open_attempts: u32,
    /// Upper bound on back-to-back preview restarts that yield no frames
    pub max_loop_refills: usize,
    /// Capacity of the playback event channel
    pub event_capacity: usize,
}

impl Default for PlayerDesc {
    fn default() -> Self {
        Self {
            block_size: 512,
            fixed_block_size: false,
            output_device: None,
            max_open_attempts: 3,
            max_loop_refills: 8,
            event_capacity: 64,
        }
    }
}

impl PlayerDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn fixed_block_size(mut self, fixed: bool) -> Self {
        self.fixed_block_size = fixed;
        self
    }

    pub fn output_device(mut self, device: impl Into<String>) -> Self {
        self.output_device = Some(device.into());
        self
    }

    pub fn max_open_attempts(mut self, attempts: u32) -> Self {
        self.max_open_attempts = attempts;
        self
    }

    pub fn max_loop_refills(mut self, refills: usize) -> Self {
        self.max_loop_refills = refills;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Reject settings a stream cannot be opened with.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(StemPlayError::Configuration(
                "block_size must be at least 1 frame".into(),
            ));
        }
        if self.block_size > u32::MAX as usize {
            return Err(StemPlayError::Configuration(format!(
                "block_size {} is too large",
                self.block_size
            )));
        }
        if self.max_open_attempts == 0 {
            return Err(StemPlayError::Configuration(
                "max_open_attempts must be at least 1".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(StemPlayError::Configuration(
                "event_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PlayerDesc::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        assert!(PlayerDesc::new().block_size(0).validate().is_err());
        assert!(PlayerDesc::new().max_open_attempts(0).validate().is_err());
        assert!(matches!(
            PlayerDesc::new().event_capacity(0).validate(),
            Err(StemPlayError::Configuration(_))
        ));
    }
}
