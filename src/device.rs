//! Output device discovery and preference handling.
//!
//! Devices are identified by their position in the backend's enumeration.
//! A preference string has the form `"<index>:<name>"`; only the index is
//! significant, the name is informational.

use crate::backend::{CpalBackend, OutputBackend};
use crate::error::{Result, StemPlayError};
use std::fmt;

/// One output device as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceInfo {
    pub index: usize,
    pub name: String,
}

impl fmt::Display for OutputDeviceInfo {
    /// Formats as `"<index>: <name>"`, which parses back as a preference.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.index, self.name)
    }
}

/// All output devices of the default cpal host.
pub fn list_output_devices() -> Result<Vec<OutputDeviceInfo>> {
    CpalBackend.output_devices()
}

/// Extract the device index from a `"<index>:<name>"` preference.
pub fn parse_device_index(preference: &str) -> Result<usize> {
    let index = preference.split(':').next().unwrap_or_default().trim();
    index.parse::<usize>().map_err(|e| {
        StemPlayError::AudioDevice(format!(
            "Invalid device preference '{}': {}",
            preference, e
        ))
    })
}

/// Resolve a preference against the available devices.
///
/// `Ok(None)` means "use the system default" and is returned when no
/// preference was given. An unparsable index or one that is not in `devices`
/// is an error; callers fall back to the default device.
pub fn resolve_output_device(
    preference: Option<&str>,
    devices: &[OutputDeviceInfo],
) -> Result<Option<usize>> {
    let Some(preference) = preference else {
        return Ok(None);
    };

    let index = parse_device_index(preference)?;
    if devices.iter().any(|d| d.index == index) {
        Ok(Some(index))
    } else {
        Err(StemPlayError::AudioDevice(format!(
            "Output device {} not found ({} available)",
            index,
            devices.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<OutputDeviceInfo> {
        vec![
            OutputDeviceInfo {
                index: 0,
                name: "Speakers".into(),
            },
            OutputDeviceInfo {
                index: 1,
                name: "Headphones: USB".into(),
            },
        ]
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let device = &devices()[1];
        assert_eq!(device.to_string(), "1: Headphones: USB");
        assert_eq!(parse_device_index(&device.to_string()).unwrap(), 1);
    }

    #[test]
    fn test_parse_accepts_bare_index() {
        assert_eq!(parse_device_index("3").unwrap(), 3);
        assert_eq!(parse_device_index(" 2 :x").unwrap(), 2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_device_index("speakers").is_err());
        assert!(parse_device_index("").is_err());
        assert!(parse_device_index("-1:neg").is_err());
    }

    #[test]
    fn test_resolve() {
        let devices = devices();
        assert_eq!(resolve_output_device(None, &devices).unwrap(), None);
        assert_eq!(resolve_output_device(Some("0:Speakers"), &devices).unwrap(), Some(0));
        assert!(resolve_output_device(Some("7:Gone"), &devices).is_err());
        assert!(resolve_output_device(Some("bogus"), &devices).is_err());
    }
}
