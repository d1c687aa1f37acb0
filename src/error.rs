//! Error types for StemPlay

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StemPlayError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio loading error: {0}")]
    AudioLoading(String),

    #[error("Stream open error: {0}")]
    StreamOpen(String),

    #[error("Audio callback error: {0}")]
    Callback(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, StemPlayError>;
