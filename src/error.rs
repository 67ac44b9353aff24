//! Error types for legato.

use thiserror::Error;

/// Rejected `DeviceConfig` construction. Recoverable by correcting the
/// offending parameter and building again.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid channel count: {0}. Must be between 1 and 32")]
    InvalidChannels(u16),

    #[error("Invalid sample rate: {0}. Must be between 8000 and 384000 Hz")]
    InvalidSampleRate(u32),

    #[error("Invalid period size: {0}. Must be positive")]
    InvalidPeriodSize(u32),

    #[error("Missing data callback")]
    MissingCallback,
}

/// Error type for device operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("No suitable backend driver")]
    NoSuitableDriver,

    #[error("Device already open")]
    AlreadyOpen,

    #[error("Backend rejected configuration: {0}")]
    BackendRejected(String),

    #[error("Device not open")]
    NotOpen,

    #[error("Device already started")]
    AlreadyStarted,

    #[error("Device not started")]
    NotStarted,

    #[error("Volume {0} out of range (0.0-1.0)")]
    InvalidVolume(f32),
}

/// Result type alias.
pub type Result<T, E = DeviceError> = core::result::Result<T, E>;
