//! Minimal real-time audio output engine.
//!
//! Callback-driven playback over pluggable backend drivers: the application
//! describes what it wants with a [`DeviceConfig`], a [`PlaybackDevice`]
//! negotiates it with a [`BackendDriver`] and owns the stream lifecycle, and
//! a driver-owned real-time thread pulls frames through the configured
//! callback.
//!
//! # Primary API
//!
//! - [`DeviceConfig`] / [`DeviceConfigBuilder`]: validated, immutable
//!   playback parameters plus the frame-producing callback
//! - [`PlaybackDevice`]: open/start/stop/close over one output stream
//! - [`BackendDriver`] / [`DriverStream`]: the seam concrete platform
//!   drivers implement
//! - [`registry`]: explicit process-wide driver registration
//!
//! # Example
//!
//! ```ignore
//! use legato::{DeviceConfig, PlaybackDevice, SampleFormat};
//!
//! let config = DeviceConfig::builder()
//!     .format(SampleFormat::Float32)
//!     .channels(2)
//!     .sample_rate(48_000)
//!     .callback(|out, _| {
//!         // Fill out.as_f32_mut() with frames; silence was pre-filled.
//!     })
//!     .build()?;
//!
//! legato::registry::init().register(std::sync::Arc::new(legato::drivers::CpalDriver::new()));
//!
//! let device = PlaybackDevice::new();
//! device.open(config)?;
//! device.start()?;
//! // ...
//! device.stop()?;
//! device.close()?;
//! ```
//!
//! # Real-time contract
//!
//! The callback runs on a thread with hard deadlines. It must fill every
//! frame it is handed and return within the period budget: no blocking on
//! unbounded I/O, no locks shared with non-real-time threads, no
//! allocation. Missed deadlines surface as underrun statistics and
//! [`DeviceEvent`]s, never as synchronous errors.

pub mod error;
pub use error::{ConfigError, DeviceError, Result};

mod config;
pub use config::{
    DataCallback, DeviceConfig, DeviceConfigBuilder, DeviceParams, PerformanceProfile,
    SampleFormat, UserData, MAX_CHANNELS, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE,
};

mod buffer;
pub use buffer::OutputBuffer;

mod driver;
pub use driver::{BackendDriver, DriverStream};

mod device;
pub use device::{DeviceState, PlaybackDevice};

mod rt;
pub use rt::CallbackTrampoline;

mod stats;
pub use stats::{DeviceEvent, StatsSnapshot};

pub mod registry;
pub use registry::DriverRegistry;

pub mod drivers;
