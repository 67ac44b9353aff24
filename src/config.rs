//! Device configuration - built once, validated, immutable thereafter.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::buffer::OutputBuffer;
use crate::error::ConfigError;

/// Maximum supported channel count.
pub const MAX_CHANNELS: u16 = 32;

/// Minimum supported sample rate in Hz.
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Maximum supported sample rate in Hz.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Interleaved sample formats understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// 8-bit unsigned. Silence is 0x80, not zero.
    Unsigned8,
    Signed16,
    /// 24-bit signed, tightly packed little-endian. No typed slice view.
    Signed24,
    Signed32,
    #[default]
    Float32,
}

impl SampleFormat {
    /// Size of one sample in bytes.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::Unsigned8 => 1,
            Self::Signed16 => 2,
            Self::Signed24 => 3,
            Self::Signed32 | Self::Float32 => 4,
        }
    }
}

/// Latency/robustness trade-off requested from the backend driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceProfile {
    #[default]
    LowLatency,
    Conservative,
}

impl PerformanceProfile {
    /// Period length used when the caller does not set one explicitly.
    pub(crate) const fn default_period_millis(self) -> u32 {
        match self {
            Self::LowLatency => 10,
            Self::Conservative => 100,
        }
    }
}

/// Opaque application handle handed back on every callback invocation.
///
/// The device borrows it for the duration of each invocation; ownership
/// stays with the application.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Frame-producing callback.
///
/// Must fill every frame of the buffer it is given and return within the
/// period budget: no unbounded I/O, no locks shared with non-real-time
/// threads, no allocation.
pub type DataCallback = Box<dyn FnMut(&mut OutputBuffer<'_>, Option<&UserData>) + Send + 'static>;

/// Stream parameters a driver delivers. May differ from what was requested
/// (e.g. an unsupported sample rate substituted with the nearest one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParams {
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    pub period_size_in_frames: u32,
    pub performance_profile: PerformanceProfile,
}

impl DeviceParams {
    /// Size of one interleaved frame in bytes.
    pub const fn frame_bytes(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    /// Size of one period in bytes.
    pub const fn period_bytes(&self) -> usize {
        self.frame_bytes() * self.period_size_in_frames as usize
    }

    /// Wall-clock duration of one period.
    pub fn period_duration(&self) -> core::time::Duration {
        let nanos = self.period_size_in_frames as u64 * 1_000_000_000 / self.sample_rate as u64;
        core::time::Duration::from_nanos(nanos)
    }
}

/// Per-buffer behavior toggles. Each one trades a safety net for speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ConfigFlags {
    pub no_pre_silenced_output_buffer: bool,
    pub no_clip: bool,
    pub no_fixed_sized_callback: bool,
}

/// Validated playback configuration. Consumed by [`PlaybackDevice::open`].
///
/// [`PlaybackDevice::open`]: crate::PlaybackDevice::open
pub struct DeviceConfig {
    params: DeviceParams,
    flags: ConfigFlags,
    callback: DataCallback,
    user_data: Option<UserData>,
}

impl DeviceConfig {
    pub fn builder() -> DeviceConfigBuilder {
        DeviceConfigBuilder::default()
    }

    pub fn params(&self) -> DeviceParams {
        self.params
    }

    pub fn format(&self) -> SampleFormat {
        self.params.format
    }

    pub fn channels(&self) -> u16 {
        self.params.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }

    pub fn period_size_in_frames(&self) -> u32 {
        self.params.period_size_in_frames
    }

    pub fn performance_profile(&self) -> PerformanceProfile {
        self.params.performance_profile
    }

    pub fn no_pre_silenced_output_buffer(&self) -> bool {
        self.flags.no_pre_silenced_output_buffer
    }

    pub fn no_clip(&self) -> bool {
        self.flags.no_clip
    }

    pub fn no_fixed_sized_callback(&self) -> bool {
        self.flags.no_fixed_sized_callback
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    pub(crate) fn into_parts(self) -> (DeviceParams, ConfigFlags, DataCallback, Option<UserData>) {
        (self.params, self.flags, self.callback, self.user_data)
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("params", &self.params)
            .field("flags", &self.flags)
            .field("has_user_data", &self.user_data.is_some())
            .finish()
    }
}

/// Builder for [`DeviceConfig`].
///
/// Defaults: Float32, stereo, 48 kHz, low-latency profile, all flags off.
/// When no period size is set, one is derived from the performance profile:
/// 10 ms of frames for low latency, 100 ms for conservative.
pub struct DeviceConfigBuilder {
    format: SampleFormat,
    channels: u16,
    sample_rate: u32,
    period_size_in_frames: Option<u32>,
    performance_profile: PerformanceProfile,
    flags: ConfigFlags,
    callback: Option<DataCallback>,
    user_data: Option<UserData>,
}

impl Default for DeviceConfigBuilder {
    fn default() -> Self {
        Self {
            format: SampleFormat::default(),
            channels: 2,
            sample_rate: 48_000,
            period_size_in_frames: None,
            performance_profile: PerformanceProfile::default(),
            flags: ConfigFlags::default(),
            callback: None,
            user_data: None,
        }
    }
}

impl DeviceConfigBuilder {
    pub fn format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Frames per callback invocation. Governs latency and stop granularity.
    pub fn period_size_in_frames(mut self, frames: u32) -> Self {
        self.period_size_in_frames = Some(frames);
        self
    }

    pub fn performance_profile(mut self, profile: PerformanceProfile) -> Self {
        self.performance_profile = profile;
        self
    }

    /// Skip zero-filling the buffer before each callback invocation.
    pub fn no_pre_silenced_output_buffer(mut self, value: bool) -> Self {
        self.flags.no_pre_silenced_output_buffer = value;
        self
    }

    /// Skip clamping Float32 output to [-1.0, 1.0].
    pub fn no_clip(mut self, value: bool) -> Self {
        self.flags.no_clip = value;
        self
    }

    /// Let the driver pass through whatever buffer size it natively produces
    /// instead of chunking into exact periods.
    pub fn no_fixed_sized_callback(mut self, value: bool) -> Self {
        self.flags.no_fixed_sized_callback = value;
        self
    }

    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut OutputBuffer<'_>, Option<&UserData>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn user_data(mut self, data: UserData) -> Self {
        self.user_data = Some(data);
        self
    }

    /// Validate and build. No side effects; pure value construction.
    pub fn build(self) -> Result<DeviceConfig, ConfigError> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::InvalidChannels(self.channels));
        }
        if self.sample_rate < MIN_SAMPLE_RATE || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        let period_size_in_frames = match self.period_size_in_frames {
            Some(0) => return Err(ConfigError::InvalidPeriodSize(0)),
            Some(frames) => frames,
            None => {
                let millis = self.performance_profile.default_period_millis();
                (self.sample_rate / 1_000 * millis).max(1)
            }
        };
        let callback = self.callback.ok_or(ConfigError::MissingCallback)?;

        Ok(DeviceConfig {
            params: DeviceParams {
                format: self.format,
                channels: self.channels,
                sample_rate: self.sample_rate,
                period_size_in_frames,
                performance_profile: self.performance_profile,
            },
            flags: self.flags,
            callback,
            user_data: self.user_data,
        })
    }
}
