//! CPAL-backed output driver.
//!
//! Bridges the driver seam to the system default output device via CPAL.
//! Negotiation prefers an exact match on channels and format, clamps the
//! sample rate into the supported range, and otherwise falls back to the
//! device's default configuration.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::config::{DeviceParams, SampleFormat};
use crate::driver::{BackendDriver, DriverStream};
use crate::error::{DeviceError, Result};
use crate::rt::CallbackTrampoline;

/// Output driver over the platform's default CPAL host.
#[derive(Debug, Default)]
pub struct CpalDriver;

impl CpalDriver {
    pub fn new() -> Self {
        Self
    }
}

impl BackendDriver for CpalDriver {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn acquire(&self, requested: &DeviceParams) -> Result<(Box<dyn DriverStream>, DeviceParams)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| DeviceError::BackendRejected("no output device available".into()))?;

        let (sample_format, effective) = negotiate(&device, requested)?;

        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".into());
        tracing::debug!(
            device = %device_name,
            ?sample_format,
            sample_rate = effective.sample_rate,
            channels = effective.channels,
            "cpal output acquired"
        );

        let stream = CpalStream {
            device,
            sample_format,
            params: effective,
            stream: None,
        };
        Ok((Box::new(stream), effective))
    }
}

/// Pick the closest supported configuration.
fn negotiate(device: &cpal::Device, requested: &DeviceParams) -> Result<(cpal::SampleFormat, DeviceParams)> {
    // Signed24 has no packed CPAL representation; substitute Float32 and
    // report the adjustment through the effective parameters.
    let wanted_format = match requested.format {
        SampleFormat::Signed24 => SampleFormat::Float32,
        other => other,
    };
    let wanted_cpal = to_cpal_format(wanted_format);

    let mut effective = *requested;
    effective.format = wanted_format;

    let ranges = device
        .supported_output_configs()
        .map_err(|e| DeviceError::BackendRejected(e.to_string()))?;

    for range in ranges {
        if range.channels() != requested.channels || range.sample_format() != wanted_cpal {
            continue;
        }
        effective.sample_rate = requested
            .sample_rate
            .clamp(range.min_sample_rate().0, range.max_sample_rate().0);
        return Ok((wanted_cpal, effective));
    }

    // Nothing matched the request; take whatever the device does natively.
    let default = device
        .default_output_config()
        .map_err(|e| DeviceError::BackendRejected(e.to_string()))?;
    let format = from_cpal_format(default.sample_format()).ok_or_else(|| {
        DeviceError::BackendRejected(format!(
            "unsupported device sample format {:?}",
            default.sample_format()
        ))
    })?;

    effective.format = format;
    effective.channels = default.channels();
    effective.sample_rate = default.sample_rate().0;
    Ok((default.sample_format(), effective))
}

fn to_cpal_format(format: SampleFormat) -> cpal::SampleFormat {
    match format {
        SampleFormat::Unsigned8 => cpal::SampleFormat::U8,
        SampleFormat::Signed16 => cpal::SampleFormat::I16,
        SampleFormat::Signed32 => cpal::SampleFormat::I32,
        // Signed24 is substituted before mapping.
        SampleFormat::Signed24 | SampleFormat::Float32 => cpal::SampleFormat::F32,
    }
}

fn from_cpal_format(format: cpal::SampleFormat) -> Option<SampleFormat> {
    match format {
        cpal::SampleFormat::U8 => Some(SampleFormat::Unsigned8),
        cpal::SampleFormat::I16 => Some(SampleFormat::Signed16),
        cpal::SampleFormat::I32 => Some(SampleFormat::Signed32),
        cpal::SampleFormat::F32 => Some(SampleFormat::Float32),
        _ => None,
    }
}

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. This is safe because
/// the stream is only reached through `PlaybackDevice`'s state mutex, which
/// serializes every activate/deactivate/release, and it is never handed to
/// another thread directly.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: see StreamHandle - access is serialized by the device mutex.
unsafe impl Send for StreamHandle {}

struct CpalStream {
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    params: DeviceParams,
    stream: Option<StreamHandle>,
}

impl DriverStream for CpalStream {
    fn activate(&mut self, trampoline: Arc<CallbackTrampoline>) -> Result<()> {
        debug_assert!(self.stream.is_none(), "stream already active");

        let stream = match self.sample_format {
            cpal::SampleFormat::U8 => self.build::<u8>(trampoline)?,
            cpal::SampleFormat::I16 => self.build::<i16>(trampoline)?,
            cpal::SampleFormat::I32 => self.build::<i32>(trampoline)?,
            cpal::SampleFormat::F32 => self.build::<f32>(trampoline)?,
            format => {
                return Err(DeviceError::BackendRejected(format!(
                    "unsupported sample format: {format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| DeviceError::BackendRejected(e.to_string()))?;
        self.stream = Some(StreamHandle(stream));
        Ok(())
    }

    fn deactivate(&mut self) {
        if let Some(handle) = self.stream.take() {
            let _ = handle.0.pause();
            // Dropping the stream tears the callback down; CPAL does not
            // return control until it is no longer running.
            drop(handle);
        }
    }
}

impl CpalStream {
    fn build<T: cpal::SizedSample>(&self, trampoline: Arc<CallbackTrampoline>) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: self.params.channels,
            sample_rate: cpal::SampleRate(self.params.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.params.period_size_in_frames),
        };

        match self.try_build::<T>(&config, trampoline.clone()) {
            Ok(stream) => Ok(stream),
            Err(_) => {
                // Some hosts refuse fixed buffer sizes; period granularity
                // is still enforced by the trampoline's chunking.
                let config = cpal::StreamConfig {
                    buffer_size: cpal::BufferSize::Default,
                    ..config
                };
                self.try_build::<T>(&config, trampoline)
            }
        }
    }

    fn try_build<T: cpal::SizedSample>(
        &self,
        config: &cpal::StreamConfig,
        trampoline: Arc<CallbackTrampoline>,
    ) -> Result<cpal::Stream> {
        self.device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // SAFETY: T is a plain sample type; reinterpreting the
                    // interleaved slice as bytes preserves length and layout.
                    let bytes = unsafe {
                        core::slice::from_raw_parts_mut(
                            data.as_mut_ptr().cast::<u8>(),
                            core::mem::size_of_val(data),
                        )
                    };
                    trampoline.fire(bytes);
                },
                |_err| {
                    // Stream error - cannot log from the audio thread.
                },
                None,
            )
            .map_err(|e| DeviceError::BackendRejected(e.to_string()))
    }
}
