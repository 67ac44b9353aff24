//! Playback device lifecycle.

use std::sync::Arc;

use atomic_float::AtomicF32;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::config::{DeviceConfig, DeviceParams, PerformanceProfile, SampleFormat, UserData};
use crate::driver::{BackendDriver, DriverStream};
use crate::error::{DeviceError, Result};
use crate::registry;
use crate::rt::CallbackTrampoline;
use crate::stats::{DeviceEvent, DeviceStats, StatsSnapshot};

const EVENT_QUEUE_CAPACITY: usize = 64;

/// Lifecycle state of a [`PlaybackDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Closed,
    Open,
    Started,
    Stopped,
}

/// Everything that exists between `open()` and `close()`.
struct Active {
    driver_name: &'static str,
    stream: Box<dyn DriverStream>,
    params: DeviceParams,
    trampoline: Arc<CallbackTrampoline>,
    user_data: Option<UserData>,
    stats: Arc<DeviceStats>,
    events: Receiver<DeviceEvent>,
}

struct Inner {
    state: DeviceState,
    active: Option<Active>,
}

/// An audio output device.
///
/// Owns the driver stream for its whole open lifetime and drives the state
/// machine `Closed -> Open -> Started <-> Stopped -> Closed`. Invalid
/// transitions fail with the matching [`DeviceError`] and leave the state
/// untouched. Dropping a device that is still open stops and closes it.
///
/// A single mutex guards state transitions; the real-time path never takes
/// it.
///
/// # Example
///
/// ```ignore
/// let config = DeviceConfig::builder()
///     .format(SampleFormat::Signed16)
///     .sample_rate(44_100)
///     .callback(|out, _| out.fill_silence())
///     .build()?;
///
/// let device = PlaybackDevice::with_driver(Arc::new(NullDriver::new()));
/// device.open(config)?;
/// device.start()?;
/// // ... audio plays ...
/// device.stop()?;
/// device.close()?;
/// ```
pub struct PlaybackDevice {
    driver: Option<Arc<dyn BackendDriver>>,
    volume: Arc<AtomicF32>,
    inner: Mutex<Inner>,
}

impl PlaybackDevice {
    /// Device that resolves its driver from the process-wide
    /// [`registry`](crate::registry) at `open()` time.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Device bound to one specific driver, bypassing the registry.
    pub fn with_driver(driver: Arc<dyn BackendDriver>) -> Self {
        Self::build(Some(driver))
    }

    fn build(driver: Option<Arc<dyn BackendDriver>>) -> Self {
        Self {
            driver,
            volume: Arc::new(AtomicF32::new(1.0)),
            inner: Mutex::new(Inner {
                state: DeviceState::Closed,
                active: None,
            }),
        }
    }

    /// Acquire a driver stream for `config`. The driver may adjust the
    /// requested parameters; the adjusted set becomes the effective
    /// configuration reported by the accessors.
    pub fn open(&self, config: DeviceConfig) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != DeviceState::Closed {
            return Err(DeviceError::AlreadyOpen);
        }

        let (requested, flags, callback, user_data) = config.into_parts();

        let (driver_name, stream, params) = match &self.driver {
            Some(driver) => {
                let (stream, params) = driver.acquire(&requested)?;
                (driver.name(), stream, params)
            }
            None => {
                let registry = registry::get().ok_or(DeviceError::NoSuitableDriver)?;
                let (driver, stream, params) = registry.acquire(&requested)?;
                (driver.name(), stream, params)
            }
        };

        let stats = Arc::new(DeviceStats::new());
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
        let trampoline = Arc::new(CallbackTrampoline::new(
            callback,
            user_data.clone(),
            params,
            flags,
            self.volume.clone(),
            stats.clone(),
            events_tx,
        ));

        tracing::debug!(
            driver = driver_name,
            sample_rate = params.sample_rate,
            channels = params.channels,
            period = params.period_size_in_frames,
            "device opened"
        );

        inner.active = Some(Active {
            driver_name,
            stream,
            params,
            trampoline,
            user_data,
            stats,
            events: events_rx,
        });
        inner.state = DeviceState::Open;
        Ok(())
    }

    /// Begin the periodic callback-driven loop.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            DeviceState::Open | DeviceState::Stopped => {}
            DeviceState::Started => return Err(DeviceError::AlreadyStarted),
            DeviceState::Closed => return Err(DeviceError::NotOpen),
        }

        let Some(active) = inner.active.as_mut() else {
            return Err(DeviceError::NotOpen);
        };
        let trampoline = active.trampoline.clone();
        active.stream.activate(trampoline)?;
        inner.state = DeviceState::Started;
        tracing::debug!("device started");
        Ok(())
    }

    /// Halt the loop. Blocks until any in-flight callback invocation has
    /// completed; once this returns, no further invocation happens until
    /// the next `start()`.
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != DeviceState::Started {
            return Err(DeviceError::NotStarted);
        }

        let Some(active) = inner.active.as_mut() else {
            return Err(DeviceError::NotStarted);
        };
        active.stream.deactivate();
        inner.state = DeviceState::Stopped;
        tracing::debug!("device stopped");
        Ok(())
    }

    /// Release the driver resource. Idempotent: closing a closed device is
    /// a success, not an error.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::close_locked(&mut inner);
        Ok(())
    }

    fn close_locked(inner: &mut Inner) {
        let Some(mut active) = inner.active.take() else {
            return;
        };
        if inner.state == DeviceState::Started {
            active.stream.deactivate();
        }
        active.stream.release();
        inner.state = DeviceState::Closed;
        tracing::debug!(driver = active.driver_name, "device closed");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.inner.lock().state
    }

    pub fn is_started(&self) -> bool {
        self.state() == DeviceState::Started
    }

    /// Effective (driver-negotiated) stream parameters.
    pub fn params(&self) -> Result<DeviceParams> {
        self.with_active(|active| active.params)
    }

    pub fn sample_rate(&self) -> Result<u32> {
        self.with_active(|active| active.params.sample_rate)
    }

    pub fn channels(&self) -> Result<u16> {
        self.with_active(|active| active.params.channels)
    }

    pub fn format(&self) -> Result<SampleFormat> {
        self.with_active(|active| active.params.format)
    }

    pub fn period_size_in_frames(&self) -> Result<u32> {
        self.with_active(|active| active.params.period_size_in_frames)
    }

    pub fn performance_profile(&self) -> Result<PerformanceProfile> {
        self.with_active(|active| active.params.performance_profile)
    }

    /// Name of the driver backing the open stream.
    pub fn driver_name(&self) -> Result<&'static str> {
        self.with_active(|active| active.driver_name)
    }

    /// The opaque application handle, if one was configured.
    pub fn user_data(&self) -> Result<Option<UserData>> {
        self.with_active(|active| active.user_data.clone())
    }

    /// Playback counters since `open()`.
    pub fn stats(&self) -> Result<StatsSnapshot> {
        self.with_active(|active| active.stats.snapshot())
    }

    /// Receiver for asynchronous real-time events (underruns, callback
    /// panics). The queue is bounded; events are dropped, never blocked on.
    pub fn events(&self) -> Result<Receiver<DeviceEvent>> {
        self.with_active(|active| active.events.clone())
    }

    /// Master volume in [0.0, 1.0]. Applied lock-free on the real-time
    /// path; settable in any state.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(DeviceError::InvalidVolume(volume));
        }
        self.volume
            .store(volume, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.volume.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn with_active<T>(&self, f: impl FnOnce(&Active) -> T) -> Result<T> {
        let inner = self.inner.lock();
        inner.active.as_ref().map(f).ok_or(DeviceError::NotOpen)
    }
}

impl Default for PlaybackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackDevice {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        Self::close_locked(&mut inner);
    }
}
