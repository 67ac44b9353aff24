//! Process-wide backend driver registry.
//!
//! Explicit lifecycle, not an implicit singleton: [`init`] installs the
//! process registry, [`shutdown`] tears it down, and a device opened without
//! an explicit driver resolves against whatever is registered at that
//! moment. Tests substitute fakes either here or via
//! [`PlaybackDevice::with_driver`](crate::PlaybackDevice::with_driver).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::DeviceParams;
use crate::driver::{BackendDriver, DriverStream};
use crate::error::{DeviceError, Result};

/// Ordered collection of backend drivers. Cloning shares the underlying
/// registrations.
pub struct DriverRegistry {
    drivers: Arc<RwLock<Vec<Arc<dyn BackendDriver>>>>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            drivers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a driver. Selection order is registration order.
    pub fn register(&self, driver: Arc<dyn BackendDriver>) {
        self.drivers.write().push(driver);
    }

    /// Remove a driver by name. Returns whether anything was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut drivers = self.drivers.write();
        let before = drivers.len();
        drivers.retain(|d| d.name() != name);
        drivers.len() != before
    }

    /// Look up a driver by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn BackendDriver>> {
        self.drivers.read().iter().find(|d| d.name() == name).cloned()
    }

    /// Names of all registered drivers, in selection order.
    pub fn names(&self) -> Vec<&'static str> {
        self.drivers.read().iter().map(|d| d.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.read().is_empty()
    }

    /// Drop all registrations.
    pub fn clear(&self) {
        self.drivers.write().clear();
    }

    /// Walk drivers in registration order; the first successful `acquire`
    /// wins. Fails with `NoSuitableDriver` when none accepts.
    pub(crate) fn acquire(
        &self,
        requested: &DeviceParams,
    ) -> Result<(Arc<dyn BackendDriver>, Box<dyn DriverStream>, DeviceParams)> {
        let drivers: Vec<_> = self.drivers.read().clone();
        for driver in drivers {
            match driver.acquire(requested) {
                Ok((stream, effective)) => return Ok((driver, stream, effective)),
                Err(err) => {
                    tracing::debug!(driver = driver.name(), %err, "driver declined");
                }
            }
        }
        Err(DeviceError::NoSuitableDriver)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DriverRegistry {
    fn clone(&self) -> Self {
        Self {
            drivers: Arc::clone(&self.drivers),
        }
    }
}

static GLOBAL: RwLock<Option<DriverRegistry>> = RwLock::new(None);

/// Install the process-wide registry. Idempotent; returns a handle to it.
pub fn init() -> DriverRegistry {
    let mut global = GLOBAL.write();
    global.get_or_insert_with(DriverRegistry::new).clone()
}

/// Handle to the process-wide registry, if initialized.
pub fn get() -> Option<DriverRegistry> {
    GLOBAL.read().clone()
}

/// Tear down the process-wide registry. Devices already open keep their
/// acquired streams; only future driver resolution is affected.
pub fn shutdown() {
    *GLOBAL.write() = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct RecordingDriver {
        name: &'static str,
        accept: bool,
        asked: AtomicBool,
    }

    impl RecordingDriver {
        fn new(name: &'static str, accept: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                accept,
                asked: AtomicBool::new(false),
            })
        }
    }

    struct NoopStream;

    impl DriverStream for NoopStream {
        fn activate(&mut self, _trampoline: Arc<crate::rt::CallbackTrampoline>) -> Result<()> {
            Ok(())
        }

        fn deactivate(&mut self) {}
    }

    impl BackendDriver for RecordingDriver {
        fn name(&self) -> &'static str {
            self.name
        }

        fn acquire(
            &self,
            requested: &DeviceParams,
        ) -> Result<(Box<dyn DriverStream>, DeviceParams)> {
            self.asked.store(true, Ordering::SeqCst);
            if self.accept {
                Ok((Box::new(NoopStream), *requested))
            } else {
                Err(DeviceError::BackendRejected("busy".into()))
            }
        }
    }

    fn requested() -> DeviceParams {
        DeviceParams {
            format: crate::SampleFormat::Float32,
            channels: 2,
            sample_rate: 48_000,
            period_size_in_frames: 480,
            performance_profile: crate::PerformanceProfile::LowLatency,
        }
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = DriverRegistry::new();
        assert!(registry.is_empty());

        registry.register(RecordingDriver::new("a", true));
        registry.register(RecordingDriver::new("b", true));
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert!(registry.lookup("a").is_some());
        assert!(registry.lookup("missing").is_none());

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert_eq!(registry.names(), vec!["b"]);
    }

    #[test]
    fn test_acquire_falls_through_to_next_driver() {
        let registry = DriverRegistry::new();
        let first = RecordingDriver::new("first", false);
        let second = RecordingDriver::new("second", true);
        registry.register(first.clone());
        registry.register(second.clone());

        let (driver, _stream, effective) = registry.acquire(&requested()).unwrap();
        assert_eq!(driver.name(), "second");
        assert_eq!(effective, requested());
        assert!(first.asked.load(Ordering::SeqCst));
        assert!(second.asked.load(Ordering::SeqCst));
    }

    #[test]
    fn test_acquire_with_no_acceptor() {
        let registry = DriverRegistry::new();
        assert_eq!(
            registry.acquire(&requested()).err(),
            Some(DeviceError::NoSuitableDriver)
        );

        registry.register(RecordingDriver::new("declines", false));
        assert_eq!(
            registry.acquire(&requested()).err(),
            Some(DeviceError::NoSuitableDriver)
        );
    }
}
