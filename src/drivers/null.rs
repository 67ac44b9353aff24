//! Timed null output driver.
//!
//! Consumes frames on a wall-clock schedule without touching hardware.
//! Useful as a test backend and as a fallback on machines with no audio
//! device: playback proceeds at the configured rate, output goes nowhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use thread_priority::ThreadPriority;

use crate::buffer::SampleBuf;
use crate::config::{DeviceParams, PerformanceProfile};
use crate::driver::{BackendDriver, DriverStream};
use crate::error::{DeviceError, Result};
use crate::rt::CallbackTrampoline;

/// Hardware-free output driver. Accepts any validated configuration as-is.
#[derive(Debug, Default)]
pub struct NullDriver;

impl NullDriver {
    pub fn new() -> Self {
        Self
    }
}

impl BackendDriver for NullDriver {
    fn name(&self) -> &'static str {
        "null"
    }

    fn acquire(&self, requested: &DeviceParams) -> Result<(Box<dyn DriverStream>, DeviceParams)> {
        let stream = NullStream {
            params: *requested,
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        };
        Ok((Box::new(stream), *requested))
    }
}

struct NullStream {
    params: DeviceParams,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DriverStream for NullStream {
    fn activate(&mut self, trampoline: Arc<CallbackTrampoline>) -> Result<()> {
        debug_assert!(self.worker.is_none(), "stream already active");
        self.shutdown.store(false, Ordering::Release);

        let params = self.params;
        let shutdown = self.shutdown.clone();

        let worker = thread::Builder::new()
            .name("legato-null-out".into())
            .spawn(move || consume_loop(params, trampoline, shutdown))
            .map_err(|e| DeviceError::BackendRejected(format!("spawn output thread: {e}")))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn deactivate(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            // Join gives the happens-before edge stop() promises: no fire
            // outlives this call.
            if worker.join().is_err() {
                tracing::error!("null output thread panicked");
            }
        }
    }
}

impl Drop for NullStream {
    fn drop(&mut self) {
        // Release without deactivate still tears the worker down.
        self.deactivate();
    }
}

fn consume_loop(params: DeviceParams, trampoline: Arc<CallbackTrampoline>, shutdown: Arc<AtomicBool>) {
    if params.performance_profile == PerformanceProfile::LowLatency {
        // Best effort; falls back to normal priority on restricted systems.
        let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
    }

    let period = params.period_duration();
    let mut scratch = SampleBuf::zeroed(params.period_bytes());
    let mut deadline = Instant::now() + period;

    while !shutdown.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < deadline {
            thread::sleep(deadline - now);
        }

        trampoline.fire(scratch.as_mut_bytes());

        deadline += period;
        if Instant::now() > deadline {
            trampoline.note_underrun();
            deadline = Instant::now() + period;
        }
    }
}
