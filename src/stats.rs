//! Playback statistics and asynchronous device events.
//!
//! Real-time failures (underruns, callback panics) never surface as return
//! values from `start()` - by then it has already returned. They land here:
//! counters updated from the real-time thread and a bounded event queue
//! drained at the application's leisure.

use std::sync::atomic::{AtomicU64, Ordering};

/// Events emitted from the real-time path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The driver missed a period deadline; output glitched.
    Underrun,
    /// The data callback panicked. The affected buffer was silenced.
    CallbackPanicked,
}

/// Point-in-time view of the playback counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Driver fire cycles since `open()`.
    pub callbacks: u64,
    /// Frames handed to the driver since `open()`.
    pub frames_rendered: u64,
    /// Missed period deadlines since `open()`.
    pub underruns: u64,
}

/// Shared counters, written by the real-time thread, read anywhere.
#[derive(Debug, Default)]
#[repr(align(64))]
pub(crate) struct DeviceStats {
    callbacks: AtomicU64,
    frames: AtomicU64,
    underruns: AtomicU64,
}

impl DeviceStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_fire(&self, frames: u64) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            frames_rendered: self.frames.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}
