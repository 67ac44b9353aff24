//! Backend driver seam.
//!
//! The engine reaches platform audio subsystems through these traits and
//! nothing else; it never branches on the OS. This file must not contain
//! platform-specific imports - those belong to the driver implementations
//! under `drivers/`.

use std::sync::Arc;

use crate::config::DeviceParams;
use crate::error::Result;
use crate::rt::CallbackTrampoline;

/// A platform output mechanism capable of producing playback streams.
///
/// Drivers are registered with the [`registry`](crate::registry) or handed
/// directly to [`PlaybackDevice::with_driver`]. `acquire` claims an output
/// stream for the requested parameters and reports what the platform will
/// actually deliver - the returned parameters may differ (nearest supported
/// sample rate, substituted format) and become the device's effective
/// configuration.
///
/// [`PlaybackDevice::with_driver`]: crate::PlaybackDevice::with_driver
pub trait BackendDriver: Send + Sync {
    /// Short stable identifier, e.g. `"null"` or `"cpal"`.
    fn name(&self) -> &'static str;

    /// Claim an output stream matching `requested` as closely as the
    /// platform allows.
    fn acquire(&self, requested: &DeviceParams) -> Result<(Box<dyn DriverStream>, DeviceParams)>;
}

/// An acquired output stream. Exclusively owned by one `PlaybackDevice`.
///
/// The driver owns the real-time thread; the engine only defines its
/// contract: once activated, the stream periodically fires the trampoline
/// with an interleaved buffer in the negotiated format, one period at a
/// time or in whatever granularity the platform produces.
pub trait DriverStream: Send {
    /// Begin the periodic real-time loop.
    ///
    /// The stream holds the trampoline for the lifetime of the activation
    /// and fires it from a single thread.
    fn activate(&mut self, trampoline: Arc<CallbackTrampoline>) -> Result<()>;

    /// Halt the loop.
    ///
    /// Must not return while a trampoline invocation is in flight: when this
    /// returns, no further fires happen until the next `activate`. The loop
    /// is cooperative - worst case this blocks for one period window.
    fn deactivate(&mut self);

    /// Release the underlying platform resource.
    ///
    /// Must not fail; implementations log anything that goes wrong during
    /// teardown. Consuming the box makes a second release unrepresentable.
    fn release(self: Box<Self>) {}
}
