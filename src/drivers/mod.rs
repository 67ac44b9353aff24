//! In-tree backend drivers.
//!
//! The null driver is always available; the CPAL driver requires the `cpal`
//! feature (on by default). Platform-specific drivers beyond these are
//! external collaborators implementing [`BackendDriver`].
//!
//! [`BackendDriver`]: crate::BackendDriver

mod null;
pub use null::NullDriver;

#[cfg(feature = "cpal")]
mod cpal;
#[cfg(feature = "cpal")]
pub use self::cpal::CpalDriver;
