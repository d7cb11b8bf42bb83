//! Controller subsystem: device adapters producing canonical snapshots
//!
//! ```text
//! hidapi ──► HidAdapter ───────────────────────────┐
//!                                                   ├──► Snapshot
//! gilrs ──► ActivationStateMachine ──► MappingTable ┘
//! ```
//!
//! Both paths implement [`DeviceAdapter`], so the engine never knows which
//! transport is behind it.

pub mod activation;
pub mod error;
pub mod generic;
pub mod gilrs_backend;
pub mod hid;
pub mod hidapi_source;
pub mod snapshot;

pub use error::DeviceError;
pub use snapshot::{AnalogChannel, Snapshot};

/// One source of canonical snapshots
pub trait DeviceAdapter {
    /// Next decoded snapshot. Waits at most a few milliseconds; `None` means
    /// "no change" and is never an error.
    fn poll(&mut self) -> Option<Snapshot>;

    /// Whether a device is currently driving this adapter
    fn is_active(&self) -> bool;

    /// Releases the transport handle. Later polls return `None`.
    fn close(&mut self);

    fn describe(&self) -> String;
}
