//! Device-side error taxonomy
//!
//! None of these are fatal inside the engine. Adapters downgrade them to
//! "no snapshot this tick" and the next poll retries; only the binary decides
//! whether a device missing at startup ends the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// No transport handle is open
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    /// Report too short or otherwise undecodable
    #[error("Malformed report: got {len} bytes, need at least {min}")]
    MalformedReport { len: usize, min: usize },

    /// The device went away mid-session
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The joystick backend could not be initialized
    #[error("Backend error: {0}")]
    Backend(String),
}
