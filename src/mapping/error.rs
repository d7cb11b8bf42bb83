//! Error definitions for the output side of the mapping pipeline

use thiserror::Error;

/// Failure reported by an output sink
///
/// Never fatal: the pipeline logs it and keeps advancing action state.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The injector refused or failed to deliver the event
    #[error("Injection failed: {0}")]
    Injection(String),

    /// The downstream injector task is gone
    #[error("Output channel closed")]
    ChannelClosed,
}
