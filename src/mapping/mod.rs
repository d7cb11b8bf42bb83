//! Turns canonical snapshots into mouse and keyboard output.
//!
//! An [`ActionPipeline`] holds the configured [`Action`]s in their declared
//! order. Each tick every action sees the same `(current, previous)` pair;
//! virtual buttons written by one action are visible to the actions after
//! it. Effects go to an [`OutputSink`].

pub mod action;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod profile;
pub mod sink;

pub use action::{Action, ActionConfig, Effect, KeyOp, MouseOp, RepeatTimer};
pub use error::SinkError;
pub use keys::{Key, MouseButton};
pub use pipeline::{ActionPipeline, TickReport};
pub use profile::BuiltinProfile;
pub use sink::{ChannelSink, OutputCommand, OutputSink, RecordingSink, TracingSink};

use std::time::{Duration, Instant};

/// Lets an event through at most once per interval
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_event_time: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_event_time: None,
        }
    }

    pub fn should_process(&mut self, now: Instant) -> bool {
        let due = match self.last_event_time {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        };
        if due {
            self.last_event_time = Some(now);
        }
        due
    }
}
