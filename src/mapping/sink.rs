//! Output sinks: where mapped effects end up
//!
//! The engine only talks to [`OutputSink`]. [`TracingSink`] logs every
//! command, [`ChannelSink`] hands commands to an injector task, and
//! [`RecordingSink`] keeps them in memory for assertions.

use crate::mapping::action::{Effect, KeyOp, MouseOp};
use crate::mapping::error::SinkError;
use crate::mapping::keys::{Key, MouseButton};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub trait OutputSink {
    /// Relative pointer motion
    fn move_by(&mut self, dx: f64, dy: f64) -> Result<(), SinkError>;
    fn press(&mut self, button: MouseButton) -> Result<(), SinkError>;
    fn release(&mut self, button: MouseButton) -> Result<(), SinkError>;
    fn scroll(&mut self, dx: f64, dy: f64) -> Result<(), SinkError>;
    fn key_down(&mut self, key: Key) -> Result<(), SinkError>;
    fn key_up(&mut self, key: Key) -> Result<(), SinkError>;

    fn tap(&mut self, key: Key) -> Result<(), SinkError> {
        self.key_down(key)?;
        self.key_up(key)
    }

    /// Taps `key` with `modifiers` held for the duration of the tap.
    fn tap_with(&mut self, key: Key, modifiers: &[Key]) -> Result<(), SinkError> {
        scoped_tap(self, key, modifiers)
    }
}

/// Runs `f` with every modifier held down.
///
/// Modifiers are released in reverse order on every path, including a failed
/// acquisition part way through and a failure inside `f`. The first error
/// wins.
pub fn with_modifiers_held<S, F>(sink: &mut S, modifiers: &[Key], f: F) -> Result<(), SinkError>
where
    S: OutputSink + ?Sized,
    F: FnOnce(&mut S) -> Result<(), SinkError>,
{
    let mut held: Vec<Key> = Vec::with_capacity(modifiers.len());
    let mut result = Ok(());

    for modifier in modifiers {
        match sink.key_down(*modifier) {
            Ok(()) => held.push(*modifier),
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    if result.is_ok() {
        result = f(sink);
    }

    for modifier in held.into_iter().rev() {
        if let Err(e) = sink.key_up(modifier) {
            if result.is_ok() {
                result = Err(e);
            }
        }
    }

    result
}

/// Modifier-scoped tap built from primitive key operations.
pub fn scoped_tap<S: OutputSink + ?Sized>(
    sink: &mut S,
    key: Key,
    modifiers: &[Key],
) -> Result<(), SinkError> {
    with_modifiers_held(sink, modifiers, |sink| {
        sink.key_down(key)?;
        sink.key_up(key)
    })
}

/// Delivers one effect to a sink.
pub fn apply_effect<S: OutputSink + ?Sized>(sink: &mut S, effect: &Effect) -> Result<(), SinkError> {
    match effect {
        Effect::Mouse(MouseOp::Move { dx, dy }) => sink.move_by(*dx, *dy),
        Effect::Mouse(MouseOp::Press(button)) => sink.press(*button),
        Effect::Mouse(MouseOp::Release(button)) => sink.release(*button),
        Effect::Mouse(MouseOp::Scroll { dx, dy }) => sink.scroll(*dx, *dy),
        Effect::Key(KeyOp::Tap { key, modifiers }) if modifiers.is_empty() => sink.tap(*key),
        Effect::Key(KeyOp::Tap { key, modifiers }) => sink.tap_with(*key, modifiers),
    }
}

/// Primitive sink operation
#[derive(Debug, Clone, PartialEq)]
pub enum OutputCommand {
    MoveBy { dx: f64, dy: f64 },
    Press(MouseButton),
    Release(MouseButton),
    Scroll { dx: f64, dy: f64 },
    KeyDown(Key),
    KeyUp(Key),
    /// A whole tap, delivered as one unit so no key is left half pressed
    Tap { key: Key, modifiers: Vec<Key> },
}

impl OutputCommand {
    /// Replays this command on another sink.
    pub fn apply_to<S: OutputSink + ?Sized>(&self, sink: &mut S) -> Result<(), SinkError> {
        match self {
            OutputCommand::MoveBy { dx, dy } => sink.move_by(*dx, *dy),
            OutputCommand::Press(button) => sink.press(*button),
            OutputCommand::Release(button) => sink.release(*button),
            OutputCommand::Scroll { dx, dy } => sink.scroll(*dx, *dy),
            OutputCommand::KeyDown(key) => sink.key_down(*key),
            OutputCommand::KeyUp(key) => sink.key_up(*key),
            OutputCommand::Tap { key, modifiers } => sink.tap_with(*key, modifiers),
        }
    }
}

impl fmt::Display for OutputCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputCommand::MoveBy { dx, dy } => write!(f, "move by ({:.2}, {:.2})", dx, dy),
            OutputCommand::Press(button) => write!(f, "press {}", button),
            OutputCommand::Release(button) => write!(f, "release {}", button),
            OutputCommand::Scroll { dx, dy } => write!(f, "scroll ({:.2}, {:.2})", dx, dy),
            OutputCommand::KeyDown(key) => write!(f, "key down {}", key),
            OutputCommand::KeyUp(key) => write!(f, "key up {}", key),
            OutputCommand::Tap { key, modifiers } if modifiers.is_empty() => {
                write!(f, "tap {}", key)
            }
            OutputCommand::Tap { key, modifiers } => {
                let held: Vec<String> = modifiers.iter().map(Key::to_string).collect();
                write!(f, "tap {}+{}", held.join("+"), key)
            }
        }
    }
}

/// Sink that takes every operation as one [`OutputCommand`]; implementing it
/// provides [`OutputSink`].
///
/// Taps arrive as a single [`OutputCommand::Tap`]. The receiver performs the
/// scoped press and release itself, e.g. with [`scoped_tap`].
pub trait CommandSink {
    fn submit(&mut self, command: OutputCommand) -> Result<(), SinkError>;
}

impl<T: CommandSink> OutputSink for T {
    fn move_by(&mut self, dx: f64, dy: f64) -> Result<(), SinkError> {
        self.submit(OutputCommand::MoveBy { dx, dy })
    }

    fn press(&mut self, button: MouseButton) -> Result<(), SinkError> {
        self.submit(OutputCommand::Press(button))
    }

    fn release(&mut self, button: MouseButton) -> Result<(), SinkError> {
        self.submit(OutputCommand::Release(button))
    }

    fn scroll(&mut self, dx: f64, dy: f64) -> Result<(), SinkError> {
        self.submit(OutputCommand::Scroll { dx, dy })
    }

    fn key_down(&mut self, key: Key) -> Result<(), SinkError> {
        self.submit(OutputCommand::KeyDown(key))
    }

    fn key_up(&mut self, key: Key) -> Result<(), SinkError> {
        self.submit(OutputCommand::KeyUp(key))
    }

    fn tap(&mut self, key: Key) -> Result<(), SinkError> {
        self.tap_with(key, &[])
    }

    fn tap_with(&mut self, key: Key, modifiers: &[Key]) -> Result<(), SinkError> {
        self.submit(OutputCommand::Tap {
            key,
            modifiers: modifiers.to_vec(),
        })
    }
}

/// Dry-run sink that only logs
#[derive(Debug, Default)]
pub struct TracingSink {
    delivered: u64,
}

impl TracingSink {
    pub fn new() -> Self {
        info!("Output sink: tracing (dry run)");
        Self::default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl CommandSink for TracingSink {
    fn submit(&mut self, command: OutputCommand) -> Result<(), SinkError> {
        self.delivered += 1;
        match command {
            // pointer motion arrives every tick while a stick is deflected
            OutputCommand::MoveBy { .. } => debug!("output: {}", command),
            _ => info!("output: {}", command),
        }
        Ok(())
    }
}

/// Forwards commands to an injector task over a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<OutputCommand>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<OutputCommand>) -> Self {
        Self { sender }
    }
}

impl CommandSink for ChannelSink {
    fn submit(&mut self, command: OutputCommand) -> Result<(), SinkError> {
        self.sender.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(command) => {
                SinkError::Injection(format!("output queue full, dropped {}", command))
            }
            mpsc::error::TrySendError::Closed(_) => SinkError::ChannelClosed,
        })
    }
}

/// In-memory sink. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<OutputCommand>>>,
    failing_keys: HashSet<Key>,
    fail_all: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `key_down` of `key` fails instead of being recorded.
    pub fn failing_on_key(mut self, key: Key) -> Self {
        self.failing_keys.insert(key);
        self
    }

    /// While set, every command fails. Shared with clones.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutputCommand>> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn commands(&self) -> Vec<OutputCommand> {
        self.lock().clone()
    }

    pub fn take(&self) -> Vec<OutputCommand> {
        std::mem::take(&mut *self.lock())
    }

    pub fn scrolls(&self) -> Vec<f64> {
        self.lock()
            .iter()
            .filter_map(|command| match command {
                OutputCommand::Scroll { dy, .. } => Some(*dy),
                _ => None,
            })
            .collect()
    }
}

impl CommandSink for RecordingSink {
    fn submit(&mut self, command: OutputCommand) -> Result<(), SinkError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(SinkError::Injection(format!("refused {}", command)));
        }
        match command {
            // recorded as the primitive sequence an injector would perform
            OutputCommand::Tap { key, modifiers } => scoped_tap(self, key, &modifiers),
            OutputCommand::KeyDown(key) if self.failing_keys.contains(&key) => {
                Err(SinkError::Injection(format!("refused {}", command)))
            }
            command => {
                self.lock().push(command);
                Ok(())
            }
        }
    }
}
