//! Mapping actions: the stateful rules evaluated once per tick
//!
//! Each [`Action`] reads the current and previous snapshot and returns the
//! [`Effect`]s it wants delivered. Only the scroll-family actions keep state
//! between ticks (their [`RepeatTimer`]); threshold actions write synthetic
//! buttons into the current snapshot for later actions to read.

use crate::controller::snapshot::{AnalogChannel, Snapshot};
use crate::mapping::keys::{Key, MouseButton};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum MouseOp {
    Move { dx: f64, dy: f64 },
    Press(MouseButton),
    Release(MouseButton),
    Scroll { dx: f64, dy: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyOp {
    /// Hold `modifiers`, tap `key`, release `modifiers`
    Tap { key: Key, modifiers: Vec<Key> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Mouse(MouseOp),
    Key(KeyOp),
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Mouse(MouseOp::Move { dx, dy }) => write!(f, "move({:.2}, {:.2})", dx, dy),
            Effect::Mouse(MouseOp::Press(button)) => write!(f, "press({})", button),
            Effect::Mouse(MouseOp::Release(button)) => write!(f, "release({})", button),
            Effect::Mouse(MouseOp::Scroll { dx, dy }) => write!(f, "scroll({:.2}, {:.2})", dx, dy),
            Effect::Key(KeyOp::Tap { key, modifiers }) if modifiers.is_empty() => {
                write!(f, "tap({})", key)
            }
            Effect::Key(KeyOp::Tap { key, modifiers }) => {
                let held: Vec<String> = modifiers.iter().map(Key::to_string).collect();
                write!(f, "tap({}+{})", held.join("+"), key)
            }
        }
    }
}

fn vertical_scroll(amount: f64) -> Effect {
    Effect::Mouse(MouseOp::Scroll { dx: 0.0, dy: amount })
}

/// Threshold comparison shared by virtual buttons and analog scroll.
///
/// A non-negative threshold is met at or above it, a negative one at or below.
pub fn threshold_met(value: f64, threshold: f64) -> bool {
    if threshold >= 0.0 {
        value >= threshold
    } else {
        value <= threshold
    }
}

fn apply_deadzone(value: f64, deadzone: f64) -> f64 {
    if value.abs() < deadzone {
        0.0
    } else {
        value
    }
}

/// Config seconds to a duration, rounded to the microsecond
pub fn seconds(secs: f64) -> Duration {
    Duration::from_micros((secs * 1_000_000.0).round() as u64)
}

/// Key-repeat schedule for the scroll-family actions
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatTimer {
    initial_delay: Duration,
    repeat_rate: Duration,
    pressed: bool,
    next_fire: Option<Instant>,
}

impl RepeatTimer {
    pub fn new(initial_delay: Duration, repeat_rate: Duration) -> Self {
        Self {
            initial_delay,
            repeat_rate,
            pressed: false,
            next_fire: None,
        }
    }

    /// Advances the schedule and reports whether to fire this tick.
    ///
    /// The press edge fires immediately. Repeats are due every `repeat_rate`
    /// after `initial_delay`; a tick arriving late fires once and
    /// reschedules from `now`, so a long gap never turns into a burst.
    pub fn update(&mut self, down: bool, now: Instant) -> bool {
        if !down {
            self.reset();
            return false;
        }

        if !self.pressed {
            self.pressed = true;
            self.next_fire = Some(now + self.initial_delay);
            return true;
        }

        match self.next_fire {
            Some(due) if now >= due => {
                let mut next = due + self.repeat_rate;
                if next <= now {
                    next = now + self.repeat_rate;
                }
                self.next_fire = Some(next);
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.pressed = false;
        self.next_fire = None;
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn next_fire(&self) -> Option<Instant> {
        self.next_fire
    }
}

/// One `[[actions]]` entry as written in the mapping file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionConfig {
    MouseMove {
        x_axis: AnalogChannel,
        y_axis: AnalogChannel,
        sensitivity: f64,
        deadzone: f64,
    },
    Click {
        #[serde(alias = "controller_button")]
        button: String,
        mouse_button: MouseButton,
    },
    Scroll {
        #[serde(alias = "controller_button")]
        button: String,
        scroll_speed: f64,
        initial_delay: f64,
        repeat_rate: f64,
    },
    AnalogScroll {
        axis: AnalogChannel,
        threshold: f64,
        scroll_speed: f64,
        initial_delay: f64,
        repeat_rate: f64,
    },
    VariableScroll {
        axis: AnalogChannel,
        sensitivity: f64,
        deadzone: f64,
        #[serde(default)]
        inverted: bool,
    },
    Threshold {
        axis: AnalogChannel,
        threshold: f64,
        output_button: String,
    },
    KeyboardTap {
        #[serde(alias = "controller_button")]
        button: String,
        key: Key,
        #[serde(default)]
        modifiers: Vec<Key>,
    },
}

fn check_deadzone(deadzone: f64) -> Result<(), String> {
    if !(0.0..1.0).contains(&deadzone) {
        return Err(format!("deadzone must be in [0, 1), got {}", deadzone));
    }
    Ok(())
}

fn check_timing(initial_delay: f64, repeat_rate: f64) -> Result<(), String> {
    if !initial_delay.is_finite() || initial_delay < 0.0 {
        return Err(format!("initial_delay must be >= 0, got {}", initial_delay));
    }
    if !repeat_rate.is_finite() || repeat_rate <= 0.0 {
        return Err(format!("repeat_rate must be > 0, got {}", repeat_rate));
    }
    Ok(())
}

fn check_button(button: &str) -> Result<(), String> {
    if button.trim().is_empty() {
        return Err("button name must not be empty".to_string());
    }
    Ok(())
}

fn check_finite(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{} must be a finite number", name));
    }
    Ok(())
}

impl ActionConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionConfig::MouseMove { .. } => "mouse_move",
            ActionConfig::Click { .. } => "click",
            ActionConfig::Scroll { .. } => "scroll",
            ActionConfig::AnalogScroll { .. } => "analog_scroll",
            ActionConfig::VariableScroll { .. } => "variable_scroll",
            ActionConfig::Threshold { .. } => "threshold",
            ActionConfig::KeyboardTap { .. } => "keyboard_tap",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ActionConfig::MouseMove {
                sensitivity,
                deadzone,
                ..
            } => {
                check_finite("sensitivity", *sensitivity)?;
                check_deadzone(*deadzone)
            }
            ActionConfig::Click { button, .. } => check_button(button),
            ActionConfig::Scroll {
                button,
                scroll_speed,
                initial_delay,
                repeat_rate,
            } => {
                check_button(button)?;
                check_finite("scroll_speed", *scroll_speed)?;
                check_timing(*initial_delay, *repeat_rate)
            }
            ActionConfig::AnalogScroll {
                threshold,
                scroll_speed,
                initial_delay,
                repeat_rate,
                ..
            } => {
                check_finite("threshold", *threshold)?;
                check_finite("scroll_speed", *scroll_speed)?;
                check_timing(*initial_delay, *repeat_rate)
            }
            ActionConfig::VariableScroll {
                sensitivity,
                deadzone,
                ..
            } => {
                check_finite("sensitivity", *sensitivity)?;
                check_deadzone(*deadzone)
            }
            ActionConfig::Threshold {
                threshold,
                output_button,
                ..
            } => {
                check_finite("threshold", *threshold)?;
                check_button(output_button)
            }
            ActionConfig::KeyboardTap { button, .. } => check_button(button),
        }
    }
}

/// A configured action together with its runtime state
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    MouseMove {
        x_axis: AnalogChannel,
        y_axis: AnalogChannel,
        sensitivity: f64,
        deadzone: f64,
    },
    Click {
        button: String,
        mouse_button: MouseButton,
    },
    Scroll {
        button: String,
        amount: f64,
        timer: RepeatTimer,
    },
    AnalogScroll {
        axis: AnalogChannel,
        threshold: f64,
        amount: f64,
        timer: RepeatTimer,
    },
    VariableScroll {
        axis: AnalogChannel,
        sensitivity: f64,
        deadzone: f64,
        direction: f64,
    },
    Threshold {
        axis: AnalogChannel,
        threshold: f64,
        output_button: String,
    },
    KeyboardTap {
        button: String,
        key: Key,
        modifiers: Vec<Key>,
    },
}

impl From<&ActionConfig> for Action {
    fn from(config: &ActionConfig) -> Self {
        match config.clone() {
            ActionConfig::MouseMove {
                x_axis,
                y_axis,
                sensitivity,
                deadzone,
            } => Action::MouseMove {
                x_axis,
                y_axis,
                sensitivity,
                deadzone,
            },
            ActionConfig::Click {
                button,
                mouse_button,
            } => Action::Click {
                button,
                mouse_button,
            },
            ActionConfig::Scroll {
                button,
                scroll_speed,
                initial_delay,
                repeat_rate,
            } => Action::Scroll {
                button,
                amount: scroll_speed,
                timer: RepeatTimer::new(seconds(initial_delay), seconds(repeat_rate)),
            },
            ActionConfig::AnalogScroll {
                axis,
                threshold,
                scroll_speed,
                initial_delay,
                repeat_rate,
            } => Action::AnalogScroll {
                axis,
                threshold,
                amount: scroll_speed,
                timer: RepeatTimer::new(seconds(initial_delay), seconds(repeat_rate)),
            },
            ActionConfig::VariableScroll {
                axis,
                sensitivity,
                deadzone,
                inverted,
            } => Action::VariableScroll {
                axis,
                sensitivity,
                deadzone,
                direction: if inverted { -1.0 } else { 1.0 },
            },
            ActionConfig::Threshold {
                axis,
                threshold,
                output_button,
            } => Action::Threshold {
                axis,
                threshold,
                output_button,
            },
            ActionConfig::KeyboardTap {
                button,
                key,
                modifiers,
            } => Action::KeyboardTap {
                button,
                key,
                modifiers,
            },
        }
    }
}

fn pressed_edge(button: &str, current: &Snapshot, previous: Option<&Snapshot>) -> (bool, bool) {
    let is_pressed = current.is_pressed(button);
    let was_pressed = previous.is_some_and(|previous| previous.is_pressed(button));
    (is_pressed, was_pressed)
}

impl Action {
    /// Evaluates this action for one tick.
    ///
    /// `previous` is `None` on the first tick after activation, in which case
    /// every button counts as previously released.
    pub fn update(
        &mut self,
        current: &mut Snapshot,
        previous: Option<&Snapshot>,
        now: Instant,
    ) -> Vec<Effect> {
        match self {
            Action::MouseMove {
                x_axis,
                y_axis,
                sensitivity,
                deadzone,
            } => {
                let x = apply_deadzone(current.channel(*x_axis), *deadzone);
                let y = apply_deadzone(current.channel(*y_axis), *deadzone);
                if x == 0.0 && y == 0.0 {
                    return Vec::new();
                }
                vec![Effect::Mouse(MouseOp::Move {
                    dx: x.powi(3) * *sensitivity,
                    dy: -y.powi(3) * *sensitivity,
                })]
            }
            Action::Click {
                button,
                mouse_button,
            } => match pressed_edge(button, current, previous) {
                (true, false) => vec![Effect::Mouse(MouseOp::Press(*mouse_button))],
                (false, true) => vec![Effect::Mouse(MouseOp::Release(*mouse_button))],
                _ => Vec::new(),
            },
            Action::Scroll {
                button,
                amount,
                timer,
            } => {
                if timer.update(current.is_pressed(button), now) {
                    vec![vertical_scroll(*amount)]
                } else {
                    Vec::new()
                }
            }
            Action::AnalogScroll {
                axis,
                threshold,
                amount,
                timer,
            } => {
                let down = threshold_met(current.channel(*axis), *threshold);
                if timer.update(down, now) {
                    vec![vertical_scroll(*amount)]
                } else {
                    Vec::new()
                }
            }
            Action::VariableScroll {
                axis,
                sensitivity,
                deadzone,
                direction,
            } => {
                let value = apply_deadzone(current.channel(*axis), *deadzone);
                if value == 0.0 {
                    return Vec::new();
                }
                vec![vertical_scroll(value.powi(2) * *sensitivity * *direction)]
            }
            Action::Threshold {
                axis,
                threshold,
                output_button,
            } => {
                let down = threshold_met(current.channel(*axis), *threshold);
                current.set_button(output_button.as_str(), down);
                Vec::new()
            }
            Action::KeyboardTap {
                button,
                key,
                modifiers,
            } => match pressed_edge(button, current, previous) {
                (true, false) => vec![Effect::Key(KeyOp::Tap {
                    key: *key,
                    modifiers: modifiers.clone(),
                })],
                _ => Vec::new(),
            },
        }
    }

    /// Clears repeat schedules, as after a controller pause.
    pub fn reset(&mut self) {
        match self {
            Action::Scroll { timer, .. } | Action::AnalogScroll { timer, .. } => timer.reset(),
            _ => {}
        }
    }

    /// The mouse button a click action is still holding down, judged by the
    /// last snapshot it saw
    pub fn held_mouse_button(&self, last: Option<&Snapshot>) -> Option<MouseButton> {
        match self {
            Action::Click {
                button,
                mouse_button,
            } if last.is_some_and(|last| last.is_pressed(button)) => Some(*mouse_button),
            _ => None,
        }
    }
}
