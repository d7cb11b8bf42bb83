use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One of the six normalized analog channels carried by a [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalogChannel {
    Lt,
    Rt,
    Lx,
    Ly,
    Rx,
    Ry,
}

impl AnalogChannel {
    pub const ALL: [AnalogChannel; 6] = [
        AnalogChannel::Lt,
        AnalogChannel::Rt,
        AnalogChannel::Lx,
        AnalogChannel::Ly,
        AnalogChannel::Rx,
        AnalogChannel::Ry,
    ];

    /// Triggers live in [0, 1], sticks in [-1, 1]
    pub fn is_trigger(self) -> bool {
        matches!(self, AnalogChannel::Lt | AnalogChannel::Rt)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalogChannel::Lt => "lt",
            AnalogChannel::Rt => "rt",
            AnalogChannel::Lx => "lx",
            AnalogChannel::Ly => "ly",
            AnalogChannel::Rx => "rx",
            AnalogChannel::Ry => "ry",
        }
    }

    fn clamp(self, value: f64) -> f64 {
        if self.is_trigger() {
            value.clamp(0.0, 1.0)
        } else {
            value.clamp(-1.0, 1.0)
        }
    }
}

impl fmt::Display for AnalogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalogChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalogChannel::ALL
            .into_iter()
            .find(|channel| channel.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown analog channel '{}'", s))
    }
}

/// One tick's fully decoded controller state.
///
/// Created fresh by a device adapter every tick. The action pipeline may add
/// synthetic buttons to `buttons` while it evaluates the tick; after that the
/// snapshot only serves as the next tick's `previous`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub buttons: HashMap<String, bool>,
    pub lt: f64,
    pub rt: f64,
    pub lx: f64,
    pub ly: f64,
    pub rx: f64,
    pub ry: f64,
}

impl Snapshot {
    /// Unknown buttons read as released
    pub fn is_pressed(&self, button: &str) -> bool {
        self.buttons.get(button).copied().unwrap_or(false)
    }

    pub fn set_button(&mut self, button: impl Into<String>, pressed: bool) {
        self.buttons.insert(button.into(), pressed);
    }

    pub fn channel(&self, channel: AnalogChannel) -> f64 {
        match channel {
            AnalogChannel::Lt => self.lt,
            AnalogChannel::Rt => self.rt,
            AnalogChannel::Lx => self.lx,
            AnalogChannel::Ly => self.ly,
            AnalogChannel::Rx => self.rx,
            AnalogChannel::Ry => self.ry,
        }
    }

    /// Stores `value` clamped to the channel's range.
    pub fn set_channel(&mut self, channel: AnalogChannel, value: f64) {
        let value = channel.clamp(value);
        match channel {
            AnalogChannel::Lt => self.lt = value,
            AnalogChannel::Rt => self.rt = value,
            AnalogChannel::Lx => self.lx = value,
            AnalogChannel::Ly => self.ly = value,
            AnalogChannel::Rx => self.rx = value,
            AnalogChannel::Ry => self.ry = value,
        }
    }

    /// Names of all pressed buttons, sorted for stable output.
    pub fn pressed_buttons(&self) -> Vec<&str> {
        let mut pressed: Vec<&str> = self
            .buttons
            .iter()
            .filter(|(_, pressed)| **pressed)
            .map(|(name, _)| name.as_str())
            .collect();
        pressed.sort_unstable();
        pressed
    }

    pub fn any_pressed(&self) -> bool {
        self.buttons.values().any(|pressed| *pressed)
    }

    /// Compact one-line summary used by the debug status log
    pub fn summary(&self) -> String {
        format!(
            "L:({:.2},{:.2}) R:({:.2},{:.2}) LT:{:.2} RT:{:.2} B:{:?}",
            self.lx,
            self.ly,
            self.rx,
            self.ry,
            self.lt,
            self.rt,
            self.pressed_buttons()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_buttons_read_as_released() {
        let mut snapshot = Snapshot::default();
        assert!(!snapshot.is_pressed("A"));
        snapshot.set_button("A", true);
        assert!(snapshot.is_pressed("A"));
        assert!(snapshot.any_pressed());
    }

    #[test]
    fn set_channel_clamps_to_channel_range() {
        let mut snapshot = Snapshot::default();
        snapshot.set_channel(AnalogChannel::Lt, -0.4);
        snapshot.set_channel(AnalogChannel::Rt, 1.7);
        snapshot.set_channel(AnalogChannel::Lx, -3.0);
        snapshot.set_channel(AnalogChannel::Ry, 0.25);

        assert_eq!(snapshot.lt, 0.0);
        assert_eq!(snapshot.rt, 1.0);
        assert_eq!(snapshot.lx, -1.0);
        assert_eq!(snapshot.channel(AnalogChannel::Ry), 0.25);
    }

    #[test]
    fn pressed_buttons_are_sorted() {
        let mut snapshot = Snapshot::default();
        snapshot.set_button("RB", true);
        snapshot.set_button("A", true);
        snapshot.set_button("B", false);
        assert_eq!(snapshot.pressed_buttons(), vec!["A", "RB"]);
    }

    #[test]
    fn channel_names_parse_case_insensitively() {
        assert_eq!("LT".parse::<AnalogChannel>(), Ok(AnalogChannel::Lt));
        assert_eq!("ry".parse::<AnalogChannel>(), Ok(AnalogChannel::Ry));
        assert!("lz".parse::<AnalogChannel>().is_err());
    }
}
