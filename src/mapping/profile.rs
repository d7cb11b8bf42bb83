//! Built-in action profiles used when the mapping file lists no actions

use crate::controller::generic::ProtocolFamily;
use crate::controller::snapshot::AnalogChannel;
use crate::mapping::action::ActionConfig;
use crate::mapping::keys::{Key, MouseButton};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinProfile {
    /// Full layout for pads with analog triggers and all face/shoulder buttons
    #[default]
    Microsoft,
    /// Reduced layout relying on stick-derived virtual buttons
    Generic,
    /// Picked from the configured device's protocol family
    Auto,
}

impl BuiltinProfile {
    /// MICROSOFT pads get the full layout, every other family the generic one.
    pub fn for_family(family: ProtocolFamily) -> Self {
        match family {
            ProtocolFamily::Microsoft => BuiltinProfile::Microsoft,
            ProtocolFamily::Nintendo | ProtocolFamily::Default => BuiltinProfile::Generic,
        }
    }

    /// `Auto` that was never resolved falls back to the Microsoft list.
    pub fn actions(self) -> Vec<ActionConfig> {
        match self {
            BuiltinProfile::Microsoft | BuiltinProfile::Auto => microsoft_profile(),
            BuiltinProfile::Generic => generic_profile(),
        }
    }
}

fn mouse_move(x_axis: AnalogChannel, y_axis: AnalogChannel, sensitivity: f64) -> ActionConfig {
    ActionConfig::MouseMove {
        x_axis,
        y_axis,
        sensitivity,
        deadzone: 0.15,
    }
}

fn click(button: &str, mouse_button: MouseButton) -> ActionConfig {
    ActionConfig::Click {
        button: button.to_string(),
        mouse_button,
    }
}

fn scroll(button: &str, scroll_speed: f64, initial_delay: f64, repeat_rate: f64) -> ActionConfig {
    ActionConfig::Scroll {
        button: button.to_string(),
        scroll_speed,
        initial_delay,
        repeat_rate,
    }
}

fn analog_scroll(axis: AnalogChannel, threshold: f64, scroll_speed: f64) -> ActionConfig {
    ActionConfig::AnalogScroll {
        axis,
        threshold,
        scroll_speed,
        initial_delay: 0.3,
        repeat_rate: 0.05,
    }
}

fn tap(button: &str, key: Key, modifiers: &[Key]) -> ActionConfig {
    ActionConfig::KeyboardTap {
        button: button.to_string(),
        key,
        modifiers: modifiers.to_vec(),
    }
}

fn virtual_button(axis: AnalogChannel, threshold: f64, output_button: &str) -> ActionConfig {
    ActionConfig::Threshold {
        axis,
        threshold,
        output_button: output_button.to_string(),
    }
}

pub fn microsoft_profile() -> Vec<ActionConfig> {
    use AnalogChannel::*;
    vec![
        mouse_move(Lx, Ly, 25.0),
        mouse_move(Rx, Ry, 15.0),
        click("A", MouseButton::Left),
        click("B", MouseButton::Right),
        analog_scroll(Lt, 0.01, 15.0),
        analog_scroll(Rt, 0.01, -15.0),
        scroll("RB", -15.0, 0.3, 0.05),
        scroll("LB", 15.0, 0.3, 0.05),
        scroll("UP", 1.0, 0.4, 0.1),
        scroll("DOWN", -1.0, 0.4, 0.1),
        tap("X", Key::Left, &[Key::Cmd]),
        tap("Y", Key::Right, &[Key::Cmd]),
        tap("RIGHT", Key::Tab, &[]),
        tap("LEFT", Key::Tab, &[Key::Shift]),
        tap("WIN", Key::Enter, &[]),
        tap("MENU", Key::Char('q'), &[Key::Cmd, Key::Ctrl]),
        tap("RS", Key::Char('w'), &[Key::Cmd]),
    ]
}

pub fn generic_profile() -> Vec<ActionConfig> {
    use AnalogChannel::*;
    vec![
        virtual_button(Lx, 0.5, "STICK_RIGHT"),
        virtual_button(Lx, -0.5, "STICK_LEFT"),
        click("A", MouseButton::Left),
        click("B", MouseButton::Right),
        analog_scroll(Ry, -0.5, 15.0),
        analog_scroll(Ry, 0.5, -15.0),
        scroll("UP", 1.0, 0.4, 0.1),
        scroll("DOWN", -1.0, 0.4, 0.1),
        tap("X", Key::Left, &[Key::Cmd]),
        tap("Y", Key::Right, &[Key::Cmd]),
        tap("STICK_RIGHT", Key::Tab, &[]),
        tap("STICK_LEFT", Key::Tab, &[Key::Shift]),
        tap("WIN", Key::Enter, &[]),
        tap("MENU", Key::Char('q'), &[Key::Cmd, Key::Ctrl]),
    ]
}
