//! Index-mapped decoding for generic joysticks
//!
//! A [`MappingTable`] translates physical button/axis/hat indices into
//! canonical names. Built-in tables cover the common protocol families; a
//! custom table can be supplied in config instead.

use crate::controller::snapshot::{AnalogChannel, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// D-pad directions written by hat decoding
pub const DPAD_BUTTONS: [&str; 4] = ["UP", "DOWN", "LEFT", "RIGHT"];

/// Index-addressable raw state of one joystick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoystickReport {
    pub buttons: Vec<bool>,
    /// Raw axis values in [-1, 1], positive y pointing down
    pub axes: Vec<f64>,
    /// Hat direction vectors, positive y pointing up
    pub hats: Vec<(i8, i8)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingTable {
    pub buttons: BTreeMap<usize, String>,
    pub axes: BTreeMap<usize, AnalogChannel>,
    /// Restrict d-pad decoding to one hat. `None` reads every hat.
    pub dpad_hat: Option<usize>,
    pub invert: Vec<AnalogChannel>,
    /// Trigger axes rest at -1 and are remapped to [0, 1]
    pub bidirectional_triggers: bool,
}

fn table(
    buttons: &[(usize, &str)],
    axes: &[(usize, AnalogChannel)],
    dpad_hat: Option<usize>,
) -> MappingTable {
    MappingTable {
        buttons: buttons
            .iter()
            .map(|(index, name)| (*index, name.to_string()))
            .collect(),
        axes: axes.iter().copied().collect(),
        dpad_hat,
        invert: vec![AnalogChannel::Ly, AnalogChannel::Ry],
        bidirectional_triggers: true,
    }
}

impl MappingTable {
    pub fn microsoft() -> Self {
        use AnalogChannel::*;
        table(
            &[
                (0, "A"),
                (1, "B"),
                (2, "X"),
                (3, "Y"),
                (4, "LB"),
                (5, "RB"),
                (6, "LS"),
                (7, "RS"),
                (8, "MENU"),
                (10, "WIN"),
            ],
            &[(0, Lx), (1, Ly), (2, Lt), (3, Rx), (4, Ry), (5, Rt)],
            Some(0),
        )
    }

    /// Pro-style pads without analog triggers
    pub fn nintendo() -> Self {
        use AnalogChannel::*;
        table(
            &[
                (0, "B"),
                (1, "A"),
                (2, "Y"),
                (3, "X"),
                (4, "LB"),
                (5, "RB"),
                (8, "MENU"),
                (9, "WIN"),
                (10, "LS"),
                (11, "RS"),
            ],
            &[(0, Lx), (1, Ly), (2, Rx), (3, Ry)],
            Some(0),
        )
    }

    pub fn default_layout() -> Self {
        use AnalogChannel::*;
        table(
            &[
                (0, "A"),
                (1, "B"),
                (2, "X"),
                (3, "Y"),
                (4, "LB"),
                (5, "RB"),
                (6, "MENU"),
                (7, "WIN"),
                (8, "LS"),
                (9, "RS"),
            ],
            &[(0, Lx), (1, Ly), (2, Rx), (3, Ry), (4, Lt), (5, Rt)],
            Some(0),
        )
    }

    /// Decodes one raw joystick report through this table.
    ///
    /// Every mapped button name is present in the result, pressed or not.
    /// Unmapped indices are ignored and missing channels read as rest.
    pub fn decode(&self, report: &JoystickReport) -> Snapshot {
        let mut snapshot = Snapshot::default();

        for name in self.buttons.values() {
            snapshot.set_button(name.as_str(), false);
        }
        for (index, pressed) in report.buttons.iter().enumerate() {
            if !pressed {
                continue;
            }
            if let Some(name) = self.buttons.get(&index) {
                snapshot.set_button(name.as_str(), true);
            }
        }

        self.decode_hats(report, &mut snapshot);

        for (index, raw) in report.axes.iter().enumerate() {
            let Some(channel) = self.axes.get(&index).copied() else {
                continue;
            };
            let mut value = *raw;
            if self.invert.contains(&channel) {
                value = -value;
            }
            if channel.is_trigger() && self.bidirectional_triggers {
                value = (value + 1.0) / 2.0;
            }
            snapshot.set_channel(channel, value);
        }

        snapshot
    }

    fn decode_hats(&self, report: &JoystickReport, snapshot: &mut Snapshot) {
        let hats: Vec<(i8, i8)> = match self.dpad_hat {
            Some(index) => report.hats.get(index).copied().into_iter().collect(),
            None => report.hats.clone(),
        };
        if hats.is_empty() {
            return;
        }

        let (mut up, mut down, mut left, mut right) = (false, false, false, false);
        for (x, y) in hats {
            up |= y > 0;
            down |= y < 0;
            left |= x < 0;
            right |= x > 0;
        }
        for (name, pressed) in DPAD_BUTTONS.iter().zip([up, down, left, right]) {
            snapshot.set_button(*name, pressed);
        }
    }
}

/// Built-in protocol families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFamily {
    Microsoft,
    Nintendo,
    Default,
}

impl ProtocolFamily {
    /// Best-effort guess from the device's reported name. `None` means the
    /// name matched no known family.
    pub fn detect(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.contains("microsoft") || name.contains("xbox") {
            Some(ProtocolFamily::Microsoft)
        } else if name.contains("nintendo") {
            Some(ProtocolFamily::Nintendo)
        } else {
            None
        }
    }

    pub fn table(self) -> MappingTable {
        match self {
            ProtocolFamily::Microsoft => MappingTable::microsoft(),
            ProtocolFamily::Nintendo => MappingTable::nintendo(),
            ProtocolFamily::Default => MappingTable::default_layout(),
        }
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFamily::Microsoft => write!(f, "MICROSOFT"),
            ProtocolFamily::Nintendo => write!(f, "NINTENDO"),
            ProtocolFamily::Default => write!(f, "DEFAULT"),
        }
    }
}

/// How the generic adapter picks a table for a device.
///
/// Family tables address raw driver indices, so they only apply to devices
/// with [`LayoutHint::Native`]. Standard-layout devices always use DEFAULT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilySelection {
    #[default]
    Auto,
    Microsoft,
    Nintendo,
    Default,
}

/// What `Auto` does with a native-layout device whose name matches nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownDevicePolicy {
    /// Use the DEFAULT table
    #[default]
    Fallback,
    /// Refuse to activate the device
    Reject,
}

/// Physical layout a device's indices follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutHint {
    /// Indices already normalized to the DEFAULT table order
    Standard,
    /// Raw driver indices
    Native,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonBinding {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBinding {
    pub index: usize,
    pub channel: AnalogChannel,
}

/// Config form of a [`MappingTable`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMapping {
    #[serde(default)]
    pub buttons: Vec<ButtonBinding>,
    #[serde(default)]
    pub axes: Vec<AxisBinding>,
    #[serde(default)]
    pub dpad_hat: Option<usize>,
    #[serde(default)]
    pub invert: Vec<AnalogChannel>,
    #[serde(default = "default_bidirectional_triggers")]
    pub bidirectional_triggers: bool,
}

fn default_bidirectional_triggers() -> bool {
    true
}

impl From<&CustomMapping> for MappingTable {
    fn from(custom: &CustomMapping) -> Self {
        MappingTable {
            buttons: custom
                .buttons
                .iter()
                .map(|binding| (binding.index, binding.name.clone()))
                .collect(),
            axes: custom
                .axes
                .iter()
                .map(|binding| (binding.index, binding.channel))
                .collect(),
            dpad_hat: custom.dpad_hat,
            invert: custom.invert.clone(),
            bidirectional_triggers: custom.bidirectional_triggers,
        }
    }
}

/// Resolves the mapping table for a device at activation time
#[derive(Debug, Clone, Default)]
pub struct MappingPolicy {
    pub family: FamilySelection,
    pub unknown_device: UnknownDevicePolicy,
    pub custom: Option<MappingTable>,
}

impl MappingPolicy {
    /// Returns `None` when the device must not be activated.
    pub fn resolve(&self, name: &str, layout: LayoutHint) -> Option<MappingTable> {
        if let Some(custom) = &self.custom {
            info!("Using custom mapping table for '{}'", name);
            return Some(custom.clone());
        }

        let family = match (self.family, layout) {
            (FamilySelection::Auto | FamilySelection::Default, LayoutHint::Standard) => {
                ProtocolFamily::Default
            }
            // family tables describe driver indices, a standard report has none
            (forced, LayoutHint::Standard) => {
                warn!(
                    "'{}' reports the standard layout, ignoring family {:?} and using DEFAULT",
                    name, forced
                );
                ProtocolFamily::Default
            }
            (FamilySelection::Microsoft, LayoutHint::Native) => ProtocolFamily::Microsoft,
            (FamilySelection::Nintendo, LayoutHint::Native) => ProtocolFamily::Nintendo,
            (FamilySelection::Default, LayoutHint::Native) => ProtocolFamily::Default,
            (FamilySelection::Auto, LayoutHint::Native) => match ProtocolFamily::detect(name) {
                Some(family) => {
                    info!("Detected protocol family {} from name '{}'", family, name);
                    family
                }
                None => match self.unknown_device {
                    UnknownDevicePolicy::Fallback => {
                        warn!(
                            "No protocol family matches '{}', falling back to DEFAULT",
                            name
                        );
                        ProtocolFamily::Default
                    }
                    UnknownDevicePolicy::Reject => {
                        warn!("No protocol family matches '{}', rejecting device", name);
                        return None;
                    }
                },
            },
        };

        info!("Using {} mapping table for '{}'", family, name);
        Some(family.table())
    }
}
