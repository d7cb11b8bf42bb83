//! Mapping file loading.
//!
//! The file is read once at startup and never written back.

use crate::controller::generic::{
    CustomMapping, FamilySelection, MappingPolicy, MappingTable, ProtocolFamily,
    UnknownDevicePolicy,
};
use crate::controller::activation::DEFAULT_ACTIVATION_DEADZONE;
use crate::engine::EngineSettings;
use crate::mapping::action::ActionConfig;
use crate::mapping::profile::BuiltinProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CONFIG_DIR: &str = "padmapper";
pub const CONFIG_FILE: &str = "mapping.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSettings,
    pub device: DeviceConfig,
    /// Used when `actions` is empty
    pub profile: BuiltinProfile,
    pub actions: Vec<ActionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DeviceConfig {
    Gilrs(GenericDeviceConfig),
    #[serde(alias = "hidraw")]
    Hid(HidConfig),
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig::Gilrs(GenericDeviceConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenericDeviceConfig {
    pub family: FamilySelection,
    pub unknown_device: UnknownDevicePolicy,
    pub activation_deadzone: f64,
    pub custom_mapping: Option<CustomMapping>,
}

impl Default for GenericDeviceConfig {
    fn default() -> Self {
        Self {
            family: FamilySelection::Auto,
            unknown_device: UnknownDevicePolicy::Fallback,
            activation_deadzone: DEFAULT_ACTIVATION_DEADZONE,
            custom_mapping: None,
        }
    }
}

impl GenericDeviceConfig {
    pub fn policy(&self) -> MappingPolicy {
        MappingPolicy {
            family: self.family,
            unknown_device: self.unknown_device,
            custom: self.custom_mapping.as_ref().map(MappingTable::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HidConfig {
    /// Platform device path; opened by vendor/product when absent
    pub path: Option<String>,
    pub vendor_id: u16,
    pub product_id: u16,
    pub read_timeout_ms: u64,
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            path: None,
            vendor_id: 0x045E,
            product_id: 0x0B12,
            read_timeout_ms: 1,
        }
    }
}

impl AppConfig {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading mapping config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Loads `explicit` if given, else the file in the user config dir, else
    /// the built-in defaults. An explicit path that does not exist is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match default_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                warn!(
                    "No config at {}, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Protocol family the configured device is expected to speak.
    ///
    /// The fixed HID protocol is the MICROSOFT pad. Generic joysticks use the
    /// forced family, or DEFAULT when it is left on auto.
    pub fn device_family(&self) -> ProtocolFamily {
        match &self.device {
            DeviceConfig::Hid(_) => ProtocolFamily::Microsoft,
            DeviceConfig::Gilrs(generic) => match generic.family {
                FamilySelection::Microsoft => ProtocolFamily::Microsoft,
                FamilySelection::Nintendo => ProtocolFamily::Nintendo,
                FamilySelection::Default | FamilySelection::Auto => ProtocolFamily::Default,
            },
        }
    }

    /// The built-in profile in use, with `auto` resolved.
    pub fn resolved_profile(&self) -> BuiltinProfile {
        match self.profile {
            BuiltinProfile::Auto => BuiltinProfile::for_family(self.device_family()),
            profile => profile,
        }
    }

    /// The configured actions, or the selected built-in profile.
    pub fn effective_actions(&self) -> Vec<ActionConfig> {
        if !self.actions.is_empty() {
            return self.actions.clone();
        }
        let profile = self.resolved_profile();
        if self.profile == BuiltinProfile::Auto {
            info!(
                "No actions configured, auto-selected {:?} profile for {} devices",
                profile,
                self.device_family()
            );
        } else {
            debug!("No actions configured, using {:?} profile", profile);
        }
        profile.actions()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.engine.idle_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.idle_backoff_ms must be > 0".to_string(),
            ));
        }

        match &self.device {
            DeviceConfig::Gilrs(generic) => {
                let deadzone = generic.activation_deadzone;
                if !deadzone.is_finite() || !(0.0..1.0).contains(&deadzone) {
                    return Err(ConfigError::Invalid(format!(
                        "device.activation_deadzone must be in [0, 1), got {}",
                        deadzone
                    )));
                }
                if let Some(custom) = &generic.custom_mapping {
                    if let Some(binding) = custom.buttons.iter().find(|b| b.name.trim().is_empty())
                    {
                        return Err(ConfigError::Invalid(format!(
                            "custom_mapping button {} has an empty name",
                            binding.index
                        )));
                    }
                }
            }
            DeviceConfig::Hid(_) => {}
        }

        for (index, action) in self.actions.iter().enumerate() {
            action.validate().map_err(|reason| {
                ConfigError::Invalid(format!("actions[{}] ({}): {}", index, action.kind(), reason))
            })?;
        }

        Ok(())
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    })
}
