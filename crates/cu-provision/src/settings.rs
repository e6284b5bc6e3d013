//! Provisioning settings

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseToggleError;

/// A setting that can be switched on, switched off, or left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    On,
    Off,
    /// Do not send the command at all
    #[default]
    Unset,
}

impl Toggle {
    /// Whether a command will be sent for this setting
    pub fn is_set(self) -> bool {
        self != Toggle::Unset
    }

    /// The on/off value, `None` when unset
    pub fn value(self) -> Option<bool> {
        match self {
            Toggle::On => Some(true),
            Toggle::Off => Some(false),
            Toggle::Unset => None,
        }
    }
}

impl From<Option<bool>> for Toggle {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Toggle::On,
            Some(false) => Toggle::Off,
            None => Toggle::Unset,
        }
    }
}

impl FromStr for Toggle {
    type Err = ParseToggleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "enable" | "true" => Ok(Toggle::On),
            "off" | "disable" | "false" => Ok(Toggle::Off),
            "unset" | "none" | "-" => Ok(Toggle::Unset),
            _ => Err(ParseToggleError(s.to_string())),
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Toggle::On => "on",
            Toggle::Off => "off",
            Toggle::Unset => "unset",
        })
    }
}

/// What a provisioning run does to each device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Send the activation frame and a fresh serial number
    pub activate_firmware: bool,
    /// Low-frequency (ID) card cycling
    pub low_freq: Toggle,
    /// High-frequency (IC) card cycling
    pub high_freq: Toggle,
    /// Button light cycling
    pub light: Toggle,
}

impl fmt::Display for ProvisioningSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "firmware={} low={} high={} light={}",
            if self.activate_firmware { "on" } else { "off" },
            self.low_freq,
            self.high_freq,
            self.light
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_parse() {
        assert_eq!("on".parse::<Toggle>(), Ok(Toggle::On));
        assert_eq!(" OFF ".parse::<Toggle>(), Ok(Toggle::Off));
        assert_eq!("unset".parse::<Toggle>(), Ok(Toggle::Unset));
        assert!("maybe".parse::<Toggle>().is_err());
    }

    #[test]
    fn test_toggle_value() {
        assert_eq!(Toggle::On.value(), Some(true));
        assert_eq!(Toggle::Off.value(), Some(false));
        assert_eq!(Toggle::Unset.value(), None);
        assert!(!Toggle::Unset.is_set());
        assert_eq!(Toggle::from(Some(false)), Toggle::Off);
    }

    #[test]
    fn test_default_settings_send_nothing_optional() {
        let settings = ProvisioningSettings::default();
        assert!(!settings.activate_firmware);
        assert!(!settings.low_freq.is_set());
        assert!(!settings.high_freq.is_set());
        assert!(!settings.light.is_set());
    }

    #[test]
    fn test_settings_serde() {
        let settings = ProvisioningSettings {
            activate_firmware: true,
            low_freq: Toggle::On,
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"low_freq\":\"on\""));
        let back: ProvisioningSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}
