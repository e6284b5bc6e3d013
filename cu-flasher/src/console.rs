//! Operator console: line commands, device roster and event rendering

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use cu_detect::FlasherEvent;
use cu_provision::{ProvisioningSettings, Toggle};
use thiserror::Error;

/// Errors from operator input
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("unknown command: {0} (type 'help')")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0} is not a detected device")]
    UnknownDevice(String),

    #[error("a provisioning run is in progress")]
    Busy,

    #[error(transparent)]
    Toggle(#[from] cu_provision::ParseToggleError),
}

/// Which setting a `set` command changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingName {
    Firmware,
    LowFrequency,
    HighFrequency,
    Light,
}

/// A parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Select(String),
    Deselect(String),
    SelectAll,
    Set(SettingName, Toggle),
    Settings,
    Debug(bool),
    Start,
    Quit,
}

pub const HELP: &str = "\
commands:
  list                              show detected devices
  select <port> | select all        mark a device for provisioning
  deselect <port>                   unmark a device
  set firmware on|off               activate firmware and assign a serial number
  set low|high|light on|off|unset   card and light cycling modes
  settings                          show current settings
  debug on|off                      show frame-level debug lines
  start                             provision the selected devices
  quit";

impl FromStr for Command {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ConsoleError::UnknownCommand(String::new()));
        };
        let args: Vec<&str> = words.collect();

        match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("help" | "?", _) => Ok(Command::Help),
            ("list" | "ls", _) => Ok(Command::List),
            ("select", ["all"]) => Ok(Command::SelectAll),
            ("select", [port]) => Ok(Command::Select(port.to_string())),
            ("select", _) => Err(ConsoleError::Usage("select <port> | select all")),
            ("deselect", [port]) => Ok(Command::Deselect(port.to_string())),
            ("deselect", _) => Err(ConsoleError::Usage("deselect <port>")),
            ("set", [name, value]) => parse_set(name, value),
            ("set", _) => Err(ConsoleError::Usage("set <firmware|low|high|light> <on|off|unset>")),
            ("settings", _) => Ok(Command::Settings),
            ("debug", ["on"]) => Ok(Command::Debug(true)),
            ("debug", ["off"]) => Ok(Command::Debug(false)),
            ("debug", _) => Err(ConsoleError::Usage("debug on|off")),
            ("start", _) => Ok(Command::Start),
            ("quit" | "exit", _) => Ok(Command::Quit),
            _ => Err(ConsoleError::UnknownCommand(verb.to_string())),
        }
    }
}

fn parse_set(name: &str, value: &str) -> Result<Command, ConsoleError> {
    let setting = match name.to_ascii_lowercase().as_str() {
        "firmware" => SettingName::Firmware,
        "low" => SettingName::LowFrequency,
        "high" => SettingName::HighFrequency,
        "light" => SettingName::Light,
        _ => return Err(ConsoleError::Usage("set <firmware|low|high|light> <on|off|unset>")),
    };
    let toggle: Toggle = value.parse()?;
    if setting == SettingName::Firmware && toggle == Toggle::Unset {
        return Err(ConsoleError::Usage("set firmware on|off"));
    }
    Ok(Command::Set(setting, toggle))
}

/// Apply a `set` command to the settings
pub fn apply_setting(settings: &mut ProvisioningSettings, name: SettingName, value: Toggle) {
    match name {
        SettingName::Firmware => settings.activate_firmware = value == Toggle::On,
        SettingName::LowFrequency => settings.low_freq = value,
        SettingName::HighFrequency => settings.high_freq = value,
        SettingName::Light => settings.light = value,
    }
}

/// Detected devices and the operator's selection
///
/// Selection flags survive list refreshes: a device that drops out of a
/// detection cycle comes back with the selection it had.
#[derive(Debug, Default)]
pub struct DeviceRoster {
    devices: BTreeMap<String, bool>,
    previous: HashMap<String, bool>,
    locked: bool,
}

impl DeviceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a discovery event; other events are ignored
    pub fn apply(&mut self, event: &FlasherEvent) {
        match event {
            FlasherEvent::DeviceFound {
                port,
                is_target: true,
            } => {
                if !self.devices.contains_key(port) {
                    let selected = self.previous.get(port).copied().unwrap_or(false);
                    self.devices.insert(port.clone(), selected);
                }
            }
            FlasherEvent::DeviceListFinalized(ports) => {
                self.previous
                    .extend(self.devices.iter().map(|(p, s)| (p.clone(), *s)));
                self.devices = ports
                    .iter()
                    .map(|p| (p.clone(), self.previous.get(p).copied().unwrap_or(false)))
                    .collect();
            }
            _ => {}
        }
    }

    /// Freeze the selection while a run is active
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub fn select(&mut self, port: &str, selected: bool) -> Result<(), ConsoleError> {
        if self.locked {
            return Err(ConsoleError::Busy);
        }
        match self.devices.get_mut(port) {
            Some(flag) => {
                *flag = selected;
                Ok(())
            }
            None => Err(ConsoleError::UnknownDevice(port.to_string())),
        }
    }

    pub fn select_all(&mut self) -> Result<(), ConsoleError> {
        if self.locked {
            return Err(ConsoleError::Busy);
        }
        self.devices.values_mut().for_each(|s| *s = true);
        Ok(())
    }

    /// Selected devices in list order
    pub fn selected(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|(_, selected)| **selected)
            .map(|(port, _)| port.clone())
            .collect()
    }

    /// (port, selected) pairs in list order
    pub fn entries(&self) -> impl Iterator<Item = (&str, bool)> {
        self.devices.iter().map(|(p, s)| (p.as_str(), *s))
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Text shown to the operator for an event, if any
pub fn render_event(event: &FlasherEvent, show_debug: bool) -> Option<String> {
    match event {
        FlasherEvent::ProgressPercent(p) => Some(format!("[{:>3}%]", p)),
        FlasherEvent::CurrentTaskLabel(label) => Some(format!("== {}", label)),
        FlasherEvent::ResultLine(line) => Some(line.clone()),
        FlasherEvent::ErrorsAggregated(errors) => Some(format!(
            "The following errors occurred:\n  {}",
            errors.join("\n  ")
        )),
        FlasherEvent::RunFinished => Some("Provisioning finished".to_string()),
        FlasherEvent::DeviceFound { port, is_target } if show_debug => Some(format!(
            "[DEBUG] {} {}",
            port,
            if *is_target { "is a Chameleon Ultra" } else { "is not a target device" }
        )),
        FlasherEvent::DebugLine(line) if show_debug => Some(format!("[DEBUG] {}", line)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(port: &str) -> FlasherEvent {
        FlasherEvent::DeviceFound {
            port: port.to_string(),
            is_target: true,
        }
    }

    fn finalized(ports: &[&str]) -> FlasherEvent {
        FlasherEvent::DeviceListFinalized(ports.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("list".parse(), Ok(Command::List));
        assert_eq!(
            "select /dev/ttyACM0".parse(),
            Ok(Command::Select("/dev/ttyACM0".to_string()))
        );
        assert_eq!("select all".parse(), Ok(Command::SelectAll));
        assert_eq!(
            "set low off".parse(),
            Ok(Command::Set(SettingName::LowFrequency, Toggle::Off))
        );
        assert_eq!(
            "SET firmware on".parse(),
            Ok(Command::Set(SettingName::Firmware, Toggle::On))
        );
        assert_eq!("debug on".parse(), Ok(Command::Debug(true)));
        assert_eq!("quit".parse(), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("flash".parse::<Command>(), Err(ConsoleError::UnknownCommand(_))));
        assert!(matches!("select".parse::<Command>(), Err(ConsoleError::Usage(_))));
        assert!(matches!("set light maybe".parse::<Command>(), Err(ConsoleError::Toggle(_))));
        assert!(matches!("set firmware unset".parse::<Command>(), Err(ConsoleError::Usage(_))));
    }

    #[test]
    fn test_apply_setting() {
        let mut settings = ProvisioningSettings::default();
        apply_setting(&mut settings, SettingName::Firmware, Toggle::On);
        apply_setting(&mut settings, SettingName::Light, Toggle::Off);
        assert!(settings.activate_firmware);
        assert_eq!(settings.light, Toggle::Off);

        apply_setting(&mut settings, SettingName::Firmware, Toggle::Off);
        assert!(!settings.activate_firmware);
    }

    #[test]
    fn test_roster_preserves_selection_across_refresh() {
        let mut roster = DeviceRoster::new();
        roster.apply(&found("/dev/ttyACM0"));
        roster.apply(&found("/dev/ttyACM1"));
        roster.apply(&finalized(&["/dev/ttyACM0", "/dev/ttyACM1"]));
        roster.select("/dev/ttyACM1", true).unwrap();

        // ACM1 drops out for a cycle, then comes back
        roster.apply(&finalized(&["/dev/ttyACM0"]));
        assert!(roster.selected().is_empty());
        roster.apply(&found("/dev/ttyACM1"));
        assert_eq!(roster.selected(), vec!["/dev/ttyACM1"]);

        roster.apply(&finalized(&["/dev/ttyACM0", "/dev/ttyACM1"]));
        assert_eq!(roster.selected(), vec!["/dev/ttyACM1"]);
    }

    #[test]
    fn test_roster_ignores_non_targets() {
        let mut roster = DeviceRoster::new();
        roster.apply(&FlasherEvent::DeviceFound {
            port: "/dev/ttyS0".to_string(),
            is_target: false,
        });
        assert!(roster.is_empty());
        assert_eq!(
            roster.select("/dev/ttyS0", true),
            Err(ConsoleError::UnknownDevice("/dev/ttyS0".to_string()))
        );
    }

    #[test]
    fn test_roster_locked_during_run() {
        let mut roster = DeviceRoster::new();
        roster.apply(&finalized(&["/dev/ttyACM0"]));
        roster.set_locked(true);
        assert_eq!(roster.select("/dev/ttyACM0", true), Err(ConsoleError::Busy));
        assert_eq!(roster.select_all(), Err(ConsoleError::Busy));

        roster.set_locked(false);
        roster.select_all().unwrap();
        assert_eq!(roster.selected(), vec!["/dev/ttyACM0"]);
    }

    #[test]
    fn test_render_event() {
        assert_eq!(
            render_event(&FlasherEvent::ProgressPercent(5), false),
            Some("[  5%]".to_string())
        );
        assert_eq!(render_event(&FlasherEvent::DebugLine("x".to_string()), false), None);
        assert_eq!(
            render_event(&FlasherEvent::DebugLine("x".to_string()), true),
            Some("[DEBUG] x".to_string())
        );
        assert_eq!(render_event(&finalized(&["/dev/ttyACM0"]), true), None);

        let errors = render_event(
            &FlasherEvent::ErrorsAggregated(vec!["a".to_string(), "b".to_string()]),
            false,
        )
        .unwrap();
        assert!(errors.ends_with("a\n  b"));
    }
}
