//! Per-device task plans
//!
//! A plan is the ordered list of frames a run sends to one device. Its length
//! depends only on the settings, which is what makes the run's total step
//! count known before the first device is touched.

use cu_protocol::DeviceCommand;
use serde::{Deserialize, Serialize};

use crate::settings::ProvisioningSettings;

/// One frame exchange with a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStep {
    /// Fixed activation frame
    Activate,
    /// The device's generated serial number frame
    SerialNumber,
    /// Low-frequency cycling on/off
    LowFrequency { on: bool },
    /// High-frequency cycling on/off
    HighFrequency { on: bool },
    /// Light cycling on/off
    Light { on: bool },
    /// One frame of the status query sequence
    StatusRead { index: usize },
}

/// Group of steps announced with one label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Activation,
    LowFrequency,
    HighFrequency,
    Light,
    Status,
}

impl Phase {
    /// Operator-facing label for this phase on `port`
    pub fn label(&self, port: &str) -> String {
        match self {
            Phase::Activation => format!("Current step: activating {}", port),
            Phase::LowFrequency => format!("Current step: setting low-frequency cycling on {}", port),
            Phase::HighFrequency => format!("Current step: setting high-frequency cycling on {}", port),
            Phase::Light => format!("Current step: setting light cycling on {}", port),
            Phase::Status => format!("Current step: reading status of {}", port),
        }
    }
}

impl TaskStep {
    pub fn phase(&self) -> Phase {
        match self {
            TaskStep::Activate | TaskStep::SerialNumber => Phase::Activation,
            TaskStep::LowFrequency { .. } => Phase::LowFrequency,
            TaskStep::HighFrequency { .. } => Phase::HighFrequency,
            TaskStep::Light { .. } => Phase::Light,
            TaskStep::StatusRead { .. } => Phase::Status,
        }
    }

    /// Fixed frame for this step, `None` for the serial number step
    pub fn fixed_frame(&self) -> Option<&'static [u8]> {
        let command = match *self {
            TaskStep::SerialNumber => return None,
            TaskStep::StatusRead { index } => return DeviceCommand::Status.frames().iter().nth(index),
            TaskStep::Activate => DeviceCommand::Activate,
            TaskStep::LowFrequency { on } => DeviceCommand::LowFrequency { on },
            TaskStep::HighFrequency { on } => DeviceCommand::HighFrequency { on },
            TaskStep::Light { on } => DeviceCommand::Light { on },
        };
        command.frames().iter().next()
    }

    /// Whether this step reads status rather than changing the device
    pub fn is_status_read(&self) -> bool {
        matches!(self, TaskStep::StatusRead { .. })
    }

    /// Short description used in result lines
    pub fn describe(&self) -> String {
        let on_off = |on: bool| if on { "on" } else { "off" };
        match self {
            TaskStep::Activate => "activation".to_string(),
            TaskStep::SerialNumber => "serial number".to_string(),
            TaskStep::LowFrequency { on } => format!("low-frequency cycling {}", on_off(*on)),
            TaskStep::HighFrequency { on } => format!("high-frequency cycling {}", on_off(*on)),
            TaskStep::Light { on } => format!("light cycling {}", on_off(*on)),
            TaskStep::StatusRead { index } => format!("status read {}", index + 1),
        }
    }
}

/// Ordered steps for one device
pub fn plan_steps(settings: &ProvisioningSettings) -> Vec<TaskStep> {
    let mut steps = Vec::with_capacity(task_count(settings));

    if settings.activate_firmware {
        steps.push(TaskStep::Activate);
        steps.push(TaskStep::SerialNumber);
    }
    if let Some(on) = settings.low_freq.value() {
        steps.push(TaskStep::LowFrequency { on });
    }
    if let Some(on) = settings.high_freq.value() {
        steps.push(TaskStep::HighFrequency { on });
    }
    if let Some(on) = settings.light.value() {
        steps.push(TaskStep::Light { on });
    }
    for index in 0..DeviceCommand::Status.frames().len() {
        steps.push(TaskStep::StatusRead { index });
    }

    steps
}

/// Number of steps per device
pub fn task_count(settings: &ProvisioningSettings) -> usize {
    2 * usize::from(settings.activate_firmware)
        + usize::from(settings.low_freq.is_set())
        + usize::from(settings.high_freq.is_set())
        + usize::from(settings.light.is_set())
        + DeviceCommand::Status.frames().len()
}

/// Number of steps for a whole run
pub fn total_steps(devices: usize, settings: &ProvisioningSettings) -> usize {
    devices * task_count(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Toggle;

    #[test]
    fn test_minimal_plan_is_status_only() {
        let steps = plan_steps(&ProvisioningSettings::default());
        assert_eq!(
            steps,
            vec![TaskStep::StatusRead { index: 0 }, TaskStep::StatusRead { index: 1 }]
        );
        assert_eq!(task_count(&ProvisioningSettings::default()), 2);
    }

    #[test]
    fn test_full_plan_order() {
        let settings = ProvisioningSettings {
            activate_firmware: true,
            low_freq: Toggle::On,
            high_freq: Toggle::Off,
            light: Toggle::On,
        };
        let phases: Vec<_> = plan_steps(&settings).iter().map(TaskStep::phase).collect();
        assert_eq!(
            phases,
            vec![
                Phase::Activation,
                Phase::Activation,
                Phase::LowFrequency,
                Phase::HighFrequency,
                Phase::Light,
                Phase::Status,
                Phase::Status,
            ]
        );
        assert_eq!(task_count(&settings), 7);
    }

    #[test]
    fn test_fixed_frames() {
        assert_eq!(TaskStep::SerialNumber.fixed_frame(), None);
        assert_eq!(
            TaskStep::StatusRead { index: 1 }.fixed_frame().map(|f| (f[2], f[3])),
            Some((0x04, 0x0A))
        );
        assert_eq!(TaskStep::StatusRead { index: 2 }.fixed_frame(), None);
        assert_eq!(
            TaskStep::Light { on: true }.fixed_frame().map(|f| f[3]),
            Some(0x1A)
        );
    }

    #[test]
    fn test_scenario_total() {
        let settings = ProvisioningSettings {
            activate_firmware: true,
            low_freq: Toggle::On,
            ..Default::default()
        };
        assert_eq!(total_steps(2, &settings), 10);
    }
}
