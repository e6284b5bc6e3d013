//! Serial number assignments
//!
//! Every device in a run gets a freshly generated serial number. Numbers are
//! drawn independently, so a duplicate within one run is possible in theory;
//! a duplicate is simply drawn again.

use std::collections::HashSet;

use cu_protocol::catalog::serial_number_command_with_rng;
use cu_protocol::Frame;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The serial number a run will program into one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialNumberAssignment {
    /// Port of the device
    pub port: String,
    /// 14 alphanumeric characters
    pub serial_number: String,
    /// Frame that programs `serial_number`
    #[serde(skip)]
    pub frame: Vec<u8>,
}

impl SerialNumberAssignment {
    pub fn new(port: impl Into<String>, serial_number: String, frame: Frame) -> Self {
        Self {
            port: port.into(),
            serial_number,
            frame: frame.into_bytes(),
        }
    }
}

/// Generate one assignment per port
pub fn assign_serial_numbers(ports: &[String]) -> Vec<SerialNumberAssignment> {
    assign_serial_numbers_with_rng(ports, &mut rand::thread_rng())
}

/// Generate one assignment per port from the given RNG, unique within the call
pub fn assign_serial_numbers_with_rng<R: Rng + ?Sized>(
    ports: &[String],
    rng: &mut R,
) -> Vec<SerialNumberAssignment> {
    let mut seen = HashSet::with_capacity(ports.len());

    ports
        .iter()
        .map(|port| loop {
            let command = serial_number_command_with_rng(&mut *rng);
            if seen.insert(command.serial_number.clone()) {
                debug!("{} assigned serial number {}", port, command.serial_number);
                break SerialNumberAssignment::new(port.as_str(), command.serial_number, command.frame);
            }
            warn!("Duplicate serial number {} drawn, regenerating", command.serial_number);
        })
        .collect()
}
