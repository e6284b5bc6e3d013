//! Virtual Chameleon Ultra
//!
//! Answers request frames the way the real firmware does: every reply echoes
//! the request's command class and id with a status word. State changes made
//! by provisioning commands are recorded so tests can inspect them.

use cu_protocol::catalog::{
    FIRMWARE_VERSION_CLASS, FIRMWARE_VERSION_ID, SERIAL_NUMBER_CLASS, SERIAL_NUMBER_ID,
    SERIAL_NUMBER_LEN, SERIAL_NUMBER_PREFIX,
};
use cu_protocol::codec::HEADER_LEN;
use cu_protocol::{to_hex, verify_checksum, FrameBuilder, FrameHeader};
use serde::{Deserialize, Serialize};
use tracing::debug;

const SETTINGS_CLASS: u8 = SERIAL_NUMBER_CLASS;
const ACTIVATE_ID: u8 = 0x1C;
const LOW_FREQ_ID: u8 = 0x19;
const HIGH_FREQ_ID: u8 = 0x18;
const LIGHT_ID: u8 = 0x1A;
const STATUS_READ_1: (u8, u8) = (0x03, 0xF5);
const STATUS_READ_2: (u8, u8) = (0x04, 0x0A);

/// Status word for a successful command
pub const STATUS_OK: u16 = 0x0000;
/// Status word for a rejected serial number frame
pub const STATUS_INVALID: u16 = 0x0001;

/// How the virtual device reacts to requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceBehavior {
    /// Answer every request
    #[default]
    Responsive,
    /// Accept the port but never answer
    Silent,
    /// Answer with a foreign sync word (some other serial device)
    Foreign,
}

/// Configuration for creating a virtual device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDeviceConfig {
    /// Status word returned for the firmware version query
    pub firmware_status: u16,
    /// Status word returned for both status-query frames
    pub query_status: u16,
    /// Firmware version reported as (major, minor)
    pub firmware_version: (u8, u8),
    /// Reaction to requests
    pub behavior: DeviceBehavior,
}

impl Default for VirtualDeviceConfig {
    fn default() -> Self {
        Self {
            firmware_status: 0x0068,
            query_status: STATUS_OK,
            firmware_version: (1, 0),
            behavior: DeviceBehavior::Responsive,
        }
    }
}

/// A simulated device with recorded provisioning state
#[derive(Debug, Clone, Default)]
pub struct VirtualDevice {
    config: VirtualDeviceConfig,
    activated: bool,
    serial_number: Option<String>,
    low_freq: Option<bool>,
    high_freq: Option<bool>,
    light: Option<bool>,
    status_reads: usize,
    received: Vec<Vec<u8>>,
}

impl VirtualDevice {
    /// Create a responsive device with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a device from configuration
    pub fn from_config(config: VirtualDeviceConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &VirtualDeviceConfig {
        &self.config
    }

    /// Whether the activation command was received
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Serial number programmed by the last valid serial number frame
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    /// Low-frequency cycling state, `None` if never set
    pub fn low_freq(&self) -> Option<bool> {
        self.low_freq
    }

    /// High-frequency cycling state, `None` if never set
    pub fn high_freq(&self) -> Option<bool> {
        self.high_freq
    }

    /// Light cycling state, `None` if never set
    pub fn light(&self) -> Option<bool> {
        self.light
    }

    /// Number of status-query frames answered
    pub fn status_reads(&self) -> usize {
        self.status_reads
    }

    /// Every frame received, in order
    pub fn received(&self) -> &[Vec<u8>] {
        &self.received
    }

    /// Process one request frame and return the reply, if any
    pub fn process_frame(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        self.received.push(frame.to_vec());
        debug!("Virtual device received {}", to_hex(frame));

        match self.config.behavior {
            DeviceBehavior::Silent => return None,
            DeviceBehavior::Foreign => return Some(vec![0x55, 0xAA, 0x00, 0x00, 0x00, 0x00]),
            DeviceBehavior::Responsive => {}
        }

        let header = match FrameHeader::parse(frame) {
            Ok(header) => header,
            Err(e) => {
                debug!("Virtual device ignoring malformed frame: {}", e);
                return None;
            }
        };

        let reply = match (header.class, header.id) {
            (FIRMWARE_VERSION_CLASS, FIRMWARE_VERSION_ID) => {
                let (major, minor) = self.config.firmware_version;
                FrameBuilder::new(header.class, header.id)
                    .status(self.config.firmware_status)
                    .payload(&[major, minor])
                    .build()
            }
            (SERIAL_NUMBER_CLASS, SERIAL_NUMBER_ID) => {
                let status = self.program_serial_number(frame);
                FrameBuilder::new(header.class, header.id).status(status).build()
            }
            (SETTINGS_CLASS, ACTIVATE_ID) => {
                self.activated = true;
                ack(&header)
            }
            (SETTINGS_CLASS, LOW_FREQ_ID) => {
                self.low_freq = Some(toggle_value(frame));
                ack(&header)
            }
            (SETTINGS_CLASS, HIGH_FREQ_ID) => {
                self.high_freq = Some(toggle_value(frame));
                ack(&header)
            }
            (SETTINGS_CLASS, LIGHT_ID) => {
                self.light = Some(toggle_value(frame));
                ack(&header)
            }
            STATUS_READ_1 | STATUS_READ_2 => {
                self.status_reads += 1;
                FrameBuilder::new(header.class, header.id)
                    .status(self.config.query_status)
                    .build()
            }
            _ => ack(&header),
        };

        Some(reply.into_bytes())
    }

    fn program_serial_number(&mut self, frame: &[u8]) -> u16 {
        if frame.len() < HEADER_LEN + 2 || verify_checksum(frame).is_err() {
            return STATUS_INVALID;
        }
        let payload = &frame[HEADER_LEN..frame.len() - 2];
        match payload.split_first() {
            Some((&SERIAL_NUMBER_PREFIX, serial)) if serial.len() == SERIAL_NUMBER_LEN => {
                self.serial_number = Some(String::from_utf8_lossy(serial).into_owned());
                STATUS_OK
            }
            _ => STATUS_INVALID,
        }
    }
}

fn ack(header: &FrameHeader) -> cu_protocol::Frame {
    FrameBuilder::new(header.class, header.id).status(STATUS_OK).build()
}

/// Toggle frames carry the on/off flag just before their final byte
fn toggle_value(frame: &[u8]) -> bool {
    frame.len() >= 2 && frame[frame.len() - 2] != 0
}
