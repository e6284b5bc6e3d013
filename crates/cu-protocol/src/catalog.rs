//! Device command catalog
//!
//! Fixed commands are the device's reference frames and are sent verbatim.
//! The serial-number command is generated per device and per run.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::codec::{Frame, FrameBuilder};
use crate::error::ProtocolError;

/// Firmware version query: command class
pub const FIRMWARE_VERSION_CLASS: u8 = 0x03;
/// Firmware version query: command id
pub const FIRMWARE_VERSION_ID: u8 = 0xFB;
/// Status values a genuine device answers the firmware version query with
pub const FIRMWARE_VERSION_ACCEPTED: [u16; 2] = [0x0068, 0x0000];

/// Status values treated as success for status-query replies
pub const STATUS_ACCEPTED: [u16; 2] = [0x0000, 0x0068];

/// Serial number command: command class
pub const SERIAL_NUMBER_CLASS: u8 = 0x04;
/// Serial number command: command id
pub const SERIAL_NUMBER_ID: u8 = 0x1B;
/// Payload prefix byte preceding the ASCII serial number
pub const SERIAL_NUMBER_PREFIX: u8 = 0xD2;
/// Number of characters in a generated serial number
pub const SERIAL_NUMBER_LEN: usize = 14;

const ACTIVATE: &[u8] = &[0x11, 0xEF, 0x04, 0x1C, 0x00, 0x00, 0x00, 0x00, 0xE0, 0x00];

const LOW_FREQ_ON: &[u8] = &[0x11, 0xEF, 0x04, 0x19, 0x00, 0x00, 0x00, 0x01, 0xE2, 0x01, 0xFF];
const LOW_FREQ_OFF: &[u8] = &[0x11, 0xEF, 0x04, 0x19, 0x00, 0x00, 0x00, 0x01, 0xE2, 0x00, 0x00];

const HIGH_FREQ_ON: &[u8] = &[0x11, 0xEF, 0x04, 0x18, 0x00, 0x00, 0x00, 0x01, 0xE3, 0x01, 0xFF];
const HIGH_FREQ_OFF: &[u8] = &[0x11, 0xEF, 0x04, 0x18, 0x00, 0x00, 0x00, 0x01, 0xE3, 0x00, 0x00];

const LIGHT_ON: &[u8] = &[0x11, 0xEF, 0x04, 0x1A, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x01, 0xFF];
const LIGHT_OFF: &[u8] = &[0x11, 0xEF, 0x04, 0x1A, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00, 0x00];

const STATUS_QUERY: &[&[u8]] = &[
    &[0x11, 0xEF, 0x03, 0xF5, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00],
    &[0x11, 0xEF, 0x04, 0x0A, 0x00, 0x00, 0x00, 0x00, 0xF2, 0x00],
];

const FIRMWARE_VERSION: &[u8] = &[0x11, 0xEF, 0x03, 0xFB, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00];

/// Fixed device commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceCommand {
    /// Firmware activation
    Activate,
    /// Low-frequency (ID) card cycling on/off
    LowFrequency { on: bool },
    /// High-frequency (IC) card cycling on/off
    HighFrequency { on: bool },
    /// Button light cycling on/off
    Light { on: bool },
    /// Firmware version query, used to identify devices
    FirmwareVersion,
    /// Two-frame status read
    Status,
}

/// The frames making up one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFrames {
    /// A single frame
    Single(&'static [u8]),
    /// Several frames, sent in order
    Sequence(&'static [&'static [u8]]),
}

impl CommandFrames {
    /// Iterate the frames in transmission order
    pub fn iter(&self) -> impl Iterator<Item = &'static [u8]> {
        let frames = match *self {
            CommandFrames::Single(frame) => vec![frame],
            CommandFrames::Sequence(frames) => frames.to_vec(),
        };
        frames.into_iter()
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        match self {
            CommandFrames::Single(_) => 1,
            CommandFrames::Sequence(frames) => frames.len(),
        }
    }

    /// Whether the command has no frames
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeviceCommand {
    /// Frames for this command
    pub fn frames(&self) -> CommandFrames {
        match self {
            DeviceCommand::Activate => CommandFrames::Single(ACTIVATE),
            DeviceCommand::LowFrequency { on: true } => CommandFrames::Single(LOW_FREQ_ON),
            DeviceCommand::LowFrequency { on: false } => CommandFrames::Single(LOW_FREQ_OFF),
            DeviceCommand::HighFrequency { on: true } => CommandFrames::Single(HIGH_FREQ_ON),
            DeviceCommand::HighFrequency { on: false } => CommandFrames::Single(HIGH_FREQ_OFF),
            DeviceCommand::Light { on: true } => CommandFrames::Single(LIGHT_ON),
            DeviceCommand::Light { on: false } => CommandFrames::Single(LIGHT_OFF),
            DeviceCommand::FirmwareVersion => CommandFrames::Single(FIRMWARE_VERSION),
            DeviceCommand::Status => CommandFrames::Sequence(STATUS_QUERY),
        }
    }

    /// Human-readable command name
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::Activate => "activation",
            DeviceCommand::LowFrequency { .. } => "low-frequency cycling",
            DeviceCommand::HighFrequency { .. } => "high-frequency cycling",
            DeviceCommand::Light { .. } => "light cycling",
            DeviceCommand::FirmwareVersion => "firmware version",
            DeviceCommand::Status => "status query",
        }
    }
}

/// Firmware version query frame, used by probes
pub fn firmware_version_query() -> &'static [u8] {
    FIRMWARE_VERSION
}

/// A generated serial number and the frame that programs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialNumberCommand {
    /// The 14-character serial number
    pub serial_number: String,
    /// Complete frame including checksum
    pub frame: Frame,
}

/// Generate a random serial number and its command frame
pub fn build_serial_number_command() -> SerialNumberCommand {
    serial_number_command_with_rng(&mut rand::thread_rng())
}

/// Generate a serial number from the given RNG
pub fn serial_number_command_with_rng<R: Rng + ?Sized>(rng: &mut R) -> SerialNumberCommand {
    let serial_number: String = rng
        .sample_iter(&Alphanumeric)
        .take(SERIAL_NUMBER_LEN)
        .map(char::from)
        .collect();
    debug!("Generated serial number {}", serial_number);

    SerialNumberCommand {
        frame: serial_frame(&serial_number),
        serial_number,
    }
}

/// Build the command frame for a specific serial number
pub fn serial_number_command_for(serial_number: &str) -> Result<SerialNumberCommand, ProtocolError> {
    if !is_valid_serial_number(serial_number) {
        return Err(ProtocolError::InvalidSerialNumber(serial_number.to_string()));
    }
    Ok(SerialNumberCommand {
        frame: serial_frame(serial_number),
        serial_number: serial_number.to_string(),
    })
}

/// Whether `s` is 14 ASCII alphanumeric characters
pub fn is_valid_serial_number(s: &str) -> bool {
    s.len() == SERIAL_NUMBER_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn serial_frame(serial_number: &str) -> Frame {
    FrameBuilder::new(SERIAL_NUMBER_CLASS, SERIAL_NUMBER_ID)
        .payload(&[SERIAL_NUMBER_PREFIX])
        .payload(serial_number.as_bytes())
        .build()
}
