//! Error types for frame encoding and response validation

use thiserror::Error;

/// Errors raised while validating frames exchanged with a device
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Response shorter than the fixed header prefix
    #[error("response too short: {len} bytes (need at least {needed})")]
    TooShort { len: usize, needed: usize },

    /// Response does not start with the 0x11 0xEF sync bytes
    #[error("invalid sync: {0:02X?}")]
    BadSync([u8; 2]),

    /// Response echoes a different command than the one sent
    #[error("invalid command echo: expected {expected_class:02X}/{expected_id:02X}, got {class:02X}/{id:02X}")]
    BadCommandEcho {
        expected_class: u8,
        expected_id: u8,
        class: u8,
        id: u8,
    },

    /// Status field outside the accepted set for the command
    #[error("invalid status: 0x{0:04X}")]
    BadStatus(u16),

    /// Trailing CRC does not match the frame contents
    #[error("checksum mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Serial number is not 14 ASCII alphanumeric characters
    #[error("invalid serial number: {0:?}")]
    InvalidSerialNumber(String),
}
