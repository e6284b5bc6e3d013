//! Chameleon Ultra Protocol Library
//!
//! This crate provides framing, checksum validation and the command catalog
//! for the binary serial protocol spoken by Chameleon Ultra devices.
//!
//! # Architecture
//!
//! - [`codec`]: frame layout, CRC16-IBM, response validation
//! - [`catalog`]: the fixed device commands and the serial-number generator
//!
//! Both modules are pure: nothing here touches a serial port.
//!
//! # Example
//!
//! ```rust
//! use cu_protocol::catalog::{self, FIRMWARE_VERSION_ACCEPTED};
//! use cu_protocol::codec::validate_response;
//!
//! let query = catalog::firmware_version_query();
//! assert_eq!(&query[..2], &[0x11, 0xEF]);
//!
//! let reply = [0x11, 0xEF, 0x03, 0xFB, 0x00, 0x00, 0x00, 0x00];
//! assert!(validate_response(&reply, 0x03, 0xFB, &FIRMWARE_VERSION_ACCEPTED).is_ok());
//! ```

pub mod catalog;
pub mod codec;
pub mod error;

pub use catalog::{
    build_serial_number_command, CommandFrames, DeviceCommand, SerialNumberCommand,
};
pub use codec::{
    crc16_ibm, encode, to_hex, validate_response, verify_checksum, Frame, FrameBuilder,
    FrameHeader,
};
pub use error::ProtocolError;
