//! Chameleon Ultra frame codec
//!
//! Every exchange with a device is a single binary frame.
//!
//! # Frame Format
//! ```text
//! 11 EF [class] [id] [status hi] [status lo] [len hi] [len lo] [payload...] [crc hi] [crc lo]
//! ```
//!
//! - `11 EF`: Sync bytes
//! - `class`, `id`: Command class and command id, echoed back in responses
//! - `status`: Zero on requests, result code on responses
//! - `len`: Payload length, big-endian
//! - `crc`: CRC16-IBM over every preceding byte, big-endian
//!
//! The fixed frames in [`crate::catalog`] are the device's reference frames and
//! are transmitted verbatim. Frames assembled at runtime go through
//! [`FrameBuilder`] or [`encode`], which always recompute the checksum over
//! the exact bytes that will be written.

use std::fmt;

use crc::{Crc, CRC_16_MODBUS};

use crate::error::ProtocolError;

/// Frame sync bytes
pub const SYNC: [u8; 2] = [0x11, 0xEF];
/// Length of the fixed frame header (sync, class, id, status, length)
pub const HEADER_LEN: usize = 8;
/// Length of the trailing checksum
pub const CRC_LEN: usize = 2;
/// Minimum response length needed to check sync, command echo and status
pub const MIN_RESPONSE_LEN: usize = 6;

/// CRC16-IBM: polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF
const CRC16_IBM: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the CRC16-IBM checksum of `data`
pub fn crc16_ibm(data: &[u8]) -> u16 {
    CRC16_IBM.checksum(data)
}

/// A complete frame as it travels over the serial link
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame(Vec<u8>);

impl Frame {
    /// Wrap bytes that already form a complete frame
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the frame, returning its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the frame holds no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the frame header
    pub fn header(&self) -> Result<FrameHeader, ProtocolError> {
        FrameHeader::parse(&self.0)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

/// Format bytes as space-separated upper-case hex
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append the CRC16-IBM checksum of `bytes`, big-endian
pub fn encode(bytes: &[u8]) -> Frame {
    let crc = crc16_ibm(bytes);
    let mut frame = Vec::with_capacity(bytes.len() + CRC_LEN);
    frame.extend_from_slice(bytes);
    frame.extend_from_slice(&crc.to_be_bytes());
    Frame(frame)
}

/// Check that the trailing two bytes are the CRC16-IBM of everything before them
pub fn verify_checksum(bytes: &[u8]) -> Result<(), ProtocolError> {
    if bytes.len() < CRC_LEN {
        return Err(ProtocolError::TooShort {
            len: bytes.len(),
            needed: CRC_LEN,
        });
    }

    let (body, tail) = bytes.split_at(bytes.len() - CRC_LEN);
    let expected = crc16_ibm(body);
    let actual = u16::from_be_bytes([tail[0], tail[1]]);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Validate a device response against the command that was sent
///
/// Checks, in order: minimum length, sync bytes, command echo, and that the
/// status field is one of `accepted`. Returns the status on success.
pub fn validate_response(
    bytes: &[u8],
    expected_class: u8,
    expected_id: u8,
    accepted: &[u16],
) -> Result<u16, ProtocolError> {
    if bytes.len() < MIN_RESPONSE_LEN {
        return Err(ProtocolError::TooShort {
            len: bytes.len(),
            needed: MIN_RESPONSE_LEN,
        });
    }

    if bytes[0..2] != SYNC {
        return Err(ProtocolError::BadSync([bytes[0], bytes[1]]));
    }

    if bytes[2] != expected_class || bytes[3] != expected_id {
        return Err(ProtocolError::BadCommandEcho {
            expected_class,
            expected_id,
            class: bytes[2],
            id: bytes[3],
        });
    }

    let status = u16::from_be_bytes([bytes[4], bytes[5]]);
    if !accepted.contains(&status) {
        return Err(ProtocolError::BadStatus(status));
    }

    Ok(status)
}

/// Decoded fixed header of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameHeader {
    /// Command class
    pub class: u8,
    /// Command id
    pub id: u8,
    /// Status (zero on requests)
    pub status: u16,
    /// Declared payload length
    pub payload_len: u16,
}

impl FrameHeader {
    /// Parse the header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::TooShort {
                len: bytes.len(),
                needed: HEADER_LEN,
            });
        }
        if bytes[0..2] != SYNC {
            return Err(ProtocolError::BadSync([bytes[0], bytes[1]]));
        }

        Ok(Self {
            class: bytes[2],
            id: bytes[3],
            status: u16::from_be_bytes([bytes[4], bytes[5]]),
            payload_len: u16::from_be_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// Builder for frames assembled at runtime
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    class: u8,
    id: u8,
    status: u16,
    payload: Vec<u8>,
}

impl FrameBuilder {
    /// Start a request frame for the given command class and id
    pub fn new(class: u8, id: u8) -> Self {
        Self {
            class,
            id,
            status: 0,
            payload: Vec::new(),
        }
    }

    /// Set the status field (responses only; requests leave it zero)
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Append payload bytes
    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload.extend_from_slice(data);
        self
    }

    /// Assemble header and payload and append the checksum
    pub fn build(self) -> Frame {
        debug_assert!(self.payload.len() <= u16::MAX as usize);
        let len = self.payload.len() as u16;

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len() + CRC_LEN);
        bytes.extend_from_slice(&SYNC);
        bytes.push(self.class);
        bytes.push(self.id);
        bytes.extend_from_slice(&self.status.to_be_bytes());
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        encode(&bytes)
    }
}
