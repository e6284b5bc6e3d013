//! Error types for serial links and device discovery

use thiserror::Error;

/// Errors that can occur during port enumeration
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),
}

/// The port could not be opened or claimed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to open port {port}: {reason}")]
pub struct ConnectionError {
    /// Port address
    pub port: String,
    /// Underlying reason reported by the OS
    pub reason: String,
}

/// A single command exchange failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The link was never opened or has been closed
    #[error("port {0} is not connected")]
    NotConnected(String),

    /// Writing the frame failed
    #[error("write to {port} failed: {reason}")]
    WriteFailed { port: String, reason: String },

    /// Reading the response failed
    #[error("read from {port} failed: {reason}")]
    ReadFailed { port: String, reason: String },

    /// The device sent nothing back before the read timeout
    #[error("no response from {0}")]
    NoResponse(String),
}
