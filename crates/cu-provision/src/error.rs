//! Error types for provisioning

use thiserror::Error;

/// Unexpected failures of a provisioning run as a whole
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// Firmware activation was requested but a device has no serial number
    #[error("no serial number assigned to {0}")]
    MissingAssignment(String),

    /// The worker running the command sequence stopped abnormally
    #[error("provisioning worker aborted: {0}")]
    WorkerAborted(String),
}

/// Reasons a provisioning session does not run or does not complete
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The start gate refused the run
    #[error("start not allowed: {0}")]
    StartDenied(String),

    /// No device was selected
    #[error("select at least one device")]
    NoDevicesSelected,

    /// The run itself failed
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

/// A tri-state setting could not be parsed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid toggle value {0:?} (expected on, off or unset)")]
pub struct ParseToggleError(pub String);
