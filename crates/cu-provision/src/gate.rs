//! Start gate consulted once before a run begins

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

/// Answer of a start gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub allowed: bool,
    /// Shown to the operator
    pub message: String,
}

impl GateVerdict {
    pub fn allow(message: impl Into<String>) -> Self {
        Self {
            allowed: true,
            message: message.into(),
        }
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            message: message.into(),
        }
    }
}

/// Predicate deciding whether a run may start
pub trait StartGate: Send + Sync {
    fn check_start_allowed(&self) -> GateVerdict;
}

/// Gate that never refuses
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllow;

impl StartGate for AlwaysAllow {
    fn check_start_allowed(&self) -> GateVerdict {
        GateVerdict::allow("start check skipped")
    }
}

/// Gate that refuses once a fixed point in time has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryGate {
    expires_at: SystemTime,
}

impl ExpiryGate {
    pub fn new(expires_at: SystemTime) -> Self {
        Self { expires_at }
    }

    /// Gate expiring `secs` seconds after the Unix epoch
    pub fn from_unix_secs(secs: u64) -> Self {
        Self::new(UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Verdict at a given time
    pub fn check_at(&self, now: SystemTime) -> GateVerdict {
        if now > self.expires_at {
            warn!("Start refused: tool expired");
            GateVerdict::deny("this version has expired")
        } else {
            debug!("Start check passed");
            GateVerdict::allow("version check passed")
        }
    }
}

impl StartGate for ExpiryGate {
    fn check_start_allowed(&self) -> GateVerdict {
        self.check_at(SystemTime::now())
    }
}

impl<G: StartGate + ?Sized> StartGate for Box<G> {
    fn check_start_allowed(&self) -> GateVerdict {
        (**self).check_start_allowed()
    }
}
