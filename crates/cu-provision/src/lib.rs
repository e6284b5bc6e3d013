//! Chameleon Ultra Provisioning Engine
//!
//! This crate turns an operator's device selection and settings into a
//! sequence of frame exchanges, executed one device at a time.
//!
//! # Architecture
//!
//! - [`settings`]: tri-state toggles and the run settings
//! - [`plan`]: per-device step lists and the step-count formula
//! - [`orchestrator`]: sequential, best-effort execution with progress events
//! - [`session`]: start gate, serial numbers and discovery hand-off around a run
//!
//! Progress, result lines and errors are reported through the
//! [`cu_detect::EventSink`] handed to the [`Orchestrator`].
//!
//! # Example
//!
//! ```rust
//! use cu_provision::{task_count, ProvisioningSettings, Toggle};
//!
//! let settings = ProvisioningSettings {
//!     activate_firmware: true,
//!     low_freq: Toggle::On,
//!     ..Default::default()
//! };
//! // activation + serial number + low frequency + two status reads
//! assert_eq!(task_count(&settings), 5);
//! ```

pub mod assignment;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod plan;
pub mod session;
pub mod settings;

pub use assignment::{assign_serial_numbers, SerialNumberAssignment};
pub use error::{OrchestratorError, ParseToggleError, SessionError};
pub use gate::{AlwaysAllow, ExpiryGate, GateVerdict, StartGate};
pub use orchestrator::{ErrorLog, Orchestrator, ProvisioningRun, RunReport, COMPLETED_LABEL};
pub use plan::{plan_steps, task_count, total_steps, Phase, TaskStep};
pub use session::{ProvisioningSession, DO_NOT_DISCONNECT};
pub use settings::{ProvisioningSettings, Toggle};
