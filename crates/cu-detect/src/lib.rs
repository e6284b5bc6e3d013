//! Chameleon Ultra serial link and device discovery
//!
//! This crate owns everything that touches serial ports: the per-device
//! [`DeviceLink`], identity probing, the periodic [`DiscoveryScheduler`], and
//! the [`PortArbiter`] that keeps discovery away from the ports while a
//! provisioning run is active. It also defines the [`FlasherEvent`] stream
//! shared by all components.
//!
//! # Example
//!
//! ```rust,no_run
//! use cu_detect::PortScanner;
//!
//! let scanner = PortScanner::new();
//! let ports = scanner.enumerate_ports().unwrap();
//!
//! for port in ports {
//!     println!("Found port: {}", port.port);
//! }
//! ```

pub mod arbiter;
pub mod discovery;
pub mod error;
pub mod events;
pub mod link;
pub mod probe;
pub mod scanner;

#[cfg(test)]
mod testing;

pub use arbiter::{CyclePermit, ExclusiveAccess, PortArbiter};
pub use discovery::{DiscoveryConfig, DiscoveryScheduler};
pub use error::{CommandError, ConnectionError, DetectError};
pub use events::{EventSink, FlasherEvent};
pub use link::{DeviceLink, LinkConfig, PortConnector, SerialConnector};
pub use probe::{DeviceProber, ProbeResult};
pub use scanner::{PortScanner, PortSource, ScannerConfig, SerialPortInfo};
