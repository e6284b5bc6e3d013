//! Chameleon Ultra Simulation Library
//!
//! This crate provides a simulation layer for testing discovery and
//! provisioning without physical devices. It includes:
//!
//! - **VirtualDevice**: answers protocol frames and records provisioning state
//! - **SimConnector**: in-memory serial ports wired to virtual devices
//!
//! # Example
//!
//! ```rust
//! use cu_sim::VirtualDevice;
//! use cu_protocol::DeviceCommand;
//!
//! let mut device = VirtualDevice::new();
//! let light_on = DeviceCommand::Light { on: true };
//! for frame in light_on.frames().iter() {
//!     let reply = device.process_frame(frame);
//!     assert!(reply.is_some());
//! }
//! assert_eq!(device.light(), Some(true));
//! ```

pub mod connector;
pub mod device;

pub use connector::SimConnector;
pub use device::{DeviceBehavior, VirtualDevice, VirtualDeviceConfig};
