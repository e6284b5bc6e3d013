//! Serial port scanner
//!
//! This module provides serial port enumeration.

use serde::{Deserialize, Serialize};
use serialport::{available_ports, SerialPortType};
use tracing::{debug, info};

use crate::error::DetectError;

/// Information about a serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyACM0, COM3)
    pub port: String,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                product: None,
            },
        }
    }
}

/// Source of candidate port addresses for a detection cycle
pub trait PortSource: Send + Sync + 'static {
    /// Addresses of all currently visible ports
    fn list_ports(&self) -> Result<Vec<String>, DetectError>;
}

/// Serial port scanner configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Skip ports matching these patterns
    pub skip_patterns: Vec<String>,
}

impl ScannerConfig {
    /// Patterns skipped by default
    pub fn default_skip_patterns() -> Vec<String> {
        vec![
            // Bluetooth ports on macOS
            "Bluetooth".to_string(),
            // Debug/logging ports
            "debug".to_string(),
        ]
    }
}

/// Serial port scanner
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Create a new scanner with default configuration
    pub fn new() -> Self {
        Self {
            config: ScannerConfig {
                skip_patterns: ScannerConfig::default_skip_patterns(),
            },
        }
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Enumerate all available serial ports
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        debug!("Enumerating serial ports...");
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

        let result: Vec<_> = ports
            .into_iter()
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
            .filter(|p| !self.should_skip_port(p))
            .collect();

        if result.is_empty() {
            debug!("No serial ports found");
        } else {
            debug!("Found {} serial port(s)", result.len());
            for port in &result {
                let desc = port.product.as_deref().unwrap_or("Unknown");
                debug!("  {} - {}", port.port, desc);
            }
        }

        Ok(result)
    }

    /// Check if a port should be skipped
    fn should_skip_port(&self, port: &SerialPortInfo) -> bool {
        let skip = self
            .config
            .skip_patterns
            .iter()
            .any(|pattern| port.port.contains(pattern));
        if skip {
            info!("Skipping port {}", port.port);
        }
        skip
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PortSource for PortScanner {
    fn list_ports(&self) -> Result<Vec<String>, DetectError> {
        Ok(self
            .enumerate_ports()?
            .into_iter()
            .map(|p| p.port)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_serial_port_info_from_usb() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x6868,
            pid: 0x8686,
            serial_number: Some("12345".to_string()),
            manufacturer: Some("Proxgrind".to_string()),
            product: Some("ChameleonUltra".to_string()),
        });

        let info = SerialPortInfo::from_serialport("/dev/ttyACM0".to_string(), &usb_info);

        assert_eq!(info.port, "/dev/ttyACM0");
        assert_eq!(info.product.as_deref(), Some("ChameleonUltra"));
    }

    #[test]
    fn test_skip_patterns() {
        let scanner = PortScanner::new();
        let bt = SerialPortInfo::from_serialport(
            "/dev/cu.Bluetooth-Incoming-Port".to_string(),
            &SerialPortType::Unknown,
        );
        let acm = SerialPortInfo::from_serialport("/dev/ttyACM0".to_string(), &SerialPortType::Unknown);

        assert!(scanner.should_skip_port(&bt));
        assert!(!scanner.should_skip_port(&acm));
    }
}
