//! In-memory serial ports backed by virtual devices
//!
//! [`SimConnector`] hands out `tokio::io::duplex()` streams in place of real
//! serial ports. Each open spawns a task that feeds written frames to the
//! port's [`VirtualDevice`] and writes its replies back. It also acts as a
//! [`PortSource`], so discovery can enumerate the simulated ports.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cu_detect::error::{ConnectionError, DetectError};
use cu_detect::link::{LinkConfig, PortConnector};
use cu_detect::scanner::PortSource;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tracing::{debug, info};

use crate::device::{VirtualDevice, VirtualDeviceConfig};

/// Buffer size of each simulated port
const PORT_BUFFER: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SimPorts {
    devices: BTreeMap<String, Arc<Mutex<VirtualDevice>>>,
    unavailable: HashSet<String>,
    opened: Vec<String>,
}

/// Connector and port source for simulated devices
#[derive(Debug, Clone, Default)]
pub struct SimConnector {
    ports: Arc<Mutex<SimPorts>>,
}

impl SimConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device with default configuration
    pub fn with_device(self, port: &str) -> Self {
        self.add_device(port, VirtualDeviceConfig::default());
        self
    }

    /// Attach a device with the given configuration
    pub fn with_device_config(self, port: &str, config: VirtualDeviceConfig) -> Self {
        self.add_device(port, config);
        self
    }

    /// Attach (or replace) the device behind `port`
    pub fn add_device(&self, port: &str, config: VirtualDeviceConfig) {
        info!("Virtual device attached at {}", port);
        lock(&self.ports)
            .devices
            .insert(port.to_string(), Arc::new(Mutex::new(VirtualDevice::from_config(config))));
    }

    /// Detach the device behind `port`
    pub fn remove_device(&self, port: &str) {
        let mut ports = lock(&self.ports);
        ports.devices.remove(port);
        ports.unavailable.remove(port);
    }

    /// Keep `port` listed but make every open fail (held by another program)
    pub fn set_unavailable(&self, port: &str, unavailable: bool) {
        let mut ports = lock(&self.ports);
        if unavailable {
            ports.unavailable.insert(port.to_string());
        } else {
            ports.unavailable.remove(port);
        }
    }

    /// Snapshot of the device behind `port`
    pub fn device(&self, port: &str) -> Option<VirtualDevice> {
        let device = lock(&self.ports).devices.get(port).cloned()?;
        let snapshot = lock(&device).clone();
        Some(snapshot)
    }

    /// Every successful open, in order
    pub fn opened(&self) -> Vec<String> {
        lock(&self.ports).opened.clone()
    }
}

impl PortConnector for SimConnector {
    type Io = DuplexStream;

    fn open(&self, port: &str, _config: &LinkConfig) -> Result<Self::Io, ConnectionError> {
        let device = {
            let mut ports = lock(&self.ports);
            if ports.unavailable.contains(port) {
                return Err(ConnectionError {
                    port: port.to_string(),
                    reason: "access denied".to_string(),
                });
            }
            let device = ports.devices.get(port).cloned().ok_or_else(|| ConnectionError {
                port: port.to_string(),
                reason: "no such device".to_string(),
            })?;
            ports.opened.push(port.to_string());
            device
        };

        let (client, stream) = tokio::io::duplex(PORT_BUFFER);
        tokio::spawn(serve(stream, device, port.to_string()));
        Ok(client)
    }
}

impl PortSource for SimConnector {
    fn list_ports(&self) -> Result<Vec<String>, DetectError> {
        Ok(lock(&self.ports).devices.keys().cloned().collect())
    }
}

/// Answer frames until the link side closes
async fn serve(mut stream: DuplexStream, device: Arc<Mutex<VirtualDevice>>, port: String) {
    let mut buf = [0u8; PORT_BUFFER];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let reply = lock(&device).process_frame(&buf[..n]);
        if let Some(reply) = reply {
            if stream.write_all(&reply).await.is_err() {
                break;
            }
        }
    }
    debug!("Virtual port {} closed", port);
}
