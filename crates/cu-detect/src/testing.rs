//! Test helpers: a connector backed by in-memory streams

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::error::ConnectionError;
use crate::link::{LinkConfig, PortConnector};

/// Link config with a short read timeout so tests stay fast
pub(crate) fn fast_config() -> LinkConfig {
    LinkConfig {
        read_timeout: Duration::from_millis(30),
        ..Default::default()
    }
}

/// Connector whose ports answer every write with a fixed reply
///
/// Ports without a script fail to open.
#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
    scripts: HashMap<String, Option<Vec<u8>>>,
    received: Arc<Mutex<HashMap<String, Vec<Vec<u8>>>>>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Port answers every write with `reply`
    pub(crate) fn reply(mut self, port: &str, reply: &[u8]) -> Self {
        self.scripts.insert(port.to_string(), Some(reply.to_vec()));
        self
    }

    /// Port opens but never answers
    pub(crate) fn silent(mut self, port: &str) -> Self {
        self.scripts.insert(port.to_string(), None);
        self
    }

    /// Frames written to `port`, in order
    pub(crate) fn received(&self, port: &str) -> Vec<Vec<u8>> {
        self.received
            .lock()
            .unwrap()
            .get(port)
            .cloned()
            .unwrap_or_default()
    }

    /// Every successful open, in order
    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl PortConnector for ScriptedConnector {
    type Io = DuplexStream;

    fn open(&self, port: &str, _config: &LinkConfig) -> Result<Self::Io, ConnectionError> {
        let script = self.scripts.get(port).cloned().ok_or_else(|| ConnectionError {
            port: port.to_string(),
            reason: "no such port".to_string(),
        })?;
        self.opened.lock().unwrap().push(port.to_string());

        let (client, mut device) = tokio::io::duplex(256);
        let received = Arc::clone(&self.received);
        let port = port.to_string();

        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                match device.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        received
                            .lock()
                            .unwrap()
                            .entry(port.clone())
                            .or_default()
                            .push(buf[..n].to_vec());
                        if let Some(reply) = &script {
                            if device.write_all(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(client)
    }
}
