//! Identity probing for device detection
//!
//! A probe opens a port, sends the firmware version query and checks that the
//! reply carries the device's identity signature. Probing is exploratory: a
//! timeout, a garbled reply or a port that refuses to open all simply mean
//! "not a target device".

use std::sync::Arc;

use cu_protocol::catalog::{
    firmware_version_query, FIRMWARE_VERSION_ACCEPTED, FIRMWARE_VERSION_CLASS, FIRMWARE_VERSION_ID,
};
use cu_protocol::{validate_response, ProtocolError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::link::{DeviceLink, LinkConfig, PortConnector};

/// Result of probing a serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Port address
    pub port: String,
    /// Whether a target device answered
    pub is_target: bool,
    /// Human-readable outcome
    pub detail: String,
}

impl ProbeResult {
    fn target(port: &str) -> Self {
        Self {
            port: port.to_string(),
            is_target: true,
            detail: "Chameleon Ultra detected".to_string(),
        }
    }

    fn not_target(port: &str, detail: impl Into<String>) -> Self {
        Self {
            port: port.to_string(),
            is_target: false,
            detail: detail.into(),
        }
    }
}

/// Check a firmware version reply for the device's identity signature
pub fn classify_response(response: &[u8]) -> Result<u16, ProtocolError> {
    validate_response(
        response,
        FIRMWARE_VERSION_CLASS,
        FIRMWARE_VERSION_ID,
        &FIRMWARE_VERSION_ACCEPTED,
    )
}

/// Device identity prober
pub struct DeviceProber<C> {
    connector: Arc<C>,
    config: LinkConfig,
}

impl<C: PortConnector> DeviceProber<C> {
    /// Create a prober that opens ports through `connector`
    pub fn new(connector: Arc<C>, config: LinkConfig) -> Self {
        Self { connector, config }
    }

    /// Probe one port. Never retries; the link is closed before returning.
    pub async fn probe(&self, port: &str) -> ProbeResult {
        let mut link = match DeviceLink::connect(self.connector.as_ref(), port, &self.config) {
            Ok(link) => link,
            Err(e) => {
                debug!("{} probe skipped: {}", port, e);
                return ProbeResult::not_target(port, e.to_string());
            }
        };

        let result = match link.send_command(firmware_version_query()).await {
            Ok(response) => match classify_response(&response) {
                Ok(status) => {
                    info!("{} identified (status 0x{:04X})", port, status);
                    ProbeResult::target(port)
                }
                Err(e) => {
                    debug!("{} is not a target device: {}", port, e);
                    ProbeResult::not_target(port, e.to_string())
                }
            },
            Err(e) => {
                debug!("{} probe failed: {}", port, e);
                ProbeResult::not_target(port, e.to_string())
            }
        };

        link.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, ScriptedConnector};

    const PORT: &str = "/dev/ttyACM0";

    async fn probe_with_reply(reply: &[u8]) -> ProbeResult {
        let connector = ScriptedConnector::new().reply(PORT, reply);
        DeviceProber::new(Arc::new(connector), fast_config())
            .probe(PORT)
            .await
    }

    #[tokio::test]
    async fn test_accepted_statuses_are_targets() {
        for status in [[0x00, 0x68], [0x00, 0x00]] {
            let reply = [0x11, 0xEF, 0x03, 0xFB, status[0], status[1], 0x00, 0x00];
            let result = probe_with_reply(&reply).await;
            assert!(result.is_target, "status {:02X?}", status);
        }
    }

    #[tokio::test]
    async fn test_malformed_replies_are_not_targets() {
        let cases: [&[u8]; 4] = [
            &[0x11, 0xEF, 0x03],
            &[0x12, 0xEF, 0x03, 0xFB, 0x00, 0x00],
            &[0x11, 0xEF, 0x04, 0xFB, 0x00, 0x00],
            &[0x11, 0xEF, 0x03, 0xFB, 0x00, 0x01],
        ];
        for reply in cases {
            let result = probe_with_reply(reply).await;
            assert!(!result.is_target, "reply {:02X?}", reply);
            assert_eq!(result.port, PORT);
        }
    }

    #[tokio::test]
    async fn test_silent_port_is_not_target() {
        let connector = ScriptedConnector::new().silent(PORT);
        let result = DeviceProber::new(Arc::new(connector), fast_config())
            .probe(PORT)
            .await;
        assert!(!result.is_target);
    }

    #[tokio::test]
    async fn test_unopenable_port_is_not_target() {
        let connector = ScriptedConnector::new();
        let result = DeviceProber::new(Arc::new(connector), fast_config())
            .probe(PORT)
            .await;
        assert!(!result.is_target);
        assert!(result.detail.contains("failed to open"));
    }

    #[tokio::test]
    async fn test_probe_sends_firmware_version_query_once() {
        let connector = ScriptedConnector::new().reply(PORT, &[0x11, 0xEF, 0x03, 0xFB, 0x00, 0x00]);
        let prober = DeviceProber::new(Arc::new(connector.clone()), fast_config());
        prober.probe(PORT).await;

        assert_eq!(connector.received(PORT), vec![firmware_version_query().to_vec()]);
    }
}
