//! Serial link to a single device
//!
//! A [`DeviceLink`] owns one open port for its lifetime. Opening goes through
//! a [`PortConnector`], so the same link code drives real serial ports
//! (`tokio_serial`) and in-memory streams from `tokio::io::duplex()`.

use std::io::ErrorKind;
use std::time::Duration;

use cu_protocol::to_hex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace};

use crate::error::{CommandError, ConnectionError};

/// Baud rate spoken by the devices
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
/// How long to wait for a response
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Maximum bytes read per exchange
pub const MAX_READ_LEN: usize = 64;

/// Link parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Serial baud rate
    pub baud_rate: u32,
    /// Read timeout for one exchange
    pub read_timeout: Duration,
    /// Maximum bytes read per exchange
    pub max_read: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_read: MAX_READ_LEN,
        }
    }
}

/// Opens the I/O stream behind a port address
pub trait PortConnector: Send + Sync + 'static {
    /// Stream type produced for an open port
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open and claim `port`
    fn open(&self, port: &str, config: &LinkConfig) -> Result<Self::Io, ConnectionError>;
}

/// Connector for real serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl PortConnector for SerialConnector {
    type Io = SerialStream;

    fn open(&self, port: &str, config: &LinkConfig) -> Result<Self::Io, ConnectionError> {
        tokio_serial::new(port, config.baud_rate)
            .timeout(config.read_timeout)
            .open_native_async()
            .map_err(|e| ConnectionError {
                port: port.to_string(),
                reason: e.to_string(),
            })
    }
}

/// An open (or closed) connection to one device
pub struct DeviceLink<T> {
    port: String,
    io: Option<T>,
    config: LinkConfig,
}

impl<T> DeviceLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Open `port` through `connector`
    pub fn connect<C>(connector: &C, port: &str, config: &LinkConfig) -> Result<Self, ConnectionError>
    where
        C: PortConnector<Io = T>,
    {
        debug!("Connecting to {}", port);
        let io = connector.open(port, config)?;
        debug!("{} connected", port);
        Ok(Self::from_io(port, io, config.clone()))
    }

    /// Wrap an already-open stream
    pub fn from_io(port: &str, io: T, config: LinkConfig) -> Self {
        Self {
            port: port.to_string(),
            io: Some(io),
            config,
        }
    }

    /// Port address
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Whether the link currently holds the port
    pub fn is_open(&self) -> bool {
        self.io.is_some()
    }

    /// Write `frame` and collect the response
    ///
    /// Reads until `max_read` bytes have arrived or the read timeout elapses.
    /// A short or empty response is returned as-is; judging its content is
    /// the caller's job.
    pub async fn send_command(&mut self, frame: &[u8]) -> Result<Vec<u8>, CommandError> {
        let Some(io) = self.io.as_mut() else {
            debug!("{} not connected, cannot send", self.port);
            return Err(CommandError::NotConnected(self.port.clone()));
        };

        debug!("{} -> {}", self.port, to_hex(frame));

        write_frame(io, frame).await.map_err(|e| CommandError::WriteFailed {
            port: self.port.clone(),
            reason: e.to_string(),
        })?;

        let response = read_response(io, self.config.max_read, self.config.read_timeout)
            .await
            .map_err(|e| CommandError::ReadFailed {
                port: self.port.clone(),
                reason: e.to_string(),
            })?;

        debug!("{} <- {}", self.port, to_hex(&response));
        Ok(response)
    }

    /// Release the port. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.io.take().is_some() {
            debug!("Closed {}", self.port);
        }
    }
}

async fn write_frame<W>(io: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    io.write_all(frame).await?;
    io.flush().await
}

/// Read up to `max` bytes, stopping early at `read_timeout` or end of stream
async fn read_response<R>(io: &mut R, max: usize, read_timeout: Duration) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; max];
    let mut filled = 0;
    let deadline = Instant::now() + read_timeout;

    while filled < max {
        match timeout_at(deadline, io.read(&mut buf[filled..])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                trace!("read {} bytes", n);
                filled += n;
            }
            Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => break,
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }
    }

    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, ScriptedConnector};

    #[test]
    fn test_link_config_default() {
        let config = LinkConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.max_read, 64);
    }

    #[tokio::test]
    async fn test_send_command_returns_response() {
        let connector = ScriptedConnector::new().reply("/dev/ttyACM0", &[0x11, 0xEF, 0x03, 0xFB]);
        let mut link = DeviceLink::connect(&connector, "/dev/ttyACM0", &fast_config()).unwrap();

        let response = link.send_command(&[0x01, 0x02]).await.unwrap();
        assert_eq!(response, vec![0x11, 0xEF, 0x03, 0xFB]);
        assert_eq!(connector.received("/dev/ttyACM0"), vec![vec![0x01, 0x02]]);
    }

    #[tokio::test]
    async fn test_silent_device_yields_empty_response() {
        let connector = ScriptedConnector::new().silent("/dev/ttyACM0");
        let mut link = DeviceLink::connect(&connector, "/dev/ttyACM0", &fast_config()).unwrap();

        let response = link.send_command(&[0x01]).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_read_stops_at_max_len() {
        let long = vec![0xAA; 100];
        let connector = ScriptedConnector::new().reply("/dev/ttyACM0", &long);
        let mut link = DeviceLink::connect(&connector, "/dev/ttyACM0", &fast_config()).unwrap();

        let response = link.send_command(&[0x01]).await.unwrap();
        assert_eq!(response.len(), MAX_READ_LEN);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let connector = ScriptedConnector::new();
        let result = DeviceLink::connect(&connector, "/dev/ttyUSB9", &fast_config());
        let err = result.err().unwrap();
        assert_eq!(err.port, "/dev/ttyUSB9");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connector = ScriptedConnector::new().reply("/dev/ttyACM0", &[0x00]);
        let mut link = DeviceLink::connect(&connector, "/dev/ttyACM0", &fast_config()).unwrap();
        assert!(link.is_open());

        link.close();
        link.close();
        assert!(!link.is_open());

        assert_eq!(
            link.send_command(&[0x01]).await,
            Err(CommandError::NotConnected("/dev/ttyACM0".to_string()))
        );
    }
}
