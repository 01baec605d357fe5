//! BridgeBuilder -- fluent builder for constructing [`Bridge`] instances.
//!
//! Separates configuration from construction so callers can pick the port,
//! serial settings and reader tuning before anything is opened.
//!
//! # Example
//!
//! ```no_run
//! use coinlink_io::BridgeBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> coinlink_core::Result<()> {
//! let bridge = BridgeBuilder::new()
//!     .port_prefix("/dev/ttyUSB")
//!     .idle_interval(Duration::from_millis(2))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use coinlink_core::error::{Error, Result};
use coinlink_core::transport::Transport;
use coinlink_transport::discovery::{self, DEFAULT_PORT_PREFIX};
use coinlink_transport::{SerialConfig, SerialTransport};

use crate::bridge::Bridge;
use crate::reader::ReaderConfig;

/// Fluent builder for [`Bridge`].
pub struct BridgeBuilder {
    serial_port: Option<String>,
    port_prefix: String,
    serial: SerialConfig,
    reader: ReaderConfig,
}

impl BridgeBuilder {
    /// Create a builder with the controller's default settings.
    pub fn new() -> Self {
        BridgeBuilder {
            serial_port: None,
            port_prefix: DEFAULT_PORT_PREFIX.to_string(),
            serial: SerialConfig::default(),
            reader: ReaderConfig::default(),
        }
    }

    /// Use this serial port instead of discovering one.
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Path prefix used to discover the port when none is given
    /// (default: `/dev/tty.usb`).
    pub fn port_prefix(mut self, prefix: &str) -> Self {
        self.port_prefix = prefix.to_string();
        self
    }

    /// Override the baud rate (default: 57600).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.serial.baud_rate = baud;
        self
    }

    /// Replace the full serial configuration.
    pub fn serial_config(mut self, config: SerialConfig) -> Self {
        self.serial = config;
        self
    }

    /// Reader sleep between empty ticks (default: 1ms).
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.reader.idle_interval = interval;
        self
    }

    /// Buffer size for each read (default: 256 bytes). Must be non-zero.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.reader.chunk_size = size;
        self
    }

    /// Longest partial line the reader buffers (default: 8192 bytes).
    pub fn max_line_len(mut self, len: usize) -> Self {
        self.reader.max_line_len = len;
        self
    }

    /// The port that [`build`](Self::build) would open.
    ///
    /// An explicit port wins; otherwise the first enumerated port matching
    /// the prefix is used.
    pub fn resolve_port(&self) -> Result<String> {
        if let Some(port) = &self.serial_port {
            return Ok(port.clone());
        }
        discovery::first_matching_port(&self.port_prefix)?.ok_or_else(|| {
            Error::Transport(format!(
                "no serial port matching prefix {}",
                self.port_prefix
            ))
        })
    }

    /// Open the serial port and start the bridge.
    pub async fn build(self) -> Result<Bridge> {
        let port = self.resolve_port()?;
        let transport = SerialTransport::open_with_config(&port, self.serial.clone()).await?;
        self.build_with_transport(Box::new(transport)).await
    }

    /// Start the bridge on a caller-provided transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `coinlink-test-harness`) and for callers that open the port
    /// themselves.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Bridge> {
        if self.reader.chunk_size == 0 {
            return Err(Error::InvalidParameter(
                "reader chunk size must be non-zero".into(),
            ));
        }
        Ok(Bridge::start(transport, self.reader))
    }
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
