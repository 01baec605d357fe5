//! Serial port transport for the coin controller.
//!
//! [`SerialTransport`] opens a USB virtual COM port and implements the
//! [`Transport`] trait. The board talks 57600 baud, 8N1, no flow control,
//! which is what [`SerialConfig::default`] describes.
//!
//! # Example
//!
//! ```no_run
//! use coinlink_core::transport::Transport;
//! use coinlink_transport::SerialTransport;
//!
//! # async fn example() -> coinlink_core::Result<()> {
//! let transport = SerialTransport::open("/dev/tty.usbserial-A1", 57_600).await?;
//! let (_reader, mut writer) = Box::new(transport).split();
//! writer.send(b"AF1ZO000FA").await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use coinlink_core::error::{Error, Result};
use coinlink_core::transport::{Transport, TransportReader, TransportWriter};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};

/// Baud rate the coin controller firmware is built for.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate (57600 for the coin controller)
    pub baud_rate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Number of stop bits (typically 1)
    pub stop_bits: StopBits,
    /// Parity checking (typically None)
    pub parity: Parity,
    /// Flow control (the board wires neither RTS/CTS nor XON/XOFF)
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// An open serial connection to the coin controller.
pub struct SerialTransport {
    stream: SerialStream,
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port with the given baud rate and default 8N1 settings.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open a serial port with full configuration control.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            data_bits = ?config.data_bits,
            stop_bits = ?config.stop_bits,
            parity = ?config.parity,
            flow_control = ?config.flow_control,
            "Opening serial port"
        );

        let mut stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(config.flow_control)
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::Transport(format!("Failed to open serial port {}: {}", port, e))
            })?;

        // Stale bytes from before the port was opened would otherwise be
        // queued as the first response line.
        if let Err(e) = stream.clear(tokio_serial::ClearBuffer::Input) {
            tracing::warn!(port = %port, error = %e, "Failed to clear input buffer");
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "Serial port opened successfully");

        Ok(Self {
            stream,
            port_name: port.to_string(),
        })
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        let SerialTransport { stream, port_name } = *self;
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = SerialReader {
            port: read_half,
            port_name: port_name.clone(),
        };
        let writer = SerialWriter {
            port: Some(write_half),
            port_name,
        };
        (Box::new(reader), Box::new(writer))
    }
}

/// Read half of a [`SerialTransport`].
pub struct SerialReader {
    port: ReadHalf<SerialStream>,
    port_name: String,
}

#[async_trait]
impl TransportReader for SerialReader {
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        // A zero timeout polls the read once: ready data is returned, a
        // pending read is dropped without waiting.
        match tokio::time::timeout(Duration::ZERO, self.port.read(buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                tracing::debug!(port = %self.port_name, "Serial port reached end of stream");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(
                    port = %self.port_name,
                    bytes = n,
                    data = ?&buf[..n],
                    "Received data"
                );
                Ok(Some(n))
            }
            Ok(Err(e)) => {
                tracing::debug!(port = %self.port_name, error = %e, "Serial read failed");
                Err(Error::Io(e))
            }
        }
    }
}

/// Write half of a [`SerialTransport`].
pub struct SerialWriter {
    port: Option<WriteHalf<SerialStream>>,
    port_name: String,
}

#[async_trait]
impl TransportWriter for SerialWriter {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            port = %self.port_name,
            bytes = data.len(),
            data = ?data,
            "Sending data"
        );

        port.write_all(data).await.map_err(|e| {
            tracing::error!(
                port = %self.port_name,
                error = %e,
                "Failed to send data"
            );
            if e.kind() == std::io::ErrorKind::BrokenPipe
                || e.kind() == std::io::ErrorKind::NotConnected
            {
                Error::ConnectionLost
            } else {
                Error::Io(e)
            }
        })?;

        port.flush().await.map_err(|e| {
            tracing::error!(
                port = %self.port_name,
                error = %e,
                "Failed to flush serial port"
            );
            Error::Io(e)
        })?;

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");

            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }

            // The device handle itself closes once the read half is dropped too.
            tracing::info!(port = %self.port_name, "Serial port closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }
}
