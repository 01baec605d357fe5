//! Transport implementations for coinlink.
//!
//! - [`SerialTransport`]: USB serial connection to the coin controller,
//!   split into independent read and write halves
//! - [`discovery`]: find the controller's port by path prefix
//!
//! # Example
//!
//! ```no_run
//! use coinlink_core::transport::Transport;
//! use coinlink_transport::{discovery, SerialTransport, DEFAULT_BAUD_RATE};
//!
//! # async fn example() -> coinlink_core::Result<()> {
//! if let Some(port) = discovery::first_matching_port(discovery::DEFAULT_PORT_PREFIX)? {
//!     let transport = SerialTransport::open(&port, DEFAULT_BAUD_RATE).await?;
//!     let (_reader, mut writer) = Box::new(transport).split();
//!     writer.send(b"AF1ZO000FA").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod serial;

pub use serial::{SerialConfig, SerialReader, SerialTransport, SerialWriter, DEFAULT_BAUD_RATE};
pub use tokio_serial::{DataBits, FlowControl, Parity, StopBits};
