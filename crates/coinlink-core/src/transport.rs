//! Transport traits for talking to the microcontroller.
//!
//! A [`Transport`] is one open byte-oriented connection. Before use it is
//! split into a [`TransportReader`], owned by the background line reader,
//! and a [`TransportWriter`], owned by whoever sends command frames. The two
//! halves are driven from different tasks without a caller-visible lock.
//!
//! Implementations exist for serial ports (`coinlink-transport`) and for
//! scripted mocks (`coinlink-test-harness`).

use async_trait::async_trait;

use crate::error::Result;

/// An open connection that can be split into independent read and write halves.
pub trait Transport: Send {
    /// Human-readable name of the underlying device, used in logs.
    fn name(&self) -> &str;

    /// Split the connection into its read and write halves.
    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>);
}

/// Read half of a [`Transport`].
#[async_trait]
pub trait TransportReader: Send {
    /// Copy the bytes that are available right now into `buf`.
    ///
    /// Returns `Ok(Some(n))` when `n` bytes were read and `Ok(None)` when
    /// nothing is pending. Never waits for data to arrive. A device that has
    /// gone away is reported as an error, not as an empty read.
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;
}

/// Write half of a [`Transport`].
#[async_trait]
pub trait TransportWriter: Send {
    /// Write all of `data` and flush it to the device.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Close the write half. Subsequent `send()` calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the write half is still open.
    fn is_connected(&self) -> bool;
}
