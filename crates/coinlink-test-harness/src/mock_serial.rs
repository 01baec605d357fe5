//! Scripted mock transport for testing the reader and the bridge.
//!
//! [`MockTransport`] implements the split [`Transport`] traits over shared
//! in-memory state. The read half replays a script of byte chunks and
//! failures; the write half records every frame sent. A [`MockHandle`]
//! keeps access to that state after the transport has been split and moved
//! into a running reader.
//!
//! # Example
//!
//! ```
//! use coinlink_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! mock.feed(b"A1B ok\n");
//! mock.fail_close_race();
//! let handle = mock.handle();
//! assert_eq!(handle.pending_steps(), 2);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use coinlink_core::error::{Error, Result};
use coinlink_core::transport::{Transport, TransportReader, TransportWriter};

/// OS error code for "bad file descriptor" on Unix.
#[cfg(unix)]
const BAD_FILE_DESCRIPTOR: i32 = 9;
/// `ERROR_INVALID_HANDLE`, the Windows counterpart.
#[cfg(windows)]
const BAD_FILE_DESCRIPTOR: i32 = 6;

/// One step of the read-side script.
enum Step {
    /// Bytes that become readable, delivered in one read.
    Data(Vec<u8>),
    /// A read that fails with this error.
    Fail(Error),
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Step>,
    sent_log: Vec<Vec<u8>>,
    closed: bool,
    reads: usize,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock [`Transport`] driven by a script of reads.
///
/// Once the script is exhausted, reads report "nothing available" until
/// more data is fed or the transport is closed. After the write half is
/// closed, reads fail with a bad-file-descriptor error, the same way a
/// real port does when it is torn down underneath an in-flight read.
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a mock with an empty script.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Queue bytes to be returned by the next read.
    pub fn feed(&self, data: &[u8]) {
        lock(&self.state).script.push_back(Step::Data(data.to_vec()));
    }

    /// Queue a read that fails with `error`.
    pub fn fail_with(&self, error: Error) {
        lock(&self.state).script.push_back(Step::Fail(error));
    }

    /// Queue a read that fails with a generic I/O error.
    pub fn fail_io(&self, message: &str) {
        self.fail_with(Error::Io(std::io::Error::other(message.to_string())));
    }

    /// Queue a read that fails because the port was closed mid-read.
    pub fn fail_close_race(&self) {
        self.fail_with(Error::Io(std::io::Error::from_raw_os_error(
            BAD_FILE_DESCRIPTOR,
        )));
    }

    /// Get a handle to the shared state that outlives `split()`.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportReader>, Box<dyn TransportWriter>) {
        let reader = MockReader {
            state: Arc::clone(&self.state),
        };
        let writer = MockWriter { state: self.state };
        (Box::new(reader), Box::new(writer))
    }
}

/// Shared view of a [`MockTransport`] for assertions and live feeding.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Queue bytes for the reader while it is running.
    pub fn feed(&self, data: &[u8]) {
        lock(&self.state).script.push_back(Step::Data(data.to_vec()));
    }

    /// Queue a generic I/O failure while the reader is running.
    pub fn fail_io(&self, message: &str) {
        lock(&self.state)
            .script
            .push_back(Step::Fail(Error::Io(std::io::Error::other(message.to_string()))));
    }

    /// Every frame written through the write half, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// Number of script steps not yet consumed by the reader.
    pub fn pending_steps(&self) -> usize {
        lock(&self.state).script.len()
    }

    /// Number of reads the reader has performed.
    pub fn read_count(&self) -> usize {
        lock(&self.state).reads
    }

    /// Whether the write half has been closed.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

struct MockReader {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl TransportReader for MockReader {
    async fn read_available(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut state = lock(&self.state);
        state.reads += 1;

        match state.script.pop_front() {
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    // Leave the remainder readable for the next call.
                    state.script.push_front(Step::Data(data.split_off(n)));
                }
                Ok(Some(n))
            }
            Some(Step::Fail(e)) => Err(e),
            None if state.closed => Err(Error::Io(std::io::Error::from_raw_os_error(
                BAD_FILE_DESCRIPTOR,
            ))),
            None => Ok(None),
        }
    }
}

struct MockWriter {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl TransportWriter for MockWriter {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(Error::NotConnected);
        }
        state.sent_log.push(data.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.state).closed = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !lock(&self.state).closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_reads_script_in_order() {
        let mock = MockTransport::new();
        mock.feed(b"first\n");
        mock.feed(b"second\n");
        let (mut reader, _writer) = Box::new(mock).split();

        let mut buf = [0u8; 64];
        let n = reader.read_available(&mut buf).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"first\n");
        let n = reader.read_available(&mut buf).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"second\n");
        assert!(reader.read_available(&mut buf).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mock_partial_read_keeps_remainder() {
        let mock = MockTransport::new();
        mock.feed(b"abcdef");
        let (mut reader, _writer) = Box::new(mock).split();

        let mut buf = [0u8; 4];
        let n = reader.read_available(&mut buf).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"abcd");
        let n = reader.read_available(&mut buf).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"ef");
    }

    #[tokio::test]
    async fn mock_scripted_failure() {
        let mock = MockTransport::new();
        mock.fail_io("device vanished");
        let (mut reader, _writer) = Box::new(mock).split();

        let mut buf = [0u8; 8];
        let err = reader.read_available(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("device vanished"));
    }

    #[tokio::test]
    async fn mock_records_sent_frames() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (_reader, mut writer) = Box::new(mock).split();

        writer.send(b"AF1ZS5442FA").await.unwrap();
        writer.send(b"AF2ZO000FA").await.unwrap();

        let sent = handle.sent_data();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], b"AF1ZS5442FA");
        assert_eq!(sent[1], b"AF2ZO000FA");
    }

    #[tokio::test]
    async fn mock_close_fails_writes_and_reads() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (mut reader, mut writer) = Box::new(mock).split();

        assert!(writer.is_connected());
        writer.close().await.unwrap();
        assert!(!writer.is_connected());
        assert!(handle.is_closed());

        let result = writer.send(b"AF1ZO000FA").await;
        assert!(matches!(result, Err(Error::NotConnected)));

        let mut buf = [0u8; 8];
        match reader.read_available(&mut buf).await {
            Err(Error::Io(e)) => assert_eq!(e.raw_os_error(), Some(BAD_FILE_DESCRIPTOR)),
            other => panic!("expected bad file descriptor, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_handle_feeds_after_split() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (mut reader, _writer) = Box::new(mock).split();

        let mut buf = [0u8; 16];
        assert!(reader.read_available(&mut buf).await.unwrap().is_none());
        handle.feed(b"late\n");
        assert_eq!(handle.pending_steps(), 1);
        let n = reader.read_available(&mut buf).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"late\n");
        assert_eq!(handle.read_count(), 2);
    }
}
