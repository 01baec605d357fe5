//! Background serial reader.
//!
//! One tokio task owns the read half of the connection. Each tick it reads
//! everything that is available right now, splits it into lines and pushes
//! each complete line to the [`LineQueue`], then idles for
//! [`ReaderConfig::idle_interval`] before the next tick. Reads never wait for
//! data, so the write half stays free for the caller the whole time.
//!
//! The task ends in one of three ways:
//!
//! - the [`CancellationToken`] is cancelled ([`ReaderExit::Stopped`]),
//! - the port is closed under an in-flight read ([`ReaderExit::Closed`]),
//!   which is expected during shutdown and reported nowhere,
//! - any other read failure: the [`ReaderFault`] is pushed to the queue and
//!   returned as the task's error. Nothing restarts the reader.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use coinlink_core::error::Error;
use coinlink_core::transport::TransportReader;

use crate::fault::{FaultKind, ReaderFault};
use crate::queue::{LineQueue, ResponseUnit};

/// Line separator on the read side.
const LINE_SEPARATOR: u8 = b'\n';

/// Tuning for the reader task.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Sleep between ticks once nothing is left to read (default 1ms).
    pub idle_interval: Duration,
    /// Size of the buffer handed to each read (default 256 bytes).
    pub chunk_size: usize,
    /// Longest partial line kept while waiting for its separator.
    /// Longer input is discarded (default 8192 bytes).
    pub max_line_len: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            idle_interval: Duration::from_millis(1),
            chunk_size: 256,
            max_line_len: 8192,
        }
    }
}

/// How a reader that did not fault came to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Stopped through its cancellation token.
    Stopped,
    /// The port was closed under an in-flight read.
    Closed,
}

/// Final result of the reader task.
pub type ReaderOutcome = std::result::Result<ReaderExit, ReaderFault>;

/// Handle to a running reader task.
///
/// Dropping the handle stops the reader, which releases the read half of
/// the connection.
pub struct ReaderHandle {
    cancel: CancellationToken,
    task: JoinHandle<ReaderOutcome>,
}

impl ReaderHandle {
    /// Ask the reader to stop. Returns immediately; the reader notices on
    /// its next tick or during its idle wait.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the reader task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// A token that stops the reader when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the task to end and return its outcome.
    ///
    /// Does not stop the reader; call [`stop`](Self::stop) first for that.
    /// A panic inside the task comes back as an unclassified fault.
    pub async fn join(mut self) -> ReaderOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => Err(ReaderFault::new(
                FaultKind::Unclassified,
                format!("reader task failed: {e}"),
            )),
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        // A read that never returns would otherwise keep the task alive.
        self.task.abort();
    }
}

/// Spawn the reader task on the current tokio runtime.
pub fn spawn_reader(
    source: Box<dyn TransportReader>,
    queue: LineQueue,
    config: ReaderConfig,
) -> ReaderHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(reader_loop(source, queue, config, cancel.clone()));
    ReaderHandle { cancel, task }
}

async fn reader_loop(
    mut source: Box<dyn TransportReader>,
    queue: LineQueue,
    config: ReaderConfig,
    cancel: CancellationToken,
) -> ReaderOutcome {
    let mut buf = vec![0u8; config.chunk_size.max(1)];
    let mut lines = LineAssembler::new(config.max_line_len);
    debug!("serial reader started");

    loop {
        if cancel.is_cancelled() {
            return stopped(&lines);
        }

        loop {
            match source.read_available(&mut buf).await {
                Ok(Some(n)) if n > 0 => {
                    for line in lines.push(&buf[..n]) {
                        queue.push(ResponseUnit::Line(line));
                    }
                }
                Ok(_) => break,
                Err(e) => return fault(e, &queue),
            }
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => return stopped(&lines),
            _ = tokio::time::sleep(config.idle_interval) => {}
        }
    }
}

fn stopped(lines: &LineAssembler) -> ReaderOutcome {
    debug!(partial_bytes = lines.pending(), "serial reader stopped");
    Ok(ReaderExit::Stopped)
}

fn fault(err: Error, queue: &LineQueue) -> ReaderOutcome {
    let kind = FaultKind::classify(&err);
    if !kind.is_reported() {
        debug!(error = %err, "port closed during read, reader exiting quietly");
        return Ok(ReaderExit::Closed);
    }

    let fault = ReaderFault::new(kind, err.to_string());
    match kind {
        FaultKind::Disconnected => tracing::warn!(error = %err, "serial device disconnected"),
        _ => tracing::error!(error = %err, kind = %kind, "serial reader failed"),
    }
    queue.push(ResponseUnit::Fault(fault.clone()));
    Err(fault)
}

/// Accumulates raw bytes and yields complete lines.
///
/// Bytes after the last separator are kept for the next push. Lines are
/// returned verbatim including the separator; invalid UTF-8 is replaced
/// rather than rejected. A line that outgrows the limit is dropped whole,
/// up to and including its separator.
#[derive(Debug)]
pub struct LineAssembler {
    buf: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl LineAssembler {
    /// Create an assembler that drops partial lines longer than `max_len`.
    pub fn new(max_len: usize) -> Self {
        LineAssembler {
            buf: Vec::new(),
            max_len,
            discarding: false,
        }
    }

    /// Feed bytes and collect every line they complete.
    pub fn push(&mut self, mut data: &[u8]) -> Vec<String> {
        if self.discarding {
            match data.iter().position(|&b| b == LINE_SEPARATOR) {
                Some(pos) => {
                    self.discarding = false;
                    data = &data[pos + 1..];
                }
                None => return Vec::new(),
            }
        }
        self.buf.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == LINE_SEPARATOR) {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        if self.buf.len() > self.max_len {
            tracing::warn!(
                len = self.buf.len(),
                "partial line exceeds limit, discarding"
            );
            self.buf.clear();
            self.discarding = true;
        }
        lines
    }

    /// Bytes held waiting for a separator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinlink_core::transport::Transport;
    use coinlink_test_harness::MockTransport;

    fn line(s: &str) -> ResponseUnit {
        ResponseUnit::Line(s.to_string())
    }

    fn spawn_on(mock: MockTransport) -> (LineQueue, ReaderHandle) {
        let queue = LineQueue::new();
        let (source, _writer) = Box::new(mock).split();
        let handle = spawn_reader(source, queue.clone(), ReaderConfig::default());
        (queue, handle)
    }

    // =======================================================================
    // LineAssembler
    // =======================================================================

    #[test]
    fn assembler_splits_lines_and_keeps_separator() {
        let mut asm = LineAssembler::new(64);
        assert_eq!(asm.push(b"one\ntwo\r\nthr"), vec!["one\n", "two\r\n"]);
        assert_eq!(asm.pending(), 3);
        assert_eq!(asm.push(b"ee\n"), vec!["three\n"]);
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn assembler_handles_empty_lines() {
        let mut asm = LineAssembler::new(64);
        assert_eq!(asm.push(b"\n\n"), vec!["\n", "\n"]);
    }

    #[test]
    fn assembler_discards_overlong_partial_line() {
        let mut asm = LineAssembler::new(4);
        assert!(asm.push(b"abcdefgh").is_empty());
        assert_eq!(asm.pending(), 0);
        // Everything up to the separator still belongs to the dropped line.
        assert!(asm.push(b"ok\n").is_empty());
        assert_eq!(asm.push(b"A12\n"), vec!["A12\n"]);
    }

    #[test]
    fn assembler_drops_tail_of_overlong_line() {
        let mut asm = LineAssembler::new(4);
        assert!(asm.push(b"A1-this-line-is-long").is_empty());
        assert!(asm.push(b"-still-going").is_empty());
        assert_eq!(asm.pending(), 0);
        assert_eq!(asm.push(b"-tail\nA21\nA3"), vec!["A21\n"]);
        assert_eq!(asm.pending(), 2);
        assert_eq!(asm.push(b"4\n"), vec!["A34\n"]);
    }

    #[test]
    fn assembler_replaces_invalid_utf8() {
        let mut asm = LineAssembler::new(64);
        let lines = asm.push(b"A1\xff\n");
        assert_eq!(lines, vec!["A1\u{fffd}\n"]);
    }

    // =======================================================================
    // Reader task
    // =======================================================================

    #[tokio::test]
    async fn reader_close_race_pushes_lines_only() {
        let mock = MockTransport::new();
        mock.feed(b"A12 one\n");
        mock.feed(b"A12 two\nA12 th");
        mock.feed(b"ree\n");
        mock.fail_close_race();

        let (queue, handle) = spawn_on(mock);
        let outcome = handle.join().await;

        assert_eq!(outcome, Ok(ReaderExit::Closed));
        assert_eq!(
            queue.drain_all(None),
            vec![line("A12 one\n"), line("A12 two\n"), line("A12 three\n")]
        );
    }

    #[tokio::test]
    async fn reader_io_error_is_queued_after_lines_and_returned() {
        let mock = MockTransport::new();
        mock.feed(b"A12 one\nA12 two\n");
        mock.fail_io("device vanished");

        let (queue, handle) = spawn_on(mock);
        let outcome = handle.join().await;

        let fault = outcome.unwrap_err();
        assert_eq!(fault.kind, FaultKind::Io);
        assert!(fault.message.contains("device vanished"));

        let units = queue.drain_all(None);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0], line("A12 one\n"));
        assert_eq!(units[1], line("A12 two\n"));
        assert_eq!(units[2], ResponseUnit::Fault(fault));
    }

    #[tokio::test]
    async fn reader_disconnect_is_reported() {
        let mock = MockTransport::new();
        mock.fail_with(Error::ConnectionLost);

        let (queue, handle) = spawn_on(mock);
        let fault = handle.join().await.unwrap_err();

        assert_eq!(fault.kind, FaultKind::Disconnected);
        assert_eq!(queue.drain_all(None), vec![ResponseUnit::Fault(fault)]);
    }

    #[tokio::test]
    async fn reader_unclassified_fault_is_reported() {
        let mock = MockTransport::new();
        mock.fail_with(Error::InvalidParameter("unexpected".into()));

        let (queue, handle) = spawn_on(mock);
        let fault = handle.join().await.unwrap_err();

        assert_eq!(fault.kind, FaultKind::Unclassified);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn reader_stop_ends_task_without_draining_queue() {
        let mock = MockTransport::new();
        mock.feed(b"A12 kept\n");
        let probe = mock.handle();

        let (queue, handle) = spawn_on(mock);
        while probe.pending_steps() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        handle.stop();
        assert_eq!(handle.join().await, Ok(ReaderExit::Stopped));
        assert_eq!(queue.drain_all(None), vec![line("A12 kept\n")]);
    }

    #[tokio::test(start_paused = true)]
    async fn reader_idles_between_empty_ticks() {
        let mock = MockTransport::new();
        let probe = mock.handle();
        let (_queue, handle) = spawn_on(mock);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let reads = probe.read_count();
        // One read per tick, one tick per idle interval.
        assert!((5..=12).contains(&reads), "unexpected read count {reads}");

        handle.stop();
        assert_eq!(handle.join().await, Ok(ReaderExit::Stopped));
    }

    #[tokio::test]
    async fn reader_picks_up_data_fed_while_running() {
        let mock = MockTransport::new();
        let probe = mock.handle();
        let (queue, handle) = spawn_on(mock);

        probe.feed(b"A31 late\n");
        while queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        handle.stop();
        handle.join().await.unwrap();
        assert_eq!(queue.drain_all(None), vec![line("A31 late\n")]);
    }

    #[tokio::test]
    async fn reader_fault_while_running_ends_task() {
        let mock = MockTransport::new();
        let probe = mock.handle();
        let (queue, handle) = spawn_on(mock);

        probe.feed(b"A12 before\n");
        probe.fail_io("usb reset");
        let fault = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("reader should end on fault")
            .unwrap_err();

        assert_eq!(
            queue.drain_all(None),
            vec![line("A12 before\n"), ResponseUnit::Fault(fault)]
        );
    }

    #[tokio::test]
    async fn dropping_handle_stops_reader() {
        let mock = MockTransport::new();
        let probe = mock.handle();
        let (_queue, handle) = spawn_on(mock);

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let reads = probe.read_count();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.read_count(), reads);
    }

    #[tokio::test]
    async fn reader_stop_is_observed_during_idle_wait() {
        let mock = MockTransport::new();
        let queue = LineQueue::new();
        let (source, _writer) = Box::new(mock).split();
        let config = ReaderConfig {
            idle_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let handle = spawn_reader(source, queue, config);

        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.cancellation_token().cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .expect("reader should stop promptly");
        assert_eq!(outcome, Ok(ReaderExit::Stopped));
    }
}
