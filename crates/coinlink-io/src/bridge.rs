//! The bridge: one open connection, its line queue and its reader.
//!
//! [`Bridge`] is the context object client code holds. It owns the write
//! half of the connection, shares the [`LineQueue`] with the background
//! reader, and keeps the [`ReaderHandle`] for teardown. Sending a command
//! and draining responses are independent: the reader keeps filling the
//! queue while frames are written.

use tracing::debug;

use coinlink_core::error::{Error, Result};
use coinlink_core::transport::{Transport, TransportWriter};

use crate::frame::Command;
use crate::queue::{LineFilter, LineQueue, ResponseUnit};
use crate::reader::{spawn_reader, ReaderConfig, ReaderHandle, ReaderOutcome};

/// An open connection to the coin controller.
///
/// Dropping a bridge without [`shutdown`](Self::shutdown) still stops its
/// reader; the write half is dropped without a final flush.
pub struct Bridge {
    port_name: String,
    writer: Box<dyn TransportWriter>,
    queue: LineQueue,
    reader: ReaderHandle,
}

impl Bridge {
    /// Split `transport` and start its reader on the current runtime.
    pub fn start(transport: Box<dyn Transport>, config: ReaderConfig) -> Self {
        let port_name = transport.name().to_string();
        let (source, writer) = transport.split();
        let queue = LineQueue::new();
        let reader = spawn_reader(source, queue.clone(), config);
        debug!(port = %port_name, "bridge started");

        Bridge {
            port_name,
            writer,
            queue,
            reader,
        }
    }

    /// Name of the underlying port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Encode `command` and write it to the controller.
    ///
    /// Fails with [`Error::NotConnected`] once the connection is closed.
    /// Write errors are returned to the caller as-is.
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        if !self.writer.is_connected() {
            return Err(Error::NotConnected);
        }
        let frame = command.encode();
        debug!(
            port = %self.port_name,
            frame = %String::from_utf8_lossy(&frame),
            "sending command"
        );
        self.writer.send(&frame).await
    }

    /// Drain every queued response, optionally keeping only matching lines.
    ///
    /// Never waits; an empty queue yields an empty vector. Reader faults are
    /// returned whatever the filter.
    pub fn read(&self, filter: Option<&LineFilter>) -> Vec<ResponseUnit> {
        self.queue.drain_all(filter)
    }

    /// The queue the reader pushes to.
    pub fn queue(&self) -> &LineQueue {
        &self.queue
    }

    /// Whether the reader task has ended (stopped or faulted).
    pub fn reader_finished(&self) -> bool {
        self.reader.is_finished()
    }

    /// Ask the reader to stop without closing the connection.
    pub fn stop_reader(&self) {
        self.reader.stop();
    }

    /// Stop the reader, close the connection and return the reader's outcome.
    ///
    /// Responses still queued are left in [`queue`](Self::queue) clones.
    pub async fn shutdown(mut self) -> Result<ReaderOutcome> {
        self.reader.stop();
        self.writer.close().await?;
        let outcome = self.reader.join().await;
        debug!(port = %self.port_name, ?outcome, "bridge shut down");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use coinlink_core::CommandCode;
    use coinlink_test_harness::MockTransport;

    use crate::fault::FaultKind;
    use crate::reader::ReaderExit;

    async fn wait_for_lines(bridge: &Bridge, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while bridge.queue().len() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("reader did not deliver lines in time");
    }

    #[tokio::test]
    async fn bridge_sends_encoded_frames() {
        let mock = MockTransport::new();
        let probe = mock.handle();
        let mut bridge = Bridge::start(Box::new(mock), ReaderConfig::default());

        let cmd = Command::new('1', CommandCode::SetBalance).with_operands(5, 300);
        bridge.send(&cmd).await.unwrap();
        bridge
            .send(&Command::new('2', CommandCode::OutputTest))
            .await
            .unwrap();

        assert_eq!(
            probe.sent_data(),
            vec![b"AF1ZS5442FA".to_vec(), b"AF2ZO000FA".to_vec()]
        );
        bridge.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn bridge_read_drains_with_and_without_filter() {
        let mock = MockTransport::new();
        mock.feed(b"A12 balance\nA34 coins\nA41 shake\n");
        let bridge = Bridge::start(Box::new(mock), ReaderConfig::default());
        wait_for_lines(&bridge, 3).await;

        let filter = LineFilter::new(['1']);
        let matched = bridge.read(Some(&filter));
        assert_eq!(
            matched,
            vec![
                ResponseUnit::Line("A12 balance\n".into()),
                ResponseUnit::Line("A41 shake\n".into()),
            ]
        );
        assert!(bridge.read(None).is_empty());
        bridge.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn bridge_shutdown_is_a_silent_close() {
        let mock = MockTransport::new();
        mock.feed(b"A12 hello\n");
        let probe = mock.handle();
        let bridge = Bridge::start(Box::new(mock), ReaderConfig::default());
        wait_for_lines(&bridge, 1).await;
        let queue = bridge.queue().clone();

        let outcome = bridge.shutdown().await.unwrap();
        assert!(matches!(outcome, Ok(ReaderExit::Stopped) | Ok(ReaderExit::Closed)));
        assert!(probe.is_closed());
        assert_eq!(queue.drain_all(None), vec![ResponseUnit::Line("A12 hello\n".into())]);
    }

    #[tokio::test]
    async fn bridge_send_after_close_is_not_connected() {
        let mock = MockTransport::new();
        let mut bridge = Bridge::start(Box::new(mock), ReaderConfig::default());
        bridge.writer.close().await.unwrap();

        let result = bridge.send(&Command::new('1', CommandCode::Abort)).await;
        assert!(matches!(result, Err(Error::NotConnected)));

        // The reader sees the closed port as a close race and ends quietly.
        tokio::time::timeout(Duration::from_secs(5), async {
            while !bridge.reader_finished() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        assert!(bridge.read(None).is_empty());
    }

    #[tokio::test]
    async fn bridge_surfaces_reader_fault_through_queue() {
        let mock = MockTransport::new();
        mock.feed(b"A12 last words\n");
        mock.fail_io("device vanished");
        let bridge = Bridge::start(Box::new(mock), ReaderConfig::default());
        wait_for_lines(&bridge, 2).await;

        let units = bridge.read(None);
        assert_eq!(units[0], ResponseUnit::Line("A12 last words\n".into()));
        assert!(units[1].is_fault());

        let fault = bridge.shutdown().await.unwrap().unwrap_err();
        assert_eq!(fault.kind, FaultKind::Io);
    }

    #[tokio::test]
    async fn dropped_bridge_stops_polling() {
        let mock = MockTransport::new();
        let probe = mock.handle();
        let bridge = Bridge::start(Box::new(mock), ReaderConfig::default());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(probe.read_count() > 0);

        drop(bridge);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let reads = probe.read_count();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.read_count(), reads, "reader kept polling after drop");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writes_and_reads_do_not_interleave() {
        const FRAMES: u16 = 200;
        const LINES: usize = 200;

        let mock = MockTransport::new();
        let probe = mock.handle();
        let mut bridge = Bridge::start(Box::new(mock), ReaderConfig::default());

        let feeder = {
            let probe = probe.clone();
            tokio::spawn(async move {
                for i in 0..LINES {
                    // Split each line across two reads.
                    probe.feed(format!("A1{i:04}").as_bytes());
                    probe.feed(b" ok\n");
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut expected = Vec::new();
        for i in 0..FRAMES {
            let cmd = Command::new('1', CommandCode::SetCoinCount).with_operands(1, i);
            expected.push(cmd.encode());
            bridge.send(&cmd).await.unwrap();
        }
        feeder.await.unwrap();
        wait_for_lines(&bridge, LINES).await;

        assert_eq!(probe.sent_data(), expected);
        let lines: Vec<String> = bridge
            .read(None)
            .into_iter()
            .map(|u| u.as_line().unwrap().to_string())
            .collect();
        let want: Vec<String> = (0..LINES).map(|i| format!("A1{i:04} ok\n")).collect();
        assert_eq!(lines, want);

        bridge.shutdown().await.unwrap().unwrap();
    }
}
