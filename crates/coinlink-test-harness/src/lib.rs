//! coinlink-test-harness: mock transports for coinlink tests.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! background reader and the bridge without a board attached.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport};
