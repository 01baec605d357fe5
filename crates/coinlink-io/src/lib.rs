//! Host-side I/O for the coin controller.
//!
//! Frames go out through the codec, lines come back through a background
//! reader into a queue the caller drains whenever it likes.
//!
//! # Architecture
//!
//! - [`frame`]: command frame encoding and response field extraction
//! - [`queue`]: the thread-safe line queue and its filter
//! - [`fault`]: typed classification of read failures
//! - [`reader`]: the polling reader task
//! - [`bridge`] / [`builder`]: the context object tying them together
//!
//! # Example
//!
//! ```no_run
//! use coinlink_core::CommandCode;
//! use coinlink_io::{BridgeBuilder, Command, LineFilter};
//!
//! # async fn example() -> coinlink_core::Result<()> {
//! let mut bridge = BridgeBuilder::new().serial_port("/dev/ttyUSB0").build().await?;
//! bridge
//!     .send(&Command::new('1', CommandCode::SetBalance).with_operands(5, 300))
//!     .await?;
//!
//! let only_board_1 = LineFilter::new(['1']);
//! for unit in bridge.read(Some(&only_board_1)) {
//!     println!("{unit}");
//! }
//! bridge.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod builder;
pub mod fault;
pub mod frame;
pub mod queue;
pub mod reader;

pub use bridge::Bridge;
pub use builder::BridgeBuilder;
pub use fault::{FaultKind, ReaderFault};
pub use frame::{encode, Command};
pub use queue::{LineFilter, LineQueue, ResponseUnit};
pub use reader::{spawn_reader, ReaderConfig, ReaderExit, ReaderHandle, ReaderOutcome};
