//! coinlink-core: error, transport and command types for coinlink.
//!
//! This crate holds the pieces every other coinlink crate agrees on: the
//! split [`Transport`] traits, the wire [`CommandCode`] set, and the shared
//! [`Error`] type. It performs no I/O itself.

pub mod error;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use transport::{Transport, TransportReader, TransportWriter};
pub use types::{CommandCode, ParseCommandCodeError};
