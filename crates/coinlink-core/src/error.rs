//! Error types for coinlink.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, bad command input,
//! and write-side errors on a closed connection are all captured here.

/// The error type for all coinlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (opening or configuring the serial port).
    #[error("transport error: {0}")]
    Transport(String),

    /// An invalid setting was passed to a builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The connection has been closed or was never opened.
    #[error("not connected")]
    NotConnected,

    /// The device went away while the connection was open.
    ///
    /// Reported when the serial stream reaches end-of-file or the OS
    /// reports a broken pipe, which is how an unplugged USB adapter shows up.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
