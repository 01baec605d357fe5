//! Classification of read-side failures.
//!
//! The reader classifies an error exactly once, at the read boundary, and
//! then acts on the [`FaultKind`]. Only [`FaultKind::CloseRace`] is silent:
//! it is what a port closed underneath an in-flight read looks like, and is
//! expected during shutdown.

use std::fmt;
use std::io::ErrorKind;

use coinlink_core::Error;

/// OS error code for "bad file descriptor" on Unix.
#[cfg(unix)]
pub const BAD_FILE_DESCRIPTOR: i32 = 9;
/// `ERROR_INVALID_HANDLE`, the Windows counterpart.
#[cfg(windows)]
pub const BAD_FILE_DESCRIPTOR: i32 = 6;

/// What kind of failure ended the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The handle was closed while a read was in flight. Not reported.
    CloseRace,
    /// The device went away or the connection was closed.
    Disconnected,
    /// Any other operating-system I/O error.
    Io,
    /// A failure that is not an I/O error at all.
    Unclassified,
}

impl FaultKind {
    /// Map a transport error to its fault kind.
    pub fn classify(err: &Error) -> FaultKind {
        match err {
            Error::Io(e) if e.raw_os_error() == Some(BAD_FILE_DESCRIPTOR) => FaultKind::CloseRace,
            Error::Io(e)
                if matches!(
                    e.kind(),
                    ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof
                ) =>
            {
                FaultKind::Disconnected
            }
            Error::Io(_) => FaultKind::Io,
            Error::NotConnected | Error::ConnectionLost | Error::Transport(_) => {
                FaultKind::Disconnected
            }
            Error::InvalidParameter(_) => FaultKind::Unclassified,
        }
    }

    /// Whether a fault of this kind is pushed to the queue.
    pub fn is_reported(self) -> bool {
        self != FaultKind::CloseRace
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::CloseRace => write!(f, "closed during read"),
            FaultKind::Disconnected => write!(f, "disconnected"),
            FaultKind::Io => write!(f, "I/O error"),
            FaultKind::Unclassified => write!(f, "unclassified fault"),
        }
    }
}

/// A captured reader failure.
///
/// Cloneable so the same fault can sit in the line queue and be returned
/// as the reader task's result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ReaderFault {
    /// Classified kind.
    pub kind: FaultKind,
    /// Rendered description of the underlying error.
    pub message: String,
}

impl ReaderFault {
    /// Create a fault with an explicit kind.
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        ReaderFault {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for ReaderFault {
    fn from(err: &Error) -> Self {
        ReaderFault::new(FaultKind::classify(err), err.to_string())
    }
}
