//! Error taxonomy and the process-local diagnostic channel.

use std::cell::RefCell;
use std::fmt;

thread_local! {
    static LAST_ERROR: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Sub-kind of an [`Error::Io`] failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorKind {
    /// Frame CRC did not match.
    Crc,
    /// Device replied with a NACK carrying the given error code.
    Nack(u32),
    /// Fewer bytes were available than the transaction expected.
    ShortRead,
    /// The underlying transport reported a failure.
    Transport,
}

impl fmt::Display for IoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoErrorKind::Crc => write!(f, "CRC mismatch"),
            IoErrorKind::Nack(code) => write!(f, "NACK (0x{code:08x})"),
            IoErrorKind::ShortRead => write!(f, "short read"),
            IoErrorKind::Transport => write!(f, "transport failure"),
        }
    }
}

/// Error kinds a public operation of this crate may return.
///
/// The discriminant is the contract; the message carried alongside it (and
/// mirrored into [`last_error`]) is best-effort diagnostic text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Invalid(String),

    #[error("session is not in the required state: {0}")]
    State(String),

    #[error("already running: {0}")]
    Already(String),

    #[error("allocation failed: {0}")]
    NoMem(String),

    #[error("I/O error ({kind}): {detail}")]
    Io { kind: IoErrorKind, detail: String },

    #[error("operation timed out")]
    Timeout,

    #[error("not supported on this profile: {0}")]
    NotSupported(String),

    #[error("dictionary parse failed: {0}")]
    Parse(String),

    #[error("unknown language tag: {0}")]
    UnknownLang(String),

    #[error("unrecoverable fault: {0}")]
    Fault(String),
}

impl Error {
    pub(crate) fn io(kind: IoErrorKind, detail: impl Into<String>) -> Self {
        Error::Io { kind, detail: detail.into() }
    }

    /// Records this error's message as the calling thread's last error and
    /// returns `self`, so call sites can write `return Err(err).tap_err()`
    /// style chains as `some_op().map_err(Error::record)`.
    pub fn record(self) -> Self {
        set_last_error(self.to_string());
        self
    }
}

fn set_last_error(msg: String) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = msg);
}

/// Returns the calling thread's most recently recorded error message.
///
/// Empty if no operation on this thread has failed yet.
pub fn last_error() -> String {
    LAST_ERROR.with(|cell| cell.borrow().clone())
}

pub(crate) type Result<T> = std::result::Result<T, Error>;
