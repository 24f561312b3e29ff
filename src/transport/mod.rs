//! Transport abstraction (§4.2): a uniform capability interface over a
//! byte-oriented stream transport (serial) or a fixed-frame TCP link,
//! generalized from the teacher's `NetworkInterface` driver trait.

#[cfg(feature = "serial")]
pub mod serial;
#[cfg(feature = "tcp")]
pub mod tcp;

use std::time::Duration;

use crate::error::Error;

/// Outcome of a non-blocking style read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were copied into the caller's buffer.
    Read(usize),
    /// Nothing was available right now.
    Empty,
}

/// A duplex link to an MCB device, abstracted over the physical medium.
///
/// Implementations are owned exclusively by one [`crate::session::Session`]
/// and are only touched by callers under the session lock, or by the
/// listener between caller transactions (§5 "Shared resources").
pub trait Transport: Send {
    /// Writes `bytes` to the link, returning the number of bytes written.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error>;

    /// Attempts to fill `buf` without blocking beyond the configured
    /// timeout; returns [`ReadOutcome::Empty`] rather than erroring when
    /// nothing is available yet.
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, Error>;

    /// Blocks until more data is likely available or `timeout` elapses.
    fn read_wait(&mut self, timeout: Duration) -> Result<(), Error>;

    /// Closes the underlying link. Implementations must tolerate being
    /// called more than once.
    fn close(&mut self);

    /// Discards any buffered but unconsumed data. Transports for which this
    /// has no meaning (e.g. a single-exchange TCP link) may no-op.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
