//! TCP transport: a fixed-endpoint, fixed-frame-size duplex link to an
//! embedded device (§4.2, §4.4).

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use super::{ReadOutcome, Transport};
use crate::config::TcpConfig;
use crate::error::{Error, IoErrorKind};

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Wraps an already-connected stream, used by tests that stand up a
    /// fake device with [`std::net::TcpListener`] rather than a real one.
    pub fn from_stream(stream: TcpStream) -> Self {
        TcpTransport { stream }
    }

    /// Connects to `config.address:config.port` (fixed port 23 by default).
    pub fn connect(config: &TcpConfig) -> Result<Self, Error> {
        let addr = format!("{}:{}", config.address, config.port);
        let stream = TcpStream::connect(&addr)
            .map_err(|e| Error::io(IoErrorKind::Transport, format!("connect {addr}: {e}")))?;
        stream
            .set_read_timeout(Some(config.read_timeout))
            .map_err(|e| Error::io(IoErrorKind::Transport, format!("set_read_timeout: {e}")))?;
        stream
            .set_write_timeout(Some(config.write_timeout))
            .map_err(|e| Error::io(IoErrorKind::Transport, format!("set_write_timeout: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::io(IoErrorKind::Transport, format!("set_nodelay: {e}")))?;
        Ok(TcpTransport { stream })
    }

    /// Writes a full frame in one call.
    pub fn send_frame(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.stream
            .write_all(bytes)
            .map_err(|e| Error::io(IoErrorKind::Transport, format!("tcp write: {e}")))
    }

    /// Reads exactly `buf.len()` bytes, the fixed TCP-profile frame size.
    pub fn recv_frame(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.stream.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::WouldBlock {
                Error::Timeout
            } else if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::io(IoErrorKind::ShortRead, "connection closed mid-frame")
            } else {
                Error::io(IoErrorKind::Transport, format!("tcp read: {e}"))
            }
        })
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        self.send_frame(bytes)?;
        Ok(bytes.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, Error> {
        match self.stream.read(buf) {
            Ok(0) => Ok(ReadOutcome::Empty),
            Ok(n) => Ok(ReadOutcome::Read(n)),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(ReadOutcome::Empty),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(ReadOutcome::Empty),
            Err(e) => Err(Error::io(IoErrorKind::Transport, format!("tcp read: {e}"))),
        }
    }

    fn read_wait(&mut self, _timeout: Duration) -> Result<(), Error> {
        // The TCP profile has no passive byte-stream ingest loop; transactions
        // are strictly one-frame in, one-frame out (§4.4).
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
