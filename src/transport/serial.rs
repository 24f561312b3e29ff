//! Serial transport: a blocking byte stream with read/write timeouts.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use super::{ReadOutcome, Transport};
use crate::config::SerialConfig;
use crate::error::{Error, IoErrorKind};

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Opens the configured serial port.
    pub fn open(config: &SerialConfig) -> Result<Self, Error> {
        let port = serialport::new(&config.port, config.baudrate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| Error::io(IoErrorKind::Transport, format!("open {}: {e}", config.port)))?;

        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        self.port
            .write(bytes)
            .map_err(|e| Error::io(IoErrorKind::Transport, format!("serial write: {e}")))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, Error> {
        match self.port.read(buf) {
            Ok(0) => Ok(ReadOutcome::Empty),
            Ok(n) => Ok(ReadOutcome::Read(n)),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(ReadOutcome::Empty),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(ReadOutcome::Empty),
            Err(e) => Err(Error::io(IoErrorKind::Transport, format!("serial read: {e}"))),
        }
    }

    fn read_wait(&mut self, timeout: Duration) -> Result<(), Error> {
        let poll_interval = Duration::from_millis(5);
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let available = self
                .port
                .bytes_to_read()
                .map_err(|e| Error::io(IoErrorKind::Transport, format!("serial bytes_to_read: {e}")))?;
            if available > 0 {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(Error::Timeout.record());
            }
            std::thread::sleep(poll_interval.min(deadline - std::time::Instant::now()));
        }
    }

    fn close(&mut self) {
        // `serialport` has no explicit close; dropping the handle releases
        // the OS file descriptor. Nothing to do here beyond the Drop impl.
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| Error::io(IoErrorKind::Transport, format!("serial clear: {e}")))
    }
}

/// Lists the serial device paths currently present on the system.
pub fn available_ports() -> Result<Vec<String>, Error> {
    let ports = serialport::available_ports()
        .map_err(|e| Error::io(IoErrorKind::Transport, format!("enumerate ports: {e}")))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
