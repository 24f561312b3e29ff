//! Byte-level reassembly state machine for the serial transport (§4.1).

use crate::frame::{SerialFrame, MAX_PAYLOAD};

const SERIAL_STX: u8 = 0x02;
const SERIAL_ETX: u8 = 0x03;
/// node(1) + idx(2) + sidx(1) + len(1) + payload(MAX_PAYLOAD) + crc(2).
const MAX_BODY_LEN: usize = 5 + MAX_PAYLOAD + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Header,
    Payload,
    Complete,
    Error,
}

/// Outcome of feeding one byte into the [`Framer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The byte was consumed; no complete frame yet.
    Progress,
    /// A complete frame is available via [`Framer::take_frame`].
    Complete,
    /// The byte stream could not be parsed; the framer has reset.
    Error,
}

/// Byte-at-a-time reassembly of the serial wire format into complete
/// frames. One framer is owned per session listener.
pub struct Framer {
    state: State,
    buf: Vec<u8>,
    expected_len: Option<usize>,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Framer { state: State::Idle, buf: Vec::with_capacity(MAX_BODY_LEN), expected_len: None }
    }

    fn reset(&mut self) {
        self.state = State::Idle;
        self.buf.clear();
        self.expected_len = None;
    }

    /// Feeds a single byte read off the wire.
    ///
    /// On [`Progress::Error`] the framer has already reset; per §4.1 the
    /// caller should re-feed the same byte once, to resync on a potential
    /// header boundary that this byte may itself begin.
    pub fn push(&mut self, byte: u8) -> Progress {
        match self.state {
            State::Idle => {
                if byte == SERIAL_STX {
                    self.buf.clear();
                    self.state = State::Header;
                    Progress::Progress
                } else {
                    Progress::Progress
                }
            }
            State::Header => {
                self.buf.push(byte);
                // node(1) + idx(2) + sidx(1) + len(1) = 5 header bytes.
                if self.buf.len() == 5 {
                    let len = self.buf[4] as usize;
                    if len > MAX_PAYLOAD {
                        self.reset();
                        return Progress::Error;
                    }
                    self.expected_len = Some(5 + len + 2); // + payload + crc
                    self.state = State::Payload;
                }
                Progress::Progress
            }
            State::Payload => {
                self.buf.push(byte);
                if Some(self.buf.len()) == self.expected_len {
                    self.state = State::Complete;
                    return Progress::Progress;
                }
                Progress::Progress
            }
            State::Complete => {
                // Latched until the consumer calls `take_frame`; this byte
                // must be the trailing ETX.
                if byte == SERIAL_ETX {
                    Progress::Complete
                } else {
                    self.reset();
                    Progress::Error
                }
            }
            State::Error => {
                self.reset();
                self.push(byte)
            }
        }
    }

    /// Decodes and returns the frame latched by a prior [`Progress::Complete`],
    /// then resets the framer for the next frame.
    pub fn take_frame(&mut self) -> Option<SerialFrame> {
        if self.state != State::Complete {
            return None;
        }
        let mut wire = Vec::with_capacity(self.buf.len() + 2);
        wire.push(SERIAL_STX);
        wire.extend_from_slice(&self.buf);
        wire.push(SERIAL_ETX);
        self.reset();
        SerialFrame::decode(&wire).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_serial;

    #[test]
    fn reassembles_a_single_frame() {
        let frame = encode_serial(3, 0x0011, 0, &[0x34, 0x12]).unwrap();
        let wire = frame.to_bytes();

        let mut framer = Framer::new();
        let mut last = Progress::Progress;
        for &b in &wire {
            last = framer.push(b);
        }
        assert_eq!(last, Progress::Complete);
        assert_eq!(framer.take_frame(), Some(frame));
    }

    #[test]
    fn resyncs_after_garbage_prefix() {
        let frame = encode_serial(3, 0x0011, 0, &[]).unwrap();
        let wire = frame.to_bytes();

        let mut framer = Framer::new();
        // Garbage bytes before the real frame are absorbed in Idle state.
        for junk in [0xFF, 0x00, 0x7A] {
            assert_eq!(framer.push(junk), Progress::Progress);
        }
        let mut last = Progress::Progress;
        for &b in &wire {
            last = framer.push(b);
        }
        assert_eq!(last, Progress::Complete);
        assert_eq!(framer.take_frame(), Some(frame));
    }

    #[test]
    fn rejects_oversized_length_byte() {
        let mut framer = Framer::new();
        framer.push(SERIAL_STX);
        framer.push(1); // node
        framer.push(0); // idx lo
        framer.push(0); // idx hi
        framer.push(0); // sidx
        let r = framer.push(0xFF); // len byte, way over MAX_PAYLOAD
        assert_eq!(r, Progress::Error);
    }

    #[test]
    fn two_frames_back_to_back() {
        let f1 = encode_serial(1, 1, 0, &[0x01]).unwrap();
        let f2 = encode_serial(2, 2, 0, &[0x02]).unwrap();
        let mut wire = f1.to_bytes();
        wire.extend_from_slice(&f2.to_bytes());

        let mut framer = Framer::new();
        let mut frames = Vec::new();
        for &b in &wire {
            if framer.push(b) == Progress::Complete {
                frames.push(framer.take_frame().unwrap());
            }
        }
        assert_eq!(frames, vec![f1, f2]);
    }
}
