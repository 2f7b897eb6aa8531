//! UART framing between the host and the coordinator.
//!
//! ```text
//! +------+----------------------+-------+------+
//! | 0x7E | DPA packet (escaped) | CRC-8 | 0x7E |
//! +------+----------------------+-------+------+
//! ```
//!
//! `0x7E` and `0x7D` inside the frame are sent as `0x7D` followed by the byte
//! XOR `0x20`. The CRC covers the unescaped packet and is escaped like data.

use log::trace;

use crate::{
    error::{Error, Result},
    protocol::crc::{CRC8_INIT, crc8, crc8_update},
};

/// Frame delimiter.
pub const FLAG: u8 = 0x7E;

/// Escape byte.
pub const ESCAPE: u8 = 0x7D;

/// Value XORed into escaped bytes.
pub const ESCAPE_XOR: u8 = 0x20;

/// Largest accepted packet (DPA header + 56 data bytes + CRC, with margin).
pub const MAX_FRAME_LEN: usize = 128;

fn push_escaped(out: &mut Vec<u8>, byte: u8) {
    if byte == FLAG || byte == ESCAPE {
        out.push(ESCAPE);
        out.push(byte ^ ESCAPE_XOR);
    } else {
        out.push(byte);
    }
}

/// Wrap a DPA packet into a UART frame.
pub fn encode_frame(packet: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packet.len() * 2 + 4);
    out.push(FLAG);
    for byte in packet {
        push_escaped(&mut out, *byte);
    }
    push_escaped(&mut out, crc8(packet));
    out.push(FLAG);
    out
}

/// Incremental frame decoder fed with raw bytes from the port.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    in_frame: bool,
    escaped: bool,
}

impl FrameDecoder {
    /// New decoder waiting for a start flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_frame = false;
        self.escaped = false;
    }

    /// Feed one byte; returns a packet when a frame completes.
    ///
    /// A closing flag also opens the next frame, so back-to-back frames
    /// sharing a flag are accepted. Empty frames are skipped.
    pub fn push(&mut self, byte: u8) -> Option<Result<Vec<u8>>> {
        if byte == FLAG {
            let completed = self.in_frame && !self.buf.is_empty();
            let frame = std::mem::take(&mut self.buf);
            let escaped = self.escaped;
            self.in_frame = true;
            self.escaped = false;
            if !completed {
                return None;
            }
            if escaped {
                return Some(Err(Error::Framing("frame ends inside escape".into())));
            }
            return Some(Self::check(frame));
        }

        if !self.in_frame {
            trace!("Skipping byte 0x{byte:02X} outside frame");
            return None;
        }

        if self.escaped {
            self.buf.push(byte ^ ESCAPE_XOR);
            self.escaped = false;
        } else if byte == ESCAPE {
            self.escaped = true;
        } else {
            self.buf.push(byte);
        }

        if self.buf.len() > MAX_FRAME_LEN {
            self.reset();
            return Some(Err(Error::Framing("frame too long".into())));
        }
        None
    }

    fn check(mut frame: Vec<u8>) -> Result<Vec<u8>> {
        if frame.len() < 2 {
            return Err(Error::Framing("frame too short".into()));
        }
        if frame.iter().fold(CRC8_INIT, |crc, b| crc8_update(crc, *b)) != 0 {
            return Err(Error::Framing("CRC mismatch".into()));
        }
        frame.pop();
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Result<Vec<u8>>> {
        let mut decoder = FrameDecoder::new();
        bytes.iter().filter_map(|b| decoder.push(*b)).collect()
    }

    #[test]
    fn test_escaping() {
        let frame = encode_frame(&[0x7E, 0x01, 0x7D]);
        assert_eq!(&frame[..6], &[FLAG, 0x7D, 0x5E, 0x01, 0x7D, 0x5D]);
        assert_eq!(*frame.last().unwrap(), FLAG);
    }

    #[test]
    fn test_decode_with_noise_and_shared_flags() {
        let a = [0x00, 0x00, 0x02, 0x80, 0xFF, 0xFF, 0x00, 0x00];
        let b = [0x7E, 0x7D, 0x01];
        let mut stream = vec![0x55, 0xAA];
        stream.extend(encode_frame(&a));
        // Second frame reuses the closing flag of the first.
        stream.extend(&encode_frame(&b)[1..]);

        let frames = decode_all(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap(), &a);
        assert_eq!(frames[1].as_ref().unwrap(), &b);
    }

    #[test]
    fn test_crc_mismatch() {
        let mut frame = encode_frame(&[1, 2, 3]);
        frame[2] ^= 0x01;
        let frames = decode_all(&frame);
        assert!(matches!(frames[0], Err(Error::Framing(_))));
    }
}
