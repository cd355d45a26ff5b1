//! Wire framing: a fixed-shape binary envelope around each message, with an
//! FNV-1a checksum covering everything but the checksum itself.
//!
//! ```text
//! cmd:1 | counter:2 | len:4 | payload:len | checksum:4
//! ```
//!
//! All multi-byte fields are big-endian. Grounded in the original
//! emulator's `protocol.Encode`/`protocol.Decode` (same FNV-1a constants,
//! same command bytes) extended with the `counter` field this format adds,
//! and structured the way the reference crate's own incremental frame
//! decoder (`FrameDecoder`) is shaped: a pure `encode`/`decode` pair for
//! whole buffers, plus a stateful decoder for streamed transports that may
//! deliver partial frames.

use crate::errors::FrameError;

pub const CMD_MSG: u8 = 0x1;
pub const CMD_RESIZE: u8 = 0x2;

pub const MAX_DATA_SIZE: usize = 262_144;

const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;
const FNV_PRIME: u32 = 0x0100_0193;

const HEADER_LEN: usize = 1 + 2 + 4;
const CHECKSUM_LEN: usize = 4;

fn fnv1a(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in data {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// A decoded frame: command byte, per-connection monotonic counter, and
/// payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd: u8,
    pub counter: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn msg(counter: u16, payload: Vec<u8>) -> Self {
        Frame {
            cmd: CMD_MSG,
            counter,
            payload,
        }
    }

    pub fn resize(counter: u16, payload: Vec<u8>) -> Self {
        Frame {
            cmd: CMD_RESIZE,
            counter,
            payload,
        }
    }

    /// Encode into the wire format described above.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MAX_DATA_SIZE {
            return Err(FrameError::InvalidSize {
                declared: self.payload.len(),
                max: MAX_DATA_SIZE,
            });
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        buf.push(self.cmd);
        buf.extend_from_slice(&self.counter.to_be_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        let checksum = fnv1a(&buf);
        buf.extend_from_slice(&checksum.to_be_bytes());
        Ok(buf)
    }

    /// Decode a single, complete frame from `buf`. `buf` must contain
    /// exactly one frame (no trailing bytes); use [`FrameDecoder`] to pull
    /// frames out of a byte stream that may deliver partial or batched
    /// frames.
    pub fn decode(buf: &[u8]) -> Result<Frame, FrameError> {
        if buf.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(FrameError::InvalidSize {
                declared: buf.len(),
                max: MAX_DATA_SIZE,
            });
        }
        let cmd = buf[0];
        let counter = u16::from_be_bytes([buf[1], buf[2]]);
        let len = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]) as usize;
        if len > MAX_DATA_SIZE || buf.len() != HEADER_LEN + len + CHECKSUM_LEN {
            return Err(FrameError::InvalidSize {
                declared: len,
                max: MAX_DATA_SIZE,
            });
        }
        let body_end = HEADER_LEN + len;
        let payload = buf[HEADER_LEN..body_end].to_vec();
        let expected = u32::from_be_bytes(
            buf[body_end..body_end + CHECKSUM_LEN]
                .try_into()
                .expect("slice length checked above"),
        );
        let actual = fnv1a(&buf[..body_end]);
        if expected != actual {
            return Err(FrameError::InvalidChecksum { expected, actual });
        }
        Ok(Frame {
            cmd,
            counter,
            payload,
        })
    }
}

/// Reassembles frames out of a byte stream that may deliver less than one
/// frame, exactly one frame, or several frames per read — the shape every
/// stream transport (TCP, Unix socket) actually has, even though a
/// WebSocket transport delivers whole messages and never needs this.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder { buf: Vec::new() }
    }

    /// Feed newly-received bytes in and pull out every frame that is now
    /// complete. Partial trailing bytes are kept for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, FrameError> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let len = u32::from_be_bytes([self.buf[3], self.buf[4], self.buf[5], self.buf[6]])
                as usize;
            if len > MAX_DATA_SIZE {
                return Err(FrameError::InvalidSize {
                    declared: len,
                    max: MAX_DATA_SIZE,
                });
            }
            let total = HEADER_LEN + len + CHECKSUM_LEN;
            if self.buf.len() < total {
                break;
            }
            let frame_bytes: Vec<u8> = self.buf.drain(..total).collect();
            frames.push(Frame::decode(&frame_bytes)?);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let f = Frame::msg(7, b"hi there".to_vec());
        let bytes = f.encode().unwrap();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn matches_the_documented_wire_vector() {
        // cmd=MSG counter=1 payload="hello"
        let bytes = Frame::msg(1, b"hello".to_vec()).encode().unwrap();
        assert_eq!(
            bytes,
            vec![
                0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x68, 0x65, 0x6C, 0x6C, 0x6F, 0x7C,
                0xE8, 0x63, 0x68,
            ]
        );
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.cmd, CMD_MSG);
        assert_eq!(decoded.counter, 1);
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = Frame::msg(1, b"hello".to_vec()).encode().unwrap();
        bytes[7] = b'H'; // flip first payload byte
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn oversized_payload_rejected_on_encode() {
        let f = Frame::msg(0, vec![0u8; MAX_DATA_SIZE + 1]);
        assert!(matches!(
            f.encode(),
            Err(FrameError::InvalidSize { .. })
        ));
    }

    #[test]
    fn reserved_command_bytes_decode_rather_than_error() {
        // non-{MSG,RESIZE} command bytes are reserved for future use, not
        // invalid; decode should hand the byte back for the caller to judge.
        let f = Frame {
            cmd: 0x99,
            counter: 0,
            payload: b"x".to_vec(),
        };
        let bytes = f.encode().unwrap();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.cmd, 0x99);
        assert_eq!(decoded.payload, b"x");
    }

    #[test]
    fn decoder_reassembles_partial_and_batched_frames() {
        let a = Frame::msg(1, b"abc".to_vec()).encode().unwrap();
        let b = Frame::resize(2, b"24:80".to_vec()).encode().unwrap();

        let mut dec = FrameDecoder::new();
        // byte-at-a-time for the first frame
        let mut got = Vec::new();
        for byte in &a {
            got.extend(dec.feed(&[*byte]).unwrap());
        }
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload, b"abc");

        // both remaining frames arrive batched in one read
        let mut combined = b.clone();
        combined.extend_from_slice(&a);
        let got2 = dec.feed(&combined).unwrap();
        assert_eq!(got2.len(), 2);
        assert_eq!(got2[0].cmd, CMD_RESIZE);
        assert_eq!(got2[1].payload, b"abc");
    }

    #[test]
    fn decoder_rejects_a_frame_whose_declared_length_is_too_large() {
        let mut dec = FrameDecoder::new();
        let mut header = vec![CMD_MSG, 0, 0];
        header.extend_from_slice(&((MAX_DATA_SIZE + 1) as u32).to_be_bytes());
        assert!(dec.feed(&header).is_err());
    }
}
