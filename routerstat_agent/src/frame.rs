//! WebSocket framing, the subset this agent speaks.
//!
//! Server frames go out unmasked as single FIN text frames. Client frames are
//! decoded incrementally from a buffer: a partial frame stays buffered until
//! the rest arrives. Lengths use the three-tier scheme: 0..=125 inline, 126
//! followed by a u16, 127 followed by a u64 (both big-endian).

use crate::error::FrameError;
use bytes::{Buf, BufMut, BytesMut};

const FIN: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const LEN_U16: u8 = 126;
const LEN_U64: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    Other(u8),
}

impl Opcode {
    pub fn from_u8(v: u8) -> Self {
        match v & 0x0F {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
            Self::Other(v) => v & 0x0F,
        }
    }
}

/// How a payload length is carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthTier {
    Small,
    Extended,
    Huge,
}

impl LengthTier {
    pub fn for_len(len: u64) -> Self {
        match len {
            0..=125 => Self::Small,
            126..=65535 => Self::Extended,
            _ => Self::Huge,
        }
    }

    /// Bytes of the header before any mask key.
    pub fn header_len(self) -> usize {
        match self {
            Self::Small => 2,
            Self::Extended => 4,
            Self::Huge => 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub masked: bool,
    /// Already unmasked.
    pub payload: Vec<u8>,
}

fn put_header(out: &mut BytesMut, first: u8, mask_bit: u8, len: usize) {
    out.put_u8(first);
    let len = len as u64;
    match LengthTier::for_len(len) {
        LengthTier::Small => out.put_u8(mask_bit | len as u8),
        LengthTier::Extended => {
            out.put_u8(mask_bit | LEN_U16);
            out.put_u16(len as u16);
        }
        LengthTier::Huge => {
            out.put_u8(mask_bit | LEN_U64);
            out.put_u64(len);
        }
    }
}

/// Server -> client: FIN text frame, no mask.
pub fn encode_text(payload: &[u8]) -> BytesMut {
    encode(Opcode::Text, payload)
}

pub fn encode(opcode: Opcode, payload: &[u8]) -> BytesMut {
    let tier = LengthTier::for_len(payload.len() as u64);
    let mut out = BytesMut::with_capacity(tier.header_len() + payload.len());
    put_header(&mut out, FIN | opcode.as_u8(), 0, payload.len());
    out.put_slice(payload);
    out
}

/// Client -> server: FIN frame masked with `mask`.
pub fn encode_masked(opcode: Opcode, payload: &[u8], mask: [u8; 4]) -> BytesMut {
    let tier = LengthTier::for_len(payload.len() as u64);
    let mut out = BytesMut::with_capacity(tier.header_len() + 4 + payload.len());
    put_header(&mut out, FIN | opcode.as_u8(), MASK_BIT, payload.len());
    out.put_slice(&mask);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    out
}

pub fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b ^= mask[i % 4];
    }
}

/// Incremental decoder over a byte buffer filled from the socket.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_payload: u64,
    require_mask: bool,
}

impl FrameDecoder {
    /// Decodes client frames: masking required, payloads above `max_payload` rejected.
    pub fn server(max_payload: u64) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_payload,
            require_mask: true,
        }
    }

    /// Decodes server frames (unmasked), no size limit.
    pub fn client() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            max_payload: u64::MAX,
            require_mask: false,
        }
    }

    /// Buffer to read socket bytes into.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete frame, or `Ok(None)` if more bytes are needed.
    pub fn decode(&mut self) -> Result<Option<Frame>, FrameError> {
        let buf = &self.buf[..];
        if buf.len() < 2 {
            return Ok(None);
        }
        let fin = buf[0] & FIN != 0;
        let opcode = Opcode::from_u8(buf[0]);
        let masked = buf[1] & MASK_BIT != 0;
        if self.require_mask && !masked {
            return Err(FrameError::Unmasked);
        }

        let (len, mut pos) = match buf[1] & 0x7F {
            LEN_U16 => {
                let Some(b) = buf.get(2..4) else {
                    return Ok(None);
                };
                (u16::from_be_bytes([b[0], b[1]]) as u64, 4)
            }
            LEN_U64 => {
                let Some(b) = buf.get(2..10) else {
                    return Ok(None);
                };
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                (u64::from_be_bytes(raw), 10)
            }
            n => (n as u64, 2),
        };
        if len > self.max_payload {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_payload,
            });
        }
        let len = usize::try_from(len).map_err(|_| FrameError::TooLarge {
            len,
            max: usize::MAX as u64,
        })?;

        let mut mask = None;
        if masked {
            let Some(b) = buf.get(pos..pos + 4) else {
                return Ok(None);
            };
            mask = Some([b[0], b[1], b[2], b[3]]);
            pos += 4;
        }
        let avail = buf.len() - pos;
        if avail < len {
            // grow toward the full frame, at most 1 MiB per wakeup
            self.buf.reserve((len - avail).min(1 << 20));
            return Ok(None);
        }

        self.buf.advance(pos);
        let mut payload = self.buf.split_to(len).to_vec();
        if let Some(mask) = mask {
            apply_mask(&mut payload, mask);
        }
        Ok(Some(Frame {
            fin,
            opcode,
            masked,
            payload,
        }))
    }
}
