//! Wire-format definitions for link frames.
//!
//! Every unit exchanged between the two stations is a [`Frame`].  This module
//! is responsible for:
//! - Packing the frame kind and sequence number into the control byte.
//! - Serialising a [`Frame`] into bytes with a CRC-32 trailer.
//! - Verifying and parsing received bytes, rejecting anything corrupted,
//!   truncated, or malformed.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! ```text
//!  DATA  +------+-----------+----------------------+-------------+
//!        | KIND | SEQ       | PAYLOAD (packet_len) | CRC-32      |
//!        | 2 b  | 6 b       |                      | 4 B, BE     |
//!        +------+-----------+----------------------+-------------+
//!
//!  ACK   +------+-----------+-------------+
//!  NAK   | KIND | ACK       | CRC-32      |
//!        | 2 b  | 6 b       | 4 B, BE     |
//!        +------+-----------+-------------+
//! ```
//!
//! The trailer is CRC-32 (IEEE) over every byte before it.  A received buffer
//! is intact iff its [`residue`] is zero.

use crc32fast::Hasher;
use thiserror::Error;

use crate::seq::{Seq, MAX_SEQ, SEQ_BITS};

/// Length of the control byte.
pub const CONTROL_LEN: usize = 1;

/// Length of the CRC-32 trailer.
pub const TRAILER_LEN: usize = 4;

/// Smallest well-formed frame (ACK or NAK).
pub const MIN_FRAME_LEN: usize = CONTROL_LEN + TRAILER_LEN;

/// Default network-layer packet size carried by a DATA frame.
pub const DEFAULT_PACKET_LEN: usize = 256;

/// Frame kind, stored in the top two bits of the control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data = 1,
    Ack = 2,
    Nak = 3,
}

impl FrameKind {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(FrameKind::Data),
            2 => Some(FrameKind::Ack),
            3 => Some(FrameKind::Nak),
            _ => None,
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Data => write!(f, "DATA"),
            FrameKind::Ack => write!(f, "ACK"),
            FrameKind::Nak => write!(f, "NAK"),
        }
    }
}

/// A decoded link frame.
///
/// For DATA frames `seq` is the frame's own sequence number; for ACK and NAK
/// it is the acknowledgement number (`frame_expected - 1` at the receiver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub seq: Seq,
    /// Empty for ACK and NAK.
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn data(seq: Seq, payload: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Data,
            seq,
            payload,
        }
    }

    pub fn ack(ack: Seq) -> Self {
        Self {
            kind: FrameKind::Ack,
            seq: ack,
            payload: Vec::new(),
        }
    }

    pub fn nak(ack: Seq) -> Self {
        Self {
            kind: FrameKind::Nak,
            seq: ack,
            payload: Vec::new(),
        }
    }

    /// Pack kind and number into the control byte.
    pub fn control_byte(&self) -> u8 {
        pack_control(self.kind, self.seq)
    }

    /// Serialise this frame, appending the CRC-32 trailer.
    pub fn encode(&self) -> Vec<u8> {
        encode_parts(self.control_byte(), &self.payload)
    }

    /// Serialise a DATA frame straight from a borrowed payload.
    pub fn encode_data(seq: Seq, payload: &[u8]) -> Vec<u8> {
        encode_parts(pack_control(FrameKind::Data, seq), payload)
    }

    /// Verify and parse a received buffer.
    ///
    /// `packet_len` is the fixed payload size of DATA frames on this link.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`MIN_FRAME_LEN`],
    /// - the checksum residue is nonzero,
    /// - the control byte carries kind 0, or
    /// - the length does not match the kind.
    ///
    /// The checksum is verified before any header field is looked at.
    pub fn decode(buf: &[u8], packet_len: usize) -> Result<Self, FrameError> {
        if buf.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort { len: buf.len() });
        }
        if residue(buf) != 0 {
            return Err(FrameError::ChecksumFailed);
        }

        let control = buf[0];
        let kind = FrameKind::from_bits(control >> SEQ_BITS)
            .ok_or(FrameError::UnknownKind(control >> SEQ_BITS))?;
        let seq = control & MAX_SEQ;
        let body = &buf[CONTROL_LEN..buf.len() - TRAILER_LEN];

        let expected = match kind {
            FrameKind::Data => packet_len,
            FrameKind::Ack | FrameKind::Nak => 0,
        };
        if body.len() != expected {
            return Err(FrameError::LengthMismatch {
                kind,
                expected,
                actual: body.len(),
            });
        }

        Ok(Self {
            kind,
            seq,
            payload: body.to_vec(),
        })
    }
}

/// Errors that can arise when parsing a received frame.
///
/// Every variant is treated as corruption by the link: the frame is dropped
/// and, if no NAK is outstanding, a NAK is sent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame of {len} bytes is shorter than the minimum frame")]
    TooShort { len: usize },
    #[error("checksum verification failed")]
    ChecksumFailed,
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    #[error("{kind} frame carries {actual} payload bytes, expected {expected}")]
    LengthMismatch {
        kind: FrameKind,
        expected: usize,
        actual: usize,
    },
}

/// CRC-32 (IEEE) of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Integrity residue of a complete frame buffer: zero iff the trailer matches
/// the CRC-32 of everything before it.
///
/// Buffers too short to hold a trailer have no valid residue and return
/// `u32::MAX`.
pub fn residue(buf: &[u8]) -> u32 {
    if buf.len() < TRAILER_LEN {
        return u32::MAX;
    }
    let (body, trailer) = buf.split_at(buf.len() - TRAILER_LEN);
    let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    crc32(body) ^ stored
}

fn pack_control(kind: FrameKind, seq: Seq) -> u8 {
    ((kind as u8) << SEQ_BITS) | (seq & MAX_SEQ)
}

fn encode_parts(control: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CONTROL_LEN + payload.len() + TRAILER_LEN);
    buf.push(control);
    buf.extend_from_slice(payload);

    let crc = crc32(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    buf
}
