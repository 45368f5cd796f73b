//! # Frame Header
//!
//! Every message on the wire starts with a 16-byte little-endian header:
//!
//! ```text
//! [messageLength(4)] [requestID(4)] [responseTo(4)] [opCode(4)] [body...]
//! ```
//!
//! `messageLength` counts the header itself. A [`Frame`] is only constructed after
//! the declared length has been checked against the actual buffer length.

use std::sync::atomic::{AtomicI32, Ordering};

use byteorder::LittleEndian;
use serde::{Deserialize, Serialize};

use super::packed::{read_at, write_at};
use crate::config::MAX_FRAME_SIZE;
use crate::error::{constants, ProtocolError, Result};

/// Size of the fixed frame header
pub const HEADER_SIZE: usize = 16;

const LENGTH_OFFSET: usize = 0;
const REQUEST_ID_OFFSET: usize = 4;
const RESPONSE_TO_OFFSET: usize = 8;
const OPCODE_OFFSET: usize = 12;

/// Operation codes carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Reply,
    Msg,
    Update,
    Insert,
    Query,
    GetMore,
    Delete,
    KillCursors,
    /// Any code this crate does not name, preserved as-is.
    Other(i32),
}

impl Opcode {
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => Opcode::Reply,
            1000 => Opcode::Msg,
            2001 => Opcode::Update,
            2002 => Opcode::Insert,
            2004 => Opcode::Query,
            2005 => Opcode::GetMore,
            2006 => Opcode::Delete,
            2007 => Opcode::KillCursors,
            other => Opcode::Other(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Opcode::Reply => 1,
            Opcode::Msg => 1000,
            Opcode::Update => 2001,
            Opcode::Insert => 2002,
            Opcode::Query => 2004,
            Opcode::GetMore => 2005,
            Opcode::Delete => 2006,
            Opcode::KillCursors => 2007,
            Opcode::Other(code) => code,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub opcode: Opcode,
}

impl MsgHeader {
    /// Decode the header from the first 16 bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let field = |offset| {
            read_at::<i32, LittleEndian>(buf, offset).ok_or_else(|| {
                ProtocolError::truncated(constants::CTX_FRAME_HEADER, HEADER_SIZE, buf.len())
            })
        };

        Ok(Self {
            message_length: field(LENGTH_OFFSET)?,
            request_id: field(REQUEST_ID_OFFSET)?,
            response_to: field(RESPONSE_TO_OFFSET)?,
            opcode: Opcode::from_i32(field(OPCODE_OFFSET)?),
        })
    }

    /// Encode the header into the first 16 bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::truncated(
                constants::CTX_FRAME_HEADER,
                HEADER_SIZE,
                buf.len(),
            ));
        }

        // Length checked above, so every write fits
        for (offset, value) in [
            (LENGTH_OFFSET, self.message_length),
            (REQUEST_ID_OFFSET, self.request_id),
            (RESPONSE_TO_OFFSET, self.response_to),
            (OPCODE_OFFSET, self.opcode.as_i32()),
        ] {
            write_at::<i32, LittleEndian>(buf, offset, value).ok_or_else(|| {
                ProtocolError::truncated(constants::CTX_FRAME_HEADER, HEADER_SIZE, buf.len())
            })?;
        }
        Ok(())
    }
}

/// A complete inbound message whose declared length matches its buffer.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    bytes: &'a [u8],
    header: MsgHeader,
}

impl<'a> Frame<'a> {
    /// Validate `bytes` as one frame, using the default size ceiling.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        Self::with_limit(bytes, MAX_FRAME_SIZE)
    }

    /// Validate `bytes` as one frame no larger than `max_size`.
    pub fn with_limit(bytes: &'a [u8], max_size: usize) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::FrameTooShort {
                len: bytes.len(),
                min: HEADER_SIZE,
            });
        }
        if bytes.len() > max_size {
            return Err(ProtocolError::OversizedFrame(bytes.len()));
        }

        let header = MsgHeader::parse(bytes)?;
        if i64::from(header.message_length) != bytes.len() as i64 {
            return Err(ProtocolError::LengthMismatch {
                declared: i64::from(header.message_length),
                actual: bytes.len(),
            });
        }

        Ok(Self { bytes, header })
    }

    pub fn header(&self) -> &MsgHeader {
        &self.header
    }

    pub fn request_id(&self) -> i32 {
        self.header.request_id
    }

    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    /// Everything after the 16-byte header.
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the frame has no body.
    pub fn is_empty(&self) -> bool {
        self.bytes.len() == HEADER_SIZE
    }
}

static NEXT_MESSAGE_ID: AtomicI32 = AtomicI32::new(1);

/// Allocate a process-unique id for an outbound message.
pub fn next_message_id() -> i32 {
    NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame(len_field: i32, body: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        MsgHeader {
            message_length: len_field,
            request_id: 77,
            response_to: 0,
            opcode: Opcode::Query,
        }
        .write_to(&mut buf)
        .unwrap();
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn test_header_round_trip() {
        let header = MsgHeader {
            message_length: 42,
            request_id: -3,
            response_to: 9,
            opcode: Opcode::Other(31337),
        };
        let mut buf = [0u8; HEADER_SIZE];
        header.write_to(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[42, 0, 0, 0]);
        assert_eq!(MsgHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn test_opcode_codes() {
        for code in [1, 1000, 2001, 2002, 2004, 2005, 2006, 2007, 5] {
            assert_eq!(Opcode::from_i32(code).as_i32(), code);
        }
        assert_eq!(Opcode::from_i32(2004), Opcode::Query);
    }

    #[test]
    fn test_frame_accepts_matching_length() {
        let buf = raw_frame(20, &[1, 2, 3, 4]);
        let frame = Frame::new(&buf).unwrap();
        assert_eq!(frame.request_id(), 77);
        assert_eq!(frame.opcode(), Opcode::Query);
        assert_eq!(frame.body(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_frame_rejects_length_mismatch() {
        let buf = raw_frame(64, &[1, 2, 3, 4]);
        assert!(matches!(
            Frame::new(&buf),
            Err(ProtocolError::LengthMismatch {
                declared: 64,
                actual: 20
            })
        ));

        let buf = raw_frame(-1, &[]);
        assert!(matches!(
            Frame::new(&buf),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_frame_rejects_short_and_oversized() {
        assert!(matches!(
            Frame::new(&[0u8; 8]),
            Err(ProtocolError::FrameTooShort { len: 8, .. })
        ));
        let buf = raw_frame(24, &[0u8; 8]);
        assert!(matches!(
            Frame::with_limit(&buf, 20),
            Err(ProtocolError::OversizedFrame(24))
        ));
    }

    #[test]
    fn test_message_ids_are_distinct() {
        let a = next_message_id();
        let b = next_message_id();
        assert_ne!(a, b);
    }
}
