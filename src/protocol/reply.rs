//! # Reply Assembly
//!
//! Two-phase construction of outbound reply frames.
//!
//! ## Reply Layout
//! ```text
//! [header(16)] [flags(4)] [cursorId(8)] [startingFrom(4)] [nReturned(4)] [document]*
//! ```
//!
//! The 36-byte prefix is reserved zeroed when the builder is created. Documents are
//! appended after it. [`ReplyBuilder::finish`] backfills every prefix field once the
//! total length is known and consumes the builder, so a finished frame cannot be
//! touched again.

use bitflags::bitflags;
use byteorder::LittleEndian;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::document::DocumentView;
use crate::core::header::{next_message_id, Frame, MsgHeader, Opcode, HEADER_SIZE};
use crate::core::packed::{read_at, write_at};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::global_metrics;

/// Reply fields following the frame header
pub const REPLY_PREFIX_SIZE: usize = 20;

/// Frame header plus reply prefix
pub const REPLY_HEADER_SIZE: usize = HEADER_SIZE + REPLY_PREFIX_SIZE;

/// Initial buffer capacity for a reply
pub const DEFAULT_REPLY_CAPACITY: usize = 32 * 1024;

const FLAGS_OFFSET: usize = HEADER_SIZE;
const CURSOR_ID_OFFSET: usize = HEADER_SIZE + 4;
const STARTING_FROM_OFFSET: usize = HEADER_SIZE + 12;
const N_RETURNED_OFFSET: usize = HEADER_SIZE + 16;

bitflags! {
    /// Result bits at the start of a reply body.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ResultFlags: i32 {
        const CURSOR_NOT_FOUND = 1;
        const ERROR_SET = 1 << 1;
        const STALE_CONFIG = 1 << 2;
        const AWAIT_CAPABLE = 1 << 3;
    }
}

impl ResultFlags {
    /// Flags for an ordinary successful reply.
    pub fn ok() -> Self {
        Self::AWAIT_CAPABLE
    }
}

/// A finished reply frame, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub request_id: i32,
    pub response_to: i32,
    pub frame: Bytes,
}

/// Destination for finished replies.
pub trait ReplySink {
    fn deliver(&mut self, reply: Reply) -> Result<()>;
}

impl ReplySink for Vec<Reply> {
    fn deliver(&mut self, reply: Reply) -> Result<()> {
        self.push(reply);
        Ok(())
    }
}

/// Accumulates reply documents and backfills the reply header on completion.
#[derive(Debug)]
pub struct ReplyBuilder {
    buf: BytesMut,
    result_flags: ResultFlags,
    cursor_id: i64,
    starting_from: i32,
    n_returned: i32,
}

impl ReplyBuilder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = BytesMut::with_capacity(capacity.max(REPLY_HEADER_SIZE));
        buf.put_bytes(0, REPLY_HEADER_SIZE);
        Self {
            buf,
            result_flags: ResultFlags::ok(),
            cursor_id: 0,
            starting_from: 0,
            n_returned: 0,
        }
    }

    /// One-document reply.
    pub fn single(flags: ResultFlags, doc: DocumentView<'_>) -> Self {
        let mut builder = Self::with_capacity(REPLY_HEADER_SIZE + doc.len());
        builder.result_flags = flags;
        builder.append_document(doc);
        builder
    }

    pub fn append_document(&mut self, doc: DocumentView<'_>) {
        self.buf.put_slice(doc.as_bytes());
        self.n_returned = self.n_returned.wrapping_add(1);
    }

    /// Append back-to-back serialized documents and return how many there were.
    ///
    /// Every length prefix must describe a whole document and the last one must end
    /// exactly at the end of `payload`. Nothing is appended on error.
    pub fn append_payload(&mut self, payload: &[u8]) -> Result<i32> {
        let mut count: i32 = 0;
        let mut pos = 0;
        while pos < payload.len() {
            pos += document_at(payload, pos)?.len();
            count = count
                .checked_add(1)
                .ok_or(ProtocolError::InvalidDocumentSize(i64::from(i32::MAX)))?;
        }

        self.buf.put_slice(payload);
        self.n_returned = self.n_returned.wrapping_add(count);
        Ok(count)
    }

    pub fn result_flags(&mut self, flags: ResultFlags) -> &mut Self {
        self.result_flags = flags;
        self
    }

    pub fn cursor_id(&mut self, cursor_id: i64) -> &mut Self {
        self.cursor_id = cursor_id;
        self
    }

    pub fn starting_from(&mut self, starting_from: i32) -> &mut Self {
        self.starting_from = starting_from;
        self
    }

    pub fn n_returned(&self) -> i32 {
        self.n_returned
    }

    /// Bytes written so far, header included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True while nothing has been appended after the reserved prefix.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == REPLY_HEADER_SIZE
    }

    /// Backfill the header and reply prefix, correlating with `response_to`.
    pub fn finish(self, response_to: i32) -> Result<Reply> {
        let mut buf = self.buf;
        let total = buf.len();
        let message_length =
            i32::try_from(total).map_err(|_| ProtocolError::OversizedFrame(total))?;

        let request_id = next_message_id();
        MsgHeader {
            message_length,
            request_id,
            response_to,
            opcode: Opcode::Reply,
        }
        .write_to(&mut buf)?;

        let short = || ProtocolError::truncated(constants::CTX_REPLY_HEADER, REPLY_HEADER_SIZE, total);
        write_at::<i32, LittleEndian>(&mut buf, FLAGS_OFFSET, self.result_flags.bits())
            .ok_or_else(short)?;
        write_at::<i64, LittleEndian>(&mut buf, CURSOR_ID_OFFSET, self.cursor_id)
            .ok_or_else(short)?;
        write_at::<i32, LittleEndian>(&mut buf, STARTING_FROM_OFFSET, self.starting_from)
            .ok_or_else(short)?;
        write_at::<i32, LittleEndian>(&mut buf, N_RETURNED_OFFSET, self.n_returned)
            .ok_or_else(short)?;

        global_metrics().reply_built(total as u64);
        debug!(
            request_id,
            response_to,
            n_returned = self.n_returned,
            len = total,
            "Reply assembled"
        );

        Ok(Reply {
            request_id,
            response_to,
            frame: buf.freeze(),
        })
    }

    /// Finish and hand the reply to `sink`, answering `request`.
    pub fn send<S: ReplySink + ?Sized>(self, sink: &mut S, request: &MsgHeader) -> Result<()> {
        let reply = self.finish(request.request_id)?;
        sink.deliver(reply)
    }
}

impl Default for ReplyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-side view of a reply frame.
#[derive(Debug, Clone, Copy)]
pub struct ReplyView<'a> {
    frame: Frame<'a>,
    result_flags: ResultFlags,
    cursor_id: i64,
    starting_from: i32,
    n_returned: i32,
}

impl<'a> ReplyView<'a> {
    pub fn parse(frame: Frame<'a>) -> Result<Self> {
        let bytes = frame.as_bytes();
        let short =
            || ProtocolError::truncated(constants::CTX_REPLY_HEADER, REPLY_HEADER_SIZE, bytes.len());

        Ok(Self {
            frame,
            result_flags: ResultFlags::from_bits_retain(
                read_at::<i32, LittleEndian>(bytes, FLAGS_OFFSET).ok_or_else(short)?,
            ),
            cursor_id: read_at::<i64, LittleEndian>(bytes, CURSOR_ID_OFFSET).ok_or_else(short)?,
            starting_from: read_at::<i32, LittleEndian>(bytes, STARTING_FROM_OFFSET)
                .ok_or_else(short)?,
            n_returned: read_at::<i32, LittleEndian>(bytes, N_RETURNED_OFFSET)
                .ok_or_else(short)?,
        })
    }

    pub fn header(&self) -> &MsgHeader {
        self.frame.header()
    }

    pub fn result_flags(&self) -> ResultFlags {
        self.result_flags
    }

    pub fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    pub fn starting_from(&self) -> i32 {
        self.starting_from
    }

    pub fn n_returned(&self) -> i32 {
        self.n_returned
    }

    /// Exactly `n_returned` documents, filling the rest of the frame.
    pub fn documents(&self) -> Result<Vec<DocumentView<'a>>> {
        let bytes = self.frame.as_bytes();
        let count = usize::try_from(self.n_returned)
            .map_err(|_| ProtocolError::InvalidDocumentSize(i64::from(self.n_returned)))?;

        let mut docs = Vec::with_capacity(count.min(bytes.len() / 5));
        let mut pos = REPLY_HEADER_SIZE;
        for _ in 0..count {
            let doc = document_at(bytes, pos)?;
            pos += doc.len();
            docs.push(doc);
        }

        if pos != bytes.len() {
            return Err(ProtocolError::LengthMismatch {
                declared: pos as i64,
                actual: bytes.len(),
            });
        }
        Ok(docs)
    }
}

/// The document whose length prefix sits at `pos`.
fn document_at(bytes: &[u8], pos: usize) -> Result<DocumentView<'_>> {
    let remaining = bytes.len().saturating_sub(pos);
    let declared = read_at::<i32, LittleEndian>(bytes, pos)
        .ok_or_else(|| ProtocolError::truncated(constants::CTX_DOCUMENT_PREFIX, 4, remaining))?;
    let len = usize::try_from(declared)
        .map_err(|_| ProtocolError::InvalidDocumentSize(i64::from(declared)))?;
    if len > remaining {
        return Err(ProtocolError::OversizedDocument {
            declared: len,
            remaining,
        });
    }
    DocumentView::new(&bytes[pos..pos + len])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(payload: &[u8]) -> Vec<u8> {
        // One binary element named "b"
        let size = 4 + 1 + 2 + 4 + 1 + payload.len() + 1;
        let mut d = (size as i32).to_le_bytes().to_vec();
        d.push(0x05);
        d.extend_from_slice(b"b\0");
        d.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        d.push(0);
        d.extend_from_slice(payload);
        d.push(0);
        d
    }

    #[test]
    fn test_empty_reply_layout() {
        let reply = ReplyBuilder::new().finish(9).unwrap();
        assert_eq!(reply.frame.len(), REPLY_HEADER_SIZE);
        assert_eq!(reply.response_to, 9);

        let header = MsgHeader::parse(&reply.frame).unwrap();
        assert_eq!(header.message_length, REPLY_HEADER_SIZE as i32);
        assert_eq!(header.response_to, 9);
        assert_eq!(header.request_id, reply.request_id);
        assert_eq!(header.opcode, Opcode::Reply);

        let view = ReplyView::parse(Frame::new(&reply.frame).unwrap()).unwrap();
        assert_eq!(view.result_flags(), ResultFlags::AWAIT_CAPABLE);
        assert_eq!(view.n_returned(), 0);
        assert!(view.documents().unwrap().is_empty());
    }

    #[test]
    fn test_backfilled_fields() {
        let a = doc(b"first");
        let b = doc(b"second!");
        let mut builder = ReplyBuilder::new();
        builder.append_document(DocumentView::new(&a).unwrap());
        builder.append_document(DocumentView::new(&b).unwrap());
        builder
            .cursor_id(0x1122_3344_5566_7788)
            .starting_from(40)
            .result_flags(ResultFlags::ok() | ResultFlags::STALE_CONFIG);
        assert_eq!(builder.n_returned(), 2);

        let reply = builder.finish(3).unwrap();
        assert_eq!(reply.frame.len(), REPLY_HEADER_SIZE + a.len() + b.len());

        let view = ReplyView::parse(Frame::new(&reply.frame).unwrap()).unwrap();
        assert_eq!(view.cursor_id(), 0x1122_3344_5566_7788);
        assert_eq!(view.starting_from(), 40);
        assert!(view.result_flags().contains(ResultFlags::STALE_CONFIG));

        let docs = view.documents().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].as_bytes(), a.as_slice());
        assert_eq!(docs[1].as_bytes(), b.as_slice());
    }

    #[test]
    fn test_payload_is_counted() {
        let a = doc(b"x");
        let b = doc(b"yz");
        let mut payload = a.clone();
        payload.extend_from_slice(&b);

        let mut builder = ReplyBuilder::new();
        builder.append_document(DocumentView::new(&a).unwrap());
        assert_eq!(builder.append_payload(&payload).unwrap(), 2);
        assert_eq!(builder.append_payload(&[]).unwrap(), 0);
        assert_eq!(builder.n_returned(), 3);

        let reply = builder.finish(1).unwrap();
        let view = ReplyView::parse(Frame::new(&reply.frame).unwrap()).unwrap();
        assert_eq!(view.n_returned(), 3);
        assert_eq!(view.documents().unwrap().len(), 3);
    }

    #[test]
    fn test_malformed_payload_is_not_appended() {
        let a = doc(b"x");

        // Trailing bytes that do not form a document
        let mut trailing = a.clone();
        trailing.extend_from_slice(&[1, 2]);

        // Prefix claims more than the payload holds
        let mut overlong = a.clone();
        overlong[..4].copy_from_slice(&((a.len() + 8) as i32).to_le_bytes());

        // Negative prefix
        let mut negative = a.clone();
        negative[..4].copy_from_slice(&(-1i32).to_le_bytes());

        let mut builder = ReplyBuilder::new();
        assert!(matches!(
            builder.append_payload(&trailing),
            Err(ProtocolError::Truncated { .. })
        ));
        assert!(matches!(
            builder.append_payload(&overlong),
            Err(ProtocolError::OversizedDocument { .. })
        ));
        assert!(matches!(
            builder.append_payload(&negative),
            Err(ProtocolError::InvalidDocumentSize(-1))
        ));
        assert!(builder.is_empty());
        assert_eq!(builder.n_returned(), 0);
    }

    #[test]
    fn test_send_correlates_with_request() {
        let a = doc(b"payload");
        let request = MsgHeader {
            message_length: 0,
            request_id: 555,
            response_to: 0,
            opcode: Opcode::Query,
        };

        let mut sink: Vec<Reply> = Vec::new();
        ReplyBuilder::single(ResultFlags::ERROR_SET, DocumentView::new(&a).unwrap())
            .send(&mut sink, &request)
            .unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].response_to, 555);
        let view = ReplyView::parse(Frame::new(&sink[0].frame).unwrap()).unwrap();
        assert_eq!(view.result_flags(), ResultFlags::ERROR_SET);
        assert_eq!(view.n_returned(), 1);
    }

    #[test]
    fn test_reply_ids_are_distinct() {
        let first = ReplyBuilder::new().finish(1).unwrap();
        let second = ReplyBuilder::new().finish(1).unwrap();
        assert_ne!(first.request_id, second.request_id);
    }
}
