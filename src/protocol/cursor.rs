//! # Message Cursor
//!
//! Sequential, bounds-checked access to the body of one inbound frame.
//!
//! A request body starts with a 4-byte reserved/flags field, followed by a
//! null-terminated namespace and then opcode-specific fields:
//!
//! ```text
//! [flags(4)] [namespace\0] [field]* [document]*
//! ```
//!
//! The cursor moves `Start -> Parsing(pos) -> Exhausted`. The first pull skips the
//! namespace; documents advance by their declared length; reaching the end of the
//! frame after a document moves the cursor to `Exhausted`. A saved mark can be
//! restored at any point to re-read a region.
//!
//! Nothing is ever read outside the frame body. Inconsistent lengths are reported as
//! framing errors and abort the request.

use byteorder::LittleEndian;
use tracing::{debug, warn};

use crate::config;
use crate::core::byte_order::Packable;
use crate::core::document::DocumentView;
use crate::core::header::{Frame, MsgHeader, HEADER_SIZE};
use crate::core::packed::{read_at, PackedField, PackedMut, PackedRead, PackedRef};
use crate::error::{constants, ProtocolError, Result};
use crate::identity::object_id::{ObjectId, OBJECT_ID_LEN};
use crate::utils::metrics::global_metrics;

/// Width of the reserved/flags field at the start of every request body
pub const RESERVED_FIELD_SIZE: usize = 4;

/// Read position of a [`MessageCursor`], as an offset into the frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Nothing pulled yet; the namespace has not been skipped.
    Start,
    /// Next read happens at this body offset.
    Parsing(usize),
    /// The last document ended at the frame end.
    Exhausted,
}

/// Offset just past the namespace terminator.
fn skip_namespace(body: &[u8]) -> Result<usize> {
    body.get(RESERVED_FIELD_SIZE..)
        .and_then(|data| data.iter().position(|&b| b == 0))
        .map(|nul| RESERVED_FIELD_SIZE + nul + 1)
        .ok_or(ProtocolError::UnterminatedNamespace)
}

fn namespace_of(body: &[u8]) -> Result<&str> {
    let end = skip_namespace(body)?;
    std::str::from_utf8(&body[RESERVED_FIELD_SIZE..end - 1])
        .map_err(|_| ProtocolError::InvalidNamespace)
}

/// Parse state over one inbound frame.
#[derive(Debug, Clone)]
pub struct MessageCursor<'a> {
    frame: Frame<'a>,
    body: &'a [u8],
    state: CursorState,
    mark: Option<CursorState>,
    deep_validation: bool,
}

impl<'a> MessageCursor<'a> {
    /// Open a cursor on `frame`. Samples the process-wide deep validation switch.
    pub fn new(frame: Frame<'a>) -> Result<Self> {
        let body = frame.body();
        if body.len() < RESERVED_FIELD_SIZE {
            global_metrics().framing_error();
            return Err(ProtocolError::truncated(
                constants::CTX_RESERVED_FIELD,
                RESERVED_FIELD_SIZE,
                body.len(),
            ));
        }

        global_metrics().frame_parsed();
        debug!(
            request_id = frame.request_id(),
            opcode = frame.opcode().as_i32(),
            len = frame.len(),
            "Opened message cursor"
        );

        Ok(Self {
            frame,
            body,
            state: CursorState::Start,
            mark: None,
            deep_validation: config::deep_validation(),
        })
    }

    pub fn frame(&self) -> &Frame<'a> {
        &self.frame
    }

    pub fn header(&self) -> &MsgHeader {
        self.frame.header()
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Whether documents returned by this cursor are structurally validated.
    pub fn deep_validation(&self) -> bool {
        self.deep_validation
    }

    /// The 32-bit field in front of the namespace (query options for query frames).
    pub fn reserved_field(&self) -> i32 {
        // new() guarantees the body holds the field
        read_at::<i32, LittleEndian>(self.body, 0).unwrap_or_default()
    }

    /// The namespace at the start of the body. Does not move the cursor.
    pub fn namespace(&self) -> Result<&'a str> {
        namespace_of(self.body).map_err(|e| self.reject(e))
    }

    /// The `index`-th int32 after the namespace, without moving the cursor.
    pub fn peek_int32(&self, index: usize) -> Result<i32> {
        let start = skip_namespace(self.body).map_err(|e| self.reject(e))?;
        let offset = index
            .checked_mul(i32::WIDTH)
            .and_then(|delta| start.checked_add(delta))
            .unwrap_or(usize::MAX);

        read_at::<i32, LittleEndian>(self.body, offset).ok_or_else(|| {
            self.reject(ProtocolError::truncated(
                constants::CTX_INT32,
                i32::WIDTH,
                self.remaining_from(offset),
            ))
        })
    }

    /// Number to return, for query and get-more frames.
    pub fn query_n_to_return(&self) -> Result<i32> {
        self.peek_int32(1)
    }

    /// The 12-byte object id at the current position, without advancing.
    pub fn peek_object_id(&mut self) -> Result<ObjectId> {
        let pos = self.position()?;
        pos.checked_add(OBJECT_ID_LEN)
            .and_then(|end| self.body.get(pos..end))
            .and_then(ObjectId::from_slice)
            .ok_or_else(|| {
                self.reject(ProtocolError::truncated(
                    constants::CTX_OBJECT_ID,
                    OBJECT_ID_LEN,
                    self.remaining_from(pos),
                ))
            })
    }

    pub fn pull_int32(&mut self) -> Result<i32> {
        self.pull::<i32>(constants::CTX_INT32)
    }

    pub fn pull_int64(&mut self) -> Result<i64> {
        self.pull::<i64>(constants::CTX_INT64)
    }

    /// Read an int64 at the current position without advancing.
    pub fn peek_int64(&mut self) -> Result<i64> {
        let pos = self.position()?;
        PackedRef::<i64, LittleEndian>::at(self.body, pos)
            .map(|field| field.get())
            .ok_or_else(|| {
                self.reject(ProtocolError::truncated(
                    constants::CTX_INT64,
                    i64::WIDTH,
                    self.remaining_from(pos),
                ))
            })
    }

    /// True until a document read ends exactly at the frame end.
    pub fn has_more_documents(&self) -> bool {
        self.state != CursorState::Exhausted
    }

    /// Return the next length-prefixed document as a zero-copy view.
    ///
    /// Documents larger than [`MAX_DOCUMENT_SIZE`](config::MAX_DOCUMENT_SIZE) are
    /// rejected even when the frame holds them.
    pub fn next_document(&mut self) -> Result<DocumentView<'a>> {
        let end = self.body.len();
        let pos = match self.state {
            CursorState::Start => skip_namespace(self.body).map_err(|e| self.reject(e))?,
            CursorState::Parsing(pos) => pos,
            CursorState::Exhausted => end,
        };
        if pos >= end {
            return Err(self.reject(ProtocolError::NoDocuments));
        }

        let remaining = end - pos;
        if remaining <= 3 {
            return Err(self.reject(ProtocolError::truncated(
                constants::CTX_DOCUMENT_PREFIX,
                4,
                remaining,
            )));
        }

        let declared = read_at::<i32, LittleEndian>(self.body, pos).unwrap_or_default();
        if declared <= 3 {
            return Err(self.reject(ProtocolError::InvalidDocumentSize(i64::from(declared))));
        }

        let declared = declared as usize;
        if declared > config::MAX_DOCUMENT_SIZE
            || declared >= end - RESERVED_FIELD_SIZE
            || declared > remaining
        {
            return Err(self.reject(ProtocolError::OversizedDocument {
                declared,
                remaining,
            }));
        }

        let doc = DocumentView::from_checked(&self.body[pos..pos + declared]);
        if self.deep_validation {
            doc.validate().map_err(|e| self.reject(e))?;
        }

        let next = pos + declared;
        self.state = if next >= end {
            CursorState::Exhausted
        } else {
            CursorState::Parsing(next)
        };
        global_metrics().document_read();
        Ok(doc)
    }

    /// Remember the current position.
    pub fn mark(&mut self) {
        self.mark = Some(self.state);
    }

    /// Return to the position saved by [`mark`](Self::mark).
    pub fn reset(&mut self) -> Result<()> {
        let mark = self.mark.ok_or(ProtocolError::MarkNotSet)?;
        self.state = mark;
        Ok(())
    }

    /// Go back to the start, before the namespace.
    pub fn rewind(&mut self) {
        self.state = CursorState::Start;
    }

    fn pull<T: Packable>(&mut self, context: &str) -> Result<T> {
        let pos = self.position()?;
        let value = PackedRef::<T, LittleEndian>::at(self.body, pos)
            .map(|field| field.get())
            .ok_or_else(|| {
                self.reject(ProtocolError::truncated(
                    context,
                    T::WIDTH,
                    self.remaining_from(pos),
                ))
            })?;
        self.state = CursorState::Parsing(pos + T::WIDTH);
        Ok(value)
    }

    /// Current read offset, skipping the namespace on first use.
    fn position(&mut self) -> Result<usize> {
        match self.state {
            CursorState::Start => {
                let pos = skip_namespace(self.body).map_err(|e| self.reject(e))?;
                self.state = CursorState::Parsing(pos);
                Ok(pos)
            }
            CursorState::Parsing(pos) => Ok(pos),
            CursorState::Exhausted => Ok(self.body.len()),
        }
    }

    fn remaining_from(&self, pos: usize) -> usize {
        self.body.len().saturating_sub(pos)
    }

    fn reject(&self, err: ProtocolError) -> ProtocolError {
        global_metrics().framing_error();
        warn!(
            request_id = self.frame.request_id(),
            state = ?self.state,
            error = %err,
            "Rejecting malformed request"
        );
        err
    }
}

/// Write-side counterpart of [`MessageCursor`] for a frame under construction.
///
/// Shares the cursor's positional discipline: the first push lands just after the
/// namespace, and each push advances by the field width.
#[derive(Debug)]
pub struct MessageWriter<'a> {
    body: &'a mut [u8],
    pos: Option<usize>,
}

impl<'a> MessageWriter<'a> {
    /// Wrap a whole frame buffer, header included.
    pub fn new(frame: &'a mut [u8]) -> Result<Self> {
        let min = HEADER_SIZE + RESERVED_FIELD_SIZE;
        if frame.len() < min {
            return Err(ProtocolError::FrameTooShort {
                len: frame.len(),
                min,
            });
        }
        Ok(Self {
            body: &mut frame[HEADER_SIZE..],
            pos: None,
        })
    }

    pub fn namespace(&self) -> Result<&str> {
        namespace_of(self.body)
    }

    pub fn push_int32(&mut self, value: i32) -> Result<()> {
        self.push(value, constants::CTX_INT32)
    }

    pub fn push_int64(&mut self, value: i64) -> Result<()> {
        self.push(value, constants::CTX_INT64)
    }

    fn push<T: Packable>(&mut self, value: T, context: &str) -> Result<()> {
        let pos = match self.pos {
            Some(pos) => pos,
            None => skip_namespace(self.body)?,
        };
        let remaining = self.body.len().saturating_sub(pos);
        let mut field = PackedMut::<T, LittleEndian>::at(self.body, pos)
            .ok_or_else(|| ProtocolError::truncated(context, T::WIDTH, remaining))?;
        field.set(value);
        self.pos = Some(pos + T::WIDTH);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::header::Opcode;

    /// Frame with the given body, header filled in.
    fn frame_bytes(body: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        MsgHeader {
            message_length: (HEADER_SIZE + body.len()) as i32,
            request_id: 11,
            response_to: 0,
            opcode: Opcode::Insert,
        }
        .write_to(&mut buf)
        .unwrap();
        buf.extend_from_slice(body);
        buf
    }

    fn body(ns: &str, tail: &[u8]) -> Vec<u8> {
        let mut b = 0x0Ai32.to_le_bytes().to_vec();
        b.extend_from_slice(ns.as_bytes());
        b.push(0);
        b.extend_from_slice(tail);
        b
    }

    /// A valid document of exactly `size` bytes (size >= 13), one binary element.
    fn doc_of_size(size: usize) -> Vec<u8> {
        let payload = size - 13;
        let mut d = (size as i32).to_le_bytes().to_vec();
        d.push(0x05);
        d.extend_from_slice(b"a\0");
        d.extend_from_slice(&(payload as i32).to_le_bytes());
        d.push(0);
        d.extend(std::iter::repeat(0xEE).take(payload));
        d.push(0);
        assert_eq!(d.len(), size);
        d
    }

    #[test]
    fn test_namespace_is_idempotent() {
        let bytes = frame_bytes(&body("test.coll", &[]));
        let frame = Frame::new(&bytes).unwrap();
        let cursor = MessageCursor::new(frame).unwrap();
        assert_eq!(cursor.namespace().unwrap(), "test.coll");
        assert_eq!(cursor.namespace().unwrap(), "test.coll");
        assert_eq!(cursor.state(), CursorState::Start);
        assert_eq!(cursor.reserved_field(), 0x0A);
    }

    #[test]
    fn test_pulls_skip_namespace_and_advance() {
        let mut tail = 5i32.to_le_bytes().to_vec();
        tail.extend_from_slice(&(-9i64).to_le_bytes());
        let bytes = frame_bytes(&body("db.c", &tail));
        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();

        assert_eq!(cursor.pull_int32().unwrap(), 5);
        assert_eq!(cursor.peek_int64().unwrap(), -9);
        assert_eq!(cursor.pull_int64().unwrap(), -9);
        assert!(matches!(
            cursor.pull_int32(),
            Err(ProtocolError::Truncated { needed: 4, remaining: 0, .. })
        ));
    }

    #[test]
    fn test_peek_int32_by_index() {
        let mut tail = 3i32.to_le_bytes().to_vec();
        tail.extend_from_slice(&100i32.to_le_bytes());
        let bytes = frame_bytes(&body("db.c", &tail));
        let cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();
        assert_eq!(cursor.peek_int32(0).unwrap(), 3);
        assert_eq!(cursor.query_n_to_return().unwrap(), 100);
        assert!(cursor.peek_int32(2).is_err());
        assert!(cursor.peek_int32(usize::MAX).is_err());
        assert_eq!(cursor.state(), CursorState::Start);
    }

    #[test]
    fn test_unterminated_namespace() {
        let mut b = 0i32.to_le_bytes().to_vec();
        b.extend_from_slice(b"no-terminator");
        let bytes = frame_bytes(&b);
        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();
        assert!(matches!(
            cursor.namespace(),
            Err(ProtocolError::UnterminatedNamespace)
        ));
        assert!(matches!(
            cursor.pull_int32(),
            Err(ProtocolError::UnterminatedNamespace)
        ));
    }

    #[test]
    fn test_missing_reserved_field() {
        let bytes = frame_bytes(&[1, 2]);
        let frame = Frame::new(&bytes).unwrap();
        assert!(matches!(
            MessageCursor::new(frame),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_documents_then_exhausted() {
        let mut tail = doc_of_size(16);
        tail.extend_from_slice(&doc_of_size(24));
        let bytes = frame_bytes(&body("db.c", &tail));
        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();

        assert!(cursor.has_more_documents());
        assert_eq!(cursor.next_document().unwrap().len(), 16);
        assert!(cursor.has_more_documents());
        assert_eq!(cursor.next_document().unwrap().len(), 24);
        assert!(!cursor.has_more_documents());
        assert!(matches!(
            cursor.next_document(),
            Err(ProtocolError::NoDocuments)
        ));
    }

    #[test]
    fn test_no_documents_after_namespace() {
        let bytes = frame_bytes(&body("db.c", &[]));
        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();
        assert!(matches!(
            cursor.next_document(),
            Err(ProtocolError::NoDocuments)
        ));
    }

    #[test]
    fn test_oversized_document_rejected() {
        let mut tail = 10_000i32.to_le_bytes().to_vec();
        tail.extend_from_slice(&[0u8; 16]);
        let bytes = frame_bytes(&body("db.c", &tail));
        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();
        assert!(matches!(
            cursor.next_document(),
            Err(ProtocolError::OversizedDocument {
                declared: 10_000,
                remaining: 20
            })
        ));
    }

    #[test]
    fn test_tiny_and_negative_sizes_rejected() {
        for declared in [0i32, 3, -1, i32::MIN] {
            let mut tail = declared.to_le_bytes().to_vec();
            tail.extend_from_slice(&[0u8; 8]);
            let bytes = frame_bytes(&body("db.c", &tail));
            let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();
            assert!(matches!(
                cursor.next_document(),
                Err(ProtocolError::InvalidDocumentSize(_))
            ));
        }
    }

    #[test]
    fn test_prefix_needs_four_bytes() {
        let bytes = frame_bytes(&body("db.c", &[9, 0, 0]));
        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();
        assert!(matches!(
            cursor.next_document(),
            Err(ProtocolError::Truncated { remaining: 3, .. })
        ));
    }

    #[test]
    fn test_mark_and_reset() {
        let mut tail = 1i32.to_le_bytes().to_vec();
        tail.extend_from_slice(&2i32.to_le_bytes());
        let bytes = frame_bytes(&body("db.c", &tail));
        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();

        assert!(matches!(cursor.reset(), Err(ProtocolError::MarkNotSet)));

        cursor.mark();
        assert_eq!(cursor.pull_int32().unwrap(), 1);
        assert_eq!(cursor.pull_int32().unwrap(), 2);
        cursor.reset().unwrap();
        assert_eq!(cursor.pull_int32().unwrap(), 1);

        cursor.rewind();
        assert_eq!(cursor.state(), CursorState::Start);
        assert_eq!(cursor.pull_int32().unwrap(), 1);
    }

    #[test]
    fn test_peek_object_id_at_position() {
        let mut tail = 7i32.to_le_bytes().to_vec();
        tail.extend(1u8..=12);
        let bytes = frame_bytes(&body("db.c", &tail));
        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();

        assert_eq!(cursor.pull_int32().unwrap(), 7);
        let oid = cursor.peek_object_id().unwrap();
        assert_eq!(oid.as_bytes(), &tail[4..]);
        assert_eq!(cursor.peek_object_id().unwrap(), oid);

        let bytes = frame_bytes(&body("db.c", &tail[..15]));
        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();
        cursor.pull_int32().unwrap();
        assert!(matches!(
            cursor.peek_object_id(),
            Err(ProtocolError::Truncated { needed: 12, remaining: 11, .. })
        ));
    }

    #[test]
    fn test_writer_shares_positional_discipline() {
        let mut bytes = frame_bytes(&body("db.c", &[0u8; 12]));
        {
            let mut writer = MessageWriter::new(&mut bytes).unwrap();
            assert_eq!(writer.namespace().unwrap(), "db.c");
            writer.push_int32(42).unwrap();
            writer.push_int64(0x0102_0304_0506_0708).unwrap();
            assert!(writer.push_int32(1).is_err());
        }

        let mut cursor = MessageCursor::new(Frame::new(&bytes).unwrap()).unwrap();
        assert_eq!(cursor.pull_int32().unwrap(), 42);
        assert_eq!(cursor.pull_int64().unwrap(), 0x0102_0304_0506_0708);
    }
}
