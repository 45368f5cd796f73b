//! # Query Requests
//!
//! Fixed-shape extraction of a query frame, and the matching encoder.
//!
//! ## Body Layout
//! ```text
//! [options(4)] [namespace\0] [skip(4)] [limit(4)] [query doc] [projection doc]?
//! ```
//!
//! Fields are consumed in exactly this order. Any encoder talking to this decoder
//! must write them in the same order.

use bitflags::bitflags;
use byteorder::LittleEndian;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::document::DocumentView;
use crate::core::header::{next_message_id, Frame, Opcode, HEADER_SIZE};
use crate::core::packed::write_at;
use crate::error::{ProtocolError, Result};
use crate::protocol::cursor::MessageCursor;

bitflags! {
    /// Option bits carried in the flags field of a query body.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct QueryOptions: i32 {
        const TAILABLE = 1 << 1;
        const SLAVE_OK = 1 << 2;
        const OPLOG_REPLAY = 1 << 3;
        const NO_CURSOR_TIMEOUT = 1 << 4;
        const AWAIT_DATA = 1 << 5;
        const EXHAUST = 1 << 6;
    }
}

/// A parsed query. Borrows the documents from the inbound frame.
#[derive(Debug, Clone)]
pub struct QueryRequest<'a> {
    namespace: &'a str,
    skip: i32,
    limit: i32,
    query: DocumentView<'a>,
    projection: Option<DocumentView<'a>>,
    options: QueryOptions,
}

impl<'a> QueryRequest<'a> {
    /// Drive `cursor` through the canonical query field sequence.
    #[instrument(level = "debug", skip(cursor), fields(request_id = cursor.header().request_id))]
    pub fn parse(cursor: &mut MessageCursor<'a>) -> Result<Self> {
        let namespace = cursor.namespace()?;
        let skip = cursor.pull_int32()?;
        let limit = cursor.pull_int32()?;
        let query = cursor.next_document()?;
        let projection = if cursor.has_more_documents() {
            Some(cursor.next_document()?)
        } else {
            None
        };
        let options = QueryOptions::from_bits_retain(cursor.reserved_field());

        debug!(
            namespace,
            skip,
            limit,
            has_projection = projection.is_some(),
            options = options.bits(),
            "Parsed query"
        );

        Ok(Self {
            namespace,
            skip,
            limit,
            query,
            projection,
            options,
        })
    }

    /// Open a cursor on `frame` and parse it as a query.
    pub fn from_frame(frame: Frame<'a>) -> Result<Self> {
        let mut cursor = MessageCursor::new(frame)?;
        Self::parse(&mut cursor)
    }

    pub fn namespace(&self) -> &'a str {
        self.namespace
    }

    pub fn skip(&self) -> i32 {
        self.skip
    }

    pub fn limit(&self) -> i32 {
        self.limit
    }

    pub fn query(&self) -> DocumentView<'a> {
        self.query
    }

    pub fn projection(&self) -> Option<DocumentView<'a>> {
        self.projection
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }
}

/// Encoder for query frames, field order matching [`QueryRequest::parse`].
#[derive(Debug, Clone)]
pub struct QueryFrameBuilder {
    namespace: String,
    skip: i32,
    limit: i32,
    query: Vec<u8>,
    projection: Option<Vec<u8>>,
    options: QueryOptions,
    request_id: Option<i32>,
}

impl QueryFrameBuilder {
    pub fn new(namespace: impl Into<String>, query: DocumentView<'_>) -> Self {
        Self {
            namespace: namespace.into(),
            skip: 0,
            limit: 0,
            query: query.as_bytes().to_vec(),
            projection: None,
            options: QueryOptions::empty(),
            request_id: None,
        }
    }

    pub fn skip(mut self, skip: i32) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = limit;
        self
    }

    pub fn projection(mut self, projection: DocumentView<'_>) -> Self {
        self.projection = Some(projection.as_bytes().to_vec());
        self
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a fixed request id instead of allocating one.
    pub fn request_id(mut self, request_id: i32) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn build(self) -> Result<Bytes> {
        if self.namespace.as_bytes().contains(&0) {
            return Err(ProtocolError::InvalidNamespace);
        }

        let projection_len = self.projection.as_ref().map_or(0, Vec::len);
        let mut buf = BytesMut::with_capacity(
            HEADER_SIZE + 4 + self.namespace.len() + 1 + 8 + self.query.len() + projection_len,
        );

        // Length is backfilled once the body is in place
        buf.put_i32_le(0);
        buf.put_i32_le(self.request_id.unwrap_or_else(next_message_id));
        buf.put_i32_le(0);
        buf.put_i32_le(Opcode::Query.as_i32());
        buf.put_i32_le(self.options.bits());
        buf.put_slice(self.namespace.as_bytes());
        buf.put_u8(0);
        buf.put_i32_le(self.skip);
        buf.put_i32_le(self.limit);
        buf.put_slice(&self.query);
        if let Some(projection) = &self.projection {
            buf.put_slice(projection);
        }

        let total = buf.len();
        let length = i32::try_from(total).map_err(|_| ProtocolError::OversizedFrame(total))?;
        write_at::<i32, LittleEndian>(&mut buf, 0, length).ok_or(ProtocolError::FrameTooShort {
            len: total,
            min: HEADER_SIZE,
        })?;

        Ok(buf.freeze())
    }
}
