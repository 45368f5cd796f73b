//! # dbwire
//!
//! Wire-level substrate for a document database protocol.
//!
//! ## Layers
//! - [`core`]: byte-order codec, padding-free packed fields, frame headers and
//!   zero-copy document views
//! - [`protocol`]: the inbound [`MessageCursor`], [`QueryRequest`] extraction and
//!   outbound [`ReplyBuilder`]
//! - [`identity`]: [`IdentityContext`] and [`ObjectIdGenerator`]
//! - [`config`], [`error`], [`utils`]: configuration, error taxonomy, logging,
//!   metrics and time helpers
//!
//! ## Example
//! ```
//! use dbwire::{DocumentView, Frame, QueryFrameBuilder, QueryRequest, ReplyBuilder, ResultFlags};
//!
//! let empty = [5u8, 0, 0, 0, 0];
//! let bytes = QueryFrameBuilder::new("app.users", DocumentView::new(&empty)?)
//!     .limit(10)
//!     .build()?;
//!
//! let frame = Frame::new(&bytes)?;
//! let query = QueryRequest::from_frame(frame)?;
//! assert_eq!(query.namespace(), "app.users");
//!
//! let reply = ReplyBuilder::single(ResultFlags::ok(), query.query())
//!     .finish(frame.request_id())?;
//! assert_eq!(reply.response_to, frame.request_id());
//! # Ok::<(), dbwire::ProtocolError>(())
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod utils;

pub use crate::core::byte_order::{BigEndian, LittleEndian, Order, Packable};
pub use crate::core::document::DocumentView;
pub use crate::core::header::{Frame, MsgHeader, Opcode, HEADER_SIZE};
pub use crate::core::packed::{Be, Le, Packed, PackedField, PackedMut, PackedRead, PackedRef};
pub use config::WireConfig;
pub use error::{ErrorKind, ProtocolError, Result};
pub use identity::{IdentityContext, ObjectId, ObjectIdGenerator};
pub use protocol::cursor::{CursorState, MessageCursor, MessageWriter};
pub use protocol::query::{QueryFrameBuilder, QueryOptions, QueryRequest};
pub use protocol::reply::{Reply, ReplyBuilder, ReplySink, ReplyView, ResultFlags};
