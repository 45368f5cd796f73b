//! # Request Parsing and Reply Assembly
//!
//! - **Cursor**: bounds-checked sequential reader (and writer) over one frame body
//! - **Query**: canonical query field sequence, decoded and encoded
//! - **Reply**: two-phase reply construction and the client-side reply reader
//!
//! Every framing failure aborts the one request being parsed and is reported as a
//! [`ProtocolFraming`](crate::error::ErrorKind::ProtocolFraming) error. Nothing here
//! blocks or performs I/O; delivering bytes is the transport's job.

pub mod cursor;
pub mod query;
pub mod reply;
