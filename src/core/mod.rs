//! # Core Wire Components
//!
//! Endian-safe scalar storage, frame headers, and embedded document views.
//!
//! ## Components
//! - **Byte order**: Host/wire conversion for every supported scalar width
//! - **Packed**: Padding-free typed cells and bounds-checked buffer views
//! - **Header**: The 16-byte frame header and the validated [`Frame`](header::Frame)
//! - **Document**: Zero-copy length-prefixed documents with optional structural checks
//!
//! ## Wire Format
//! ```text
//! [messageLength(4)] [requestID(4)] [responseTo(4)] [opCode(4)] [body(N)]
//! ```
//! All header integers are little-endian.
//!
//! ## Security
//! - Declared frame length must equal the buffer length
//! - Maximum frame size: 48MB (prevents memory exhaustion)
//! - Every typed read is preceded by an explicit length check

pub mod byte_order;
pub mod document;
pub mod header;
pub mod packed;
