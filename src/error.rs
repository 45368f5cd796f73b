//! # Error Types
//!
//! Error handling for the wire substrate.
//!
//! Every failure the crate can report is a variant of [`ProtocolError`], and every
//! variant belongs to exactly one [`ErrorKind`]:
//!
//! ## Error Categories
//! - **Protocol framing**: truncated buffers, inconsistent length prefixes, oversized
//!   embedded documents. Fatal to the current request only.
//! - **Identity faults**: entropy self-test failure, re-identification collision,
//!   unusable wall clock. Fatal to the process; identifiers can no longer be minted safely.
//! - **Usage faults**: contract violations by the caller, such as resetting a cursor
//!   that was never marked or building an identifier from a malformed hex string.
//! - **Configuration**: unreadable or invalid configuration.
//!
//! Framing errors are never retried or reinterpreted. Anything ambiguous between
//! corrupt input and a valid edge case is rejected.
//!
//! ## Example Usage
//! ```rust
//! use dbwire::core::header::Frame;
//! use dbwire::error::{ErrorKind, ProtocolError};
//! use tracing::warn;
//!
//! let truncated = [0x20, 0x00, 0x00, 0x00, 0x01];
//! match Frame::new(&truncated) {
//!     Err(e) if e.kind() == ErrorKind::ProtocolFraming => warn!(error = %e, "rejecting request"),
//!     Err(e) => panic!("unexpected error class: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Framing contexts
    pub const CTX_FRAME_HEADER: &str = "frame header";
    pub const CTX_RESERVED_FIELD: &str = "reserved flags field";
    pub const CTX_INT32: &str = "int32 field";
    pub const CTX_INT64: &str = "int64 field";
    pub const CTX_OBJECT_ID: &str = "object id field";
    pub const CTX_DOCUMENT_PREFIX: &str = "document length prefix";
    pub const CTX_REPLY_HEADER: &str = "reply header";

    /// Identity errors
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
    pub const ERR_TIME_OVERFLOW: &str = "System time does not fit in 32-bit seconds";
    pub const ERR_LOCK_POISONED: &str = "Identity salt lock poisoned";
    pub const ERR_ENTROPY_LOCK: &str = "Seeded entropy generator lock poisoned";

    /// Document validation errors
    pub const ERR_MISSING_TERMINATOR: &str = "document is not terminated by a zero byte";
    pub const ERR_UNTERMINATED_KEY: &str = "element name is not terminated";
    pub const ERR_ELEMENT_OVERRUN: &str = "element value runs past the end of its document";
    pub const ERR_BAD_STRING: &str = "string length prefix is inconsistent";
}

/// Classification of a [`ProtocolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad bytes from a peer. Abort this request only.
    ProtocolFraming,
    /// The identity/entropy machinery is unsound. Abort the process.
    IdentityFault,
    /// The caller broke an API contract.
    UsageFault,
    /// Configuration could not be loaded or is invalid.
    Config,
}

// ProtocolError is the primary error type for all wire operations
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("Frame too short: {len} bytes (minimum {min})")]
    FrameTooShort { len: usize, min: usize },

    #[error("Frame length mismatch: header declares {declared} bytes, buffer holds {actual}")]
    LengthMismatch { declared: i64, actual: usize },

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Truncated {context}: need {needed} bytes, {remaining} remain")]
    Truncated {
        context: String,
        needed: usize,
        remaining: usize,
    },

    #[error("Namespace is not terminated before the end of the frame")]
    UnterminatedNamespace,

    #[error("Namespace is not valid UTF-8")]
    InvalidNamespace,

    #[error("Client Error: message contains no documents")]
    NoDocuments,

    #[error("Client Error: invalid object size {0}")]
    InvalidDocumentSize(i64),

    #[error("Client Error: next object ({declared} bytes) larger than space left in message ({remaining} bytes)")]
    OversizedDocument { declared: usize, remaining: usize },

    #[error("Client Error: bad object in message at offset {offset}: {reason}")]
    MalformedDocument { offset: usize, reason: String },

    #[error("Entropy source failure: {0}")]
    EntropyFailure(String),

    #[error("Entropy self-test failed: three consecutive nonces were identical")]
    EntropySelfTest,

    #[error("Re-identification produced a salt identical to a freshly generated one")]
    ReidentifyCollision,

    #[error("Clock error: {0}")]
    ClockError(String),

    #[error("Synchronization primitive poisoned: {0}")]
    LockPoisoned(String),

    #[error("Cursor reset without a prior mark")]
    MarkNotSet,

    #[error("Invalid object id string: {0}")]
    InvalidObjectIdHex(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Which class of failure this is.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::FrameTooShort { .. }
            | ProtocolError::LengthMismatch { .. }
            | ProtocolError::OversizedFrame(_)
            | ProtocolError::Truncated { .. }
            | ProtocolError::UnterminatedNamespace
            | ProtocolError::InvalidNamespace
            | ProtocolError::NoDocuments
            | ProtocolError::InvalidDocumentSize(_)
            | ProtocolError::OversizedDocument { .. }
            | ProtocolError::MalformedDocument { .. } => ErrorKind::ProtocolFraming,

            ProtocolError::EntropyFailure(_)
            | ProtocolError::EntropySelfTest
            | ProtocolError::ReidentifyCollision
            | ProtocolError::ClockError(_)
            | ProtocolError::LockPoisoned(_) => ErrorKind::IdentityFault,

            ProtocolError::MarkNotSet | ProtocolError::InvalidObjectIdHex(_) => {
                ErrorKind::UsageFault
            }

            ProtocolError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// True when the process can no longer continue safely.
    pub fn is_fatal_to_process(&self) -> bool {
        self.kind() == ErrorKind::IdentityFault
    }

    /// Create a Truncated error for a read or write of `needed` bytes
    pub fn truncated(context: &str, needed: usize, remaining: usize) -> Self {
        Self::Truncated {
            context: context.to_string(),
            needed,
            remaining,
        }
    }

    /// Create a MalformedDocument error
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            offset,
            reason: reason.into(),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
