//! # Identity
//!
//! Object id generation and the process-wide identity state it draws on.
//!
//! ## Components
//! - **Entropy**: Pluggable nonce sources (OS CSPRNG, seeded generator)
//! - **Context**: Salt and counter shared by every generator in the process
//! - **Object id**: The 12-byte id type, its generator and injectable clocks
//!
//! ## Concurrency
//! The counter is the only state mutated on the hot path and is bumped with an
//! atomic fetch-add. The salt sits behind a read/write lock; re-identification
//! takes the write side, so no id is built from half of an old salt.

pub mod context;
pub mod entropy;
pub mod object_id;

pub use context::{IdentityContext, Salt};
pub use entropy::{EntropySource, OsEntropy, SeededEntropy};
pub use object_id::{Clock, ManualClock, ObjectId, ObjectIdGenerator, SystemClock};
