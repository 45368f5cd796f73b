//! # Object Ids
//!
//! 12-byte identifiers, unique with high probability across an uncoordinated fleet.
//!
//! ## Layout
//! ```text
//! [timestamp BE(4)] [salt(5)] [counter BE(3)]
//! ```
//!
//! Byte-wise comparison is the sort order for stored ids, so the timestamp leads and
//! the counter is big-endian even though the rest of the wire is little-endian.
//! Ids from one process within one second compare in creation order until the
//! 24-bit counter wraps.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::context::{IdentityContext, Salt, SALT_LEN};
use crate::core::packed::{Be, PackedRead};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::global_metrics;
use crate::utils::time;

/// Object id width in bytes
pub const OBJECT_ID_LEN: usize = 12;

const SALT_OFFSET: usize = 4;
const COUNTER_OFFSET: usize = SALT_OFFSET + SALT_LEN;

/// A 96-bit object id. Ordered byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// All-zero id, used as "not set".
    pub const NIL: Self = Self([0; OBJECT_ID_LEN]);

    pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy an id out of a slice of exactly 12 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; OBJECT_ID_LEN]>::try_from(bytes).ok().map(Self)
    }

    /// Mint an id for `timestamp` from the context's salt and counter.
    pub fn with_identity(context: &IdentityContext, timestamp: u32) -> Result<Self> {
        let (salt, counter) = context.stamp()?;

        let mut bytes = [0u8; OBJECT_ID_LEN];
        bytes[..SALT_OFFSET].copy_from_slice(Be::<u32>::new(timestamp).as_bytes());
        bytes[SALT_OFFSET..COUNTER_OFFSET].copy_from_slice(salt.as_bytes());
        bytes[COUNTER_OFFSET..].copy_from_slice(&Be::<u32>::new(counter).as_bytes()[1..]);
        Ok(Self(bytes))
    }

    /// Parse exactly 24 hex characters.
    pub fn parse_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; OBJECT_ID_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| ProtocolError::InvalidObjectIdHex(format!("{s:?}: {e}")))?;
        Ok(Self(bytes))
    }

    /// Range boundary for `timestamp`. The tail is all zero bits, or all one bits
    /// when `max` is set.
    pub fn boundary(timestamp: u32, max: bool) -> Self {
        let mut bytes = [if max { 0xFF } else { 0x00 }; OBJECT_ID_LEN];
        bytes[..SALT_OFFSET].copy_from_slice(Be::<u32>::new(timestamp).as_bytes());
        Self(bytes)
    }

    /// Range boundary for a date in milliseconds since the epoch.
    pub fn from_date_millis(millis: u64, max: bool) -> Result<Self> {
        let secs = u32::try_from(millis / 1000)
            .map_err(|_| ProtocolError::ClockError(constants::ERR_TIME_OVERFLOW.into()))?;
        Ok(Self::boundary(secs, max))
    }

    /// Creation time in seconds since the epoch.
    pub fn as_time(&self) -> u32 {
        Be::<u32>::from_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]).get()
    }

    pub fn as_system_time(&self) -> SystemTime {
        time::from_unix_seconds(self.as_time())
    }

    pub fn salt(&self) -> Salt {
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&self.0[SALT_OFFSET..COUNTER_OFFSET]);
        Salt::from_bytes(salt)
    }

    pub fn counter(&self) -> u32 {
        Be::<u32>::from_bytes([0, self.0[9], self.0[10], self.0[11]]).get()
    }

    pub fn is_set(&self) -> bool {
        *self != Self::NIL
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// 24 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Source of wall-clock seconds for id timestamps.
pub trait Clock: Send + Sync {
    fn unix_seconds(&self) -> Result<u32>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_seconds(&self) -> Result<u32> {
        time::unix_seconds()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU32);

impl ManualClock {
    pub fn new(secs: u32) -> Self {
        Self(AtomicU32::new(secs))
    }

    pub fn set(&self, secs: u32) {
        self.0.store(secs, Ordering::Relaxed);
    }

    pub fn advance(&self, secs: u32) {
        self.0.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn unix_seconds(&self) -> Result<u32> {
        Ok(self.0.load(Ordering::Relaxed))
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn unix_seconds(&self) -> Result<u32> {
        (**self).unix_seconds()
    }
}

/// Mints ids from a shared [`IdentityContext`] and a [`Clock`].
#[derive(Debug, Clone)]
pub struct ObjectIdGenerator<C: Clock = SystemClock> {
    context: Arc<IdentityContext>,
    clock: C,
}

impl ObjectIdGenerator<SystemClock> {
    pub fn new(context: Arc<IdentityContext>) -> Self {
        Self::with_clock(context, SystemClock)
    }
}

impl<C: Clock> ObjectIdGenerator<C> {
    pub fn with_clock(context: Arc<IdentityContext>, clock: C) -> Self {
        Self { context, clock }
    }

    pub fn create(&self) -> Result<ObjectId> {
        let id = ObjectId::with_identity(&self.context, self.clock.unix_seconds()?)?;
        global_metrics().id_minted();
        Ok(id)
    }

    pub fn context(&self) -> &Arc<IdentityContext> {
        &self.context
    }
}
