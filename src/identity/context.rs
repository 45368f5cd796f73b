//! # Identity Context
//!
//! Process-wide identity state behind every minted [`ObjectId`](super::ObjectId):
//! a 5-byte salt (3 machine bytes, 2 process bytes) and a 24-bit counter.
//!
//! ## Lifecycle
//! - **Startup**: [`IdentityContext::new`] self-tests the entropy source, draws the
//!   raw salt, folds in the process id and seeds the counter from fresh entropy.
//! - **Steady state**: ids read the salt and atomically bump the counter.
//! - **Fork points**: [`IdentityContext::reidentify`] replaces the salt (never the
//!   counter) under the salt write lock, so no id straddles two identities.
//!
//! Entropy or re-identification failures are identity faults. The process should
//! stop minting ids when one is returned.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{info, instrument};

use super::entropy::{EntropySource, OsEntropy};
use crate::core::packed::{Le, PackedField};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::metrics::global_metrics;

/// Salt width in bytes
pub const SALT_LEN: usize = 5;

/// Counter values are truncated to this many low bits on the wire
pub const COUNTER_MASK: u32 = 0x00FF_FFFF;

const MACHINE_LEN: usize = 3;
const PID_OFFSET: usize = 3;
const PID_HIGH_OFFSET: usize = 1;

/// Machine and process component of an object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    pub const fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    /// Low five bytes of a little-endian nonce.
    pub fn from_nonce(nonce: u64) -> Self {
        let mut bytes = [0u8; SALT_LEN];
        bytes.copy_from_slice(&nonce.to_le_bytes()[..SALT_LEN]);
        Self(bytes)
    }

    /// XOR `pid` into the process bytes. Bits above 16 perturb machine bytes 1 and 2.
    pub fn fold_in_pid(self, pid: u32) -> Self {
        let mut folded = self;
        folded.xor_u16(PID_OFFSET, pid as u16);
        folded.xor_u16(PID_HIGH_OFFSET, (pid >> 16) as u16);
        folded
    }

    fn xor_u16(&mut self, offset: usize, mask: u16) {
        let mut cell = Le::<u16>::from_bytes([self.0[offset], self.0[offset + 1]]);
        cell.bit_xor(mask);
        self.0[offset..offset + 2].copy_from_slice(cell.as_bytes());
    }

    pub fn machine(&self) -> [u8; MACHINE_LEN] {
        [self.0[0], self.0[1], self.0[2]]
    }

    pub fn process(&self) -> [u8; SALT_LEN - MACHINE_LEN] {
        [self.0[3], self.0[4]]
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

/// Shared identity state. Wrap in an [`Arc`] and hand to each generator.
#[derive(Debug)]
pub struct IdentityContext {
    entropy: Arc<dyn EntropySource>,
    /// Raw salt before any pid was folded in
    pre_fork: Salt,
    salt: RwLock<Salt>,
    counter: AtomicU32,
}

impl IdentityContext {
    /// Seed a context from `entropy` for process `pid`.
    #[instrument(level = "info", skip(entropy))]
    pub fn new(entropy: Arc<dyn EntropySource>, pid: u32) -> Result<Self> {
        let raw = generate_raw(entropy.as_ref())?;
        let salt = raw.fold_in_pid(pid);
        let counter = entropy.nonce()? as u32;

        info!(machine_id = machine_id_of(&salt), "Identity context initialized");

        Ok(Self {
            entropy,
            pre_fork: raw,
            salt: RwLock::new(salt),
            counter: AtomicU32::new(counter),
        })
    }

    /// Seed from the operating system for the current process.
    pub fn from_os() -> Result<Self> {
        Self::new(Arc::new(OsEntropy), std::process::id())
    }

    pub fn salt(&self) -> Result<Salt> {
        self.salt
            .read()
            .map(|salt| *salt)
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LOCK_POISONED.into()))
    }

    /// Raw startup salt. Fixed for the life of the context.
    pub fn pre_fork_salt(&self) -> Salt {
        self.pre_fork
    }

    /// The three machine bytes as a little-endian integer.
    pub fn machine_id(&self) -> Result<u32> {
        self.salt().map(|salt| machine_id_of(&salt))
    }

    /// Next counter value, low 24 bits only. Wraps silently.
    pub fn next_counter(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK
    }

    /// Salt and counter for one id, read as a single consistent pair.
    pub(crate) fn stamp(&self) -> Result<(Salt, u32)> {
        let salt = self
            .salt
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LOCK_POISONED.into()))?;
        Ok((*salt, self.next_counter()))
    }

    /// Re-derive the salt for `pid` after a fork.
    ///
    /// The candidate is the pre-fork raw salt with `pid` folded in. A fresh salt is
    /// drawn for comparison; if the two match the entropy source did not diverge
    /// across the fork and [`ProtocolError::ReidentifyCollision`] is returned.
    #[instrument(level = "info", skip(self))]
    pub fn reidentify(&self, pid: u32) -> Result<()> {
        let mut salt = self
            .salt
            .write()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LOCK_POISONED.into()))?;

        let candidate = self.pre_fork.fold_in_pid(pid);
        let fresh = generate_raw(self.entropy.as_ref())?.fold_in_pid(pid);
        if candidate == fresh {
            return Err(ProtocolError::ReidentifyCollision);
        }

        *salt = candidate;
        global_metrics().reidentified();
        info!(machine_id = machine_id_of(&candidate), "Process re-identified");
        Ok(())
    }

    /// [`reidentify`](Self::reidentify) for the calling process.
    pub fn reidentify_current(&self) -> Result<()> {
        self.reidentify(std::process::id())
    }
}

/// Self-test the source, then draw a raw salt.
fn generate_raw(entropy: &dyn EntropySource) -> Result<Salt> {
    let a = entropy.nonce()?;
    let b = entropy.nonce()?;
    let c = entropy.nonce()?;
    if a == b && b == c {
        return Err(ProtocolError::EntropySelfTest);
    }
    Ok(Salt::from_nonce(entropy.nonce()?))
}

fn machine_id_of(salt: &Salt) -> u32 {
    let [m0, m1, m2] = salt.machine();
    u32::from_le_bytes([m0, m1, m2, 0])
}
