//! The unit of work exchanged between coordinator and workers.
//!
//! A [`Task`] is an immutable value: executing it yields a result and a batch
//! of children, never a modified task. Children are derived from the parent's
//! payload digest, so the whole tree is a pure function of the seed tasks.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::config::TreeConfig;
use crate::error::CoreError;

/// Size of a task payload in bytes.
pub const DIGEST_LEN: usize = 32;

/// Opaque fixed-size task payload: a SHA-256 state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest(#[serde(with = "digest_bytes")] pub [u8; DIGEST_LEN]);

impl Digest {
    /// Hash arbitrary bytes into a digest.
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Hash this digest together with a little-endian index.
    pub fn derive(&self, index: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hasher.update(index.to_le_bytes());
        Self(hasher.finalize().into())
    }

    /// First eight bytes as a little-endian integer.
    pub fn prefix_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(buf)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..6] {
            write!(f, "{b:02x}")?;
        }
        f.write_str("…")
    }
}

/// Inclusive bounds on how many children a branching task emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRange {
    pub min: u32,
    pub max: u32,
}

impl BranchRange {
    pub fn new(min: u32, max: u32) -> Result<Self, CoreError> {
        if min > max {
            return Err(CoreError::BranchRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Number of distinct child counts in the range.
    pub fn width(&self) -> u64 {
        u64::from(self.max - self.min) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Remaining subdivision budget. Depth 0 tasks are always leaves.
    pub depth: u32,
    pub branch: BranchRange,
    /// Chance that a non-terminal task produces any children at all.
    pub branch_probability: f64,
    pub payload: Digest,
}

impl Task {
    /// Build the seed tasks described by the tree configuration.
    ///
    /// Root `i` gets payload `sha256(instance || i)`.
    pub fn seeds(tree: &TreeConfig) -> Result<Vec<Task>, CoreError> {
        let branch = BranchRange::new(tree.min_children, tree.max_children)?;
        let instance = Digest::of(tree.instance.as_bytes());
        Ok((0..tree.seeds)
            .map(|i| Task {
                depth: tree.depth,
                branch,
                branch_probability: tree.branch_probability,
                payload: instance.derive(i),
            })
            .collect())
    }

    pub fn is_terminal(&self) -> bool {
        self.depth == 0
    }

    /// The child at `index`, one level shallower than `self`.
    pub fn child(&self, index: u32) -> Task {
        Task {
            depth: self.depth.saturating_sub(1),
            branch: self.branch,
            branch_probability: self.branch_probability,
            payload: self.payload.derive(index),
        }
    }

    /// Children `0..count`. Terminal tasks never expand.
    pub fn expand(&self, count: u32) -> Vec<Task> {
        if self.is_terminal() {
            return Vec::new();
        }
        (0..count).map(|i| self.child(i)).collect()
    }
}

/// Serialize a fixed digest as a MessagePack `bin` rather than a 32-tuple.
mod digest_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DIGEST_LEN;

    pub fn serialize<S: Serializer>(bytes: &[u8; DIGEST_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; DIGEST_LEN], D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::invalid_length(bytes.len(), &"32 bytes"))
    }
}
