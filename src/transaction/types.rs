// Lock-mode algebra and identity types
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Transaction id as printed by the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Intention-lock modes. `NoLock` and `SharedIntentExclusive` only arise
/// from [`LockMode::upgrade`]; the log never names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    #[serde(rename = "NL")]
    NoLock,
    #[serde(rename = "S")]
    Shared,
    #[serde(rename = "X")]
    Exclusive,
    #[serde(rename = "IS")]
    IntentShared,
    #[serde(rename = "IX")]
    IntentExclusive,
    #[serde(rename = "SIX")]
    SharedIntentExclusive,
}

impl LockMode {
    pub const ALL: [LockMode; 6] = [
        LockMode::NoLock,
        LockMode::Shared,
        LockMode::Exclusive,
        LockMode::IntentShared,
        LockMode::IntentExclusive,
        LockMode::SharedIntentExclusive,
    ];

    /// Least mode dominating both `self` and `other`.
    pub fn upgrade(self, other: LockMode) -> LockMode {
        use LockMode::*;
        match (self, other) {
            (NoLock, m) | (m, NoLock) => m,
            (Exclusive, _) | (_, Exclusive) => Exclusive,
            (SharedIntentExclusive, _) | (_, SharedIntentExclusive) => SharedIntentExclusive,
            (Shared, IntentExclusive) | (IntentExclusive, Shared) => SharedIntentExclusive,
            (Shared, Shared) | (Shared, IntentShared) | (IntentShared, Shared) => Shared,
            (IntentExclusive, IntentExclusive)
            | (IntentExclusive, IntentShared)
            | (IntentShared, IntentExclusive) => IntentExclusive,
            (IntentShared, IntentShared) => IntentShared,
        }
    }

    /// Whether two different transactions may hold `self` and `other` on the
    /// same resource at the same time.
    pub fn is_compatible(&self, other: &LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (NoLock, _) | (_, NoLock) => true,
            (Exclusive, _) | (_, Exclusive) => false,
            (IntentShared, _) | (_, IntentShared) => true,
            (IntentExclusive, IntentExclusive) => true,
            (Shared, Shared) => true,
            (IntentExclusive, Shared) | (Shared, IntentExclusive) => false,
            (SharedIntentExclusive, _) | (_, SharedIntentExclusive) => false,
        }
    }

    /// True when holding `self` already implies `other`.
    pub fn dominates(self, other: LockMode) -> bool {
        self.upgrade(other) == self
    }

    /// Whether a table lock held in `self` already covers a record lock
    /// requested in `requested`, so the record lock needs no bookkeeping.
    pub fn covers_records(self, requested: LockMode) -> bool {
        use LockMode::*;
        match self {
            IntentShared | IntentExclusive => false,
            SharedIntentExclusive => requested != Exclusive,
            NoLock | Shared | Exclusive => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::NoLock => "NL",
            LockMode::Shared => "S",
            LockMode::Exclusive => "X",
            LockMode::IntentShared => "IS",
            LockMode::IntentExclusive => "IX",
            LockMode::SharedIntentExclusive => "SIX",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown lock mode {0:?}")]
pub struct ParseLockModeError(pub String);

impl FromStr for LockMode {
    type Err = ParseLockModeError;

    /// Only the modes a storage engine logs are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X" => Ok(LockMode::Exclusive),
            "S" => Ok(LockMode::Shared),
            "IX" => Ok(LockMode::IntentExclusive),
            "IS" => Ok(LockMode::IntentShared),
            _ => Err(ParseLockModeError(s.to_string())),
        }
    }
}

/// 64-bit hash of a lock identity string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockKey(pub u64);

impl LockKey {
    pub fn from_identity(identity: &str) -> Self {
        LockKey(xxh3_64(identity.as_bytes()))
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Resource granularity of a lock event and the field layout of its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Table,
    Record,
}

impl Granularity {
    pub fn min_fields(&self) -> usize {
        match self {
            Granularity::Table => 9,
            Granularity::Record => 18,
        }
    }

    pub fn trx_id_field(&self) -> usize {
        match self {
            Granularity::Table => 6,
            Granularity::Record => 15,
        }
    }

    pub fn mode_field(&self) -> usize {
        match self {
            Granularity::Table => 8,
            Granularity::Record => 17,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Table => f.write_str("TABLE"),
            Granularity::Record => f.write_str("RECORD"),
        }
    }
}
