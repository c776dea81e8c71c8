use thiserror::Error;

use crate::transaction::LockKey;

#[derive(Error, Debug)]
pub enum Error {
    #[error("INVALID_LOG_LINE at line {line}: {reason}: {text:?}")]
    InvalidLogLine {
        line: usize,
        reason: String,
        text: String,
    },

    #[error("TRX_ID_MISMATCH at line {line}: transaction {expected} received event for {found}")]
    TrxIdMismatch { line: usize, expected: u64, found: u64 },

    #[error("INVALID_LOCK_MODE at line {line}: {token:?}")]
    InvalidLockMode { line: usize, token: String },

    #[error("ORPHAN_RECORD_LOCK at line {line}: no table lock held on {table}")]
    OrphanRecordLock { line: usize, table: String },

    #[error("UNHELD_RELEASE at line {line}: release of {table} which is not locked")]
    UnheldRelease { line: usize, table: String },

    #[error("KEY_COLLISION at line {line}: {key} maps both {existing:?} and {incoming:?}")]
    KeyCollision {
        line: usize,
        key: LockKey,
        existing: String,
        incoming: String,
    },

    #[error("STALE_LOCK_HANDLE: lock entry was already removed from the ledger")]
    StaleLockHandle,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid qualifier pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// Stable fault name, used by the CLI and in tests.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidLogLine { .. } => "INVALID_LOG_LINE",
            Error::TrxIdMismatch { .. } => "TRX_ID_MISMATCH",
            Error::InvalidLockMode { .. } => "INVALID_LOCK_MODE",
            Error::OrphanRecordLock { .. } => "ORPHAN_RECORD_LOCK",
            Error::UnheldRelease { .. } => "UNHELD_RELEASE",
            Error::KeyCollision { .. } => "KEY_COLLISION",
            Error::StaleLockHandle => "STALE_LOCK_HANDLE",
            Error::ConfigError(_) => "CONFIG",
            Error::InvalidPattern(_) => "INVALID_PATTERN",
            Error::IoError(_) => "IO",
            Error::JsonError(_) => "JSON",
        }
    }

    /// Source line of a structural fault, if the error carries one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::InvalidLogLine { line, .. }
            | Error::TrxIdMismatch { line, .. }
            | Error::InvalidLockMode { line, .. }
            | Error::OrphanRecordLock { line, .. }
            | Error::UnheldRelease { line, .. }
            | Error::KeyCollision { line, .. } => Some(*line),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
