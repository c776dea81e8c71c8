//! Lock-state reconstruction for two-phase-locking logs
//!
//! Replays a textual log of lock acquisitions and releases and rebuilds the
//! set of locks each transaction effectively held, applying the intention
//! lock upgrade algebra, table/record hierarchy and record-lock escalation.

pub mod config;
pub mod error;
pub mod lock_log;
pub mod report;
pub mod transaction;

pub use config::{OutputFormat, ReplayConfig};
pub use error::{Error, Result};
pub use lock_log::{replay_file, DispatchPolicy, LockLogReplayer};
pub use report::Report;
pub use transaction::{LockKey, LockMode, Transaction, TransactionId};
