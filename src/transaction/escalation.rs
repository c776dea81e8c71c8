// Record-to-table lock escalation
use super::ledger::LockId;
use super::transaction::Transaction;
use super::types::LockMode;
use crate::error::{Error, Result};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Record locks were collapsed into the table lock.
    Escalated { collapsed: usize, mode: LockMode },
    NotEscalated,
}

/// Promotes a burst of record locks into one table lock once a
/// per-transaction limit is exceeded.
#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy {
    record_lock_limit: usize,
}

impl EscalationPolicy {
    pub fn new(record_lock_limit: usize) -> Self {
        EscalationPolicy { record_lock_limit }
    }

    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    pub fn record_lock_limit(&self) -> usize {
        self.record_lock_limit
    }

    /// Called before inserting a record lock under `table_lock`.
    ///
    /// The pending insertion counts toward the limit, so exactly
    /// `record_lock_limit` record locks fit under one table lock.
    pub fn try_escalate(&self, trx: &mut Transaction, table_lock: LockId) -> Result<Escalation> {
        let table_key = trx.ledger().get(table_lock).ok_or(Error::StaleLockHandle)?.key;
        let tracked = trx.tracked_records(table_key).len();
        if tracked < self.record_lock_limit {
            return Ok(Escalation::NotEscalated);
        }

        let collapsed = trx.drop_tracked_records(table_key)?;

        // Fold the upgrade chain of the table lock into its root entry.
        let mut folded = LockMode::NoLock;
        let mut cursor = table_lock;
        loop {
            let lock = trx.ledger().get(cursor).ok_or(Error::StaleLockHandle)?;
            folded = folded.upgrade(lock.mode);
            let prev = lock.prev;
            match prev {
                Some(prev) => {
                    trx.remove_lock(cursor)?;
                    cursor = prev;
                }
                None => break,
            }
        }

        let mode = folded.upgrade(LockMode::Shared);
        let root = trx.ledger_mut().get_mut(cursor).ok_or(Error::StaleLockHandle)?;
        root.mode = mode;

        debug!(
            table = %root.descriptor,
            key = %table_key,
            collapsed,
            mode = %mode,
            "escalated record locks to table lock"
        );

        trx.stats.escalations += 1;
        trx.stats.escalated_records += collapsed as u64 + 1;
        Ok(Escalation::Escalated { collapsed, mode })
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}
