// Lock event dispatcher
use super::event::{LockEvent, SourceLine};
use crate::error::{Error, Result};
use crate::transaction::{Escalation, EscalationPolicy, Granularity, LockKey, Transaction};
use tracing::{debug, trace};

/// How acquisitions are folded into a transaction's ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchPolicy {
    pub escalation: EscalationPolicy,
    /// Convert a held lock in place when the upgraded mode conflicts with
    /// the held one, instead of appending a second entry.
    pub direct_upgrade: bool,
}

/// Applies lock events to the transactions of one parse session.
///
/// The log has no begin marker: an acquisition arriving outside a lock
/// phase starts a new transaction, and any release ends the phase. This is
/// only sound for strict 2PL logs, where a transaction releases everything
/// in one block at commit.
#[derive(Debug, Default)]
pub struct Dispatcher {
    policy: DispatchPolicy,
    in_lock_phase: bool,
    transactions: Vec<Transaction>,
}

impl Dispatcher {
    pub fn new(policy: DispatchPolicy) -> Self {
        Dispatcher {
            policy,
            in_lock_phase: false,
            transactions: Vec::new(),
        }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    pub fn in_lock_phase(&self) -> bool {
        self.in_lock_phase
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }

    /// Applies one acquisition. `extra` is the current lock qualifier.
    pub fn acquire(&mut self, event: &LockEvent<'_>, extra: &str, source: SourceLine<'_>) -> Result<()> {
        if !self.in_lock_phase || self.transactions.is_empty() {
            self.transactions.push(Transaction::new());
            trace!(line = source.number, "transaction started");
        }
        self.in_lock_phase = true;
        let policy = self.policy;
        let last = self.transactions.len() - 1;
        let trx = &mut self.transactions[last];

        trx.bind_id(event.trx_id(source)?, source.number)?;
        let descriptor = event.descriptor();
        let identity = format!("{}{}", descriptor, extra);
        let key = LockKey::from_identity(&identity);
        let requested = event.mode(source)?;
        trx.stats.acquisitions += 1;

        trace!(
            line = source.number,
            granularity = %event.granularity(),
            %descriptor,
            mode = %requested,
            "lock event"
        );

        let mode = match trx.ledger().find_latest_verified(key, &identity, source.number)? {
            Some(held_id) => {
                let held = trx.ledger().get(held_id).ok_or(Error::StaleLockHandle)?.mode;
                let combined = held.upgrade(requested);
                if combined == held {
                    trx.stats.redundant += 1;
                    return Ok(());
                }
                if policy.direct_upgrade && !combined.is_compatible(&held) {
                    let lock = trx.ledger_mut().get_mut(held_id).ok_or(Error::StaleLockHandle)?;
                    lock.mode = combined;
                    trx.stats.upgraded_in_place += 1;
                    debug!(%descriptor, from = %held, to = %combined, "upgraded lock in place");
                    return Ok(());
                }
                combined
            }
            None => requested,
        };

        match event.granularity() {
            Granularity::Table => {
                trx.ledger_mut().append(key, descriptor, mode, extra.to_string());
                trx.stats.appended += 1;
            }
            Granularity::Record => {
                let table = event.table_descriptor().unwrap_or_default();
                let table_identity = format!("{}{}", table, extra);
                let table_key = LockKey::from_identity(&table_identity);
                let table_lock = trx
                    .ledger()
                    .find_latest_verified(table_key, &table_identity, source.number)?
                    .ok_or_else(|| Error::OrphanRecordLock {
                        line: source.number,
                        table: table_identity.clone(),
                    })?;
                let table_mode = trx.ledger().get(table_lock).ok_or(Error::StaleLockHandle)?.mode;

                if table_mode.covers_records(mode) {
                    trx.stats.subsumed_records += 1;
                    trace!(%descriptor, table = %table, %table_mode, "record lock covered by table lock");
                    return Ok(());
                }

                match policy.escalation.try_escalate(trx, table_lock)? {
                    Escalation::Escalated { .. } => {}
                    Escalation::NotEscalated => {
                        let record = trx.ledger_mut().append(key, descriptor, mode, extra.to_string());
                        trx.track_record(table_key, record);
                        trx.stats.appended += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies one release. Ends the lock phase; a table release is added to
    /// the transaction's release trace.
    pub fn release(&mut self, event: &LockEvent<'_>, source: SourceLine<'_>) -> Result<()> {
        self.in_lock_phase = false;
        let Some(trx) = self.transactions.last_mut() else {
            return Err(source.invalid("release before any acquisition"));
        };
        trx.bind_id(event.trx_id(source)?, source.number)?;
        event.mode(source)?;

        if event.granularity() == Granularity::Table {
            trx.release_table(&event.descriptor(), source.number)?;
        }
        Ok(())
    }
}
