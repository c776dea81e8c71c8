// Reconstructed transaction state
use super::ledger::{Lock, LockId, LockLedger};
use super::types::{LockKey, TransactionId};
use crate::error::{Error, Result};
use ahash::{AHashMap, AHashSet};
use serde::Serialize;

/// Counters describing how the lock events of one transaction were folded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionStats {
    /// Acquisition events seen.
    pub acquisitions: u64,
    /// Entries appended to the ledger.
    pub appended: u64,
    /// Requests already covered by the held mode.
    pub redundant: u64,
    /// Held entries converted in place (direct-upgrade policy).
    pub upgraded_in_place: u64,
    /// Record requests skipped because the table lock covers them.
    pub subsumed_records: u64,
    pub escalations: u64,
    /// Record locks dropped by escalation, including the triggering request.
    pub escalated_records: u64,
}

/// One transaction inferred from the log.
#[derive(Debug, Default)]
pub struct Transaction {
    id: Option<TransactionId>,
    ledger: LockLedger,
    // table lock key -> record locks tracked beneath it, in insertion order
    table_index: AHashMap<LockKey, Vec<LockId>>,
    record_owner: AHashMap<LockId, LockKey>,
    releases: Vec<String>,
    released_tables: AHashSet<String>,
    pub stats: TransactionStats,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<TransactionId> {
        self.id
    }

    /// Binds the transaction to the first id seen; later events must agree.
    pub fn bind_id(&mut self, found: TransactionId, line: usize) -> Result<()> {
        match self.id {
            Some(expected) if expected != found => Err(Error::TrxIdMismatch {
                line,
                expected: expected.as_u64(),
                found: found.as_u64(),
            }),
            _ => {
                self.id = Some(found);
                Ok(())
            }
        }
    }

    pub fn ledger(&self) -> &LockLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut LockLedger {
        &mut self.ledger
    }

    pub fn locks(&self) -> impl Iterator<Item = &Lock> {
        self.ledger.iter().map(|(_, lock)| lock)
    }

    /// Registers a record lock under its owning table lock key.
    pub fn track_record(&mut self, table_key: LockKey, record: LockId) {
        self.table_index.entry(table_key).or_default().push(record);
        self.record_owner.insert(record, table_key);
    }

    pub fn tracked_records(&self, table_key: LockKey) -> &[LockId] {
        self.table_index
            .get(&table_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Removes an entry from the ledger and from the table index.
    pub fn remove_lock(&mut self, id: LockId) -> Result<Lock> {
        let lock = self.ledger.remove(id)?;
        if let Some(table_key) = self.record_owner.remove(&id) {
            if let Some(records) = self.table_index.get_mut(&table_key) {
                records.retain(|r| *r != id);
                if records.is_empty() {
                    self.table_index.remove(&table_key);
                }
            }
        }
        Ok(lock)
    }

    /// Removes every record lock tracked under `table_key` from both the
    /// ledger and the index. Returns how many were removed.
    pub fn drop_tracked_records(&mut self, table_key: LockKey) -> Result<usize> {
        let records = self.table_index.remove(&table_key).unwrap_or_default();
        for record in &records {
            self.record_owner.remove(record);
            self.ledger.remove(*record)?;
        }
        Ok(records.len())
    }

    /// Records the release of every lock held on table `descriptor`.
    ///
    /// Ledger state is left untouched: under strict 2PL the final ledger is
    /// the set that was released at commit.
    pub fn release_table(&mut self, descriptor: &str, line: usize) -> Result<()> {
        let mut table_keys: Vec<LockKey> = Vec::new();
        for (id, lock) in self.ledger.iter() {
            if lock.descriptor == descriptor
                && !self.record_owner.contains_key(&id)
                && !table_keys.contains(&lock.key)
            {
                table_keys.push(lock.key);
            }
        }
        if table_keys.is_empty() {
            return Err(Error::UnheldRelease {
                line,
                table: descriptor.to_string(),
            });
        }
        if !self.released_tables.insert(descriptor.to_string()) {
            return Ok(());
        }

        for table_key in &table_keys {
            let Some(records) = self.table_index.get(table_key) else {
                continue;
            };
            for record in records.iter().rev() {
                if let Some(lock) = self.ledger.get(*record) {
                    self.releases.push(lock.descriptor.clone());
                }
            }
        }
        self.releases.push(descriptor.to_string());
        Ok(())
    }

    /// Descriptors of released locks, in release order.
    pub fn releases(&self) -> &[String] {
        &self.releases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::LockMode;

    fn table(trx: &mut Transaction, name: &str, mode: LockMode) -> (LockKey, LockId) {
        let key = LockKey::from_identity(name);
        (key, trx.ledger_mut().append(key, name.to_string(), mode, String::new()))
    }

    fn record(trx: &mut Transaction, table_key: LockKey, name: &str) -> LockId {
        let key = LockKey::from_identity(name);
        let id = trx
            .ledger_mut()
            .append(key, name.to_string(), LockMode::Exclusive, String::new());
        trx.track_record(table_key, id);
        id
    }

    #[test]
    fn test_bind_id_rejects_second_id() {
        let mut trx = Transaction::new();
        assert_eq!(trx.id(), None);
        trx.bind_id(TransactionId(42), 1).unwrap();
        trx.bind_id(TransactionId(42), 2).unwrap();
        let err = trx.bind_id(TransactionId(43), 3).unwrap_err();
        assert_eq!(err.kind(), "TRX_ID_MISMATCH");
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_remove_lock_updates_index() {
        let mut trx = Transaction::new();
        let (t, _) = table(&mut trx, "t", LockMode::IntentExclusive);
        let r1 = record(&mut trx, t, "1 2 3");
        let r2 = record(&mut trx, t, "1 2 4");
        assert_eq!(trx.tracked_records(t), &[r1, r2]);

        trx.remove_lock(r1).unwrap();
        assert_eq!(trx.tracked_records(t), &[r2]);
        assert_eq!(trx.ledger().len(), 2);
    }

    #[test]
    fn test_drop_tracked_records() {
        let mut trx = Transaction::new();
        let (t, table_id) = table(&mut trx, "t", LockMode::IntentExclusive);
        let (u, _) = table(&mut trx, "u", LockMode::IntentShared);
        record(&mut trx, t, "1 2 3");
        record(&mut trx, t, "1 2 4");
        let other = record(&mut trx, u, "9 9 9");

        assert_eq!(trx.drop_tracked_records(t).unwrap(), 2);
        assert!(trx.tracked_records(t).is_empty());
        assert_eq!(trx.tracked_records(u), &[other]);
        assert!(trx.ledger().contains(table_id));
        assert_eq!(trx.ledger().len(), 3);
    }

    #[test]
    fn test_release_table_lists_records_then_table_once() {
        let mut trx = Transaction::new();
        let (t, _) = table(&mut trx, "t", LockMode::IntentExclusive);
        record(&mut trx, t, "1 2 3");
        record(&mut trx, t, "1 2 4");

        trx.release_table("t", 10).unwrap();
        trx.release_table("t", 11).unwrap();
        assert_eq!(trx.releases(), &["1 2 4", "1 2 3", "t"]);
        assert_eq!(trx.ledger().len(), 3);

        let err = trx.release_table("missing", 12).unwrap_err();
        assert_eq!(err.kind(), "UNHELD_RELEASE");
    }
}
