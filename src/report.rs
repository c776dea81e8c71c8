//! Rendering of reconstructed transactions.

use crate::error::Result;
use crate::transaction::{LockMode, Transaction, TransactionStats};
use serde::Serialize;
use std::io::Write;

const SEPARATOR: &str = "---------------------------------------------------";

#[derive(Debug, Clone, Serialize)]
pub struct LockLine {
    pub key: String,
    pub descriptor: String,
    pub mode: LockMode,
    pub extra: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionReport {
    pub id: Option<u64>,
    pub locks: Vec<LockLine>,
    pub releases: Vec<String>,
    pub stats: TransactionStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub transactions: usize,
    pub locks: usize,
    /// Surviving locks per transaction
    pub lock_avg: f64,
    pub escalations: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub transactions: Vec<TransactionReport>,
    pub summary: Summary,
}

impl Report {
    pub fn build(transactions: &[Transaction]) -> Self {
        let reports: Vec<TransactionReport> = transactions
            .iter()
            .map(|trx| TransactionReport {
                id: trx.id().map(|id| id.as_u64()),
                locks: trx
                    .locks()
                    .map(|lock| LockLine {
                        key: lock.key.to_string(),
                        descriptor: lock.descriptor.clone(),
                        mode: lock.mode,
                        extra: lock.extra.clone(),
                    })
                    .collect(),
                releases: trx.releases().to_vec(),
                stats: trx.stats,
            })
            .collect();

        let locks: usize = reports.iter().map(|r| r.locks.len()).sum();
        let lock_avg = if reports.is_empty() {
            0.0
        } else {
            locks as f64 / reports.len() as f64
        };
        let summary = Summary {
            transactions: reports.len(),
            locks,
            lock_avg,
            escalations: reports.iter().map(|r| r.stats.escalations).sum(),
        };

        Report {
            transactions: reports,
            summary,
        }
    }

    pub fn render_text<W: Write>(&self, out: &mut W) -> Result<()> {
        for trx in &self.transactions {
            writeln!(out, "{}", SEPARATOR)?;
            match trx.id {
                Some(id) => writeln!(out, "Transaction {}", id)?,
                None => writeln!(out, "Transaction ?")?,
            }
            writeln!(out, "{}", SEPARATOR)?;
            writeln!(out, "n_locks: {}", trx.locks.len())?;
            writeln!(out, "n_unlocks: {}", trx.releases.len())?;
            for lock in &trx.locks {
                write!(out, "LOCK {} {} [{}]", lock.key, lock.descriptor, lock.mode)?;
                if !lock.extra.is_empty() {
                    write!(out, " {}", lock.extra)?;
                }
                writeln!(out)?;
            }
            for release in &trx.releases {
                writeln!(out, "UNLOCK {}", release)?;
            }
            let s = &trx.stats;
            writeln!(
                out,
                "acquisitions: {} appended: {} redundant: {} upgraded_in_place: {} subsumed: {} escalations: {} escalated_records: {}",
                s.acquisitions,
                s.appended,
                s.redundant,
                s.upgraded_in_place,
                s.subsumed_records,
                s.escalations,
                s.escalated_records
            )?;
        }
        writeln!(out, "{}", SEPARATOR)?;
        writeln!(out, "transactions: {}", self.summary.transactions)?;
        writeln!(out, "escalations: {}", self.summary.escalations)?;
        writeln!(out, "lock_avg: {}", self.summary.lock_avg)?;
        Ok(())
    }

    pub fn render_json<W: Write>(&self, out: &mut W) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{LockKey, TransactionId};

    fn sample() -> Vec<Transaction> {
        let mut trx = Transaction::new();
        trx.bind_id(TransactionId(5), 1).unwrap();
        trx.ledger_mut().append(
            LockKey::from_identity("`db`.`t`w_id=1"),
            "`db`.`t`".to_string(),
            LockMode::IntentExclusive,
            "w_id=1".to_string(),
        );
        trx.ledger_mut().append(
            LockKey::from_identity("`db`.`u`"),
            "`db`.`u`".to_string(),
            LockMode::Shared,
            String::new(),
        );
        vec![trx, Transaction::new()]
    }

    #[test]
    fn test_summary() {
        let report = Report::build(&sample());
        assert_eq!(report.summary.transactions, 2);
        assert_eq!(report.summary.locks, 2);
        assert_eq!(report.summary.lock_avg, 1.0);
        assert_eq!(report.transactions[0].id, Some(5));
        assert_eq!(report.transactions[1].id, None);
    }

    #[test]
    fn test_render_text() {
        let report = Report::build(&sample());
        let mut out = Vec::new();
        report.render_text(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Transaction 5\n"));
        assert!(text.contains("n_locks: 2\n"));
        assert!(text.contains("`db`.`t` [IX] w_id=1\n"));
        assert!(text.contains("`db`.`u` [S]\n"));
        assert!(text.contains("lock_avg: 1\n"));
    }

    #[test]
    fn test_render_json() {
        let report = Report::build(&sample());
        let mut out = Vec::new();
        report.render_json(&mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["summary"]["transactions"], 2);
        assert_eq!(value["transactions"][0]["locks"][0]["mode"], "IX");
        assert_eq!(value["transactions"][0]["locks"][0]["extra"], "w_id=1");
    }

    #[test]
    fn test_empty_report() {
        let report = Report::build(&[]);
        assert_eq!(report.summary.lock_avg, 0.0);
    }
}
