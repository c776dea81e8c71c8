//! Classification of tokenized lock-log lines.
//!
//! Acquisition lines look like
//!
//! ```text
//! TABLE LOCK table `db`.`t` trx id 42 lock_mode IX
//! RECORD LOCK space 5 page 3 heap_no 7 index PRIMARY of table `db`.`t` trx id 42 lock_mode X
//! ```
//!
//! A release line is `UNLOCK` followed by a line of the same layout, and a
//! `QUERY` line carries the SQL text that caused the following lock events.

use crate::error::{Error, Result};
use crate::transaction::{Granularity, LockMode, TransactionId};

/// Position of a line in the log, for error reporting.
#[derive(Debug, Clone, Copy)]
pub struct SourceLine<'a> {
    pub number: usize,
    pub text: &'a str,
}

impl<'a> SourceLine<'a> {
    pub fn new(number: usize, text: &'a str) -> Self {
        SourceLine { number, text }
    }

    pub fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidLogLine {
            line: self.number,
            reason: reason.into(),
            text: self.text.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LogEvent<'a> {
    Acquire(LockEvent<'a>),
    Release(LockEvent<'a>),
    /// Query text tokens, without the leading `QUERY`.
    Query(&'a [&'a str]),
}

impl<'a> LogEvent<'a> {
    pub fn classify(fields: &'a [&'a str], source: SourceLine<'_>) -> Result<Self> {
        match fields.first().copied() {
            Some("QUERY") => Ok(LogEvent::Query(&fields[1..])),
            Some("UNLOCK") => LockEvent::parse(&fields[1..], source).map(LogEvent::Release),
            Some(_) => LockEvent::parse(fields, source).map(LogEvent::Acquire),
            None => Err(source.invalid("empty line")),
        }
    }
}

/// A lock or unlock event whose field count and layout have been checked.
#[derive(Debug, Clone, Copy)]
pub struct LockEvent<'a> {
    granularity: Granularity,
    fields: &'a [&'a str],
}

impl<'a> LockEvent<'a> {
    pub fn parse(fields: &'a [&'a str], source: SourceLine<'_>) -> Result<Self> {
        let granularity = match fields.first().copied() {
            Some("TABLE") => Granularity::Table,
            Some("RECORD") => Granularity::Record,
            Some(other) => return Err(source.invalid(format!("unknown event type {:?}", other))),
            None => return Err(source.invalid("missing event type")),
        };
        if fields.len() < granularity.min_fields() {
            return Err(source.invalid(format!(
                "{} event needs at least {} fields, found {}",
                granularity,
                granularity.min_fields(),
                fields.len()
            )));
        }
        if fields[1] != "LOCK" {
            return Err(source.invalid(format!("expected LOCK, found {:?}", fields[1])));
        }
        Ok(LockEvent { granularity, fields })
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn trx_id(&self, source: SourceLine<'_>) -> Result<TransactionId> {
        let token = self.fields[self.granularity.trx_id_field()];
        token
            .parse::<u64>()
            .map(TransactionId)
            .map_err(|_| source.invalid(format!("bad transaction id {:?}", token)))
    }

    pub fn mode(&self, source: SourceLine<'_>) -> Result<LockMode> {
        let token = self.fields[self.granularity.mode_field()];
        token.parse().map_err(|_| Error::InvalidLockMode {
            line: source.number,
            token: token.to_string(),
        })
    }

    /// Resource fields identifying the locked table or record.
    pub fn descriptor(&self) -> String {
        match self.granularity {
            Granularity::Table => self.fields[3].to_string(),
            Granularity::Record => {
                format!("{} {} {}", self.fields[3], self.fields[5], self.fields[7])
            }
        }
    }

    /// Table owning a record lock.
    pub fn table_descriptor(&self) -> Option<&'a str> {
        match self.granularity {
            Granularity::Table => None,
            Granularity::Record => Some(self.fields[12]),
        }
    }
}
