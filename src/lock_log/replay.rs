// Lock log replay: reads a log and rebuilds every transaction's lock set
use super::dispatcher::{DispatchPolicy, Dispatcher};
use super::event::{LogEvent, SourceLine};
use super::qualifier::QualifierExtractor;
use crate::config::ReplayConfig;
use crate::error::{Error, Result};
use crate::transaction::Transaction;
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::info;

/// Drives one parse session.
///
/// Owns the transactions built so far; they are handed out by
/// [`finish`](Self::finish) once the input is exhausted.
pub struct LockLogReplayer {
    dispatcher: Dispatcher,
    qualifier: Box<dyn QualifierExtractor>,
    extra: String,
    lines: usize,
}

impl LockLogReplayer {
    pub fn new(policy: DispatchPolicy, qualifier: Box<dyn QualifierExtractor>) -> Self {
        LockLogReplayer {
            dispatcher: Dispatcher::new(policy),
            qualifier,
            extra: String::new(),
            lines: 0,
        }
    }

    pub fn from_config(config: &ReplayConfig) -> Result<Self> {
        Ok(Self::new(config.dispatch_policy(), config.qualifier()?))
    }

    /// Qualifier applied to the next acquisitions.
    pub fn extra(&self) -> &str {
        &self.extra
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.dispatcher.transactions()
    }

    /// Feeds the next log line. Blank lines are ignored.
    pub fn feed_line(&mut self, text: &str) -> Result<()> {
        self.lines += 1;
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.is_empty() {
            return Ok(());
        }
        let source = SourceLine::new(self.lines, text);

        match LogEvent::classify(&fields, source)? {
            LogEvent::Query(query) => {
                self.extra = self.qualifier.extract(query);
                Ok(())
            }
            LogEvent::Acquire(event) => self.dispatcher.acquire(&event, &self.extra, source),
            LogEvent::Release(event) => self.dispatcher.release(&event, source),
        }
    }

    /// Feeds every line of `reader`. Lines are split on `\n`; a line that
    /// is not UTF-8 aborts the replay with its line number.
    pub fn feed<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for bytes in reader.split(b'\n') {
            match String::from_utf8(bytes?) {
                Ok(text) => self.feed_line(text.trim_end_matches('\r'))?,
                Err(err) => {
                    self.lines += 1;
                    return Err(Error::InvalidLogLine {
                        line: self.lines,
                        reason: "invalid UTF-8".to_string(),
                        text: String::from_utf8_lossy(err.as_bytes()).into_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<Transaction> {
        info!(
            lines = self.lines,
            transactions = self.dispatcher.transactions().len(),
            "lock log replayed"
        );
        self.dispatcher.into_transactions()
    }

    /// Replays a whole log.
    pub fn replay<R: BufRead>(mut self, reader: R) -> Result<Vec<Transaction>> {
        self.feed(reader)?;
        Ok(self.finish())
    }
}

/// Replays the log named by `config.log_path`.
pub fn replay_file(config: &ReplayConfig) -> Result<Vec<Transaction>> {
    let path = config.require_log_path()?;
    info!(
        path = %path.display(),
        record_lock_limit = config.record_lock_limit,
        direct_upgrade = config.direct_upgrade,
        "replaying lock log"
    );
    let file = File::open(path)?;
    LockLogReplayer::from_config(config)?.replay(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock_log::{ColumnQualifier, NoQualifier};
    use crate::transaction::LockMode;
    use std::io::Cursor;

    #[test]
    fn test_query_line_sets_extra() {
        let mut replayer = LockLogReplayer::new(
            DispatchPolicy::default(),
            Box::new(ColumnQualifier::new("^w_id$").unwrap()),
        );
        replayer
            .feed_line("QUERY SELECT * FROM warehouse WHERE w_id = 4")
            .unwrap();
        assert_eq!(replayer.extra(), "w_id=4");
        replayer
            .feed_line("TABLE LOCK table `db`.`warehouse` trx id 9 lock_mode IS")
            .unwrap();
        replayer.feed_line("QUERY COMMIT").unwrap();
        assert_eq!(replayer.extra(), "");

        let trxs = replayer.finish();
        let lock = trxs[0].locks().next().unwrap();
        assert_eq!(lock.extra, "w_id=4");
        assert_eq!(lock.mode, LockMode::IntentShared);
    }

    #[test]
    fn test_blank_lines_are_skipped_but_counted() {
        let log = "\nTABLE LOCK table `db`.`t` trx id 9 lock_mode IX\n\nBOGUS line\n";
        let err = LockLogReplayer::new(DispatchPolicy::default(), Box::new(NoQualifier))
            .replay(Cursor::new(log))
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_LOG_LINE");
        assert_eq!(err.line(), Some(4));
    }

    #[test]
    fn test_non_utf8_line_reports_its_number() {
        let mut log = b"TABLE LOCK table `db`.`t` trx id 9 lock_mode IX\r\n".to_vec();
        log.extend_from_slice(b"TABLE LOCK table `db`.`\xff` trx id 9 lock_mode IX\n");
        let err = LockLogReplayer::new(DispatchPolicy::default(), Box::new(NoQualifier))
            .replay(Cursor::new(log))
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_LOG_LINE");
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("invalid UTF-8"));
    }
}
