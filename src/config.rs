//! Replay configuration
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - a JSON config file
//! - `LOCKTRACE_*` environment variables
//! - command-line flags (applied by the binary)

use crate::error::{Error, Result};
use crate::lock_log::{ColumnQualifier, DispatchPolicy, NoQualifier, QualifierExtractor};
use crate::transaction::EscalationPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(Error::ConfigError(format!("Invalid output format: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Lock log to replay
    pub log_path: Option<PathBuf>,

    /// Record locks tolerated under one table lock before escalating
    pub record_lock_limit: usize,

    /// Column-name regex selecting the query values that qualify lock
    /// identities; `None` disables qualifiers
    pub qualifier_pattern: Option<String>,

    /// Convert held locks in place on conflicting upgrades
    pub direct_upgrade: bool,

    pub output_format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            record_lock_limit: usize::MAX,
            qualifier_pattern: None,
            direct_upgrade: false,
            output_format: OutputFormat::Text,
            log_level: "info".to_string(),
        }
    }
}

impl ReplayConfig {
    /// Load configuration from a JSON file; missing fields keep defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_with(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("LOCKTRACE_LOG") {
            self.log_path = Some(PathBuf::from(path));
        }
        if let Some(limit) = lookup("LOCKTRACE_RECORD_LOCK_LIMIT") {
            self.record_lock_limit = limit
                .parse()
                .map_err(|_| Error::ConfigError("Invalid LOCKTRACE_RECORD_LOCK_LIMIT".to_string()))?;
        }
        if let Some(pattern) = lookup("LOCKTRACE_QUALIFIER") {
            self.qualifier_pattern = if pattern.is_empty() { None } else { Some(pattern) };
        }
        if let Some(direct) = lookup("LOCKTRACE_DIRECT_UPGRADE") {
            self.direct_upgrade = direct
                .parse()
                .map_err(|_| Error::ConfigError("Invalid LOCKTRACE_DIRECT_UPGRADE".to_string()))?;
        }
        if let Some(format) = lookup("LOCKTRACE_OUTPUT") {
            self.output_format = format.parse()?;
        }
        if let Some(level) = lookup("LOCKTRACE_LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.require_log_path()?;

        if let Some(pattern) = &self.qualifier_pattern {
            regex::Regex::new(pattern)?;
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(Error::ConfigError(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    pub fn require_log_path(&self) -> Result<&Path> {
        self.log_path
            .as_deref()
            .ok_or_else(|| Error::ConfigError("No lock log given".to_string()))
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            escalation: EscalationPolicy::new(self.record_lock_limit),
            direct_upgrade: self.direct_upgrade,
        }
    }

    pub fn qualifier(&self) -> Result<Box<dyn QualifierExtractor>> {
        let qualifier: Box<dyn QualifierExtractor> = match &self.qualifier_pattern {
            Some(pattern) => Box::new(ColumnQualifier::new(pattern)?),
            None => Box::new(NoQualifier),
        };
        Ok(qualifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ReplayConfig::default();
        assert_eq!(config.record_lock_limit, usize::MAX);
        assert!(config.qualifier_pattern.is_none());
        assert!(!config.direct_upgrade);
        assert_eq!(config.output_format, OutputFormat::Text);
        assert!(config.dispatch_policy().escalation.record_lock_limit() == usize::MAX);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ReplayConfig::default();
        config
            .apply_overrides_with(lookup(&[
                ("LOCKTRACE_LOG", "/tmp/lock.log"),
                ("LOCKTRACE_RECORD_LOCK_LIMIT", "64"),
                ("LOCKTRACE_QUALIFIER", "^w_id$"),
                ("LOCKTRACE_DIRECT_UPGRADE", "true"),
                ("LOCKTRACE_OUTPUT", "JSON"),
            ]))
            .unwrap();
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/lock.log")));
        assert_eq!(config.record_lock_limit, 64);
        assert_eq!(config.qualifier_pattern.as_deref(), Some("^w_id$"));
        assert!(config.direct_upgrade);
        assert_eq!(config.output_format, OutputFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_overrides() {
        let mut config = ReplayConfig::default();
        let err = config
            .apply_overrides_with(lookup(&[("LOCKTRACE_RECORD_LOCK_LIMIT", "many")]))
            .unwrap_err();
        assert_eq!(err.kind(), "CONFIG");
    }

    #[test]
    fn test_validate() {
        let mut config = ReplayConfig::default();
        assert!(config.validate().is_err());

        config.log_path = Some(PathBuf::from("lock.log"));
        config.validate().unwrap();

        config.qualifier_pattern = Some("[".to_string());
        assert_eq!(config.validate().unwrap_err().kind(), "INVALID_PATTERN");

        config.qualifier_pattern = None;
        config.log_level = "loud".to_string();
        assert_eq!(config.validate().unwrap_err().kind(), "CONFIG");
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locktrace.json");
        std::fs::write(&path, r#"{ "record_lock_limit": 10, "output_format": "json" }"#).unwrap();

        let config = ReplayConfig::from_file(&path).unwrap();
        assert_eq!(config.record_lock_limit, 10);
        assert_eq!(config.output_format, OutputFormat::Json);
        assert!(!config.direct_upgrade);
        assert_eq!(config.log_level, "info");
    }
}
