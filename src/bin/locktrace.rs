//! locktrace - reconstruct per-transaction lock sets from a lock log
//!
//! Usage:
//!   locktrace lock.log
//!   locktrace lock.log --limit 64 --qualifier '^w_id$'
//!   locktrace --config locktrace.json --format json

use anyhow::Context;
use clap::Parser;
use locktrace_core::{replay_file, OutputFormat, Report, ReplayConfig};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "locktrace")]
#[command(about = "Reconstruct transaction lock sets from a 2PL lock log", long_about = None)]
#[command(version)]
struct Cli {
    /// Lock log file
    log: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record locks per table before escalating to a table lock
    #[arg(short, long)]
    limit: Option<usize>,

    /// Column-name regex whose query values qualify lock identities
    #[arg(short, long)]
    qualifier: Option<String>,

    /// Convert held locks in place on conflicting upgrades
    #[arg(long)]
    direct_upgrade: bool,

    /// Output format: text, json
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(cli: Cli) -> anyhow::Result<ReplayConfig> {
    let mut config = match &cli.config {
        Some(path) => ReplayConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ReplayConfig::default(),
    };
    config.apply_env_overrides()?;

    if let Some(log) = cli.log {
        config.log_path = Some(log);
    }
    if let Some(limit) = cli.limit {
        config.record_lock_limit = limit;
    }
    if let Some(pattern) = cli.qualifier {
        config.qualifier_pattern = Some(pattern);
    }
    if cli.direct_upgrade {
        config.direct_upgrade = true;
    }
    if let Some(format) = cli.format {
        config.output_format = format;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    config.validate()?;
    Ok(config)
}

/// Filter used when `RUST_LOG` is unset: this binary and the library.
fn default_directives(level: &str) -> String {
    format!("locktrace={0},locktrace_core={0}", level)
}

fn main() -> anyhow::Result<()> {
    let config = load_config(Cli::parse())?;

    // Initialize tracing; the report goes to stdout, logs to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directives(&config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let transactions = replay_file(&config).map_err(|err| {
        tracing::error!(kind = err.kind(), line = ?err.line(), "replay aborted");
        err
    })?;

    let report = Report::build(&transactions);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match config.output_format {
        OutputFormat::Text => report.render_text(&mut out)?,
        OutputFormat::Json => report.render_json(&mut out)?,
    }
    out.flush()?;

    Ok(())
}
