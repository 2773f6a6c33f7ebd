pub mod check;
pub mod config;
pub mod next;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use rq_domain::config::Config;

/// repeatq: recurring job scheduler driven by cron expressions and RRULE sets.
#[derive(Debug, Parser)]
#[command(name = "repeatq", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler for the jobs in the config file (default when no
    /// subcommand is given).
    Serve,
    /// Print the next triggers a repeat pattern would produce.
    Next(NextArgs),
    /// Classify and parse a pattern without evaluating it.
    Check {
        /// Cron expression or RRULE set (use `\n` between RRULE lines).
        pattern: String,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Args)]
pub struct NextArgs {
    /// Cron expression or RRULE set (use `\n` between RRULE lines).
    pub pattern: String,
    /// How many triggers to print.
    #[arg(long, short = 'n', default_value_t = 5)]
    pub count: usize,
    /// Reference instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_instant)]
    pub from: Option<DateTime<Utc>>,
    /// Fire the first trigger at the reference instant.
    #[arg(long)]
    pub immediate: bool,
    /// Earliest instant recurrence may begin (RFC 3339).
    #[arg(long, value_parser = parse_instant)]
    pub start_date: Option<DateTime<Utc>>,
    /// Triggers after this instant end the recurrence (RFC 3339).
    #[arg(long, value_parser = parse_instant)]
    pub end_date: Option<DateTime<Utc>>,
    /// Maximum number of firings.
    #[arg(long)]
    pub limit: Option<u64>,
    /// Output JSON instead of plain text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors, including bad patterns.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Accepts RFC 3339 instants with any offset and normalises them to UTC.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 instant like 2025-07-22T00:00:00Z: {e}"))
}

/// Shell arguments can't carry real newlines easily; accept a literal `\n`
/// as the RRULE line separator.
pub fn unescape_pattern(pattern: &str) -> String {
    pattern.replace("\\n", "\n")
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `REPEATQ_CONFIG` (or
/// `repeatq.toml` by default).  Returns the parsed [`Config`] and the
/// path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path =
        std::env::var("REPEATQ_CONFIG").unwrap_or_else(|_| "repeatq.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

/// Parse the config at `config_path`, falling back to defaults when the
/// file does not exist.
pub fn load_config_from(config_path: &str) -> anyhow::Result<Config> {
    if !std::path::Path::new(config_path).exists() {
        tracing::debug!(path = %config_path, "config file not found, using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .with_context(|| format!("reading {config_path}"))?;
    toml::from_str(&raw).with_context(|| format!("parsing {config_path}"))
}
