//! Command-line arguments for one-off and scheduled runs.

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// ReportDesk - incident report classification and statistics
///
/// Classifies pending incident reports, notifies the responsible areas and
/// writes daily and weekly statistics snapshots.
///
/// Examples:
///   reportdesk --job classify --reports reports.json
///   reportdesk --job daily --reference-date 2024-03-13
///   reportdesk --job weekly --format json
///   reportdesk --schedule
///   reportdesk --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Job to run once
    #[arg(short, long, default_value = "all", value_name = "JOB")]
    pub job: Job,

    /// Run all jobs on their configured cadence until interrupted
    #[arg(long, conflicts_with = "dry_run")]
    pub schedule: bool,

    /// Reference date for statistics jobs (defaults to today)
    ///
    /// The daily job summarizes the day before this date; the weekly job the
    /// Monday-Sunday week before the week containing it.
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "schedule")]
    pub reference_date: Option<NaiveDate>,

    /// Configuration file to load
    ///
    /// If not specified, looks for .reportdesk.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON report table to read and update
    #[arg(long, value_name = "FILE", env = "REPORTDESK_REPORTS")]
    pub reports: Option<PathBuf>,

    /// Root directory for statistics snapshots
    #[arg(long, value_name = "DIR", env = "REPORTDESK_SNAPSHOTS")]
    pub snapshots: Option<PathBuf>,

    /// HTTP endpoint receiving classification notifications
    #[arg(long, value_name = "URL", env = "REPORTDESK_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Notification channel (topic) name
    #[arg(long, value_name = "NAME", env = "REPORTDESK_CHANNEL")]
    pub channel: Option<String>,

    /// Number of reports classified concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Console output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Show what would happen without updating reports, publishing or writing snapshots
    #[arg(long)]
    pub dry_run: bool,

    /// Log debug detail
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .reportdesk.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Job selection for a one-off run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Job {
    /// Classify pending reports and notify
    Classify,
    /// Previous day's statistics
    Daily,
    /// Previous week's statistics
    Weekly,
    /// All three, in that order
    #[default]
    All,
}

impl Job {
    pub fn includes_classify(self) -> bool {
        matches!(self, Job::Classify | Job::All)
    }

    pub fn includes_daily(self) -> bool {
        matches!(self, Job::Daily | Job::All)
    }

    pub fn includes_weekly(self) -> bool {
        matches!(self, Job::Weekly | Job::All)
    }
}

/// Output format for console summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown tables (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse the process arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Cross-field checks clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err("Endpoint URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.schedule && self.job != Job::All {
            return Err("--schedule runs every job; do not combine it with --job".to_string());
        }

        if let Some(ref reports) = self.reports {
            if reports.is_dir() {
                return Err(format!(
                    "Report table is a directory: {}",
                    reports.display()
                ));
            }
        }

        Ok(())
    }

    /// Maximum log level for `--verbose` / `--quiet`.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
