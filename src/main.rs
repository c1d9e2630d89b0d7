//! ReportDesk - incident report classification and statistics
//!
//! Classifies pending incident reports, notifies the responsible area, and
//! writes daily and weekly statistics snapshots. Jobs run once, or on their
//! configured cadence with `--schedule`.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (unreadable store, bad config, snapshot write failure, etc.)
//!   2 - A classification run finished with failed items

mod aggregation;
mod classification;
mod cli;
mod config;
mod error;
mod models;
mod output;
mod scheduler;
mod store;

use aggregation::{AggregationEngine, AggregationRun};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use classification::{BatchReport, ClassificationPipeline, Classifier};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use models::Granularity;
use scheduler::Scheduler;
use std::path::PathBuf;
use std::sync::Arc;
use store::{
    FsSnapshotStore, HttpPublisher, JsonFileRepository, LogPublisher, NotificationPublisher,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so `general.verbose` can raise the log level
    let (config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&args, &config)?;

    info!("ReportDesk v{}", env!("CARGO_PKG_VERSION"));
    match source {
        ConfigSource::File(path) => info!("Loaded config from: {}", path.display()),
        ConfigSource::Defaults => debug!("No config file found, using defaults"),
        ConfigSource::DefaultsAfterError(e) => warn!("Failed to load config: {}", e),
    }
    debug!("Arguments: {:?}", args);

    let result = if args.schedule {
        run_scheduled(&config).await
    } else {
        run_once(&args, &config).await
    };

    match result {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .reportdesk.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the report table, areas, and schedule.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the verbosity settings when set.
fn init_logging(args: &Args, config: &Config) -> Result<()> {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
        }
        Err(_) => tracing::subscriber::set_global_default(builder.with_max_level(level).finish()),
    };

    result.context("Failed to set tracing subscriber")
}

/// Where the effective configuration came from.
enum ConfigSource {
    File(PathBuf),
    Defaults,
    DefaultsAfterError(String),
}

/// Load configuration from file or use defaults, then apply CLI overrides.
///
/// Runs before logging is set up; the caller reports the source.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    let (mut config, source) = if let Some(ref config_path) = args.config {
        (
            Config::load(config_path)?,
            ConfigSource::File(config_path.clone()),
        )
    } else {
        match Config::load_default() {
            Ok(Some(config)) => (config, ConfigSource::File(PathBuf::from(CONFIG_FILE))),
            Ok(None) => (Config::default(), ConfigSource::Defaults),
            Err(e) => (
                Config::default(),
                ConfigSource::DefaultsAfterError(format!("{:#}", e)),
            ),
        }
    };

    config.merge_with_args(args);
    config.validate().context("Invalid configuration")?;
    Ok((config, source))
}

/// Wire the bundled collaborators into the two services.
fn build_services(config: &Config) -> Result<(ClassificationPipeline, AggregationEngine)> {
    let repository = Arc::new(JsonFileRepository::new(&config.store.reports_path));

    let publisher: Arc<dyn NotificationPublisher> = match config.notifications.endpoint {
        Some(ref endpoint) => {
            info!("Publishing notifications to {}", endpoint);
            Arc::new(HttpPublisher::new(
                endpoint.clone(),
                config.notifications.timeout_seconds,
            )?)
        }
        None => {
            info!("No notification endpoint configured, logging notifications");
            Arc::new(LogPublisher)
        }
    };

    let snapshots = Arc::new(FsSnapshotStore::new(&config.snapshots.root));

    let pipeline = ClassificationPipeline::new(
        repository.clone(),
        publisher,
        Classifier::new(config.area_mapping()?),
        config.notifications.channel.clone(),
    )
    .with_concurrency(config.general.concurrency);

    let engine = AggregationEngine::new(repository, snapshots, config.snapshots.prefix.clone());

    Ok((pipeline, engine))
}

/// Run the selected jobs once. Returns exit code (0 or 2).
async fn run_once(args: &Args, config: &Config) -> Result<i32> {
    let (pipeline, engine) = build_services(config)?;

    let now = Local::now();
    let reference: NaiveDateTime = match args.reference_date {
        Some(date) => date.and_time(now.time()),
        None => now.naive_local(),
    };

    let mut exit_code = 0;

    if args.job.includes_classify() {
        if args.dry_run {
            handle_classify_dry_run(&pipeline).await?;
        } else {
            let batch = pipeline.run(now).await?;
            print_batch(&batch, args.format)?;
            if batch.has_failures() {
                warn!("{} report(s) failed; see the log for details", batch.failed());
                exit_code = 2;
            }
        }
    }

    for granularity in [Granularity::Day, Granularity::Week] {
        let selected = match granularity {
            Granularity::Day => args.job.includes_daily(),
            Granularity::Week => args.job.includes_weekly(),
        };
        if !selected {
            continue;
        }

        let run = if args.dry_run {
            engine.compute(granularity, reference, now).await?
        } else {
            engine.run(granularity, reference, now).await?
        };
        print_aggregation(&run, args.format)?;
    }

    Ok(exit_code)
}

/// Handle --dry-run for classification: list what would be classified.
async fn handle_classify_dry_run(pipeline: &ClassificationPipeline) -> Result<()> {
    println!("\nDry run: no reports updated, no notifications sent.\n");

    let planned = pipeline.plan().await?;
    if planned.is_empty() {
        println!("   No unclassified reports found.");
    } else {
        println!("   {} report(s) would be classified:\n", planned.len());
        for item in &planned {
            println!(
                "     {} [{}] -> {}",
                item.report.label(),
                item.report.category,
                item.responsible_area
            );
        }
    }
    println!();
    Ok(())
}

fn print_batch(batch: &BatchReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Markdown => print!("{}", output::generate_batch_summary(batch)),
        OutputFormat::Json => {
            let value = serde_json::json!({
                "candidates": batch.candidates,
                "processed": batch.processed(),
                "skipped": batch.skipped(),
                "failed": batch.failed(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}

fn print_aggregation(run: &AggregationRun, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Markdown => print!(
            "{}",
            output::generate_markdown_summary(&run.summary, run.path.as_deref())
        ),
        OutputFormat::Json => println!("{}", output::generate_json_snapshot(&run.summary)?),
    }
    Ok(())
}

/// Run every job on its cadence until Ctrl-C.
async fn run_scheduled(config: &Config) -> Result<i32> {
    let (pipeline, engine) = build_services(config)?;

    let scheduler = Scheduler::new(Arc::new(pipeline), Arc::new(engine), &config.schedule)?;
    let shutdown = CancellationToken::new();
    let workers = scheduler.spawn(&shutdown);

    info!(
        "Scheduler running: classification every {}s, daily at {:02}:00, weekly on {} at {:02}:00",
        config.schedule.classify_interval_seconds,
        config.schedule.daily_hour,
        config.schedule.weekly_weekday,
        config.schedule.weekly_hour
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested, stopping workers");
    shutdown.cancel();

    for result in futures::future::join_all(workers).await {
        if let Err(e) = result {
            error!(error = %e, "Worker task ended abnormally");
        }
    }

    Ok(0)
}
