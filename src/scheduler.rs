//! Periodic job runner.
//!
//! Classification runs on a fixed interval; the statistics jobs run at a
//! local wall-clock time (daily, or on one weekday). A failed run is retried
//! with a fixed delay before the worker waits for its next slot.

use crate::aggregation::AggregationEngine;
use crate::classification::ClassificationPipeline;
use crate::config::ScheduleConfig;
use crate::error::ConfigError;
use crate::models::Granularity;
use anyhow::Result;
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, Weekday};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fixed-backoff retry policy for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub retries: u32,
    pub delay: Duration,
}

/// Runs `attempt` until it succeeds or the policy is exhausted.
pub async fn run_with_retry<T, F, Fut>(job: &str, policy: RetryPolicy, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut failures = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if failures < policy.retries => {
                failures += 1;
                warn!(
                    error = %e,
                    "{} failed (attempt {} of {}), retrying in {}s",
                    job,
                    failures,
                    policy.retries + 1,
                    policy.delay.as_secs()
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                return Err(e.context(format!("{} failed after {} attempts", job, failures + 1)))
            }
        }
    }
}

/// When a statistics job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily { at: NaiveTime },
    Weekly { weekday: Weekday, at: NaiveTime },
}

impl Cadence {
    /// First firing strictly after `now`.
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        match *self {
            Cadence::Daily { at } => next_daily_run(now, at),
            Cadence::Weekly { weekday, at } => next_weekly_run(now, weekday, at),
        }
    }
}

/// Next local `at` strictly after `now`.
pub fn next_daily_run(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let candidate = now.date().and_time(at);
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(1)
    }
}

/// Next `weekday` at `at` strictly after `now`.
pub fn next_weekly_run(now: NaiveDateTime, weekday: Weekday, at: NaiveTime) -> NaiveDateTime {
    let target = i64::from(weekday.num_days_from_monday());
    let current = i64::from(now.weekday().num_days_from_monday());
    let ahead = (target - current).rem_euclid(7);
    let candidate = (now.date() + ChronoDuration::days(ahead)).and_time(at);
    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::days(7)
    }
}

fn at_hour(field: &str, hour: u32) -> Result<NaiveTime, ConfigError> {
    NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| ConfigError::invalid(field, "must be between 0 and 23"))
}

/// Spawns and owns the three job workers.
pub struct Scheduler {
    pipeline: Arc<ClassificationPipeline>,
    engine: Arc<AggregationEngine>,
    interval: Duration,
    daily: Cadence,
    weekly: Cadence,
    classify_policy: RetryPolicy,
    aggregate_policy: RetryPolicy,
}

impl Scheduler {
    pub fn new(
        pipeline: Arc<ClassificationPipeline>,
        engine: Arc<AggregationEngine>,
        schedule: &ScheduleConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            pipeline,
            engine,
            interval: schedule.classify_interval(),
            daily: Cadence::Daily {
                at: at_hour("schedule.daily_hour", schedule.daily_hour)?,
            },
            weekly: Cadence::Weekly {
                weekday: schedule.weekday()?,
                at: at_hour("schedule.weekly_hour", schedule.weekly_hour)?,
            },
            classify_policy: RetryPolicy {
                retries: schedule.classify_retries,
                delay: schedule.retry_delay(),
            },
            aggregate_policy: RetryPolicy {
                retries: schedule.aggregation_retries,
                delay: schedule.retry_delay(),
            },
        })
    }

    /// Starts every worker. They stop when `shutdown` is cancelled.
    pub fn spawn(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            spawn_classification_worker(
                self.pipeline.clone(),
                self.interval,
                self.classify_policy,
                shutdown.clone(),
            ),
            spawn_aggregation_worker(
                self.engine.clone(),
                Granularity::Day,
                self.daily,
                self.aggregate_policy,
                shutdown.clone(),
            ),
            spawn_aggregation_worker(
                self.engine.clone(),
                Granularity::Week,
                self.weekly,
                self.aggregate_policy,
                shutdown.clone(),
            ),
        ]
    }
}

/// Spawn a worker that classifies pending reports every `interval`,
/// starting immediately.
pub fn spawn_classification_worker(
    pipeline: Arc<ClassificationPipeline>,
    interval: Duration,
    policy: RetryPolicy,
    shutdown_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Classification worker started"
        );

        let mut ticker = tokio::time::interval(interval);
        let pipeline = &*pipeline;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = run_with_retry("Classification run", policy, || {
                        pipeline.run(Local::now())
                    })
                    .await;

                    match result {
                        Ok(batch) if batch.has_failures() => {
                            warn!(failed = batch.failed(), "{}", batch);
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Classification run failed"),
                    }
                }
                _ = shutdown_token.cancelled() => {
                    info!("Classification worker shutting down");
                    break;
                }
            }
        }
    })
}

/// Spawn a worker that writes a statistics snapshot at every `cadence` slot.
pub fn spawn_aggregation_worker(
    engine: Arc<AggregationEngine>,
    granularity: Granularity,
    cadence: Cadence,
    policy: RetryPolicy,
    shutdown_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let engine = &*engine;

        loop {
            let now = Local::now().naive_local();
            let next = cadence.next_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!("Next {} statistics run at {}", granularity, next);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let job = format!("{} statistics run", granularity);
                    let result = run_with_retry(&job, policy, || {
                        engine.run(granularity, Local::now().naive_local(), Local::now())
                    })
                    .await;

                    if let Err(e) = result {
                        error!(error = %e, "{} statistics run failed", granularity);
                    }
                }
                _ = shutdown_token.cancelled() => {
                    info!("{} statistics worker shutting down", granularity);
                    break;
                }
            }
        }
    })
}
