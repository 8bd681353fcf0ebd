//! Scheduled Jobs
//!
//! Background maintenance for the rating aggregate.
//! The reconciliation sweep recomputes every product's rating from its
//! reviews and repairs any that drifted, for example after reviews were
//! written outside the coordinator.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::aggregate::AggregateRecomputer;
use crate::store::StoreError;

// =========================================================================
// Rating Reconciliation Job
// =========================================================================

/// Recompute the rating of every product, `batch_size` products per page.
///
/// Per-product failures are collected in the report; only a failure to list
/// products stops the sweep.
pub async fn reconcile_ratings(
    recomputer: &AggregateRecomputer,
    batch_size: i64,
) -> Result<ReconcileReport, JobError> {
    let mut report = ReconcileReport::default();
    let mut after: Option<Uuid> = None;
    let batch_size = batch_size.max(1);

    loop {
        let page = recomputer.store().list_product_ids(after, batch_size).await?;
        let Some(last) = page.last().copied() else {
            break;
        };

        for product_id in &page {
            report.products_checked += 1;

            match recomputer.recompute_rating(*product_id).await {
                Ok(recomputed) if recomputed.written => {
                    report.products_repaired += 1;
                    tracing::warn!(
                        product_id = %product_id,
                        version = recomputed.rating.version,
                        "Repaired drifted product rating"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(product_id = %product_id, error = %e, "Rating reconciliation failed");
                    report.errors.push(format!("{}: {}", product_id, e));
                }
            }
        }

        if (page.len() as i64) < batch_size {
            break;
        }
        after = Some(last);
    }

    report.completed_at = Utc::now();

    if report.products_repaired > 0 || !report.errors.is_empty() {
        tracing::info!(
            checked = report.products_checked,
            repaired = report.products_repaired,
            errors = report.errors.len(),
            "Rating reconciliation finished"
        );
    }

    Ok(report)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for rating reconciliation (default: 5 minutes)
    pub reconcile_interval: Duration,
    /// Products per page of the sweep (default: 200)
    pub reconcile_batch_size: i64,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(300),
            reconcile_batch_size: 200,
        }
    }
}

impl From<&crate::config::Config> for JobSchedulerConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            reconcile_interval: config.reconcile_interval,
            reconcile_batch_size: config.reconcile_batch_size,
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    recomputer: AggregateRecomputer,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(recomputer: AggregateRecomputer) -> Self {
        Self {
            recomputer,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(recomputer: AggregateRecomputer, config: JobSchedulerConfig) -> Self {
        Self { recomputer, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!(
            interval_secs = self.config.reconcile_interval.as_secs(),
            "Job scheduler started"
        );

        let mut reconcile_interval = interval(self.config.reconcile_interval);
        reconcile_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            reconcile_interval.tick().await;
            if let Err(e) =
                reconcile_ratings(&self.recomputer, self.config.reconcile_batch_size).await
            {
                tracing::error!(error = %e, "Rating reconciliation failed");
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> ReconcileReport {
        match reconcile_ratings(&self.recomputer, self.config.reconcile_batch_size).await {
            Ok(report) => report,
            Err(e) => ReconcileReport {
                errors: vec![format!("Rating reconciliation: {}", e)],
                completed_at: Utc::now(),
                ..Default::default()
            },
        }
    }
}

/// Report from a reconciliation sweep
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub products_checked: u64,
    pub products_repaired: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =========================================================================
// Tests
// =========================================================================
