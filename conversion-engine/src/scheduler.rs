//! Background maintenance loop
//!
//! Periodically executes pending withdrawals, reconciles withdrawals stuck
//! in `processing`, redelivers webhook retries that are due and purges
//! expired dead letters.

use crate::service::CashbackService;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, error, info};

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between pending-withdrawal sweeps
    pub withdrawal_interval_secs: u64,

    /// Seconds between reconciliation sweeps
    pub reconcile_interval_secs: u64,

    /// Seconds between webhook retry sweeps
    pub retry_interval_secs: u64,

    /// Seconds between dead-letter purges
    pub dlq_purge_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            withdrawal_interval_secs: 60,
            reconcile_interval_secs: 300,
            retry_interval_secs: 5,
            dlq_purge_interval_secs: 3_600,
        }
    }
}

impl SchedulerConfig {
    /// Every interval must be non-zero
    pub fn validate(&self) -> Result<(), String> {
        for (name, secs) in [
            ("withdrawal_interval_secs", self.withdrawal_interval_secs),
            ("reconcile_interval_secs", self.reconcile_interval_secs),
            ("retry_interval_secs", self.retry_interval_secs),
            ("dlq_purge_interval_secs", self.dlq_purge_interval_secs),
        ] {
            if secs == 0 {
                return Err(format!("scheduler.{} must be greater than zero", name));
            }
        }
        Ok(())
    }
}

/// Drives periodic work against a shared service
#[derive(Debug)]
pub struct Scheduler {
    service: Arc<CashbackService>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create scheduler
    pub fn new(service: Arc<CashbackService>, config: SchedulerConfig) -> Self {
        Self { service, config }
    }

    /// One withdrawal sweep
    pub async fn run_withdrawals(&self) {
        match self.service.process_pending_withdrawals().await {
            Ok(0) => {}
            Ok(settled) => info!(settled, "Processed pending withdrawals"),
            Err(e) => error!(error = %e, "Withdrawal sweep failed"),
        }
    }

    /// One reconciliation sweep
    pub async fn run_reconcile(&self) {
        match self.service.reconcile_withdrawals().await {
            Ok(report) if report.examined == 0 => {}
            Ok(report) => info!(
                examined = report.examined,
                completed = report.completed,
                failed = report.failed,
                unresolved = report.unresolved,
                "Reconciled withdrawals"
            ),
            Err(e) => error!(error = %e, "Reconciliation sweep failed"),
        }
    }

    /// One webhook retry sweep
    pub async fn run_retries(&self) {
        let report = self.service.drain_webhook_retries(Utc::now()).await;
        if report.dead_lettered > 0 {
            debug!(dead_lettered = report.dead_lettered, "Webhook retries gave up");
        }
    }

    /// One dead-letter purge
    pub fn run_purge(&self) {
        let purged = self.service.purge_dead_letters(Utc::now());
        if purged > 0 {
            info!(purged, "Purged expired dead letters");
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut withdrawals = interval(Duration::from_secs(self.config.withdrawal_interval_secs));
            let mut reconcile = interval(Duration::from_secs(self.config.reconcile_interval_secs));
            let mut retries = interval(Duration::from_secs(self.config.retry_interval_secs));
            let mut purge = interval(Duration::from_secs(self.config.dlq_purge_interval_secs));
            for timer in [&mut withdrawals, &mut reconcile, &mut retries, &mut purge] {
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }

            info!(
                withdrawal_interval_secs = self.config.withdrawal_interval_secs,
                reconcile_interval_secs = self.config.reconcile_interval_secs,
                retry_interval_secs = self.config.retry_interval_secs,
                dlq_purge_interval_secs = self.config.dlq_purge_interval_secs,
                "Scheduler started"
            );

            loop {
                tokio::select! {
                    _ = withdrawals.tick() => self.run_withdrawals().await,
                    _ = reconcile.tick() => self.run_reconcile().await,
                    _ = retries.tick() => self.run_retries().await,
                    _ = purge.tick() => self.run_purge(),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Scheduler stopped");
        })
    }
}
