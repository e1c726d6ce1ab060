//! Recovery Worker
//!
//! Background sweep for purchases left in TRANSFER_REQUESTED, e.g. by a
//! crash between attaching the transfer and the status check, or by a
//! buyer who never came back to recheck.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use super::error::SettlementError;
use super::orchestrator::SettlementOrchestrator;
use super::types::SettlementOutcome;

/// Configuration for the recovery worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan
    pub scan_interval: Duration,
    /// Minimum idle time before a row is polled (keeps clear of live settles)
    pub min_age: Duration,
    /// Rows older than this are left for supersede
    pub stale_after: Duration,
    /// Maximum rows polled per scan
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            min_age: Duration::from_secs(60),
            stale_after: Duration::from_secs(15 * 60),
            batch_size: 100,
        }
    }
}

pub struct RecoveryWorker {
    orchestrator: Arc<SettlementOrchestrator>,
    config: WorkerConfig,
}

impl RecoveryWorker {
    pub fn new(orchestrator: Arc<SettlementOrchestrator>, config: WorkerConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn with_defaults(orchestrator: Arc<SettlementOrchestrator>) -> Self {
        let stale_after = orchestrator.config().stale_after;
        Self::new(
            orchestrator,
            WorkerConfig {
                stale_after,
                ..WorkerConfig::default()
            },
        )
    }

    /// Run the sweep forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            min_age_secs = self.config.min_age.as_secs(),
            batch_size = self.config.batch_size,
            "Starting recovery worker"
        );

        loop {
            if let Err(e) = self.scan_and_recover().await {
                error!(error = %e, "Recovery scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// One scan. Returns how many records reached a terminal state.
    pub async fn scan_and_recover(&self) -> Result<usize, SettlementError> {
        let pending = self
            .orchestrator
            .ledger()
            .find_transfer_requested(
                self.config.min_age,
                self.config.stale_after,
                self.config.batch_size,
            )
            .await?;

        if pending.is_empty() {
            debug!("No transfer-requested purchases to recover");
            return Ok(0);
        }

        info!(count = pending.len(), "Re-polling transfer-requested purchases");

        let mut resolved = 0;
        for record in &pending {
            match self.orchestrator.recheck(record.id).await {
                Ok(SettlementOutcome::Settled { .. }) => {
                    info!(purchase_id = %record.id, "Recovered purchase settled");
                    resolved += 1;
                }
                Ok(SettlementOutcome::Pending { .. }) => {
                    debug!(purchase_id = %record.id, "Still pending");
                }
                Err(SettlementError::InProgress { .. }) => {
                    debug!(purchase_id = %record.id, "Settle running, skipped");
                }
                Err(e) if !e.is_retryable() => {
                    info!(purchase_id = %record.id, error = %e, "Recovered purchase failed");
                    resolved += 1;
                }
                Err(e) => {
                    error!(purchase_id = %record.id, error = %e, "Failed to recover purchase");
                }
            }
        }

        if resolved > 0 {
            info!(count = resolved, "Resolved purchases this scan");
        }

        Ok(resolved)
    }
}
