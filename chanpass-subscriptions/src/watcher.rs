//! Background expiry watcher.
//!
//! Periodically walks every stored record and feeds an
//! [`Event::ExpirySweepTick`] through the reconciler: expired subscribers are
//! evicted, subscriptions ending within a day get one warning. Records are
//! processed one at a time with a short pause after each one that hit the
//! platform, to stay under the chat platform's rate limits.

use crate::config::WatcherConfig;
use crate::errors::StorageError;
use crate::lifecycle::{Event, Outcome};
use crate::reconciler::MembershipReconciler;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Counters for one pass over the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records looked at
    pub examined: usize,
    /// Expired subscribers banned out of the channel
    pub evicted: usize,
    /// Expiry warnings sent
    pub warned: usize,
    /// Records with at least one failed platform action or a storage error
    pub failed: usize,
}

/// Background watcher enforcing expiry
pub struct SubscriptionWatcher {
    reconciler: Arc<MembershipReconciler>,
    config: WatcherConfig,
}

impl SubscriptionWatcher {
    /// Create a new watcher
    pub fn new(reconciler: Arc<MembershipReconciler>, config: WatcherConfig) -> Self {
        Self { reconciler, config }
    }

    /// Create with the default pacing (sweep every 60s, 50ms between records)
    pub fn with_default_interval(reconciler: Arc<MembershipReconciler>) -> Self {
        Self::new(reconciler, WatcherConfig::default())
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Run sweeps until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Watcher started (interval {}s, pace {}ms)",
            self.config.interval_secs,
            self.config.pace_ms
        );
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.sweep_until(Some(&shutdown)).await {
                Ok(report) => tracing::info!(
                    "Sweep done: {} examined, {} evicted, {} warned, {} failed",
                    report.examined,
                    report.evicted,
                    report.warned,
                    report.failed
                ),
                Err(e) => tracing::error!("Sweep failed: {}", e),
            }

            tokio::select! {
                _ = sleep(self.config.interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Watcher stopped");
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Sweep every record once.
    ///
    /// Fails only if the record snapshot cannot be read; per-record storage
    /// errors are logged and counted as failures.
    pub async fn sweep_once(&self) -> Result<SweepReport, StorageError> {
        self.sweep_until(None).await
    }

    async fn sweep_until(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<SweepReport, StorageError> {
        let records = self.reconciler.store().list_all().await?;
        let mut report = SweepReport::default();

        for record in records {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::debug!("Shutdown requested, stopping sweep early");
                break;
            }

            report.examined += 1;
            tracing::debug!("Checking user {} (expires {})", record.user_id, record.expire_at);

            match self
                .reconciler
                .apply(record.user_id, Event::ExpirySweepTick)
                .await
            {
                Ok(result) => {
                    match result.outcome {
                        Outcome::Evicted if result.removed => report.evicted += 1,
                        Outcome::Warned if result.failures() == 0 => report.warned += 1,
                        _ => {}
                    }
                    if result.failures() > 0 {
                        report.failed += 1;
                    }
                    if result.touched_platform() && !self.config.pace().is_zero() {
                        sleep(self.config.pace()).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to reconcile user {}: {}", record.user_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
