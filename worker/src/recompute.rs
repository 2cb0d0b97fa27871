//! Periodic recalculation of pending transaction profit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sarafi_common::Result;
use sarafi_fx::CachedRateProvider;
use sarafi_transactions::{RecalculationReport, TransactionService};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Drives `TransactionService::recalculate_pending` on a fixed interval.
pub struct RecomputeLoop {
    service: Arc<TransactionService>,
    interval: Duration,
    batch_size: usize,
    rate_cache: Option<Arc<CachedRateProvider>>,
}

impl RecomputeLoop {
    pub fn new(service: Arc<TransactionService>, interval: Duration, batch_size: usize) -> Self {
        Self {
            service,
            interval,
            batch_size,
            rate_cache: None,
        }
    }

    /// Evict stale entries from `cache` after every pass.
    pub fn with_rate_cache(mut self, cache: Arc<CachedRateProvider>) -> Self {
        self.rate_cache = Some(cache);
        self
    }

    /// Run a single pass.
    pub async fn run_once(&self) -> Result<RecalculationReport> {
        let report = self.service.recalculate_pending(self.batch_size).await;
        if let Some(cache) = &self.rate_cache {
            cache.evict_expired();
        }
        report
    }

    /// Run passes until `shutdown` resolves. Returns the number of passes run.
    ///
    /// A failed pass is logged and retried on the next tick.
    pub async fn run_until<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut passes = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(passes, "Recompute loop stopping");
                    return passes;
                }
                _ = ticker.tick() => {
                    passes += 1;
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, retryable = e.is_retryable(), "Recompute pass failed");
                    }
                }
            }
        }
    }
}
