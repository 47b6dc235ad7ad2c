use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::rates::RateCache;

/// Background task refreshing the rate cache on a fixed cadence.
///
/// A failed refresh is logged and the previous rates stay in effect; the
/// next tick happens on schedule regardless.
pub struct RefreshTask {
    interval: Duration,
    cache: Arc<RateCache>,
    shutdown: broadcast::Receiver<()>,
}

impl RefreshTask {
    pub fn new(
        interval: Duration,
        cache: Arc<RateCache>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            interval,
            cache,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);
        // Skip immediate first tick, the cache was primed at construction
        timer.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "rate refresh task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("rate refresh task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    match self.cache.refresh().await {
                        Ok(()) => {
                            tracing::debug!(
                                currencies = self.cache.currency_count(),
                                "rates refreshed"
                            );
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "rate refresh failed, keeping previous rates");
                        }
                    }
                }
            }
        }

        tracing::info!("rate refresh task stopped");
    }
}
