use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::logging::{Logger, TARGET_METRICS};
use crate::metrics::SharedMetrics;

/// Periodically emits orchestrator metrics snapshots through the logger.
pub struct MetricsReporter {
    logger: Logger,
    metrics: SharedMetrics,
    target: String,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(logger: Logger, metrics: SharedMetrics) -> Self {
        Self {
            logger,
            metrics,
            target: TARGET_METRICS.to_string(),
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    fn emit_snapshot(&self, uptime: Duration) {
        if let Ok(guard) = self.metrics.lock() {
            let event = guard.snapshot(uptime).to_log_event(&self.target);
            let _ = self.logger.log_event(event);
        }
    }

    /// Zero interval disables reporting and returns `None`.
    pub fn spawn(self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.interval.is_zero() {
            return None;
        }
        Some(tokio::spawn(async move {
            let started_at = Instant::now();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => self.emit_snapshot(started_at.elapsed()),
                }
            }
            // Final snapshot so short runs still report totals.
            self.emit_snapshot(started_at.elapsed());
        }))
    }
}
