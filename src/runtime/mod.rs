use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DashboardConfig;
use crate::error::{KioskError, Result};
use crate::layout::LayoutBuilder;
use crate::logging::{LogLevel, Logger, TARGET_METRICS, TARGET_RUNTIME, event_with_fields, json_kv, json_str};
use crate::metrics::{OrchestratorMetrics, SharedMetrics};
use crate::registry::{WidgetRegistry, WidgetResolver};
use crate::solar::{Clock, SolarReloadScheduler, SolarTimes, SystemClock};
use crate::swap::{JitterMode, SwapGroupManager};

pub mod diagnostics;
pub mod driver;
pub mod shared_state;

use diagnostics::MetricsReporter;
use shared_state::StateHub;

/// Configuration knobs for the orchestration runtime.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Optional structured logger used by every component.
    pub logger: Option<Logger>,
    /// Metrics accumulator used for periodic snapshots.
    pub metrics: Option<SharedMetrics>,
    /// Interval between metrics snapshot emissions. Zero disables snapshots.
    pub metrics_interval: Duration,
    /// Target field used when emitting metrics snapshots.
    pub metrics_target: String,
    /// Start offset for swap groups.
    pub jitter: JitterMode,
    /// Redraw tick of the terminal preview.
    pub preview_interval: Duration,
    /// Wall clock driving solar reloads.
    pub clock: Arc<dyn Clock>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            logger: None,
            metrics: None,
            metrics_interval: Duration::from_secs(60),
            metrics_target: TARGET_METRICS.to_string(),
            jitter: JitterMode::Random,
            preview_interval: Duration::from_millis(500),
            clock: Arc::new(SystemClock),
        }
    }
}

impl RuntimeConfig {
    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(OrchestratorMetrics::shared());
        }
    }

    /// Disable metrics collection and prevent further snapshots.
    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    pub fn metrics_handle(&self) -> Option<SharedMetrics> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// Owns the registry, the hub and every background task of one dashboard.
pub struct KioskRuntime {
    dashboard: DashboardConfig,
    config: RuntimeConfig,
    logger: Logger,
    registry: WidgetRegistry,
    hub: StateHub,
    cancel: CancellationToken,
    swaps: Option<SwapGroupManager>,
    scheduler: Option<SolarReloadScheduler>,
    reporter: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
}

impl KioskRuntime {
    pub fn new(
        dashboard: DashboardConfig,
        resolver: Arc<dyn WidgetResolver>,
        mut config: RuntimeConfig,
    ) -> Self {
        if config.metrics.is_none() && !config.metrics_interval.is_zero() {
            config.enable_metrics();
        }
        let logger = config.logger.clone().unwrap_or_default();
        let mut registry = WidgetRegistry::new(resolver).with_logger(logger.clone());
        if let Some(metrics) = config.metrics_handle() {
            registry = registry.with_metrics(metrics);
        }

        Self {
            dashboard,
            config,
            logger,
            registry,
            hub: StateHub::new(),
            cancel: CancellationToken::new(),
            swaps: None,
            scheduler: None,
            reporter: None,
            started_at: None,
        }
    }

    pub fn hub(&self) -> &StateHub {
        &self.hub
    }

    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Token cancelled when the runtime shuts down; drivers may share it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Build and publish the layout, then start swap groups, solar reloads
    /// and metrics reporting.
    pub async fn start(&mut self, solar: watch::Receiver<SolarTimes>) -> Result<()> {
        if self.started_at.is_some() {
            return Err(KioskError::Config("runtime already started".into()));
        }
        self.dashboard.validate()?;
        self.started_at = Some(Instant::now());

        for warning in &self.dashboard.warnings {
            self.log_runtime_event(
                LogLevel::Warn,
                "config_entry_skipped",
                [json_str("reason", warning.as_str())],
            );
        }

        let layout = LayoutBuilder::new(self.registry.clone())
            .with_logger(self.logger.clone())
            .build(&self.dashboard)
            .await;
        self.hub.publish_layout(layout.clone());
        self.hub.publish_generations(self.registry.generations());

        let groups: Vec<_> = self
            .dashboard
            .swap_groups()
            .into_iter()
            .filter(|group| layout.group(&group.key()).is_some())
            .cloned()
            .collect();
        let group_count = groups.len();
        let mut swaps = SwapGroupManager::new(self.registry.clone(), self.hub.clone())
            .with_logger(self.logger.clone())
            .with_jitter(self.config.jitter)
            .with_parent(&self.cancel);
        if let Some(metrics) = self.config.metrics_handle() {
            swaps = swaps.with_metrics(metrics);
        }
        swaps.start(groups);
        self.swaps = Some(swaps);

        let reloads: Vec<_> = self.dashboard.reloads().into_iter().cloned().collect();
        let reload_count = reloads.len();
        let mut scheduler =
            SolarReloadScheduler::new(self.registry.clone(), self.hub.clone(), solar)
                .with_logger(self.logger.clone())
                .with_clock(self.config.clock.clone())
                .with_parent(&self.cancel);
        if let Some(metrics) = self.config.metrics_handle() {
            scheduler = scheduler.with_metrics(metrics);
        }
        scheduler.arm(reloads);
        self.scheduler = Some(scheduler);

        if let Some(metrics) = self.config.metrics_handle() {
            self.reporter = MetricsReporter::new(self.logger.clone(), metrics)
                .with_interval(self.config.metrics_interval)
                .with_target(self.config.metrics_target.clone())
                .spawn(self.cancel.child_token());
        }

        self.log_runtime_event(
            LogLevel::Info,
            "runtime_started",
            [
                json_kv("regions", json!(layout.region_count())),
                json_kv("slots", json!(layout.slot_count())),
                json_kv("widgets", json!(self.registry.len())),
                json_kv("swap_groups", json!(group_count)),
                json_kv("reloads", json!(reload_count)),
            ],
        );
        Ok(())
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(swaps) = self.swaps.take() {
            swaps.shutdown().await;
        }
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
        if let Some(reporter) = self.reporter.take() {
            let _ = reporter.await;
        }

        let uptime_ms = self
            .started_at
            .map(|start| start.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.log_runtime_event(
            LogLevel::Info,
            "runtime_stopped",
            [json_kv("uptime_ms", json!(uptime_ms))],
        );
    }

    fn log_runtime_event<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let event = event_with_fields(level, TARGET_RUNTIME, message, fields);
        let _ = self.logger.log_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Slot;
    use crate::logging::MemorySink;
    use crate::solar::{ArmState, solar_channel};
    use crate::swap::SwapPhase;
    use crate::test_support::CountingResolver;
    use chrono::{DateTime, TimeDelta, Utc};

    const DASHBOARD: &str = r#"[
        {"name": "Clock", "path": "clock", "region": "top"},
        {"name": "Weather", "path": "weather", "region": "bottom"},
        {"name": "HotSwapModule", "props": {"swaps": [
            {"current": "Weather", "swap": "Traffic", "currentRegion": "bottom",
             "swapPath": "traffic", "intervalMs": 1000}
        ]}},
        {"name": "ReloadModule", "props": {"reloads": [{"title": "Weather", "anchor": "solar"}]}},
        {"name": "Broken", "region": "top"}
    ]"#;

    struct PausedClock {
        base: DateTime<Utc>,
        start: Instant,
    }

    impl Clock for PausedClock {
        fn now(&self) -> DateTime<Utc> {
            self.base + TimeDelta::from_std(self.start.elapsed()).unwrap()
        }
    }

    fn runtime(sink: &MemorySink) -> KioskRuntime {
        let resolver = CountingResolver::default();
        let dashboard = DashboardConfig::from_json_str(DASHBOARD).unwrap();
        let config = RuntimeConfig {
            logger: Some(Logger::new(sink.clone())),
            jitter: JitterMode::Fixed(Duration::ZERO),
            metrics_interval: Duration::from_secs(30),
            clock: Arc::new(PausedClock {
                base: DateTime::parse_from_rfc3339("2024-10-19T17:59:58+00:00")
                    .unwrap()
                    .with_timezone(&Utc),
                start: Instant::now(),
            }),
            ..RuntimeConfig::default()
        };
        KioskRuntime::new(
            dashboard,
            Arc::new(resolver.map(&["clock", "weather", "traffic"])),
            config,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn runs_layout_swaps_and_reloads_end_to_end() {
        let sink = MemorySink::new();
        let start = Instant::now();
        let mut runtime = runtime(&sink);
        let (tx, rx) = solar_channel();
        tx.send_replace(SolarTimes::new(
            DateTime::parse_from_rfc3339("2024-10-19T07:00:00+00:00").unwrap(),
            DateTime::parse_from_rfc3339("2024-10-19T18:00:00+00:00").unwrap(),
        ));
        runtime.start(rx).await.unwrap();
        assert!(runtime.is_started());

        let hub = runtime.hub().clone();
        let layout = hub.layout();
        assert_eq!(layout.slots("top"), &[Slot::widget("Clock")]);
        assert_eq!(layout.slots("bottom")[0].names(), vec!["Weather", "Traffic"]);

        tokio::time::sleep_until(start + Duration::from_millis(1200)).await;
        let key = hub.group_keys().remove(0);
        assert_eq!(hub.visibility(&key).unwrap().phase, SwapPhase::ShowingSwap);

        tokio::time::sleep_until(start + Duration::from_secs(3)).await;
        assert_eq!(hub.generations().get("Weather"), Some(&1));
        assert_eq!(hub.schedule().state, ArmState::Armed);

        tokio::time::sleep_until(start + Duration::from_secs(31)).await;
        assert_eq!(sink.count("orchestrator_metrics"), 1);

        runtime.shutdown().await;
        assert_eq!(sink.count("config_entry_skipped"), 1);
        assert_eq!(sink.count("runtime_started"), 1);
        assert_eq!(sink.count("runtime_stopped"), 1);
        let snapshots: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|event| event.message == "orchestrator_metrics")
            .collect();
        let last = snapshots.last().unwrap();
        assert_eq!(last.field("reloads_fired"), Some(&json!(1)));
        assert_eq!(last.field("widgets_loaded"), Some(&json!(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected() {
        let sink = MemorySink::new();
        let mut runtime = runtime(&sink);
        let (_tx, rx) = solar_channel();
        runtime.start(rx.clone()).await.unwrap();
        assert!(matches!(runtime.start(rx).await, Err(KioskError::Config(_))));
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn empty_dashboard_fails_validation() {
        let mut runtime = KioskRuntime::new(
            DashboardConfig::default(),
            Arc::new(CountingResolver::default().map(&[])),
            RuntimeConfig::default(),
        );
        let (_tx, rx) = solar_channel();
        assert!(runtime.start(rx).await.is_err());
        assert!(!runtime.is_started());
    }
}
