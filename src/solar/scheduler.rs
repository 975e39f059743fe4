use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ReloadAnchor, ReloadConfig};
use crate::logging::{LogLevel, Logger, TARGET_SOLAR, json_kv, json_str};
use crate::metrics::{self, SharedMetrics};
use crate::registry::WidgetRegistry;
use crate::runtime::shared_state::StateHub;

use super::times::{SolarEvent, SolarTimes, next_occurrence};

/// Wall-clock source; swapped for a paused clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmState {
    #[default]
    Idle,
    Armed,
    /// Published while due timers run. Feed updates are read by the same
    /// task, so they are only applied after firing returns to `Armed`.
    Firing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingReload {
    pub widget: String,
    pub event: SolarEvent,
    pub due: DateTime<FixedOffset>,
}

/// Scheduler state published on the hub after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadSchedule {
    pub state: ArmState,
    /// Ordered by due time.
    pub pending: Vec<PendingReload>,
}

impl ReloadSchedule {
    pub fn next_due(&self) -> Option<&PendingReload> {
        self.pending.first()
    }
}

type TimerKey = (String, SolarEvent);

/// Remounts reload targets at every sunrise and sunset.
///
/// One task owns every timer. Re-arming replaces the whole timer table, so
/// a target never carries more than one pending timer per event.
pub struct SolarReloadScheduler {
    registry: WidgetRegistry,
    hub: StateHub,
    feed: Option<watch::Receiver<SolarTimes>>,
    logger: Logger,
    metrics: Option<SharedMetrics>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SolarReloadScheduler {
    pub fn new(registry: WidgetRegistry, hub: StateHub, feed: watch::Receiver<SolarTimes>) -> Self {
        Self {
            registry,
            hub,
            feed: Some(feed),
            logger: Logger::null(),
            metrics: None,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Spawn the timer loop for the given reload declarations.
    ///
    /// Only the first call has effect; the feed is consumed by it.
    pub fn arm<I>(&mut self, reloads: I)
    where
        I: IntoIterator<Item = ReloadConfig>,
    {
        let Some(feed) = self.feed.take() else {
            self.logger.emit(
                LogLevel::Warn,
                TARGET_SOLAR,
                "solar_already_armed",
                std::iter::empty(),
            );
            return;
        };

        let mut targets: Vec<String> = Vec::new();
        for reload in reloads {
            if reload.anchor == ReloadAnchor::Unsupported {
                self.logger.emit(
                    LogLevel::Warn,
                    TARGET_SOLAR,
                    "reload_anchor_unsupported",
                    [json_str("widget", reload.widget_name)],
                );
                continue;
            }
            if !targets.contains(&reload.widget_name) {
                targets.push(reload.widget_name);
            }
        }

        let reload_loop = ReloadLoop {
            targets,
            timers: BTreeMap::new(),
            armed_with: None,
            state: ArmState::Idle,
            registry: self.registry.clone(),
            hub: self.hub.clone(),
            logger: self.logger.clone(),
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
        };
        reload_loop.publish();
        self.task = Some(tokio::spawn(reload_loop.run(feed, self.cancel.clone())));
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Some(task) = self.task {
            let _ = task.await;
        }
    }
}

struct ReloadLoop {
    targets: Vec<String>,
    timers: BTreeMap<TimerKey, DateTime<FixedOffset>>,
    armed_with: Option<SolarTimes>,
    state: ArmState,
    registry: WidgetRegistry,
    hub: StateHub,
    logger: Logger,
    metrics: Option<SharedMetrics>,
    clock: Arc<dyn Clock>,
}

impl ReloadLoop {
    async fn run(mut self, mut feed: watch::Receiver<SolarTimes>, cancel: CancellationToken) {
        let initial = feed.borrow_and_update().clone();
        self.on_update(initial);

        let mut feed_open = true;
        loop {
            let wait = self.next_due().map(|due| self.until(due));
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = feed.changed(), if feed_open => match changed {
                    Ok(()) => {
                        let times = feed.borrow_and_update().clone();
                        self.on_update(times);
                    }
                    Err(_) => {
                        feed_open = false;
                        self.logger.emit(
                            LogLevel::Warn,
                            TARGET_SOLAR,
                            "solar_feed_closed",
                            std::iter::empty(),
                        );
                    }
                },
                _ = sleep_for(wait) => self.fire_due(),
            }
        }

        self.logger.emit(
            LogLevel::Debug,
            TARGET_SOLAR,
            "solar_scheduler_stopped",
            [json_kv("pending", json!(self.timers.len()))],
        );
    }

    fn on_update(&mut self, times: SolarTimes) {
        let (sunrise, sunset) = match times.anchors() {
            Ok(anchors) => anchors,
            Err(_) if times == SolarTimes::default() => {
                self.logger.emit(
                    LogLevel::Debug,
                    TARGET_SOLAR,
                    "solar_data_pending",
                    std::iter::empty(),
                );
                return;
            }
            Err(err) => {
                self.logger.emit(
                    LogLevel::Warn,
                    TARGET_SOLAR,
                    "solar_data_incomplete",
                    [json_str("error", err.to_string())],
                );
                return;
            }
        };

        if self.armed_with.as_ref() == Some(&times) {
            self.logger.emit(
                LogLevel::Debug,
                TARGET_SOLAR,
                "solar_unchanged",
                std::iter::empty(),
            );
            return;
        }

        let now = self.clock.now();
        self.timers.clear();
        for target in &self.targets {
            for (event, anchor) in [(SolarEvent::Sunrise, sunrise), (SolarEvent::Sunset, sunset)] {
                self.timers
                    .insert((target.clone(), event), next_occurrence(anchor, now));
            }
        }
        self.armed_with = Some(times);
        self.state = ArmState::Armed;
        metrics::record(self.metrics.as_ref(), |m| m.record_solar_rearm());

        let next = self.next_due().map(|due| due.to_rfc3339());
        self.logger.emit(
            LogLevel::Info,
            TARGET_SOLAR,
            "solar_armed",
            [
                json_kv("targets", json!(self.targets)),
                json_kv("timers", json!(self.timers.len())),
                json_kv("next_due", json!(next)),
            ],
        );
        self.publish();
    }

    fn fire_due(&mut self) {
        let now = self.clock.now();
        let due: Vec<TimerKey> = self
            .timers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        if due.is_empty() {
            return;
        }

        self.state = ArmState::Firing;
        self.publish();
        for key in due {
            let Some(at) = self.timers.get(&key).copied() else {
                continue;
            };
            self.reload(&key.0, key.1);
            self.timers.insert(key, next_occurrence(at, now));
        }
        self.state = ArmState::Armed;
        self.publish();
    }

    fn reload(&self, widget: &str, event: SolarEvent) {
        match self.registry.bump_generation(widget) {
            Ok(generation) => {
                self.hub.publish_generation(widget, generation);
                metrics::record(self.metrics.as_ref(), |m| m.record_reload());
                self.logger.emit(
                    LogLevel::Info,
                    TARGET_SOLAR,
                    "widget_reloaded",
                    [
                        json_str("widget", widget),
                        json_str("event", event.as_str()),
                        json_kv("generation", json!(generation)),
                    ],
                );
            }
            Err(_) => {
                metrics::record(self.metrics.as_ref(), |m| m.record_reload_skipped());
                self.logger.emit(
                    LogLevel::Warn,
                    TARGET_SOLAR,
                    "reload_target_missing",
                    [
                        json_str("widget", widget),
                        json_str("event", event.as_str()),
                    ],
                );
            }
        }
    }

    fn next_due(&self) -> Option<DateTime<FixedOffset>> {
        self.timers.values().min().copied()
    }

    fn until(&self, due: DateTime<FixedOffset>) -> Duration {
        due.signed_duration_since(self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn schedule(&self) -> ReloadSchedule {
        let mut pending: Vec<PendingReload> = self
            .timers
            .iter()
            .map(|((widget, event), due)| PendingReload {
                widget: widget.clone(),
                event: *event,
                due: *due,
            })
            .collect();
        pending.sort_by(|a, b| a.due.cmp(&b.due).then_with(|| a.widget.cmp(&b.widget)));
        ReloadSchedule {
            state: self.state,
            pending,
        }
    }

    fn publish(&self) {
        self.hub.publish_schedule(self.schedule());
    }
}

async fn sleep_for(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}
