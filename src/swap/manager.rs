use std::time::Duration;

use rand::Rng;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SwapGroupConfig;
use crate::logging::{LogLevel, Logger, TARGET_SWAP, json_kv, json_str};
use crate::metrics::{self, SharedMetrics};
use crate::registry::WidgetRegistry;
use crate::runtime::shared_state::StateHub;

use super::core::{GroupVisibility, SwapCycle, SwapPhase};

/// Start offset applied to each group before its first transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterMode {
    /// Uniform in `[0, interval)`, so groups do not flip in lockstep.
    #[default]
    Random,
    Fixed(Duration),
}

impl JitterMode {
    fn delay(self, interval: Duration) -> Duration {
        match self {
            Self::Fixed(delay) => delay,
            Self::Random => {
                let millis = interval.as_millis() as u64;
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::thread_rng().gen_range(0..millis))
            }
        }
    }
}

/// Runs one alternation task per configured swap group.
pub struct SwapGroupManager {
    registry: WidgetRegistry,
    hub: StateHub,
    logger: Logger,
    metrics: Option<SharedMetrics>,
    jitter: JitterMode,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SwapGroupManager {
    pub fn new(registry: WidgetRegistry, hub: StateHub) -> Self {
        Self {
            registry,
            hub,
            logger: Logger::null(),
            metrics: None,
            jitter: JitterMode::default(),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
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

    pub fn with_jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter = jitter;
        self
    }

    /// Tie the manager's tasks to a parent token (runtime-wide shutdown).
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Publish each group's initial visibility and spawn its loop.
    pub fn start<I>(&mut self, groups: I)
    where
        I: IntoIterator<Item = SwapGroupConfig>,
    {
        for group in groups {
            if group.interval.is_zero() {
                self.logger.emit(
                    LogLevel::Warn,
                    TARGET_SWAP,
                    "swap_group_rejected",
                    [json_str("group", group.key().to_string())],
                );
                continue;
            }

            self.hub.publish_visibility(GroupVisibility::for_phase(
                &group,
                SwapPhase::ShowingCurrent,
            ));
            let task = GroupTask {
                cycle: SwapCycle::new(group),
                registry: self.registry.clone(),
                hub: self.hub.clone(),
                logger: self.logger.clone(),
                metrics: self.metrics.clone(),
            };
            let jitter = self.jitter.delay(task.cycle.group().interval);
            let cancel = self.cancel.child_token();
            self.tasks.push(tokio::spawn(task.run(jitter, cancel)));
        }
    }

    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }

    /// Cancel every group and wait for the loops to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

struct GroupTask {
    cycle: SwapCycle,
    registry: WidgetRegistry,
    hub: StateHub,
    logger: Logger,
    metrics: Option<SharedMetrics>,
}

impl GroupTask {
    async fn run(mut self, jitter: Duration, cancel: CancellationToken) {
        let key = self.cycle.group().key().to_string();
        self.logger.emit(
            LogLevel::Debug,
            TARGET_SWAP,
            "swap_group_started",
            [
                json_str("group", key.as_str()),
                json_kv("jitter_ms", json!(jitter.as_millis() as u64)),
            ],
        );

        if sleep_or_cancel(jitter, &cancel).await {
            return;
        }
        self.enter();

        loop {
            if sleep_or_cancel(self.cycle.dwell(), &cancel).await {
                break;
            }
            let target = self.cycle.advance();
            self.apply(target);
        }

        self.logger.emit(
            LogLevel::Debug,
            TARGET_SWAP,
            "swap_group_stopped",
            [json_str("group", key)],
        );
    }

    /// Initial `ShowingCurrent`; its visibility was already published at start.
    fn enter(&mut self) {
        let visibility = GroupVisibility::for_phase(self.cycle.group(), SwapPhase::ShowingCurrent);
        self.set_visibility(&visibility);
        self.cycle.mark_shown(SwapPhase::ShowingCurrent);
    }

    fn set_visibility(&self, visibility: &GroupVisibility) {
        for (name, visible) in &visibility.visible {
            if let Err(err) = self.registry.set_visible(name, *visible) {
                self.logger.emit(
                    LogLevel::Warn,
                    TARGET_SWAP,
                    "visibility_update_failed",
                    [
                        json_str("group", self.cycle.group().key().to_string()),
                        json_str("widget", name.as_str()),
                        json_str("error", err.to_string()),
                    ],
                );
            }
        }
    }

    fn apply(&mut self, target: SwapPhase) {
        if !self.cycle.needs_transition(target) {
            return;
        }

        let group = self.cycle.group();
        let missing: Vec<String> = group
            .members()
            .into_iter()
            .filter(|name| !self.registry.contains(name))
            .collect();
        if !missing.is_empty() {
            self.logger.emit(
                LogLevel::Warn,
                TARGET_SWAP,
                "swap_skipped",
                [
                    json_str("group", group.key().to_string()),
                    json_kv("missing", json!(missing)),
                ],
            );
            metrics::record(self.metrics.as_ref(), |m| m.record_swap_skipped());
            return;
        }

        let visibility = GroupVisibility::for_phase(group, target);
        self.set_visibility(&visibility);
        self.logger.emit(
            LogLevel::Info,
            TARGET_SWAP,
            "swap_transition",
            [
                json_str("group", group.key().to_string()),
                json_kv("phase", json!(target)),
            ],
        );
        self.hub.publish_visibility(visibility);
        self.cycle.mark_shown(target);
        metrics::record(self.metrics.as_ref(), |m| m.record_swap());
    }
}

/// Returns `true` when cancelled before the delay elapsed.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
