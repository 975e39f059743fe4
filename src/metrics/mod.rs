use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type SharedMetrics = Arc<Mutex<OrchestratorMetrics>>;

/// Counters describing what the orchestration core has been doing.
#[derive(Debug, Default, Clone)]
pub struct OrchestratorMetrics {
    widgets_loaded: u64,
    load_failures: u64,
    swap_transitions: u64,
    swaps_skipped: u64,
    reloads_fired: u64,
    reloads_skipped: u64,
    solar_rearms: u64,
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedMetrics {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn record_widget_loaded(&mut self) {
        self.widgets_loaded = self.widgets_loaded.saturating_add(1);
    }

    pub fn record_load_failure(&mut self) {
        self.load_failures = self.load_failures.saturating_add(1);
    }

    pub fn record_swap(&mut self) {
        self.swap_transitions = self.swap_transitions.saturating_add(1);
    }

    pub fn record_swap_skipped(&mut self) {
        self.swaps_skipped = self.swaps_skipped.saturating_add(1);
    }

    pub fn record_reload(&mut self) {
        self.reloads_fired = self.reloads_fired.saturating_add(1);
    }

    pub fn record_reload_skipped(&mut self) {
        self.reloads_skipped = self.reloads_skipped.saturating_add(1);
    }

    pub fn record_solar_rearm(&mut self) {
        self.solar_rearms = self.solar_rearms.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            widgets_loaded: self.widgets_loaded,
            load_failures: self.load_failures,
            swap_transitions: self.swap_transitions,
            swaps_skipped: self.swaps_skipped,
            reloads_fired: self.reloads_fired,
            reloads_skipped: self.reloads_skipped,
            solar_rearms: self.solar_rearms,
        }
    }
}

/// Apply `record` to a shared metrics handle if one is configured.
pub fn record(metrics: Option<&SharedMetrics>, record: impl FnOnce(&mut OrchestratorMetrics)) {
    if let Some(metrics) = metrics {
        if let Ok(mut guard) = metrics.lock() {
            record(&mut guard);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub widgets_loaded: u64,
    pub load_failures: u64,
    pub swap_transitions: u64,
    pub swaps_skipped: u64,
    pub reloads_fired: u64,
    pub reloads_skipped: u64,
    pub solar_rearms: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "orchestrator_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("widgets_loaded".to_string(), json!(self.widgets_loaded));
        map.insert("load_failures".to_string(), json!(self.load_failures));
        map.insert("swap_transitions".to_string(), json!(self.swap_transitions));
        map.insert("swaps_skipped".to_string(), json!(self.swaps_skipped));
        map.insert("reloads_fired".to_string(), json!(self.reloads_fired));
        map.insert("reloads_skipped".to_string(), json!(self.reloads_skipped));
        map.insert("solar_rearms".to_string(), json!(self.solar_rearms));
        map
    }
}
