//! Kiosk dashboard orchestration core.
//!
//! Reads an ordered dashboard configuration, loads widgets through a
//! pluggable resolver, arranges them into regions and keeps them moving:
//! swap groups alternate on timers and reload targets remount at sunrise
//! and sunset. Everything the presentation layer needs is published on
//! watch channels in [`runtime::shared_state::StateHub`].

pub mod config;
pub mod error;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod render;
pub mod runtime;
pub mod solar;
pub mod swap;
pub mod width;

#[cfg(test)]
mod test_support;

pub use config::{
    ConfigEntry, DashboardConfig, ReloadAnchor, ReloadConfig, SwapGroupConfig, SwapGroupKey,
    SwapTarget, WidgetConfig,
};
pub use error::{KioskError, Result};
pub use layout::{LayoutBuilder, RegionLayout, Slot, SwapGroupSlot};
pub use logging::{LogEvent, LogFields, LogLevel, Logger, LoggingError, LoggingResult};
pub use metrics::{MetricSnapshot, OrchestratorMetrics, SharedMetrics};
pub use registry::{ResolverMap, ViewHandle, WidgetDescriptor, WidgetRegistry, WidgetResolver};
pub use render::{FramePreview, PreviewFrame};
pub use runtime::diagnostics::MetricsReporter;
pub use runtime::driver::{DriverResult, PreviewDriver, PreviewDriverError};
pub use runtime::shared_state::{ReloadGenerations, StateHub};
pub use runtime::{KioskRuntime, RuntimeConfig};
pub use solar::{
    ArmState, ReloadSchedule, SolarEvent, SolarFilePoller, SolarReloadScheduler, SolarTimes,
    solar_channel,
};
pub use swap::{GroupVisibility, JitterMode, SwapGroupManager, SwapPhase};
pub use width::display_width;
