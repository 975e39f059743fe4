//! Declarative dashboard configuration consumed by the layout builder.
//!
//! The on-disk form is an ordered JSON array. Ordinary records declare
//! widgets; two reserved names carry swap-group and solar reload
//! declarations.

mod core;

pub use core::{
    ConfigEntry, DashboardConfig, HIDDEN_REGION, Props, RELOAD_DECLARATION, ReloadAnchor,
    ReloadConfig, SWAP_DECLARATION, SwapGroupConfig, SwapGroupKey, SwapTarget, WidgetConfig,
};
