//! Region layout module orchestrator.
//!
//! Downstream code imports layout types from here while the builder and
//! slot model live in the private `core` module.

mod core;

pub use core::{LayoutBuilder, RegionId, RegionLayout, Slot, SwapGroupSlot};
