//! Swap groups: pairs of widgets alternating in one region on a timer.

mod core;
mod manager;

pub use core::{GroupVisibility, SwapCycle, SwapPhase};
pub use manager::{JitterMode, SwapGroupManager};
