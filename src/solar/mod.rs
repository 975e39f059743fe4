//! Solar-anchored reloads.
//!
//! Widgets listed in a reload declaration are remounted at every sunrise and
//! sunset. Solar times arrive on a watch channel fed by the weather side
//! (see [`SolarFilePoller`]); each change re-arms the scheduler.

mod feed;
mod scheduler;
mod times;

pub use feed::{SolarFilePoller, solar_channel};
pub use scheduler::{
    ArmState, Clock, PendingReload, ReloadSchedule, SolarReloadScheduler, SystemClock,
};
pub use times::{SolarEvent, SolarTimes, next_occurrence, parse_timestamp};
