use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::config::{SwapGroupConfig, SwapGroupKey};

/// Which member of a group is on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapPhase {
    ShowingCurrent,
    ShowingSwap,
    /// Replaces `ShowingSwap` for groups whose swap target is hidden.
    Hidden,
}

/// Visibility mapping published for one group after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupVisibility {
    pub key: SwapGroupKey,
    pub phase: SwapPhase,
    pub active: Option<String>,
    pub visible: BTreeMap<String, bool>,
}

impl GroupVisibility {
    pub fn for_phase(group: &SwapGroupConfig, phase: SwapPhase) -> Self {
        let hidden = group.swap_target.is_hidden();
        let mut visible = BTreeMap::new();
        visible.insert(
            group.current_name.clone(),
            phase == SwapPhase::ShowingCurrent,
        );
        if !hidden {
            visible.insert(group.swap_name.clone(), phase == SwapPhase::ShowingSwap);
        }
        let active = match phase {
            SwapPhase::ShowingCurrent => Some(group.current_name.clone()),
            SwapPhase::ShowingSwap => Some(group.swap_name.clone()),
            SwapPhase::Hidden => None,
        };
        Self {
            key: group.key(),
            phase,
            active,
            visible,
        }
    }
}

/// Timeline of one swap group.
///
/// `scheduled` walks the fixed timeline (full interval on the current
/// member, half an interval away from it); `shown` is what was last
/// applied. They diverge only while a transition is being skipped.
#[derive(Debug, Clone)]
pub struct SwapCycle {
    group: SwapGroupConfig,
    scheduled: SwapPhase,
    shown: SwapPhase,
}

impl SwapCycle {
    pub fn new(group: SwapGroupConfig) -> Self {
        Self {
            group,
            scheduled: SwapPhase::ShowingCurrent,
            shown: SwapPhase::ShowingCurrent,
        }
    }

    pub fn group(&self) -> &SwapGroupConfig {
        &self.group
    }

    pub fn shown(&self) -> SwapPhase {
        self.shown
    }

    /// How long the scheduled phase lasts.
    pub fn dwell(&self) -> Duration {
        match self.scheduled {
            SwapPhase::ShowingCurrent => self.group.interval,
            SwapPhase::ShowingSwap | SwapPhase::Hidden => self.group.interval / 2,
        }
    }

    /// Move the timeline forward one phase and return the new target.
    pub fn advance(&mut self) -> SwapPhase {
        self.scheduled = match self.scheduled {
            SwapPhase::ShowingCurrent if self.group.swap_target.is_hidden() => SwapPhase::Hidden,
            SwapPhase::ShowingCurrent => SwapPhase::ShowingSwap,
            SwapPhase::ShowingSwap | SwapPhase::Hidden => SwapPhase::ShowingCurrent,
        };
        self.scheduled
    }

    pub fn needs_transition(&self, target: SwapPhase) -> bool {
        self.shown != target
    }

    pub fn mark_shown(&mut self, phase: SwapPhase) {
        self.shown = phase;
    }
}
