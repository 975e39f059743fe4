use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use crate::config::SwapGroupKey;
use crate::layout::RegionLayout;
use crate::solar::ReloadSchedule;
use crate::swap::GroupVisibility;

/// Widget name → reload generation.
pub type ReloadGenerations = BTreeMap<String, u64>;

/// Last-value cached channels the rendering layer observes.
///
/// Every channel is a `watch`: subscribers joining late immediately see the
/// latest value, and publishing always replaces the value wholesale so a
/// snapshot a subscriber is holding is never mutated underneath it. Cloning
/// the hub clones the handle.
#[derive(Clone)]
pub struct StateHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    layout: watch::Sender<RegionLayout>,
    generations: watch::Sender<ReloadGenerations>,
    schedule: watch::Sender<ReloadSchedule>,
    groups: RwLock<HashMap<SwapGroupKey, watch::Sender<GroupVisibility>>>,
}

impl Default for StateHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHub {
    pub fn new() -> Self {
        let (layout, _) = watch::channel(RegionLayout::default());
        let (generations, _) = watch::channel(ReloadGenerations::new());
        let (schedule, _) = watch::channel(ReloadSchedule::default());
        Self {
            inner: Arc::new(HubInner {
                layout,
                generations,
                schedule,
                groups: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn publish_layout(&self, layout: RegionLayout) {
        self.inner.layout.send_replace(layout);
    }

    pub fn layout(&self) -> RegionLayout {
        self.inner.layout.borrow().clone()
    }

    pub fn subscribe_layout(&self) -> watch::Receiver<RegionLayout> {
        self.inner.layout.subscribe()
    }

    /// Publish a group's visibility, creating its channel on first use.
    pub fn publish_visibility(&self, visibility: GroupVisibility) {
        if let Some(sender) = self.group_sender(&visibility.key) {
            sender.send_replace(visibility);
            return;
        }
        let mut groups = self
            .inner
            .groups
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match groups.get(&visibility.key) {
            Some(sender) => {
                sender.send_replace(visibility);
            }
            None => {
                let key = visibility.key.clone();
                let (sender, _) = watch::channel(visibility);
                groups.insert(key, sender);
            }
        }
    }

    pub fn visibility(&self, key: &SwapGroupKey) -> Option<GroupVisibility> {
        self.group_sender(key).map(|sender| sender.borrow().clone())
    }

    /// `None` until the group has published at least once.
    pub fn subscribe_group(&self, key: &SwapGroupKey) -> Option<watch::Receiver<GroupVisibility>> {
        self.group_sender(key).map(|sender| sender.subscribe())
    }

    pub fn group_keys(&self) -> Vec<SwapGroupKey> {
        let groups = self
            .inner
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = groups.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn group_sender(&self, key: &SwapGroupKey) -> Option<watch::Sender<GroupVisibility>> {
        self.inner
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn publish_generations(&self, generations: ReloadGenerations) {
        self.inner.generations.send_replace(generations);
    }

    /// Replace the generation map with a copy carrying `name`'s new value.
    pub fn publish_generation(&self, name: &str, generation: u64) {
        let mut next = self.inner.generations.borrow().clone();
        next.insert(name.to_string(), generation);
        self.inner.generations.send_replace(next);
    }

    pub fn generations(&self) -> ReloadGenerations {
        self.inner.generations.borrow().clone()
    }

    pub fn subscribe_generations(&self) -> watch::Receiver<ReloadGenerations> {
        self.inner.generations.subscribe()
    }

    pub fn publish_schedule(&self, schedule: ReloadSchedule) {
        self.inner.schedule.send_replace(schedule);
    }

    pub fn schedule(&self) -> ReloadSchedule {
        self.inner.schedule.borrow().clone()
    }

    pub fn subscribe_schedule(&self) -> watch::Receiver<ReloadSchedule> {
        self.inner.schedule.subscribe()
    }
}
