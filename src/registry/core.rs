use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::json;

use crate::config::{Props, WidgetConfig};
use crate::error::{KioskError, Result};
use crate::logging::{LogLevel, Logger, TARGET_REGISTRY, json_kv, json_str};
use crate::metrics::{self, SharedMetrics};

use super::resolver::{ViewHandle, WidgetResolver};

/// Registry entry for one loaded widget.
#[derive(Debug, Clone)]
pub struct WidgetDescriptor {
    pub name: String,
    pub view: ViewHandle,
    pub props: Props,
    pub region: String,
    pub visible: bool,
    pub reload_generation: u64,
}

/// Name-keyed arena of widget descriptors.
///
/// Cloning the registry clones the handle, not the entries: every clone sees
/// the same descriptors. The lock is never held across an `.await`.
#[derive(Clone)]
pub struct WidgetRegistry {
    entries: Arc<RwLock<HashMap<String, WidgetDescriptor>>>,
    resolver: Arc<dyn WidgetResolver>,
    logger: Logger,
    metrics: Option<SharedMetrics>,
}

impl WidgetRegistry {
    pub fn new(resolver: Arc<dyn WidgetResolver>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            resolver,
            logger: Logger::null(),
            metrics: None,
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

    /// Load `config` on first reference, refresh `props`/`region` afterwards.
    ///
    /// A refresh never calls the resolver again and preserves `view` and
    /// `reload_generation`.
    pub async fn load_or_update(&self, config: &WidgetConfig) -> Result<WidgetDescriptor> {
        if let Some(updated) = self.refresh(config) {
            return Ok(updated);
        }

        match self.resolve(config).await {
            Ok(view) => Ok(self.insert(config, view)),
            Err(err) => {
                self.logger.emit(
                    LogLevel::Error,
                    TARGET_REGISTRY,
                    "widget_load_failed",
                    [
                        json_str("widget", config.name.as_str()),
                        json_str("path", config.path.as_str()),
                        json_str("error", err.to_string()),
                    ],
                );
                metrics::record(self.metrics.as_ref(), |m| m.record_load_failure());
                Err(err)
            }
        }
    }

    async fn resolve(&self, config: &WidgetConfig) -> Result<ViewHandle> {
        let pending = self
            .resolver
            .resolve(&config.path)
            .ok_or_else(|| KioskError::UnknownPath(config.path.clone()))?;
        pending.await.map_err(|reason| KioskError::Resolution {
            name: config.name.clone(),
            path: config.path.clone(),
            reason,
        })
    }

    fn refresh(&self, config: &WidgetConfig) -> Option<WidgetDescriptor> {
        let mut entries = self.write();
        let descriptor = entries.get_mut(&config.name)?;
        descriptor.props = config.props.clone();
        descriptor.region = config.region.clone();
        Some(descriptor.clone())
    }

    fn insert(&self, config: &WidgetConfig, view: ViewHandle) -> WidgetDescriptor {
        let (descriptor, inserted) = {
            let mut entries = self.write();
            match entries.entry(config.name.clone()) {
                // Another load of the same name finished while we were resolving.
                Entry::Occupied(mut occupied) => {
                    let descriptor = occupied.get_mut();
                    descriptor.props = config.props.clone();
                    descriptor.region = config.region.clone();
                    (descriptor.clone(), false)
                }
                Entry::Vacant(vacant) => {
                    let descriptor = vacant.insert(WidgetDescriptor {
                        name: config.name.clone(),
                        view,
                        props: config.props.clone(),
                        region: config.region.clone(),
                        visible: true,
                        reload_generation: 0,
                    });
                    (descriptor.clone(), true)
                }
            }
        };

        if inserted {
            self.logger.emit(
                LogLevel::Info,
                TARGET_REGISTRY,
                "widget_loaded",
                [
                    json_str("widget", config.name.as_str()),
                    json_str("region", config.region.as_str()),
                ],
            );
            metrics::record(self.metrics.as_ref(), |m| m.record_widget_loaded());
        }
        descriptor
    }

    pub fn get(&self, name: &str) -> Option<WidgetDescriptor> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Returns whether the flag actually changed.
    pub fn set_visible(&self, name: &str, visible: bool) -> Result<bool> {
        let mut entries = self.write();
        let descriptor = entries
            .get_mut(name)
            .ok_or_else(|| KioskError::WidgetNotFound(name.to_string()))?;
        let changed = descriptor.visible != visible;
        descriptor.visible = visible;
        Ok(changed)
    }

    /// Increment the remount counter and return the new generation.
    pub fn bump_generation(&self, name: &str) -> Result<u64> {
        let next = {
            let mut entries = self.write();
            let descriptor = entries
                .get_mut(name)
                .ok_or_else(|| KioskError::WidgetNotFound(name.to_string()))?;
            descriptor.reload_generation = descriptor.reload_generation.saturating_add(1);
            descriptor.reload_generation
        };
        self.logger.emit(
            LogLevel::Debug,
            TARGET_REGISTRY,
            "generation_bumped",
            [
                json_str("widget", name),
                json_kv("generation", json!(next)),
            ],
        );
        Ok(next)
    }

    pub fn generations(&self) -> BTreeMap<String, u64> {
        self.read()
            .iter()
            .map(|(name, descriptor)| (name.clone(), descriptor.reload_generation))
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, WidgetDescriptor>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, WidgetDescriptor>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
