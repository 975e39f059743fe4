use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use serde_json::json;

use crate::config::{
    ConfigEntry, DashboardConfig, HIDDEN_REGION, ReloadConfig, SwapGroupConfig, SwapGroupKey,
    WidgetConfig,
};
use crate::logging::{LogLevel, Logger, TARGET_LAYOUT, json_kv, json_str};
use crate::registry::WidgetRegistry;

/// Region identifier as written in the configuration.
pub type RegionId = String;

/// Presentation slot for a swap group: one position, several members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapGroupSlot {
    pub key: SwapGroupKey,
    pub members: Vec<String>,
    pub active: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Slot {
    Widget { name: String },
    SwapGroup(SwapGroupSlot),
}

impl Slot {
    pub fn widget(name: impl Into<String>) -> Self {
        Self::Widget { name: name.into() }
    }

    /// Every widget name this slot references.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Widget { name } => vec![name.as_str()],
            Self::SwapGroup(group) => group.members.iter().map(String::as_str).collect(),
        }
    }
}

/// Ordered slots per region. Published as an immutable snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionLayout {
    regions: BTreeMap<RegionId, Vec<Slot>>,
}

impl RegionLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, region: &str, slot: Slot) {
        self.regions.entry(region.to_string()).or_default().push(slot);
    }

    pub fn slots(&self, region: &str) -> &[Slot] {
        self.regions.get(region).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, &[Slot])> {
        self.regions
            .iter()
            .map(|(region, slots)| (region.as_str(), slots.as_slice()))
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn slot_count(&self) -> usize {
        self.regions.values().map(Vec::len).sum()
    }

    pub fn group(&self, key: &SwapGroupKey) -> Option<&SwapGroupSlot> {
        self.slots(&key.region).iter().find_map(|slot| match slot {
            Slot::SwapGroup(group) if &group.key == key => Some(group),
            _ => None,
        })
    }

    /// Drop the standalone slot for `name`, wherever it was placed.
    fn remove_standalone(&mut self, name: &str) {
        for slots in self.regions.values_mut() {
            slots.retain(|slot| !matches!(slot, Slot::Widget { name: n } if n == name));
        }
        self.regions.retain(|_, slots| !slots.is_empty());
    }

    fn remove_standalone_in(&mut self, region: &str, name: &str) {
        if let Some(slots) = self.regions.get_mut(region) {
            slots.retain(|slot| !matches!(slot, Slot::Widget { name: n } if n == name));
            if slots.is_empty() {
                self.regions.remove(region);
            }
        }
    }
}

/// Turns configuration into a [`RegionLayout`], loading widgets on the way.
pub struct LayoutBuilder {
    registry: WidgetRegistry,
    logger: Logger,
}

impl LayoutBuilder {
    pub fn new(registry: WidgetRegistry) -> Self {
        Self {
            registry,
            logger: Logger::null(),
        }
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Build the layout in configuration order. Widgets that fail to load are
    /// logged and left out; the build itself never fails.
    pub async fn build(&self, config: &DashboardConfig) -> RegionLayout {
        let groups: HashMap<SwapGroupKey, &SwapGroupConfig> = config
            .swap_groups()
            .into_iter()
            .map(|group| (group.key(), group))
            .collect();
        let swap_members: HashMap<(&str, &str), SwapGroupKey> = groups
            .iter()
            .filter(|(_, group)| !group.swap_target.is_hidden())
            .map(|(key, group)| {
                (
                    (group.current_region.as_str(), group.swap_name.as_str()),
                    key.clone(),
                )
            })
            .collect();
        let anchored: HashSet<SwapGroupKey> = config
            .widgets()
            .map(|widget| key_of(widget))
            .filter(|key| groups.contains_key(key))
            .collect();

        let mut layout = RegionLayout::new();
        let mut emitted: HashSet<SwapGroupKey> = HashSet::new();
        let mut placed: HashSet<SwapGroupKey> = HashSet::new();
        // Standalone entries of swap members, dropped once their group is placed.
        let mut folded: Vec<(&str, &str, SwapGroupKey)> = Vec::new();

        for entry in &config.entries {
            match entry {
                ConfigEntry::Widget(widget) => {
                    let key = key_of(widget);
                    if let Some(group) = groups.get(&key) {
                        if emitted.insert(key.clone()) {
                            if self.emit_group(group, Some(widget), &mut layout).await {
                                placed.insert(key);
                            }
                        } else {
                            self.load(widget).await;
                        }
                        continue;
                    }

                    if !self.load(widget).await {
                        continue;
                    }
                    layout.remove_standalone(&widget.name);
                    layout.push(&widget.region, Slot::widget(&widget.name));
                    if let Some(key) =
                        swap_members.get(&(widget.region.as_str(), widget.name.as_str()))
                    {
                        folded.push((&widget.region, &widget.name, key.clone()));
                    }
                }
                ConfigEntry::SwapGroups(declared) => {
                    for declared in declared {
                        let key = declared.key();
                        if anchored.contains(&key) {
                            continue;
                        }
                        // Repeated keys resolve to the first declaration.
                        let Some(group) = groups.get(&key).copied() else {
                            continue;
                        };
                        if emitted.insert(key.clone())
                            && self.emit_group(group, None, &mut layout).await
                        {
                            placed.insert(key);
                        }
                    }
                }
                ConfigEntry::Reloads(_) => {}
            }
        }

        // A member whose group was omitted keeps its own slot.
        for (region, name, key) in folded {
            if placed.contains(&key) {
                layout.remove_standalone_in(region, name);
            }
        }

        for reload in config.reloads() {
            self.ensure_reload_target(reload).await;
        }

        self.logger.emit(
            LogLevel::Info,
            TARGET_LAYOUT,
            "layout_built",
            [
                json_kv("regions", json!(layout.region_count())),
                json_kv("slots", json!(layout.slot_count())),
                json_kv("widgets", json!(self.registry.len())),
            ],
        );
        layout
    }

    /// Push the group's slot. Returns false when the current member failed
    /// and the group was left out.
    async fn emit_group(
        &self,
        group: &SwapGroupConfig,
        anchor: Option<&WidgetConfig>,
        layout: &mut RegionLayout,
    ) -> bool {
        let current_loaded = match anchor {
            Some(widget) => self.load(widget).await,
            None => {
                self.ensure_loaded(
                    &group.current_name,
                    group.current_path.as_deref(),
                    &group.current_region,
                )
                .await
            }
        };
        if !current_loaded {
            self.logger.emit(
                LogLevel::Error,
                TARGET_LAYOUT,
                "swap_group_omitted",
                [json_str("group", group.key().to_string())],
            );
            return false;
        }

        let mut members = vec![group.current_name.clone()];
        if !group.swap_target.is_hidden()
            && self
                .ensure_loaded(
                    &group.swap_name,
                    group.swap_path.as_deref(),
                    group.swap_region(),
                )
                .await
        {
            // Only the current member is shown until the first transition.
            if let Err(err) = self.registry.set_visible(&group.swap_name, false) {
                self.logger.emit(
                    LogLevel::Warn,
                    TARGET_LAYOUT,
                    "visibility_update_failed",
                    [
                        json_str("widget", group.swap_name.as_str()),
                        json_str("error", err.to_string()),
                    ],
                );
            }
            members.push(group.swap_name.clone());
        }

        layout.push(
            &group.current_region,
            Slot::SwapGroup(SwapGroupSlot {
                key: group.key(),
                members,
                active: group.current_name.clone(),
            }),
        );
        true
    }

    async fn ensure_reload_target(&self, reload: &ReloadConfig) {
        if self.registry.contains(&reload.widget_name) {
            return;
        }
        match reload.path.as_deref() {
            Some(path) => {
                self.ensure_loaded(&reload.widget_name, Some(path), HIDDEN_REGION)
                    .await;
            }
            None => self.logger.emit(
                LogLevel::Warn,
                TARGET_LAYOUT,
                "reload_target_undeclared",
                [json_str("widget", reload.widget_name.as_str())],
            ),
        }
    }

    /// Load a widget referenced only by name, leaving an existing entry alone.
    async fn ensure_loaded(&self, name: &str, path: Option<&str>, region: &str) -> bool {
        if self.registry.contains(name) {
            return true;
        }
        let Some(path) = path else {
            self.logger.emit(
                LogLevel::Error,
                TARGET_LAYOUT,
                "widget_path_missing",
                [json_str("widget", name)],
            );
            return false;
        };
        self.load(&WidgetConfig::new(name, path, region)).await
    }

    async fn load(&self, widget: &WidgetConfig) -> bool {
        match self.registry.load_or_update(widget).await {
            Ok(_) => true,
            Err(_) => {
                self.logger.emit(
                    LogLevel::Warn,
                    TARGET_LAYOUT,
                    "widget_omitted",
                    [
                        json_str("widget", widget.name.as_str()),
                        json_str("region", widget.region.as_str()),
                    ],
                );
                false
            }
        }
    }
}

fn key_of(widget: &WidgetConfig) -> SwapGroupKey {
    SwapGroupKey {
        region: widget.region.clone(),
        current: widget.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Props, ReloadConfig, SwapGroupConfig};
    use crate::logging::MemorySink;
    use crate::test_support::CountingResolver;
    use std::time::Duration;

    fn widget(name: &str, region: &str) -> ConfigEntry {
        ConfigEntry::Widget(WidgetConfig::new(name, name.to_lowercase(), region))
    }

    fn group(current: &str, swap: &str, region: &str) -> SwapGroupConfig {
        SwapGroupConfig::new(current, swap, region, Duration::from_millis(2000))
            .with_paths(current.to_lowercase(), swap.to_lowercase())
    }

    fn names(slots: &[Slot]) -> Vec<String> {
        slots
            .iter()
            .map(|slot| match slot {
                Slot::Widget { name } => name.clone(),
                Slot::SwapGroup(group) => format!("<{}>", group.members.join("|")),
            })
            .collect()
    }

    #[tokio::test]
    async fn clock_and_weather_traffic_scenario() {
        let resolver = CountingResolver::default();
        let registry = resolver.registry(&["clockWidget", "weather", "traffic"]);
        let config = DashboardConfig::new(vec![
            ConfigEntry::Widget(WidgetConfig::new("Clock", "clockWidget", "top")),
            ConfigEntry::SwapGroups(vec![group("Weather", "Traffic", "bottom")]),
        ]);

        let layout = LayoutBuilder::new(registry.clone()).build(&config).await;

        assert_eq!(layout.slots("top"), &[Slot::widget("Clock")]);
        let key = group("Weather", "Traffic", "bottom").key();
        let slot = layout.group(&key).unwrap();
        assert_eq!(slot.members, vec!["Weather", "Traffic"]);
        assert_eq!(slot.active, "Weather");
        assert_eq!(layout.slot_count(), 2);
        assert!(registry.get("Weather").unwrap().visible);
        assert!(!registry.get("Traffic").unwrap().visible);
    }

    #[tokio::test]
    async fn order_follows_configuration_with_group_at_current_position() {
        let resolver = CountingResolver::default();
        let registry = resolver.registry(&["a", "weather", "traffic", "b"]);
        let config = DashboardConfig::new(vec![
            ConfigEntry::SwapGroups(vec![group("Weather", "Traffic", "main")]),
            widget("A", "main"),
            widget("Weather", "main"),
            widget("Traffic", "main"),
            widget("B", "main"),
            widget("Weather", "main"),
        ]);

        let layout = LayoutBuilder::new(registry).build(&config).await;

        assert_eq!(
            names(layout.slots("main")),
            vec!["A", "<Weather|Traffic>", "B"]
        );
        assert_eq!(resolver.calls("weather"), 1);
        assert_eq!(resolver.calls("traffic"), 1);
    }

    #[tokio::test]
    async fn referenced_only_names_load_exactly_once() {
        let resolver = CountingResolver::default();
        let registry = resolver.registry(&["weather", "traffic", "moon"]);
        let mut moon = ReloadConfig::solar("Moon");
        moon.path = Some("moon".into());
        let config = DashboardConfig::new(vec![
            ConfigEntry::SwapGroups(vec![group("Weather", "Traffic", "bottom")]),
            ConfigEntry::Reloads(vec![ReloadConfig::solar("Weather"), moon]),
            ConfigEntry::SwapGroups(vec![group("Weather", "Traffic", "bottom")]),
        ]);

        let layout = LayoutBuilder::new(registry.clone()).build(&config).await;

        assert_eq!(resolver.calls("weather"), 1);
        assert_eq!(resolver.calls("traffic"), 1);
        assert_eq!(resolver.calls("moon"), 1);
        assert_eq!(layout.slots("bottom").len(), 1);
        assert_eq!(registry.get("Moon").unwrap().region, HIDDEN_REGION);
        assert!(layout.slots(HIDDEN_REGION).is_empty());
    }

    #[tokio::test]
    async fn repeated_entry_keeps_last_props_and_generation() {
        let resolver = CountingResolver::default();
        let registry = resolver.registry(&["clock"]);
        let mut first = Props::new();
        first.insert("tz".into(), json!("UTC"));
        let mut second = Props::new();
        second.insert("tz".into(), json!("Europe/Oslo"));

        LayoutBuilder::new(registry.clone())
            .build(&DashboardConfig::new(vec![ConfigEntry::Widget(
                WidgetConfig::new("Clock", "clock", "top").with_props(first),
            )]))
            .await;
        registry.bump_generation("Clock").unwrap();

        let layout = LayoutBuilder::new(registry.clone())
            .build(&DashboardConfig::new(vec![
                widget("Clock", "top"),
                ConfigEntry::Widget(WidgetConfig::new("Clock", "clock", "top").with_props(second.clone())),
            ]))
            .await;

        let descriptor = registry.get("Clock").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(descriptor.props, second);
        assert_eq!(descriptor.reload_generation, 1);
        assert_eq!(resolver.calls("clock"), 1);
        assert_eq!(names(layout.slots("top")), vec!["Clock"]);
    }

    #[tokio::test]
    async fn failed_widgets_are_omitted_and_logged() {
        let resolver = CountingResolver::default();
        let sink = MemorySink::new();
        let registry = resolver.registry(&["a", "weather"]);
        let config = DashboardConfig::new(vec![
            widget("A", "top"),
            widget("Missing", "top"),
            ConfigEntry::SwapGroups(vec![
                group("Weather", "Traffic", "bottom"),
                group("Ghost", "Spirit", "side"),
            ]),
        ]);

        let layout = LayoutBuilder::new(registry.clone())
            .with_logger(Logger::new(sink.clone()))
            .build(&config)
            .await;

        assert_eq!(names(layout.slots("top")), vec!["A"]);
        assert_eq!(names(layout.slots("bottom")), vec!["<Weather>"]);
        assert!(layout.slots("side").is_empty());
        assert_eq!(sink.count("swap_group_omitted"), 1);
        for (_, slots) in layout.regions() {
            for slot in slots {
                for name in slot.names() {
                    assert!(registry.contains(name));
                }
            }
        }
    }

    #[tokio::test]
    async fn omitted_group_leaves_standalone_member_in_place() {
        let resolver = CountingResolver::default();
        let sink = MemorySink::new();
        let registry = resolver.registry(&["traffic"]);
        let config = DashboardConfig::new(vec![
            widget("Traffic", "bottom"),
            widget("Weather", "bottom"),
            ConfigEntry::SwapGroups(vec![group("Weather", "Traffic", "bottom")]),
        ]);

        let layout = LayoutBuilder::new(registry.clone())
            .with_logger(Logger::new(sink.clone()))
            .build(&config)
            .await;

        assert_eq!(names(layout.slots("bottom")), vec!["Traffic"]);
        assert!(layout.group(&group("Weather", "Traffic", "bottom").key()).is_none());
        assert_eq!(sink.count("swap_group_omitted"), 1);
        assert!(registry.get("Traffic").unwrap().visible);
    }

    #[tokio::test]
    async fn placed_group_absorbs_member_declared_before_it() {
        let resolver = CountingResolver::default();
        let registry = resolver.registry(&["traffic", "weather"]);
        let config = DashboardConfig::new(vec![
            widget("Traffic", "bottom"),
            widget("Weather", "bottom"),
            ConfigEntry::SwapGroups(vec![group("Weather", "Traffic", "bottom")]),
        ]);

        let layout = LayoutBuilder::new(registry).build(&config).await;

        assert_eq!(names(layout.slots("bottom")), vec!["<Weather|Traffic>"]);
        assert_eq!(resolver.calls("traffic"), 1);
    }

    #[tokio::test]
    async fn member_declared_in_other_region_keeps_its_slot() {
        let resolver = CountingResolver::default();
        let registry = resolver.registry(&["weather", "traffic"]);
        let config = DashboardConfig::new(vec![
            widget("Weather", "bottom"),
            widget("Traffic", "side"),
            ConfigEntry::SwapGroups(vec![group("Weather", "Traffic", "bottom")]),
        ]);

        let layout = LayoutBuilder::new(registry).build(&config).await;

        assert_eq!(names(layout.slots("bottom")), vec!["<Weather|Traffic>"]);
        assert_eq!(names(layout.slots("side")), vec!["Traffic"]);
        assert_eq!(resolver.calls("traffic"), 1);
    }

    #[tokio::test]
    async fn hidden_group_has_single_member() {
        let resolver = CountingResolver::default();
        let registry = resolver.registry(&["globe", "nothing"]);
        let config = DashboardConfig::new(vec![ConfigEntry::SwapGroups(vec![
            group("Globe", "Nothing", "side").hidden(),
        ])]);

        let layout = LayoutBuilder::new(registry.clone()).build(&config).await;

        assert_eq!(names(layout.slots("side")), vec!["<Globe>"]);
        assert_eq!(resolver.calls("nothing"), 0);
        assert!(!registry.contains("Nothing"));
    }
}
