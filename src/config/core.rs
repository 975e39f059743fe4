use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{KioskError, Result};

/// Reserved entry name carrying swap-group declarations.
pub const SWAP_DECLARATION: &str = "HotSwapModule";
/// Reserved entry name carrying solar reload declarations.
pub const RELOAD_DECLARATION: &str = "ReloadModule";
/// Swap region value meaning "no second widget, just hide the current one".
pub const HIDDEN_REGION: &str = "hidden";

/// Opaque widget configuration handed through to the rendering layer.
pub type Props = Map<String, Value>;

/// One declared widget.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetConfig {
    pub name: String,
    pub path: String,
    pub region: String,
    pub props: Props,
}

impl WidgetConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            region: region.into(),
            props: Props::new(),
        }
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }
}

/// Where the swap member of a group goes while it is active.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SwapTarget {
    Region(String),
    /// The group only toggles its current member off; no second widget exists.
    Hidden,
}

impl SwapTarget {
    fn parse(raw: Option<String>, current_region: &str) -> Self {
        match raw {
            Some(region) if region == HIDDEN_REGION => Self::Hidden,
            Some(region) if !region.trim().is_empty() => Self::Region(region),
            _ => Self::Region(current_region.to_string()),
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, Self::Hidden)
    }
}

/// Groups are identified by the region and name of their default member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SwapGroupKey {
    pub region: String,
    pub current: String,
}

impl fmt::Display for SwapGroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.current)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapGroupConfig {
    pub current_name: String,
    pub swap_name: String,
    pub current_region: String,
    pub swap_target: SwapTarget,
    pub current_path: Option<String>,
    pub swap_path: Option<String>,
    pub interval: Duration,
}

impl SwapGroupConfig {
    pub fn new(
        current_name: impl Into<String>,
        swap_name: impl Into<String>,
        region: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let region = region.into();
        Self {
            current_name: current_name.into(),
            swap_name: swap_name.into(),
            swap_target: SwapTarget::Region(region.clone()),
            current_region: region,
            current_path: None,
            swap_path: None,
            interval,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.swap_target = SwapTarget::Hidden;
        self
    }

    pub fn with_paths(mut self, current: impl Into<String>, swap: impl Into<String>) -> Self {
        self.current_path = Some(current.into());
        self.swap_path = Some(swap.into());
        self
    }

    pub fn key(&self) -> SwapGroupKey {
        SwapGroupKey {
            region: self.current_region.clone(),
            current: self.current_name.clone(),
        }
    }

    /// Member names in presentation order; the swap member is absent when hidden.
    pub fn members(&self) -> Vec<String> {
        let mut members = vec![self.current_name.clone()];
        if !self.swap_target.is_hidden() {
            members.push(self.swap_name.clone());
        }
        members
    }

    /// Region the swap member is registered under.
    pub fn swap_region(&self) -> &str {
        match &self.swap_target {
            SwapTarget::Region(region) => region,
            SwapTarget::Hidden => &self.current_region,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadAnchor {
    /// Both sunrise and sunset.
    #[default]
    Solar,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReloadConfig {
    pub widget_name: String,
    pub anchor: ReloadAnchor,
    /// Lets a reload-only target be loaded even if nothing else declares it.
    pub path: Option<String>,
}

impl ReloadConfig {
    pub fn solar(widget_name: impl Into<String>) -> Self {
        Self {
            widget_name: widget_name.into(),
            anchor: ReloadAnchor::Solar,
            path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEntry {
    Widget(WidgetConfig),
    SwapGroups(Vec<SwapGroupConfig>),
    Reloads(Vec<ReloadConfig>),
}

/// Ordered, classified dashboard configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardConfig {
    pub entries: Vec<ConfigEntry>,
    /// Entries dropped while parsing; logged by the runtime at startup.
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    props: Props,
    #[serde(default)]
    comment: Option<Value>,
}

impl RawEntry {
    fn is_comment(&self) -> bool {
        match &self.comment {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(_) => true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSwap {
    current: String,
    swap: String,
    current_region: String,
    #[serde(default)]
    swap_region: Option<String>,
    #[serde(default)]
    current_path: Option<String>,
    #[serde(default)]
    swap_path: Option<String>,
    #[serde(alias = "interval")]
    interval_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RawReload {
    title: String,
    #[serde(default)]
    anchor: ReloadAnchor,
    #[serde(default)]
    path: Option<String>,
}

impl DashboardConfig {
    pub fn new(entries: Vec<ConfigEntry>) -> Self {
        Self {
            entries,
            warnings: Vec::new(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Parse the JSON array form. Malformed individual entries become
    /// warnings; only a malformed document is an error.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let records: Vec<Value> = serde_json::from_str(raw)?;
        let mut config = Self::default();

        for (idx, record) in records.into_iter().enumerate() {
            let entry: RawEntry = match serde_json::from_value(record) {
                Ok(entry) => entry,
                Err(err) => {
                    config.warnings.push(format!("entry #{idx}: {err}"));
                    continue;
                }
            };
            if entry.is_comment() {
                continue;
            }
            match entry.name.as_str() {
                SWAP_DECLARATION => {
                    let groups = config.parse_swaps(&entry.props);
                    config.entries.push(ConfigEntry::SwapGroups(groups));
                }
                RELOAD_DECLARATION => {
                    let reloads = config.parse_reloads(&entry.props);
                    config.entries.push(ConfigEntry::Reloads(reloads));
                }
                _ => match (entry.path, entry.region) {
                    (Some(path), Some(region)) => {
                        config.entries.push(ConfigEntry::Widget(WidgetConfig {
                            name: entry.name,
                            path,
                            region,
                            props: entry.props,
                        }));
                    }
                    _ => config
                        .warnings
                        .push(format!("widget `{}` needs both path and region", entry.name)),
                },
            }
        }

        Ok(config)
    }

    fn parse_swaps(&mut self, props: &Props) -> Vec<SwapGroupConfig> {
        let Some(list) = props.get("swaps").and_then(Value::as_array) else {
            self.warnings
                .push(format!("{SWAP_DECLARATION} has no `swaps` list"));
            return Vec::new();
        };

        let mut groups = Vec::new();
        for item in list {
            let raw: RawSwap = match serde_json::from_value(item.clone()) {
                Ok(raw) => raw,
                Err(err) => {
                    self.warnings.push(format!("swap group: {err}"));
                    continue;
                }
            };
            if raw.interval_ms == 0 {
                self.warnings
                    .push(format!("swap group `{}` has a zero interval", raw.current));
                continue;
            }
            if raw.current.trim().is_empty() || raw.swap.trim().is_empty() {
                self.warnings
                    .push("swap group with an empty member name".to_string());
                continue;
            }
            let swap_target = SwapTarget::parse(raw.swap_region, &raw.current_region);
            groups.push(SwapGroupConfig {
                current_name: raw.current,
                swap_name: raw.swap,
                current_region: raw.current_region,
                swap_target,
                current_path: raw.current_path,
                swap_path: raw.swap_path,
                interval: Duration::from_millis(raw.interval_ms),
            });
        }
        groups
    }

    fn parse_reloads(&mut self, props: &Props) -> Vec<ReloadConfig> {
        let Some(list) = props.get("reloads").and_then(Value::as_array) else {
            self.warnings
                .push(format!("{RELOAD_DECLARATION} has no `reloads` list"));
            return Vec::new();
        };

        list.iter()
            .filter_map(|item| match serde_json::from_value::<RawReload>(item.clone()) {
                Ok(raw) => Some(ReloadConfig {
                    widget_name: raw.title,
                    anchor: raw.anchor,
                    path: raw.path,
                }),
                Err(err) => {
                    self.warnings.push(format!("reload: {err}"));
                    None
                }
            })
            .collect()
    }

    pub fn widgets(&self) -> impl Iterator<Item = &WidgetConfig> {
        self.entries.iter().filter_map(|entry| match entry {
            ConfigEntry::Widget(widget) => Some(widget),
            _ => None,
        })
    }

    /// Every swap group, first declaration winning for a repeated key.
    pub fn swap_groups(&self) -> Vec<&SwapGroupConfig> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                ConfigEntry::SwapGroups(groups) => Some(groups.iter()),
                _ => None,
            })
            .flatten()
            .filter(|group| seen.insert(group.key()))
            .collect()
    }

    pub fn reloads(&self) -> Vec<&ReloadConfig> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                ConfigEntry::Reloads(reloads) => Some(reloads.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Every source path the configuration may ask the resolver for.
    pub fn paths(&self) -> BTreeSet<&str> {
        let widgets = self.widgets().map(|widget| widget.path.as_str());
        let groups = self.swap_groups().into_iter().flat_map(|group| {
            [group.current_path.as_deref(), group.swap_path.as_deref()]
                .into_iter()
                .flatten()
        });
        let reloads = self
            .reloads()
            .into_iter()
            .filter_map(|reload| reload.path.as_deref());
        widgets.chain(groups).chain(reloads).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(KioskError::Config("configuration declares nothing".into()));
        }
        Ok(())
    }
}
