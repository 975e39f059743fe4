use std::collections::BTreeMap;
use std::io::Write;

use crate::config::SwapGroupKey;
use crate::error::Result;
use crate::layout::{RegionLayout, Slot, SwapGroupSlot};
use crate::runtime::shared_state::{ReloadGenerations, StateHub};
use crate::solar::ReloadSchedule;
use crate::swap::{GroupVisibility, SwapPhase};
use crate::width::fit_to_width;

/// Everything the preview draws, captured from the hub at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewFrame {
    pub layout: RegionLayout,
    pub groups: BTreeMap<SwapGroupKey, GroupVisibility>,
    pub generations: ReloadGenerations,
    pub schedule: ReloadSchedule,
}

impl PreviewFrame {
    pub fn capture(hub: &StateHub) -> Self {
        let groups = hub
            .group_keys()
            .into_iter()
            .filter_map(|key| hub.visibility(&key).map(|visibility| (key, visibility)))
            .collect();
        Self {
            layout: hub.layout(),
            groups,
            generations: hub.generations(),
            schedule: hub.schedule(),
        }
    }
}

/// Plain-text rendering of the dashboard state for terminals and logs.
#[derive(Debug, Clone)]
pub struct FramePreview {
    width: usize,
}

impl Default for FramePreview {
    fn default() -> Self {
        Self { width: 60 }
    }
}

impl FramePreview {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// One line per region header, slot and schedule summary, padded to width.
    pub fn lines(&self, frame: &PreviewFrame) -> Vec<String> {
        let mut lines = vec![format!(
            "kiosk  regions: {}  slots: {}",
            frame.layout.region_count(),
            frame.layout.slot_count()
        )];

        for (region, slots) in frame.layout.regions() {
            lines.push(format!("[{region}]"));
            for slot in slots {
                lines.push(match slot {
                    Slot::Widget { name } => format!("  {}", widget_label(name, frame)),
                    Slot::SwapGroup(group) => format!("  {}", group_label(group, frame)),
                });
            }
        }

        lines.push(schedule_line(&frame.schedule));

        for line in &mut lines {
            fit_to_width(line, self.width);
        }
        lines
    }

    /// Write the frame using absolute cursor positioning.
    pub fn render(&self, writer: &mut impl Write, frame: &PreviewFrame) -> Result<()> {
        for (row, line) in self.lines(frame).iter().enumerate() {
            write!(writer, "\x1b[{};1H{}", row + 1, line)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn widget_label(name: &str, frame: &PreviewFrame) -> String {
    match frame.generations.get(name) {
        Some(generation) if *generation > 0 => format!("{name} #{generation}"),
        _ => name.to_string(),
    }
}

fn group_label(group: &SwapGroupSlot, frame: &PreviewFrame) -> String {
    let members: Vec<String> = group
        .members
        .iter()
        .map(|member| widget_label(member, frame))
        .collect();
    let shown = match frame.groups.get(&group.key) {
        Some(visibility) if visibility.phase == SwapPhase::Hidden => "hidden".to_string(),
        Some(visibility) => visibility.active.clone().unwrap_or_default(),
        None => group.active.clone(),
    };
    format!("{} <> {}", members.join(" / "), shown)
}

fn schedule_line(schedule: &ReloadSchedule) -> String {
    let state = serde_json::to_value(schedule.state)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default();
    match schedule.next_due() {
        Some(next) => format!(
            "reloads: {state}  next {} {} at {}",
            next.widget,
            next.event.as_str(),
            next.due.format("%Y-%m-%d %H:%M")
        ),
        None => format!("reloads: {state}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwapGroupConfig;
    use crate::solar::{ArmState, PendingReload, SolarEvent};
    use chrono::DateTime;
    use std::time::Duration;

    fn frame() -> PreviewFrame {
        let group = SwapGroupConfig::new("Weather", "Traffic", "bottom", Duration::from_secs(2));
        let mut layout = RegionLayout::new();
        layout.push("top", Slot::widget("Clock"));
        layout.push(
            "bottom",
            Slot::SwapGroup(SwapGroupSlot {
                key: group.key(),
                members: group.members(),
                active: "Weather".into(),
            }),
        );
        let mut groups = BTreeMap::new();
        groups.insert(
            group.key(),
            GroupVisibility::for_phase(&group, SwapPhase::ShowingSwap),
        );
        let mut generations = ReloadGenerations::new();
        generations.insert("Weather".into(), 3);
        PreviewFrame {
            layout,
            groups,
            generations,
            schedule: ReloadSchedule {
                state: ArmState::Armed,
                pending: vec![PendingReload {
                    widget: "Weather".into(),
                    event: SolarEvent::Sunset,
                    due: DateTime::parse_from_rfc3339("2024-10-19T18:01:00+02:00").unwrap(),
                }],
            },
        }
    }

    #[test]
    fn lines_show_regions_groups_and_schedule() {
        let lines = FramePreview::new(60).lines(&frame());
        let trimmed: Vec<&str> = lines.iter().map(|line| line.trim_end()).collect();
        assert_eq!(
            trimmed,
            vec![
                "kiosk  regions: 2  slots: 2",
                "[bottom]",
                "  Weather #3 / Traffic <> Traffic",
                "[top]",
                "  Clock",
                "reloads: armed  next Weather sunset at 2024-10-19 18:01",
            ]
        );
        assert!(lines.iter().all(|line| line.chars().count() == 60));
    }

    #[test]
    fn render_positions_each_line() {
        let mut output = Vec::new();
        FramePreview::new(20).render(&mut output, &frame()).unwrap();
        let rendered = String::from_utf8(output).unwrap();
        assert!(rendered.contains("\u{1b}[1;1Hkiosk  regions: 2  s"));
        assert!(rendered.contains("\u{1b}[2;1H[bottom]"));
    }
}
