//! Terminal-facing sinks: notifications into tracing, renders as tables.

use tabled::{Table, Tabled};
use tracing::{error, info, warn};

use super::traits::{NotificationSink, RenderSink, Severity};
use crate::domain::{Binding, StationSnapshot};
use crate::workflow::RequirementView;

/// Routes operator notifications into the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn show_error(&self, text: &str) {
        error!(target: "spoolmap::operator", "{}", text);
    }

    fn show_warning(&self, text: &str) {
        warn!(target: "spoolmap::operator", "{}", text);
    }

    fn clear_messages(&self) {}

    fn toast(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Error => error!(target: "spoolmap::operator", "{}", text),
            Severity::Warning => warn!(target: "spoolmap::operator", "{}", text),
            Severity::Info | Severity::Success => info!(target: "spoolmap::operator", "{}", text),
        }
    }
}

/// Discards all render calls
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl RenderSink for NullRenderer {
    fn render_requirements(&self, _requirements: &[RequirementView]) {}

    fn render_slots(&self, _snapshot: Option<&StationSnapshot>, _degraded: bool) {}

    fn render_bindings(&self, _bindings: &[Binding]) {}

    fn set_submit_enabled(&self, _enabled: bool) {}
}

#[derive(Tabled)]
struct RequirementRow {
    #[tabled(rename = "Tool")]
    tool: String,
    #[tabled(rename = "Material")]
    material: String,
    #[tabled(rename = "Color")]
    color: String,
    #[tabled(rename = "Slot")]
    slot: String,
}

#[derive(Tabled)]
struct SlotRow {
    #[tabled(rename = "Slot")]
    slot: u32,
    #[tabled(rename = "Material")]
    material: String,
    #[tabled(rename = "Color")]
    color: String,
}

#[derive(Tabled)]
struct BindingRow {
    #[tabled(rename = "Tool")]
    tool: String,
    #[tabled(rename = "Slot")]
    slot: u32,
    #[tabled(rename = "Material")]
    material: String,
    #[tabled(rename = "Job color")]
    tool_color: String,
    #[tabled(rename = "Slot color")]
    slot_color: String,
}

/// Prints tables to stdout. Only the final picture is interesting for a CLI
/// run, so renders are printed when `verbose` is set and otherwise ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleRenderer {
    pub verbose: bool,
}

impl ConsoleRenderer {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn requirements_table(requirements: &[RequirementView]) -> String {
        let rows: Vec<RequirementRow> = requirements
            .iter()
            .map(|r| RequirementRow {
                tool: format!(
                    "{}{}",
                    r.requirement.label(),
                    if r.selected { " *" } else { "" }
                ),
                material: r.requirement.material.clone(),
                color: r.requirement.color.clone(),
                slot: r
                    .bound_slot
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        Table::new(rows).to_string()
    }

    pub fn slots_table(snapshot: Option<&StationSnapshot>, degraded: bool) -> String {
        let Some(snapshot) = snapshot.filter(|_| !degraded) else {
            return "Feed station disconnected".to_string();
        };
        let rows: Vec<SlotRow> = snapshot
            .slots
            .iter()
            .map(|s| SlotRow {
                slot: s.display_id(),
                material: if s.is_empty {
                    "(empty)".to_string()
                } else {
                    s.material_or_unknown().to_string()
                },
                color: s.material_color.clone().unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        Table::new(rows).to_string()
    }

    pub fn bindings_table(bindings: &[Binding]) -> String {
        if bindings.is_empty() {
            return "(no bindings)".to_string();
        }
        let rows: Vec<BindingRow> = bindings
            .iter()
            .map(|b| BindingRow {
                tool: format!("T{}", b.tool_id),
                slot: b.slot_display_id(),
                material: b.material.clone(),
                tool_color: b.tool_color.clone(),
                slot_color: b.slot_color.clone().unwrap_or_else(|| "unknown".to_string()),
            })
            .collect();
        Table::new(rows).to_string()
    }
}

impl RenderSink for ConsoleRenderer {
    fn render_requirements(&self, requirements: &[RequirementView]) {
        if self.verbose {
            println!("{}", Self::requirements_table(requirements));
        }
    }

    fn render_slots(&self, snapshot: Option<&StationSnapshot>, degraded: bool) {
        if self.verbose {
            println!("{}", Self::slots_table(snapshot, degraded));
        }
    }

    fn render_bindings(&self, bindings: &[Binding]) {
        if self.verbose {
            println!("{}", Self::bindings_table(bindings));
        }
    }

    fn set_submit_enabled(&self, enabled: bool) {
        if self.verbose {
            println!("Submit {}", if enabled { "enabled" } else { "disabled" });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SlotState, ToolRequirement};

    #[test]
    fn slots_table_marks_empty_slots() {
        let snapshot = StationSnapshot::new(
            true,
            vec![SlotState::loaded(0, "PLA", "#ff0000"), SlotState::empty(1)],
        );
        let table = ConsoleRenderer::slots_table(Some(&snapshot), false);
        assert!(table.contains("(empty)"));
        assert!(table.contains("#ff0000"));
    }

    #[test]
    fn degraded_station_renders_placeholder() {
        assert_eq!(
            ConsoleRenderer::slots_table(None, true),
            "Feed station disconnected"
        );
    }

    #[test]
    fn bindings_table_shows_unknown_slot_color() {
        let slot = SlotState {
            slot_id: 2,
            is_empty: false,
            material_type: Some("PLA".to_string()),
            material_color: None,
        };
        let binding = Binding::capture(&ToolRequirement::new(0, "PLA", "#fff"), &slot);
        let table = ConsoleRenderer::bindings_table(&[binding]);
        assert!(table.contains("unknown"));
        assert!(table.contains("T0"));
    }
}
