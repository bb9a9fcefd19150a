use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{station, SlotState, ToolRequirement};

/// Assignment of one tool to one station slot.
///
/// Denormalized on purpose: it records the material and colors as they were
/// when the binding was made, not as the station reports them later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub tool_id: u32,
    pub slot_id: u32,
    pub material: String,
    pub tool_color: String,
    pub slot_color: Option<String>,
    pub bound_at: DateTime<Utc>,
}

impl Binding {
    pub fn capture(requirement: &ToolRequirement, slot: &SlotState) -> Self {
        Self {
            tool_id: requirement.tool_id,
            slot_id: slot.slot_id,
            material: requirement.material.clone(),
            tool_color: requirement.color.clone(),
            slot_color: slot.material_color.clone(),
            bound_at: Utc::now(),
        }
    }

    pub fn slot_display_id(&self) -> u32 {
        station::display_id(self.slot_id)
    }
}
