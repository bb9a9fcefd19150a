//! Ordered rule set deciding whether a slot selection may become a binding.
//!
//! Rules run in a fixed order and stop at the first failure:
//! 1. a tool is selected
//! 2. the slot holds material
//! 3. the selected tool belongs to the job
//! 4. normalized material names match
//! 5. the slot is not bound to a different tool
//!
//! Nothing here mutates state; callers apply the binding only after
//! `validate_binding` returns `Ok`.

use std::collections::BTreeMap;

use crate::domain::{normalize_label, Binding, Job, SlotState, ToolRequirement};
use crate::error::BindError;

pub fn validate_selection(selected_tool: Option<u32>) -> Result<u32, BindError> {
    selected_tool.ok_or(BindError::SelectionRequired)
}

pub fn validate_slot_loaded(slot: &SlotState) -> Result<(), BindError> {
    if slot.is_empty {
        return Err(BindError::EmptySlot {
            slot: slot.display_id(),
        });
    }
    Ok(())
}

pub fn validate_tool_known(job: &Job, tool_id: u32) -> Result<&ToolRequirement, BindError> {
    job.requirement(tool_id)
        .ok_or(BindError::UnknownTool { tool_id })
}

/// A slot with no reported material type never matches.
pub fn validate_material(requirement: &ToolRequirement, slot: &SlotState) -> Result<(), BindError> {
    let matches = slot
        .material_type
        .as_deref()
        .map(|loaded| normalize_label(loaded) == normalize_label(&requirement.material))
        .unwrap_or(false);

    if !matches {
        return Err(BindError::MaterialMismatch {
            tool_id: requirement.tool_id,
            slot: slot.display_id(),
            required: requirement.material.clone(),
            loaded: slot.material_or_unknown().to_string(),
        });
    }
    Ok(())
}

/// Re-binding a tool to the slot it already holds is allowed.
pub fn validate_slot_free(
    bindings: &BTreeMap<u32, Binding>,
    tool_id: u32,
    slot: &SlotState,
) -> Result<(), BindError> {
    let conflict = bindings
        .values()
        .find(|b| b.slot_display_id() == slot.display_id() && b.tool_id != tool_id);

    match conflict {
        Some(existing) => Err(BindError::SlotAlreadyAssigned {
            slot: slot.display_id(),
            assigned_to: existing.tool_id,
        }),
        None => Ok(()),
    }
}

/// Run every rule in order and return the requirement the slot will satisfy.
pub fn validate_binding<'a>(
    job: &'a Job,
    selected_tool: Option<u32>,
    slot: &SlotState,
    bindings: &BTreeMap<u32, Binding>,
) -> Result<&'a ToolRequirement, BindError> {
    let tool_id = validate_selection(selected_tool)?;
    validate_slot_loaded(slot)?;
    let requirement = validate_tool_known(job, tool_id)?;
    validate_material(requirement, slot)?;
    validate_slot_free(bindings, tool_id, slot)?;
    Ok(requirement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            "job-1",
            "bench.gcode",
            vec![
                ToolRequirement::new(0, "PLA", "#ff0000"),
                ToolRequirement::new(1, "PETG", "#00ff00"),
            ],
        )
    }

    fn bound(tool: &ToolRequirement, slot: &SlotState) -> BTreeMap<u32, Binding> {
        let mut map = BTreeMap::new();
        map.insert(tool.tool_id, Binding::capture(tool, slot));
        map
    }

    #[test]
    fn selection_checked_before_anything_else() {
        // Empty slot and no selection: selection wins.
        let err = validate_binding(&job(), None, &SlotState::empty(0), &BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, BindError::SelectionRequired);
    }

    #[test]
    fn empty_slot_checked_before_unknown_tool() {
        let err = validate_binding(&job(), Some(9), &SlotState::empty(2), &BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, BindError::EmptySlot { slot: 3 });
    }

    #[test]
    fn unknown_tool_rejected() {
        let slot = SlotState::loaded(0, "PLA", "#ff0000");
        let err = validate_binding(&job(), Some(9), &slot, &BTreeMap::new()).unwrap_err();
        assert_eq!(err, BindError::UnknownTool { tool_id: 9 });
    }

    #[test]
    fn material_compare_ignores_case_and_whitespace() {
        let slot = SlotState::loaded(0, "  pla ", "#ff0000");
        let job = job();
        let req = validate_binding(&job, Some(0), &slot, &BTreeMap::new()).expect("match");
        assert_eq!(req.tool_id, 0);
    }

    #[test]
    fn material_mismatch_reports_both_names() {
        let slot = SlotState::loaded(1, "PETG", "#123456");
        let err = validate_binding(&job(), Some(0), &slot, &BTreeMap::new()).unwrap_err();
        assert_eq!(
            err,
            BindError::MaterialMismatch {
                tool_id: 0,
                slot: 2,
                required: "PLA".to_string(),
                loaded: "PETG".to_string(),
            }
        );
    }

    #[test]
    fn missing_material_type_never_matches() {
        let slot = SlotState {
            slot_id: 0,
            is_empty: false,
            material_type: None,
            material_color: None,
        };
        let err = validate_binding(&job(), Some(0), &slot, &BTreeMap::new()).unwrap_err();
        assert_eq!(err.code(), "material_mismatch");
    }

    #[test]
    fn slot_held_by_other_tool_conflicts() {
        let job = Job::new(
            "job-2",
            "twin.gcode",
            vec![
                ToolRequirement::new(0, "PLA", "#ff0000"),
                ToolRequirement::new(1, "PLA", "#ffffff"),
            ],
        );
        let slot = SlotState::loaded(0, "PLA", "#ff0000");
        let bindings = bound(&job.requirements()[0], &slot);

        let err = validate_binding(&job, Some(1), &slot, &bindings).unwrap_err();
        assert_eq!(
            err,
            BindError::SlotAlreadyAssigned {
                slot: 1,
                assigned_to: 0
            }
        );
    }

    #[test]
    fn same_tool_same_slot_is_not_a_conflict() {
        let job = job();
        let slot = SlotState::loaded(0, "PLA", "#ff0000");
        let bindings = bound(&job.requirements()[0], &slot);

        assert!(validate_binding(&job, Some(0), &slot, &bindings).is_ok());
    }
}
