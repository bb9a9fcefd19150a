//! Non-blocking color checks run after a binding is committed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{normalize_label, Binding};

/// Color discrepancy between what the job asked for and what the slot holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAdvisory {
    pub tool_id: u32,
    pub slot: u32,
    pub expected: String,
    /// `None` when the station did not report a color
    pub loaded: Option<String>,
}

impl fmt::Display for ColorAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Color mismatch: tool T{} expects {} but slot {} holds {}",
            self.tool_id,
            self.expected,
            self.slot,
            self.loaded.as_deref().unwrap_or("unknown")
        )
    }
}

/// Compare the colors captured on a binding.
///
/// Only an exact normalized match passes; an unreported slot color is a mismatch.
pub fn check_color(binding: &Binding) -> Option<ColorAdvisory> {
    let matches = binding
        .slot_color
        .as_deref()
        .map(|slot_color| normalize_label(slot_color) == normalize_label(&binding.tool_color))
        .unwrap_or(false);

    if matches {
        return None;
    }

    Some(ColorAdvisory {
        tool_id: binding.tool_id,
        slot: binding.slot_display_id(),
        expected: binding.tool_color.clone(),
        loaded: binding.slot_color.clone(),
    })
}
