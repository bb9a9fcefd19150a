use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Highest slot id a station may report; the one-based display id must fit in `u32`
pub const MAX_SLOT_ID: u32 = u32::MAX - 1;

fn deserialize_slot_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let slot_id = u32::deserialize(deserializer)?;
    if slot_id > MAX_SLOT_ID {
        return Err(serde::de::Error::custom(format!(
            "slot_id {} out of range (max {})",
            slot_id, MAX_SLOT_ID
        )));
    }
    Ok(slot_id)
}

/// State of one bay in the multi-material feed station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotState {
    /// Zero-based position reported by the station
    #[serde(deserialize_with = "deserialize_slot_id")]
    pub slot_id: u32,
    pub is_empty: bool,
    #[serde(default)]
    pub material_type: Option<String>,
    #[serde(default)]
    pub material_color: Option<String>,
}

/// One-based form of a slot id. Saturates for ids above `MAX_SLOT_ID`.
pub fn display_id(slot_id: u32) -> u32 {
    slot_id.saturating_add(1)
}

impl SlotState {
    pub fn loaded(
        slot_id: u32,
        material_type: impl Into<String>,
        material_color: impl Into<String>,
    ) -> Self {
        Self {
            slot_id,
            is_empty: false,
            material_type: Some(material_type.into()),
            material_color: Some(material_color.into()),
        }
    }

    pub fn empty(slot_id: u32) -> Self {
        Self {
            slot_id,
            is_empty: true,
            material_type: None,
            material_color: None,
        }
    }

    /// One-based identifier shown to operators and used for conflict checks
    pub fn display_id(&self) -> u32 {
        display_id(self.slot_id)
    }

    pub fn material_or_unknown(&self) -> &str {
        self.material_type.as_deref().unwrap_or("unknown")
    }

    pub fn color_or_unknown(&self) -> &str {
        self.material_color.as_deref().unwrap_or("unknown")
    }
}

/// Point-in-time view of the feed station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub connected: bool,
    #[serde(default)]
    pub slots: Vec<SlotState>,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

impl StationSnapshot {
    pub fn new(connected: bool, slots: Vec<SlotState>) -> Self {
        Self {
            connected,
            slots,
            fetched_at: Utc::now(),
        }
    }

    pub fn slot(&self, slot_id: u32) -> Option<&SlotState> {
        self.slots.iter().find(|s| s.slot_id == slot_id)
    }

    pub fn slot_by_display_id(&self, display_id: u32) -> Option<&SlotState> {
        self.slots.iter().find(|s| s.display_id() == display_id)
    }

    pub fn loaded_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty).count()
    }
}
