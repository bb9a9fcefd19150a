use async_trait::async_trait;
use std::path::Path;
use std::sync::RwLock;
use tracing::debug;

use super::traits::StationStatusProvider;
use crate::domain::StationSnapshot;
use crate::error::{Result, SpoolmapError};

/// Serves a fixed snapshot, optionally replaced at runtime
pub struct StaticStationProvider {
    snapshot: RwLock<Option<StationSnapshot>>,
}

impl StaticStationProvider {
    pub fn new(snapshot: Option<StationSnapshot>) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Load a snapshot from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let snapshot: StationSnapshot = serde_json::from_str(&text)?;
        debug!(path = %path.display(), slots = snapshot.slots.len(), "Loaded station snapshot");
        Ok(Self::new(Some(snapshot)))
    }

    pub fn replace(&self, snapshot: Option<StationSnapshot>) -> Result<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| SpoolmapError::FetchFailure("snapshot lock poisoned".to_string()))?;
        *guard = snapshot;
        Ok(())
    }
}

#[async_trait]
impl StationStatusProvider for StaticStationProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, _context_id: Option<&str>) -> Result<Option<StationSnapshot>> {
        let guard = self
            .snapshot
            .read()
            .map_err(|_| SpoolmapError::FetchFailure("snapshot lock poisoned".to_string()))?;
        Ok(guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SlotState;
    use std::io::Write;

    #[tokio::test]
    async fn from_file_round_trips_through_fetch() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r##"{{"connected":true,"slots":[{{"slot_id":0,"is_empty":false,"material_type":"PLA","material_color":"#ff0000"}}]}}"##
        )
        .expect("write");

        let provider = StaticStationProvider::from_file(file.path()).expect("load");
        let snapshot = provider.fetch(None).await.expect("fetch").expect("some");
        assert_eq!(snapshot.slots[0], SlotState::loaded(0, "PLA", "#ff0000"));
    }

    #[tokio::test]
    async fn replace_changes_next_fetch() {
        let provider = StaticStationProvider::new(None);
        assert!(provider.fetch(None).await.expect("fetch").is_none());

        provider
            .replace(Some(StationSnapshot::new(false, vec![])))
            .expect("replace");
        let snapshot = provider.fetch(None).await.expect("fetch").expect("some");
        assert!(!snapshot.connected);
    }
}
