use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use super::advisory::{self, ColorAdvisory};
use super::{gate, validator};
use crate::domain::{Binding, Job, SessionPhase, SlotState, StationSnapshot};
use crate::error::{BindError, Result, SpoolmapError};

/// Identity of one open/close cycle. Async results carry it so that a result
/// issued for an earlier session can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A binding that was just committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    pub binding: Binding,
    /// Previous binding for the same tool, if the upsert overwrote one
    pub replaced: Option<Binding>,
    pub advisory: Option<ColorAdvisory>,
}

/// A job start that ended without a definite answer from the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconfirmedStart {
    pub reason: String,
    /// Latest fetch issued when the start was left unconfirmed
    pub fetch_seq: u64,
}

/// Transient provisioning state for one job
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    job: Job,
    phase: SessionPhase,
    snapshot: Option<StationSnapshot>,
    fetch_error: Option<String>,
    selected_tool: Option<u32>,
    bindings: BTreeMap<u32, Binding>,
    fetch_seq: u64,
    unconfirmed_start: Option<UnconfirmedStart>,
}

impl Session {
    /// Start a session for a job. The session begins in `Loading`.
    pub fn open(job: Job) -> Result<Self> {
        job.ensure_mappable()?;

        let session = Self {
            id: SessionId::new(),
            job,
            phase: SessionPhase::Loading,
            snapshot: None,
            fetch_error: None,
            selected_tool: None,
            bindings: BTreeMap::new(),
            fetch_seq: 0,
            unconfirmed_start: None,
        };
        info!(
            session_id = %session.id,
            job_id = %session.job.job_id,
            tools = session.job.tool_count(),
            "Mapping session opened"
        );
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn snapshot(&self) -> Option<&StationSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn fetch_error(&self) -> Option<&str> {
        self.fetch_error.as_deref()
    }

    pub fn selected_tool(&self) -> Option<u32> {
        self.selected_tool
    }

    pub fn bindings(&self) -> &BTreeMap<u32, Binding> {
        &self.bindings
    }

    pub fn binding(&self, tool_id: u32) -> Option<&Binding> {
        self.bindings.get(&tool_id)
    }

    /// Slot display must fall back to a disconnected state
    pub fn is_degraded(&self) -> bool {
        if self.phase == SessionPhase::Loading && self.snapshot.is_none() {
            return false;
        }
        match &self.snapshot {
            Some(snapshot) => !snapshot.connected,
            None => true,
        }
    }

    pub fn transition(&mut self, to: SessionPhase) -> Result<()> {
        if !self.phase.can_transition_to(to) {
            return Err(SpoolmapError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        if self.phase != to {
            debug!(session_id = %self.id, from = %self.phase, to = %to, "Session phase change");
        }
        self.phase = to;
        Ok(())
    }

    /// Number a new snapshot fetch. Only the most recently issued one is applied.
    pub fn issue_fetch(&mut self) -> u64 {
        self.fetch_seq += 1;
        self.fetch_seq
    }

    pub fn is_current_fetch(&self, fetch_seq: u64) -> bool {
        fetch_seq == self.fetch_seq
    }

    pub fn unconfirmed_start(&self) -> Option<&UnconfirmedStart> {
        self.unconfirmed_start.as_ref()
    }

    /// Record that the executor may have started the job without saying so.
    pub fn mark_start_unconfirmed(&mut self, reason: impl Into<String>) {
        self.unconfirmed_start = Some(UnconfirmedStart {
            reason: reason.into(),
            fetch_seq: self.fetch_seq,
        });
    }

    /// Clear the unconfirmed marker. Returns whether one was set.
    pub fn clear_unconfirmed_start(&mut self) -> bool {
        self.unconfirmed_start.take().is_some()
    }

    /// Store a fetch result. A failed or empty fetch clears the snapshot.
    pub fn apply_snapshot(
        &mut self,
        outcome: std::result::Result<Option<StationSnapshot>, String>,
    ) {
        match outcome {
            Ok(snapshot) => {
                self.fetch_error = None;
                self.snapshot = snapshot;
            }
            Err(reason) => {
                self.fetch_error = Some(reason);
                self.snapshot = None;
            }
        }
    }

    /// Toggle selection: choosing the selected tool again clears it.
    pub fn select_tool(&mut self, tool_id: u32) -> Option<u32> {
        self.selected_tool = if self.selected_tool == Some(tool_id) {
            None
        } else {
            Some(tool_id)
        };
        self.selected_tool
    }

    pub fn clear_selection(&mut self) {
        self.selected_tool = None;
    }

    /// Bind the selected tool to `slot`.
    ///
    /// On success the binding is upserted and the selection cleared. On
    /// failure neither the bindings nor the selection change.
    pub fn select_slot(&mut self, slot: &SlotState) -> std::result::Result<BindOutcome, BindError> {
        let requirement =
            validator::validate_binding(&self.job, self.selected_tool, slot, &self.bindings)?;

        let binding = Binding::capture(requirement, slot);
        let advisory = advisory::check_color(&binding);

        let replaced = self.bindings.insert(binding.tool_id, binding.clone());
        self.selected_tool = None;
        Ok(BindOutcome {
            binding,
            replaced,
            advisory,
        })
    }

    pub fn remove_mapping(&mut self, tool_id: u32) -> Option<Binding> {
        self.bindings.remove(&tool_id)
    }

    pub fn is_complete(&self) -> bool {
        gate::is_complete(&self.job, &self.bindings)
    }

    pub fn unbound_tools(&self) -> Vec<u32> {
        gate::unbound_tools(&self.job, &self.bindings)
    }

    pub fn ensure_complete(&self) -> Result<()> {
        gate::ensure_complete(&self.job, &self.bindings)
    }

    pub fn frozen_bindings(&self) -> Vec<Binding> {
        gate::freeze(&self.bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ToolRequirement;

    fn session() -> Session {
        Session::open(Job::new(
            "job-1",
            "bench.gcode",
            vec![
                ToolRequirement::new(0, "PLA", "#ff0000"),
                ToolRequirement::new(1, "PETG", "#00ff00"),
            ],
        ))
        .expect("job is mappable")
    }

    #[test]
    fn select_tool_toggles() {
        let mut s = session();
        assert_eq!(s.select_tool(0), Some(0));
        assert_eq!(s.select_tool(1), Some(1));
        assert_eq!(s.select_tool(1), None);
        assert_eq!(s.selected_tool(), None);
    }

    #[test]
    fn highest_slot_id_binds_without_overflow() {
        let mut s = session();
        s.select_tool(0);
        let outcome = s
            .select_slot(&SlotState::loaded(u32::MAX, "PLA", "#00ff00"))
            .expect("bind");
        assert_eq!(outcome.binding.slot_display_id(), u32::MAX);
        assert_eq!(outcome.advisory.map(|a| a.slot), Some(u32::MAX));
        assert_eq!(s.bindings().len(), 1);
    }

    #[test]
    fn select_tool_accepts_unknown_ids() {
        let mut s = session();
        assert_eq!(s.select_tool(42), Some(42));
    }

    #[test]
    fn failed_bind_keeps_selection_and_bindings() {
        let mut s = session();
        s.select_tool(0);
        let err = s.select_slot(&SlotState::empty(0)).unwrap_err();
        assert_eq!(err, BindError::EmptySlot { slot: 1 });
        assert_eq!(s.selected_tool(), Some(0));
        assert!(s.bindings().is_empty());
    }

    #[test]
    fn rebinding_tool_moves_it_and_frees_old_slot() {
        let mut s = session();
        s.select_tool(0);
        s.select_slot(&SlotState::loaded(0, "PLA", "#ff0000"))
            .expect("first bind");

        s.select_tool(0);
        let outcome = s
            .select_slot(&SlotState::loaded(2, "PLA", "#ff0000"))
            .expect("rebind");
        assert_eq!(outcome.replaced.map(|b| b.slot_id), Some(0));
        assert_eq!(s.bindings().len(), 1);
        assert_eq!(s.binding(0).map(|b| b.slot_display_id()), Some(3));

        // The original slot is free for another PLA tool now.
        assert!(validator::validate_slot_free(
            s.bindings(),
            1,
            &SlotState::loaded(0, "PLA", "#ff0000")
        )
        .is_ok());
    }

    #[test]
    fn remove_mapping_leaves_selection_alone() {
        let mut s = session();
        s.select_tool(0);
        s.select_slot(&SlotState::loaded(0, "PLA", "#ff0000"))
            .expect("bind");
        s.select_tool(1);

        assert!(s.remove_mapping(0).is_some());
        assert!(s.remove_mapping(0).is_none());
        assert_eq!(s.selected_tool(), Some(1));
    }

    #[test]
    fn failed_fetch_degrades_display() {
        let mut s = session();
        assert!(!s.is_degraded());
        s.apply_snapshot(Err("connection refused".to_string()));
        s.transition(SessionPhase::Ready).expect("loading -> ready");
        assert!(s.is_degraded());
        assert_eq!(s.fetch_error(), Some("connection refused"));
    }

    #[test]
    fn only_latest_fetch_is_current() {
        let mut s = session();
        let first = s.issue_fetch();
        let second = s.issue_fetch();
        assert!(second > first);
        assert!(s.is_current_fetch(second));
        assert!(!s.is_current_fetch(first));
    }

    #[test]
    fn unconfirmed_start_remembers_fetch_at_mark_time() {
        let mut s = session();
        s.issue_fetch();
        s.mark_start_unconfirmed("timed out");
        assert_eq!(
            s.unconfirmed_start(),
            Some(&UnconfirmedStart {
                reason: "timed out".to_string(),
                fetch_seq: 1,
            })
        );
        assert!(s.clear_unconfirmed_start());
        assert!(!s.clear_unconfirmed_start());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut s = session();
        assert!(matches!(
            s.transition(SessionPhase::Submitting),
            Err(SpoolmapError::InvalidStateTransition { .. })
        ));
        assert_eq!(s.phase(), SessionPhase::Loading);
    }
}
