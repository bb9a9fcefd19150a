use serde::Serialize;

use super::session::{Session, SessionId};
use crate::adapters::RenderSink;
use crate::domain::{Binding, SessionPhase, StationSnapshot, ToolRequirement};

/// One row of the requirements list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementView {
    pub requirement: ToolRequirement,
    /// Display id of the slot bound to this tool
    pub bound_slot: Option<u32>,
    pub selected: bool,
}

/// Immutable picture of the workflow handed to the render sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowView {
    pub session_id: Option<SessionId>,
    pub phase: SessionPhase,
    pub job_id: Option<String>,
    pub requirements: Vec<RequirementView>,
    pub snapshot: Option<StationSnapshot>,
    pub degraded: bool,
    pub selected_tool: Option<u32>,
    pub bindings: Vec<Binding>,
    pub complete: bool,
    /// A previous job start got no answer and must be confirmed first
    pub start_unconfirmed: bool,
    pub submit_enabled: bool,
}

impl WorkflowView {
    pub fn closed() -> Self {
        Self {
            session_id: None,
            phase: SessionPhase::Closed,
            job_id: None,
            requirements: Vec::new(),
            snapshot: None,
            degraded: false,
            selected_tool: None,
            bindings: Vec::new(),
            complete: false,
            start_unconfirmed: false,
            submit_enabled: false,
        }
    }

    pub fn of(session: &Session) -> Self {
        let requirements = session
            .job()
            .requirements()
            .iter()
            .map(|req| RequirementView {
                requirement: req.clone(),
                bound_slot: session.binding(req.tool_id).map(|b| b.slot_display_id()),
                selected: session.selected_tool() == Some(req.tool_id),
            })
            .collect();

        let complete = session.is_complete();
        let start_unconfirmed = session.unconfirmed_start().is_some();
        Self {
            session_id: Some(session.id()),
            phase: session.phase(),
            job_id: Some(session.job().job_id.clone()),
            requirements,
            snapshot: session.snapshot().cloned(),
            degraded: session.is_degraded(),
            selected_tool: session.selected_tool(),
            bindings: session.frozen_bindings(),
            complete,
            start_unconfirmed,
            submit_enabled: complete
                && !start_unconfirmed
                && session.phase() == SessionPhase::Ready,
        }
    }
}

/// Push a view to every render hook.
pub fn dispatch(view: &WorkflowView, sink: &dyn RenderSink) {
    sink.render_requirements(&view.requirements);
    sink.render_slots(view.snapshot.as_ref(), view.degraded);
    sink.render_bindings(&view.bindings);
    sink.set_submit_enabled(view.submit_enabled);
}
