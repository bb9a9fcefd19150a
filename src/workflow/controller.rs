//! Sequential workflow core.
//!
//! The controller owns at most one `Session` and is the only place session
//! state changes. Every operation finishes with a single render dispatch.
//! Recoverable validation failures are reported to the notification sink and
//! returned as values; `Err` is reserved for misuse (no session, wrong phase)
//! and for jobs that cannot be mapped at all.
//!
//! Snapshot fetches and job starts are split into `begin`/`finish` halves so
//! the async work can run elsewhere (see `actor`). The `finish` halves check
//! the session id and drop results addressed to a session that no longer
//! exists. Snapshot fetches are also numbered per session, and only the most
//! recently issued one is applied.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::session::{BindOutcome, Session, SessionId};
use super::view::{self, WorkflowView};
use crate::adapters::{JobStartRequest, JobStartResponse, NotificationSink, RenderSink, Severity};
use crate::config::AppConfig;
use crate::domain::{Binding, Job, SessionPhase, SlotState, StationSnapshot};
use crate::error::{BindError, Result, SpoolmapError};

/// Snapshot fetch the caller must run and report back via `finish_fetch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFetch {
    pub session_id: SessionId,
    pub fetch_seq: u64,
    pub context_id: Option<String>,
}

/// Job start the caller must run and report back via `finish_submit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    pub session_id: SessionId,
    pub request: JobStartRequest,
}

/// Result of `select_slot`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSelection {
    Bound(BindOutcome),
    Rejected(BindError),
}

impl SlotSelection {
    pub fn is_bound(&self) -> bool {
        matches!(self, SlotSelection::Bound(_))
    }
}

/// What happened to an async result delivered to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// Addressed to a session that was closed or replaced, or superseded by a
    /// newer fetch
    Stale,
}

/// Outcome of a finished job start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    /// Job started; the session is closed
    Started,
    /// Executor refused or failed; bindings kept for a retry
    Failed(String),
    /// No answer within the deadline. The job may be running, so a retry is
    /// refused until the operator confirms or a fresh station status arrives.
    Unconfirmed(String),
    Stale,
}

#[derive(Debug, Clone, Default)]
pub struct ControllerSettings {
    pub context_id: Option<String>,
    pub use_leveling: bool,
}

impl From<&AppConfig> for ControllerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            context_id: config.station.context_id.clone(),
            use_leveling: config.workflow.use_leveling,
        }
    }
}

pub struct WorkflowController {
    session: Option<Session>,
    settings: ControllerSettings,
    notifier: Arc<dyn NotificationSink>,
    renderer: Arc<dyn RenderSink>,
}

impl WorkflowController {
    pub fn new(
        settings: ControllerSettings,
        notifier: Arc<dyn NotificationSink>,
        renderer: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            session: None,
            settings,
            notifier,
            renderer,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.session
            .as_ref()
            .map(Session::phase)
            .unwrap_or(SessionPhase::Closed)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn view(&self) -> WorkflowView {
        match &self.session {
            Some(session) => WorkflowView::of(session),
            None => WorkflowView::closed(),
        }
    }

    pub fn set_use_leveling(&mut self, use_leveling: bool) {
        self.settings.use_leveling = use_leveling;
    }

    /// Open a session for `job`, replacing any session that is not submitting.
    pub fn open(&mut self, job: Job) -> Result<PendingFetch> {
        if self.phase() == SessionPhase::Submitting {
            return Err(SpoolmapError::SubmissionInFlight);
        }

        let mut session = match Session::open(job) {
            Ok(session) => session,
            Err(e) => {
                warn!("Mapping workflow not started: {}", e);
                self.notifier.show_error(&e.to_string());
                return Err(e);
            }
        };

        if let Some(previous) = self.session.take() {
            info!(session_id = %previous.id(), "Discarding previous mapping session");
        }

        let pending = PendingFetch {
            session_id: session.id(),
            fetch_seq: session.issue_fetch(),
            context_id: self.settings.context_id.clone(),
        };
        self.session = Some(session);
        self.notifier.clear_messages();
        self.render();
        Ok(pending)
    }

    /// Request a fresh snapshot for the open session.
    pub fn refresh_snapshot(&mut self) -> Result<PendingFetch> {
        let session = self.editable_session()?;
        let pending = PendingFetch {
            session_id: session.id(),
            fetch_seq: session.issue_fetch(),
            context_id: self.settings.context_id.clone(),
        };
        debug!(
            session_id = %pending.session_id,
            fetch_seq = pending.fetch_seq,
            "Station snapshot refresh requested"
        );
        Ok(pending)
    }

    /// Apply a snapshot fetch result. `Err` and `Ok(None)` both leave the
    /// session usable with a degraded slot display.
    pub fn finish_fetch(
        &mut self,
        pending: &PendingFetch,
        outcome: Result<Option<StationSnapshot>>,
    ) -> Delivery {
        let session_id = pending.session_id;
        let Some(session) = self.session.as_mut().filter(|s| s.id() == session_id) else {
            debug!(session_id = %session_id, "Dropping snapshot for a closed session");
            return Delivery::Stale;
        };
        if !session.is_current_fetch(pending.fetch_seq) {
            debug!(
                session_id = %session_id,
                fetch_seq = pending.fetch_seq,
                "Dropping snapshot superseded by a newer fetch"
            );
            return Delivery::Stale;
        }

        let warning = match outcome {
            Ok(Some(snapshot)) => {
                let warning = (!snapshot.connected)
                    .then(|| "Feed station is disconnected".to_string());
                debug!(
                    session_id = %session_id,
                    slots = snapshot.slots.len(),
                    connected = snapshot.connected,
                    "Station snapshot received"
                );
                let clears_unconfirmed = snapshot.connected
                    && session
                        .unconfirmed_start()
                        .is_some_and(|u| pending.fetch_seq > u.fetch_seq);
                session.apply_snapshot(Ok(Some(snapshot)));
                if clears_unconfirmed && session.clear_unconfirmed_start() {
                    info!(session_id = %session_id, "Fresh station status, job start may be retried");
                }
                warning
            }
            Ok(None) => {
                session.apply_snapshot(Ok(None));
                Some("Feed station status is unknown".to_string())
            }
            Err(e) => {
                let reason = match e {
                    SpoolmapError::FetchFailure(reason) => reason,
                    other => other.to_string(),
                };
                let failure = SpoolmapError::FetchFailure(reason.clone());
                warn!(session_id = %session_id, "{}", failure);
                session.apply_snapshot(Err(reason));
                Some(failure.to_string())
            }
        };

        if session.phase() == SessionPhase::Loading {
            if let Err(e) = session.transition(SessionPhase::Ready) {
                warn!("{}", e);
            }
        }

        if let Some(text) = warning {
            self.notifier.show_warning(&text);
        }
        self.render();
        Delivery::Applied
    }

    pub fn select_tool(&mut self, tool_id: u32) -> Result<Option<u32>> {
        let selected = self.editable_session()?.select_tool(tool_id);
        debug!(tool_id, ?selected, "Tool selection changed");
        self.render();
        Ok(selected)
    }

    pub fn select_slot(&mut self, slot: &SlotState) -> Result<SlotSelection> {
        let session = self.editable_session()?;
        let session_id = session.id();

        let selection = match session.select_slot(slot) {
            Ok(outcome) => {
                info!(
                    session_id = %session_id,
                    tool_id = outcome.binding.tool_id,
                    slot = outcome.binding.slot_display_id(),
                    replaced = outcome.replaced.is_some(),
                    "Binding committed"
                );
                self.notifier.clear_messages();
                if let Some(advisory) = &outcome.advisory {
                    warn!(session_id = %session_id, "{}", advisory);
                    self.notifier.show_warning(&advisory.to_string());
                }
                SlotSelection::Bound(outcome)
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    slot = slot.display_id(),
                    code = e.code(),
                    "Binding rejected: {}",
                    e
                );
                self.notifier.show_error(&e.to_string());
                SlotSelection::Rejected(e)
            }
        };

        self.render();
        Ok(selection)
    }

    pub fn remove_mapping(&mut self, tool_id: u32) -> Result<Option<Binding>> {
        let removed = self.editable_session()?.remove_mapping(tool_id);
        if let Some(binding) = &removed {
            info!(tool_id, slot = binding.slot_display_id(), "Binding removed");
        }
        self.render();
        Ok(removed)
    }

    pub fn is_complete(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_complete)
    }

    /// Freeze the bindings and move to `Submitting`.
    pub fn begin_submit(&mut self) -> Result<PendingSubmission> {
        let session = self.session.as_mut().ok_or(SpoolmapError::NoSession)?;

        if session.phase() == SessionPhase::Submitting {
            warn!(session_id = %session.id(), "Duplicate submit ignored");
            return Err(SpoolmapError::SubmissionInFlight);
        }

        if let Some(unconfirmed) = session.unconfirmed_start() {
            let e = SpoolmapError::StartUnconfirmed(unconfirmed.reason.clone());
            warn!(session_id = %session.id(), "{}", e);
            self.notifier.show_error(&e.to_string());
            return Err(e);
        }

        if let Err(e) = session.ensure_complete() {
            warn!(session_id = %session.id(), unbound = ?session.unbound_tools(), "{}", e);
            self.notifier.show_error(&e.to_string());
            return Err(e);
        }

        session.transition(SessionPhase::Submitting)?;
        session.clear_selection();

        let request = JobStartRequest {
            job_id: session.job().job_id.clone(),
            filename: session.job().filename.clone(),
            use_leveling: self.settings.use_leveling,
            bindings: session.frozen_bindings(),
        };
        let pending = PendingSubmission {
            session_id: session.id(),
            request,
        };
        info!(
            session_id = %pending.session_id,
            bindings = pending.request.bindings.len(),
            "Submitting job start"
        );

        self.notifier.clear_messages();
        self.render();
        Ok(pending)
    }

    /// Apply the executor's answer for an earlier `begin_submit`.
    pub fn finish_submit(
        &mut self,
        session_id: SessionId,
        outcome: Result<JobStartResponse>,
    ) -> SubmissionResult {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.id() == session_id && s.phase() == SessionPhase::Submitting)
        else {
            debug!(session_id = %session_id, "Dropping job start result for an inactive submission");
            return SubmissionResult::Stale;
        };

        let failure = match outcome {
            Ok(resp) if resp.success => None,
            Ok(resp) => Some((
                resp.message
                    .unwrap_or_else(|| "executor rejected the job".to_string()),
                false,
            )),
            Err(e) => {
                let indeterminate = is_indeterminate(&e);
                Some((e.to_string(), indeterminate))
            }
        };

        match failure {
            None => {
                info!(session_id = %session_id, "Job started, closing mapping session");
                if let Err(e) = session.transition(SessionPhase::Closed) {
                    warn!("{}", e);
                }
                self.session = None;
                self.notifier.clear_messages();
                self.notifier.toast("Job started", Severity::Success);
                self.render();
                SubmissionResult::Started
            }
            Some((reason, true)) => {
                if let Err(e) = session.transition(SessionPhase::Ready) {
                    warn!("{}", e);
                }
                session.mark_start_unconfirmed(reason.clone());
                let text = format!(
                    "No answer to the job start ({}). The job may already be running; \
                     check the printer, then refresh the station or confirm before retrying.",
                    reason
                );
                warn!(session_id = %session_id, "{}", text);
                self.notifier.show_error(&text);
                self.notifier.toast(&text, Severity::Warning);
                self.render();
                SubmissionResult::Unconfirmed(reason)
            }
            Some((reason, false)) => {
                if let Err(e) = session.transition(SessionPhase::Ready) {
                    warn!("{}", e);
                }
                let failure = SpoolmapError::SubmissionFailure(reason.clone());
                warn!(session_id = %session_id, "{}", failure);
                self.notifier.show_error(&failure.to_string());
                self.notifier.toast(&failure.to_string(), Severity::Error);
                self.render();
                SubmissionResult::Failed(reason)
            }
        }
    }

    /// Operator confirmation that an unconfirmed job start did not run.
    /// Returns whether a marker was cleared.
    pub fn confirm_retry(&mut self) -> Result<bool> {
        let session = self.editable_session()?;
        let cleared = session.clear_unconfirmed_start();
        if cleared {
            info!(session_id = %session.id(), "Operator confirmed job start may be retried");
        }
        self.render();
        Ok(cleared)
    }

    /// Discard the session. Closing with no session open is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.phase() {
            SessionPhase::Closed => return Ok(()),
            SessionPhase::Submitting => return Err(SpoolmapError::SubmissionInFlight),
            SessionPhase::Loading | SessionPhase::Ready => {}
        }

        if let Some(session) = self.session.take() {
            info!(session_id = %session.id(), "Mapping session closed");
        }
        self.notifier.clear_messages();
        self.render();
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.close()
    }

    fn editable_session(&mut self) -> Result<&mut Session> {
        let session = self.session.as_mut().ok_or(SpoolmapError::NoSession)?;
        if !session.phase().accepts_edits() {
            return Err(SpoolmapError::SubmissionInFlight);
        }
        Ok(session)
    }

    fn render(&self) {
        view::dispatch(&self.view(), self.renderer.as_ref());
    }
}

/// Executor errors after which the device may or may not have started the job
fn is_indeterminate(err: &SpoolmapError) -> bool {
    match err {
        SpoolmapError::Timeout { .. } => true,
        SpoolmapError::Http(e) => e.is_timeout(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::NullRenderer;
    use crate::domain::ToolRequirement;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        errors: Mutex<Vec<String>>,
        warnings: Mutex<Vec<String>>,
    }

    impl NotificationSink for Recorder {
        fn show_error(&self, text: &str) {
            self.errors.lock().unwrap().push(text.to_string());
        }
        fn show_warning(&self, text: &str) {
            self.warnings.lock().unwrap().push(text.to_string());
        }
        fn clear_messages(&self) {}
        fn toast(&self, _text: &str, _severity: Severity) {}
    }

    fn controller() -> (WorkflowController, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let controller = WorkflowController::new(
            ControllerSettings {
                context_id: Some("printer-01".to_string()),
                use_leveling: true,
            },
            recorder.clone(),
            Arc::new(NullRenderer),
        );
        (controller, recorder)
    }

    fn job() -> Job {
        Job::new(
            "job-1",
            "bench.gcode",
            vec![ToolRequirement::new(0, "PLA", "#ff0000")],
        )
    }

    #[test]
    fn open_returns_fetch_for_new_session() {
        let (mut c, _) = controller();
        let pending = c.open(job()).expect("open");
        assert_eq!(pending.context_id.as_deref(), Some("printer-01"));
        assert_eq!(c.phase(), SessionPhase::Loading);
        assert_eq!(c.session().map(Session::id), Some(pending.session_id));
    }

    #[test]
    fn open_not_applicable_surfaces_error() {
        let (mut c, recorder) = controller();
        let err = c
            .open(Job::single_material("job-2", "plain.gcode"))
            .unwrap_err();
        assert!(matches!(err, SpoolmapError::NotApplicable(_)));
        assert_eq!(c.phase(), SessionPhase::Closed);
        assert_eq!(recorder.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn fetch_failure_moves_to_ready_with_warning() {
        let (mut c, recorder) = controller();
        let pending = c.open(job()).expect("open");
        let delivery = c.finish_fetch(
            &pending,
            Err(SpoolmapError::FetchFailure("timeout".to_string())),
        );
        assert_eq!(delivery, Delivery::Applied);
        assert_eq!(c.phase(), SessionPhase::Ready);
        assert!(c.view().degraded);
        assert_eq!(recorder.warnings.lock().unwrap().len(), 1);
    }

    #[test]
    fn stale_fetch_is_dropped_after_reopen() {
        let (mut c, _) = controller();
        let first = c.open(job()).expect("open");
        c.close().expect("close");
        let second = c.open(job()).expect("reopen");

        let snapshot = StationSnapshot::new(true, vec![SlotState::loaded(0, "PLA", "#ff0000")]);
        assert_eq!(
            c.finish_fetch(&first, Ok(Some(snapshot.clone()))),
            Delivery::Stale
        );
        assert_eq!(c.phase(), SessionPhase::Loading);
        assert!(c.view().snapshot.is_none());

        assert_eq!(
            c.finish_fetch(&second, Ok(Some(snapshot))),
            Delivery::Applied
        );
        assert_eq!(c.phase(), SessionPhase::Ready);
    }

    #[test]
    fn edits_rejected_while_submitting() {
        let (mut c, _) = controller();
        let pending = c.open(job()).expect("open");
        c.finish_fetch(&pending, Ok(None));
        c.select_tool(0).expect("select");
        assert!(c
            .select_slot(&SlotState::loaded(0, "PLA", "#ff0000"))
            .expect("select slot")
            .is_bound());

        let submission = c.begin_submit().expect("submit");
        assert!(submission.request.use_leveling);
        assert!(matches!(
            c.remove_mapping(0),
            Err(SpoolmapError::SubmissionInFlight)
        ));
        assert!(matches!(c.close(), Err(SpoolmapError::SubmissionInFlight)));
        assert!(matches!(
            c.begin_submit(),
            Err(SpoolmapError::SubmissionInFlight)
        ));
        assert_eq!(c.session().map(|s| s.bindings().len()), Some(1));
    }

    #[test]
    fn submit_while_loading_is_an_invalid_transition() {
        let (mut c, _) = controller();
        c.open(job()).expect("open");
        c.select_tool(0).expect("select");
        c.select_slot(&SlotState::loaded(0, "PLA", "#ff0000"))
            .expect("select slot");

        assert!(matches!(
            c.begin_submit(),
            Err(SpoolmapError::InvalidStateTransition { .. })
        ));
        assert_eq!(c.phase(), SessionPhase::Loading);
    }

    #[test]
    fn older_refresh_landing_late_is_dropped() {
        let (mut c, _) = controller();
        let opened = c.open(job()).expect("open");
        let older = c.refresh_snapshot().expect("refresh");
        let newer = c.refresh_snapshot().expect("refresh");
        assert!(newer.fetch_seq > older.fetch_seq);

        let fresh = StationSnapshot::new(true, vec![SlotState::loaded(0, "PLA", "#ff0000")]);
        assert_eq!(c.finish_fetch(&newer, Ok(Some(fresh))), Delivery::Applied);

        let outdated = StationSnapshot::new(false, vec![]);
        assert_eq!(
            c.finish_fetch(&older, Ok(Some(outdated.clone()))),
            Delivery::Stale
        );
        assert_eq!(c.finish_fetch(&opened, Ok(Some(outdated))), Delivery::Stale);

        let view = c.view();
        assert!(!view.degraded);
        assert_eq!(view.snapshot.map(|s| s.slots.len()), Some(1));
    }

    fn submitting_controller() -> (WorkflowController, Arc<Recorder>, PendingSubmission) {
        let (mut c, recorder) = controller();
        let pending = c.open(job()).expect("open");
        c.finish_fetch(&pending, Ok(None));
        c.select_tool(0).expect("select");
        c.select_slot(&SlotState::loaded(0, "PLA", "#ff0000"))
            .expect("select slot");
        let submission = c.begin_submit().expect("submit");
        (c, recorder, submission)
    }

    fn timed_out() -> Result<JobStartResponse> {
        Err(SpoolmapError::Timeout {
            operation: "job start".to_string(),
            elapsed_ms: 100,
        })
    }

    #[test]
    fn timed_out_start_blocks_plain_retry() {
        let (mut c, recorder, submission) = submitting_controller();

        let result = c.finish_submit(submission.session_id, timed_out());
        assert!(matches!(result, SubmissionResult::Unconfirmed(_)));
        assert_eq!(c.phase(), SessionPhase::Ready);
        assert_eq!(c.session().map(|s| s.bindings().len()), Some(1));
        assert!(matches!(
            c.begin_submit(),
            Err(SpoolmapError::StartUnconfirmed(_))
        ));
        assert_eq!(c.phase(), SessionPhase::Ready);
        assert_eq!(recorder.errors.lock().unwrap().len(), 2);

        assert!(c.confirm_retry().expect("confirm"));
        assert!(c.begin_submit().is_ok());
    }

    #[test]
    fn fresh_station_status_clears_unconfirmed_start() {
        let (mut c, _, submission) = submitting_controller();
        c.finish_submit(submission.session_id, timed_out());

        let offline = c.refresh_snapshot().expect("refresh");
        c.finish_fetch(&offline, Ok(Some(StationSnapshot::new(false, vec![]))));
        assert!(matches!(
            c.begin_submit(),
            Err(SpoolmapError::StartUnconfirmed(_))
        ));

        let online = c.refresh_snapshot().expect("refresh");
        c.finish_fetch(
            &online,
            Ok(Some(StationSnapshot::new(
                true,
                vec![SlotState::loaded(0, "PLA", "#ff0000")],
            ))),
        );
        assert!(c.session().is_some_and(|s| s.unconfirmed_start().is_none()));
        assert!(c.begin_submit().is_ok());
    }

    #[test]
    fn rejected_start_allows_immediate_retry() {
        let (mut c, _, submission) = submitting_controller();
        let result = c.finish_submit(
            submission.session_id,
            Ok(JobStartResponse::rejected("printer busy")),
        );
        assert_eq!(result, SubmissionResult::Failed("printer busy".to_string()));
        assert!(c.begin_submit().is_ok());
    }

    #[test]
    fn operations_without_session_fail() {
        let (mut c, _) = controller();
        assert!(matches!(c.select_tool(0), Err(SpoolmapError::NoSession)));
        assert!(matches!(c.begin_submit(), Err(SpoolmapError::NoSession)));
        assert!(!c.is_complete());
        assert!(c.close().is_ok());
    }
}
