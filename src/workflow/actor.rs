//! Single-actor driver for the workflow controller.
//!
//! All commands are applied one at a time on the actor task. Snapshot fetches
//! and job starts run in spawned tasks under a deadline and come back as
//! internal events on the same loop, so the actor never blocks on them.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::controller::{
    Delivery, PendingFetch, PendingSubmission, SlotSelection, SubmissionResult,
    WorkflowController,
};
use super::session::SessionId;
use super::view::WorkflowView;
use crate::adapters::{JobStartExecutor, JobStartResponse, StationStatusProvider};
use crate::config::AppConfig;
use crate::domain::{Binding, Job, SessionPhase, SlotState, StationSnapshot};
use crate::error::{Result, SpoolmapError};

/// Commands accepted by the workflow actor
#[derive(Debug)]
pub enum WorkflowCommand {
    Open {
        job: Job,
        reply: oneshot::Sender<Result<SessionId>>,
    },
    SelectTool {
        tool_id: u32,
        reply: oneshot::Sender<Result<Option<u32>>>,
    },
    SelectSlot {
        slot: SlotState,
        reply: oneshot::Sender<Result<SlotSelection>>,
    },
    RemoveMapping {
        tool_id: u32,
        reply: oneshot::Sender<Result<Option<Binding>>>,
    },
    RefreshSnapshot {
        reply: oneshot::Sender<Result<()>>,
    },
    /// Answered once the executor has responded
    Submit {
        reply: oneshot::Sender<Result<SubmissionResult>>,
    },
    /// Operator says an unconfirmed job start did not run
    ConfirmRetry {
        reply: oneshot::Sender<Result<bool>>,
    },
    Close {
        reply: oneshot::Sender<Result<()>>,
    },
    View {
        reply: oneshot::Sender<WorkflowView>,
    },
}

/// Events broadcast to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    SnapshotApplied {
        session_id: SessionId,
        degraded: bool,
    },
    BindingCommitted {
        session_id: SessionId,
        tool_id: u32,
        slot: u32,
    },
    SubmissionSucceeded {
        session_id: SessionId,
    },
    SubmissionFailed {
        session_id: SessionId,
        reason: String,
    },
    SubmissionUnconfirmed {
        session_id: SessionId,
        reason: String,
    },
}

/// Results of async work, fed back into the actor loop
enum Completion {
    Fetch {
        pending: PendingFetch,
        outcome: Result<Option<StationSnapshot>>,
    },
    Submit {
        session_id: SessionId,
        outcome: Result<JobStartResponse>,
    },
}

#[derive(Debug, Clone)]
pub struct ActorSettings {
    pub fetch_timeout: Duration,
    pub submit_timeout: Duration,
    pub command_buffer: usize,
}

impl Default for ActorSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(30),
            command_buffer: 64,
        }
    }
}

impl From<&AppConfig> for ActorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            fetch_timeout: config.station.fetch_timeout(),
            submit_timeout: config.executor.submit_timeout(),
            command_buffer: config.workflow.command_buffer.max(1),
        }
    }
}

pub struct WorkflowActor {
    controller: WorkflowController,
    provider: Arc<dyn StationStatusProvider>,
    executor: Arc<dyn JobStartExecutor>,
    settings: ActorSettings,
    commands: mpsc::Receiver<WorkflowCommand>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    events: broadcast::Sender<WorkflowEvent>,
    submit_reply: Option<oneshot::Sender<Result<SubmissionResult>>>,
}

impl WorkflowActor {
    pub fn new(
        controller: WorkflowController,
        provider: Arc<dyn StationStatusProvider>,
        executor: Arc<dyn JobStartExecutor>,
        settings: ActorSettings,
    ) -> (Self, WorkflowHandle) {
        let (command_tx, commands) = mpsc::channel(settings.command_buffer);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);

        let handle = WorkflowHandle {
            commands: command_tx,
            events: events.clone(),
        };
        let actor = Self {
            controller,
            provider,
            executor,
            settings,
            commands,
            completion_tx,
            completion_rx,
            events,
            submit_reply: None,
        };
        (actor, handle)
    }

    /// Build the actor and run it on the current tokio runtime.
    pub fn spawn(
        controller: WorkflowController,
        provider: Arc<dyn StationStatusProvider>,
        executor: Arc<dyn JobStartExecutor>,
        settings: ActorSettings,
    ) -> WorkflowHandle {
        let (actor, handle) = Self::new(controller, provider, executor, settings);
        tokio::spawn(actor.run());
        handle
    }

    /// Process commands until every handle is dropped.
    pub async fn run(mut self) {
        info!(provider = self.provider.name(), "Workflow actor started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(done) = self.completion_rx.recv() => self.handle_completion(done),
            }
        }

        info!("Workflow actor stopped");
    }

    fn handle_command(&mut self, cmd: WorkflowCommand) {
        let before = self.controller.phase();

        match cmd {
            WorkflowCommand::Open { job, reply } => {
                let result = self.controller.open(job).map(|pending| {
                    let session_id = pending.session_id;
                    self.spawn_fetch(pending);
                    session_id
                });
                let _ = reply.send(result);
            }
            WorkflowCommand::SelectTool { tool_id, reply } => {
                let _ = reply.send(self.controller.select_tool(tool_id));
            }
            WorkflowCommand::SelectSlot { slot, reply } => {
                let result = self.controller.select_slot(&slot);
                if let Ok(SlotSelection::Bound(outcome)) = &result {
                    if let Some(session_id) = self.controller.session().map(|s| s.id()) {
                        self.publish(WorkflowEvent::BindingCommitted {
                            session_id,
                            tool_id: outcome.binding.tool_id,
                            slot: outcome.binding.slot_display_id(),
                        });
                    }
                }
                let _ = reply.send(result);
            }
            WorkflowCommand::RemoveMapping { tool_id, reply } => {
                let _ = reply.send(self.controller.remove_mapping(tool_id));
            }
            WorkflowCommand::RefreshSnapshot { reply } => {
                let result = self
                    .controller
                    .refresh_snapshot()
                    .map(|pending| self.spawn_fetch(pending));
                let _ = reply.send(result);
            }
            WorkflowCommand::Submit { reply } => match self.controller.begin_submit() {
                Ok(pending) => {
                    self.submit_reply = Some(reply);
                    self.spawn_submit(pending);
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            WorkflowCommand::ConfirmRetry { reply } => {
                let _ = reply.send(self.controller.confirm_retry());
            }
            WorkflowCommand::Close { reply } => {
                let _ = reply.send(self.controller.close());
            }
            WorkflowCommand::View { reply } => {
                let _ = reply.send(self.controller.view());
            }
        }

        self.publish_phase_change(before);
    }

    fn handle_completion(&mut self, done: Completion) {
        let before = self.controller.phase();

        match done {
            Completion::Fetch { pending, outcome } => {
                if self.controller.finish_fetch(&pending, outcome) == Delivery::Applied {
                    let degraded = self.controller.view().degraded;
                    self.publish(WorkflowEvent::SnapshotApplied {
                        session_id: pending.session_id,
                        degraded,
                    });
                }
            }
            Completion::Submit {
                session_id,
                outcome,
            } => {
                let result = self.controller.finish_submit(session_id, outcome);
                match &result {
                    SubmissionResult::Started => {
                        self.publish(WorkflowEvent::SubmissionSucceeded { session_id })
                    }
                    SubmissionResult::Failed(reason) => {
                        self.publish(WorkflowEvent::SubmissionFailed {
                            session_id,
                            reason: reason.clone(),
                        })
                    }
                    SubmissionResult::Unconfirmed(reason) => {
                        self.publish(WorkflowEvent::SubmissionUnconfirmed {
                            session_id,
                            reason: reason.clone(),
                        })
                    }
                    SubmissionResult::Stale => {}
                }
                if result != SubmissionResult::Stale {
                    if let Some(reply) = self.submit_reply.take() {
                        let _ = reply.send(Ok(result));
                    }
                }
            }
        }

        self.publish_phase_change(before);
    }

    fn spawn_fetch(&self, pending: PendingFetch) {
        let provider = self.provider.clone();
        let tx = self.completion_tx.clone();
        let deadline = self.settings.fetch_timeout;

        tokio::spawn(async move {
            debug!(
                session_id = %pending.session_id,
                fetch_seq = pending.fetch_seq,
                "Fetching station snapshot"
            );
            let outcome =
                match tokio::time::timeout(deadline, provider.fetch(pending.context_id.as_deref()))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SpoolmapError::Timeout {
                        operation: "station snapshot fetch".to_string(),
                        elapsed_ms: deadline.as_millis() as u64,
                    }),
                };
            let _ = tx.send(Completion::Fetch { pending, outcome });
        });
    }

    fn spawn_submit(&self, pending: PendingSubmission) {
        let executor = self.executor.clone();
        let tx = self.completion_tx.clone();
        let deadline = self.settings.submit_timeout;

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(deadline, executor.start(&pending.request)).await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(session_id = %pending.session_id, "Job start timed out");
                    Err(SpoolmapError::Timeout {
                        operation: "job start".to_string(),
                        elapsed_ms: deadline.as_millis() as u64,
                    })
                }
            };
            let _ = tx.send(Completion::Submit {
                session_id: pending.session_id,
                outcome,
            });
        });
    }

    fn publish_phase_change(&self, before: SessionPhase) {
        let after = self.controller.phase();
        if before != after {
            self.publish(WorkflowEvent::PhaseChanged {
                from: before,
                to: after,
            });
        }
    }

    fn publish(&self, event: WorkflowEvent) {
        let _ = self.events.send(event);
    }
}

/// Cloneable client for a running `WorkflowActor`
#[derive(Clone)]
pub struct WorkflowHandle {
    commands: mpsc::Sender<WorkflowCommand>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Open a session. Returns once the session exists; the snapshot arrives
    /// later as `WorkflowEvent::SnapshotApplied`.
    pub async fn open(&self, job: Job) -> Result<SessionId> {
        self.request(|reply| WorkflowCommand::Open { job, reply })
            .await?
    }

    pub async fn select_tool(&self, tool_id: u32) -> Result<Option<u32>> {
        self.request(|reply| WorkflowCommand::SelectTool { tool_id, reply })
            .await?
    }

    pub async fn select_slot(&self, slot: SlotState) -> Result<SlotSelection> {
        self.request(|reply| WorkflowCommand::SelectSlot { slot, reply })
            .await?
    }

    pub async fn remove_mapping(&self, tool_id: u32) -> Result<Option<Binding>> {
        self.request(|reply| WorkflowCommand::RemoveMapping { tool_id, reply })
            .await?
    }

    pub async fn refresh_snapshot(&self) -> Result<()> {
        self.request(|reply| WorkflowCommand::RefreshSnapshot { reply })
            .await?
    }

    /// Submit the mapping and wait for the executor's answer.
    pub async fn submit(&self) -> Result<SubmissionResult> {
        self.request(|reply| WorkflowCommand::Submit { reply })
            .await?
    }

    /// Allow a retry after a job start that got no answer. Returns whether
    /// there was anything to confirm.
    pub async fn confirm_retry(&self) -> Result<bool> {
        self.request(|reply| WorkflowCommand::ConfirmRetry { reply })
            .await?
    }

    pub async fn close(&self) -> Result<()> {
        self.request(|reply| WorkflowCommand::Close { reply })
            .await?
    }

    pub async fn view(&self) -> Result<WorkflowView> {
        self.request(|reply| WorkflowCommand::View { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> WorkflowCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SpoolmapError::ChannelClosed)?;
        rx.await.map_err(|_| SpoolmapError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockJobStartExecutor, NullRenderer, StaticStationProvider, TracingNotifier};
    use crate::domain::ToolRequirement;
    use crate::workflow::ControllerSettings;

    fn job() -> Job {
        Job::new(
            "job-1",
            "bench.gcode",
            vec![ToolRequirement::new(0, "PLA", "#ff0000")],
        )
    }

    fn station() -> StationSnapshot {
        StationSnapshot::new(true, vec![SlotState::loaded(0, "PLA", "#ff0000")])
    }

    fn spawn_with(executor: MockJobStartExecutor) -> WorkflowHandle {
        let controller = WorkflowController::new(
            ControllerSettings {
                context_id: None,
                use_leveling: false,
            },
            Arc::new(TracingNotifier),
            Arc::new(NullRenderer),
        );
        WorkflowActor::spawn(
            controller,
            Arc::new(StaticStationProvider::new(Some(station()))),
            Arc::new(executor),
            ActorSettings::default(),
        )
    }

    async fn wait_for_snapshot(
        events: &mut broadcast::Receiver<WorkflowEvent>,
        session_id: SessionId,
    ) {
        loop {
            match events.recv().await {
                Ok(WorkflowEvent::SnapshotApplied { session_id: id, .. }) if id == session_id => {
                    return
                }
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    }

    async fn bind_all(handle: &WorkflowHandle) {
        let mut events = handle.subscribe();
        let session_id = handle.open(job()).await.expect("open");
        wait_for_snapshot(&mut events, session_id).await;
        handle.select_tool(0).await.expect("select tool");
        let selection = handle
            .select_slot(SlotState::loaded(0, "PLA", "#ff0000"))
            .await
            .expect("select slot");
        assert!(selection.is_bound());
    }

    #[tokio::test]
    async fn failed_start_keeps_bindings_for_retry() {
        let mut executor = MockJobStartExecutor::new();
        let mut calls = 0;
        executor
            .expect_start()
            .times(2)
            .returning(move |request| {
                calls += 1;
                assert!(!request.use_leveling);
                if calls == 1 {
                    Ok(JobStartResponse::rejected("printer busy"))
                } else {
                    Ok(JobStartResponse::started())
                }
            });

        let handle = spawn_with(executor);
        bind_all(&handle).await;

        let first = handle.submit().await.expect("submit");
        assert_eq!(first, SubmissionResult::Failed("printer busy".to_string()));
        let view = handle.view().await.expect("view");
        assert_eq!(view.phase, SessionPhase::Ready);
        assert_eq!(view.bindings.len(), 1);

        let second = handle.submit().await.expect("retry");
        assert_eq!(second, SubmissionResult::Started);
        assert_eq!(
            handle.view().await.expect("view").phase,
            SessionPhase::Closed
        );
    }

    #[tokio::test]
    async fn incomplete_mapping_never_reaches_executor() {
        let mut executor = MockJobStartExecutor::new();
        executor.expect_start().times(0);

        let handle = spawn_with(executor);
        let mut events = handle.subscribe();
        let session_id = handle.open(job()).await.expect("open");
        wait_for_snapshot(&mut events, session_id).await;

        assert!(matches!(
            handle.submit().await,
            Err(SpoolmapError::IncompleteMapping {
                bound: 0,
                required: 1
            })
        ));
    }

    #[tokio::test]
    async fn handle_fails_once_actor_is_gone() {
        let (actor, handle) = WorkflowActor::new(
            WorkflowController::new(
                ControllerSettings::default(),
                Arc::new(TracingNotifier),
                Arc::new(NullRenderer),
            ),
            Arc::new(StaticStationProvider::new(None)),
            Arc::new(MockJobStartExecutor::new()),
            ActorSettings::default(),
        );
        drop(actor);
        assert!(matches!(
            handle.view().await,
            Err(SpoolmapError::ChannelClosed)
        ));
    }
}
