pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod workflow;

pub use adapters::{
    JobStartExecutor, JobStartRequest, JobStartResponse, NotificationSink, RenderSink, Severity,
    StationStatusProvider,
};
pub use config::AppConfig;
pub use domain::{Binding, Job, SessionPhase, SlotState, StationSnapshot, ToolRequirement};
pub use error::{BindError, Result, SpoolmapError};
pub use workflow::{
    ColorAdvisory, SlotSelection, SubmissionResult, WorkflowActor, WorkflowController,
    WorkflowEvent, WorkflowHandle, WorkflowView,
};
