use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Binding, StationSnapshot};
use crate::error::Result;
use crate::workflow::RequirementView;

/// Source of feed station snapshots.
#[async_trait]
pub trait StationStatusProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the current snapshot. `Ok(None)` means the station state is unknown.
    async fn fetch(&self, context_id: Option<&str>) -> Result<Option<StationSnapshot>>;
}

/// Payload handed to the job start executor once the mapping is complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStartRequest {
    pub job_id: String,
    pub filename: String,
    pub use_leveling: bool,
    /// Bindings ordered by tool id
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStartResponse {
    pub success: bool,
    /// Operator-facing explanation when `success` is false
    #[serde(default)]
    pub message: Option<String>,
}

impl JobStartResponse {
    pub fn started() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Starts a job with a finished set of bindings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStartExecutor: Send + Sync {
    fn is_dry_run(&self) -> bool;

    async fn start(&self, request: &JobStartRequest) -> Result<JobStartResponse>;
}

/// Toast severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operator-facing message surface. Write-only from the workflow's side.
pub trait NotificationSink: Send + Sync {
    fn show_error(&self, text: &str);

    fn show_warning(&self, text: &str);

    fn clear_messages(&self);

    fn toast(&self, text: &str, severity: Severity);
}

/// Re-render hooks invoked after every state change. Never read back.
pub trait RenderSink: Send + Sync {
    fn render_requirements(&self, requirements: &[RequirementView]);

    /// `degraded` is true when the last fetch failed or the station is offline
    fn render_slots(&self, snapshot: Option<&StationSnapshot>, degraded: bool);

    fn render_bindings(&self, bindings: &[Binding]);

    fn set_submit_enabled(&self, enabled: bool);
}
