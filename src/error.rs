use thiserror::Error;

/// Main error type for the binding workflow
#[derive(Error, Debug)]
pub enum SpoolmapError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Job errors
    #[error("Job is not applicable for material mapping: {0}")]
    NotApplicable(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    // Session errors
    #[error("No mapping session is open")]
    NoSession,

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Binding rejected: {0}")]
    Bind(#[from] BindError),

    // Submission errors
    #[error("Mapping incomplete: {bound} of {required} tools bound")]
    IncompleteMapping { bound: usize, required: usize },

    #[error("A job start request is already in flight")]
    SubmissionInFlight,

    #[error("Job start failed: {0}")]
    SubmissionFailure(String),

    #[error("Previous job start has no confirmed outcome ({0}); refresh the station or confirm before retrying")]
    StartUnconfirmed(String),

    // Station errors
    #[error("Station status unavailable: {0}")]
    FetchFailure(String),

    #[error("Timed out after {elapsed_ms}ms: {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    // Actor errors
    #[error("Workflow actor is no longer running")]
    ChannelClosed,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for SpoolmapError
pub type Result<T> = std::result::Result<T, SpoolmapError>;

/// Recoverable reasons a slot selection did not produce a binding.
///
/// Variants are listed in the order the validator checks them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("Select a tool before choosing a slot")]
    SelectionRequired,

    #[error("Slot {slot} is empty")]
    EmptySlot { slot: u32 },

    #[error("Tool T{tool_id} is not part of this job")]
    UnknownTool { tool_id: u32 },

    #[error("Tool T{tool_id} needs {required} but slot {slot} holds {loaded}")]
    MaterialMismatch {
        tool_id: u32,
        slot: u32,
        required: String,
        loaded: String,
    },

    #[error("Slot {slot} is already assigned to tool T{assigned_to}")]
    SlotAlreadyAssigned { slot: u32, assigned_to: u32 },
}

impl BindError {
    /// Stable machine-readable code for logs and API payloads
    pub fn code(&self) -> &'static str {
        match self {
            BindError::SelectionRequired => "selection_required",
            BindError::EmptySlot { .. } => "empty_slot",
            BindError::UnknownTool { .. } => "unknown_tool",
            BindError::MaterialMismatch { .. } => "material_mismatch",
            BindError::SlotAlreadyAssigned { .. } => "slot_already_assigned",
        }
    }
}
