//! Tool-to-slot binding workflow
//!
//! - `session`: per-job state and the select/bind/remove operations
//! - `validator`: ordered rules a binding must pass
//! - `advisory`: non-blocking color checks
//! - `gate`: completion check and binding freeze for submission
//! - `controller`: sequential core with notification and render dispatch
//! - `actor`: async driver running fetches and job starts off the actor loop

pub mod actor;
pub mod advisory;
pub mod controller;
pub mod gate;
pub mod session;
pub mod validator;
pub mod view;

pub use actor::{ActorSettings, WorkflowActor, WorkflowCommand, WorkflowEvent, WorkflowHandle};
pub use advisory::ColorAdvisory;
pub use controller::{
    ControllerSettings, Delivery, PendingFetch, PendingSubmission, SlotSelection,
    SubmissionResult, WorkflowController,
};
pub use session::{BindOutcome, Session, SessionId, UnconfirmedStart};
pub use view::{RequirementView, WorkflowView};
