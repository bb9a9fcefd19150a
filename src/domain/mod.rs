pub mod binding;
pub mod job;
pub mod state;
pub mod station;

pub use binding::*;
pub use job::*;
pub use state::*;
pub use station::*;
