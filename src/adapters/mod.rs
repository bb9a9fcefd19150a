pub mod console;
pub mod dry_run;
pub mod factory;
pub mod http;
pub mod static_station;
pub mod traits;

pub use console::{ConsoleRenderer, NullRenderer, TracingNotifier};
pub use dry_run::DryRunExecutor;
pub use factory::{build_job_executor, build_station_provider};
pub use http::{HttpJobExecutor, HttpStationProvider};
pub use static_station::StaticStationProvider;
pub use traits::{
    JobStartExecutor, JobStartRequest, JobStartResponse, NotificationSink, RenderSink, Severity,
    StationStatusProvider,
};

#[cfg(test)]
pub use traits::MockJobStartExecutor;
