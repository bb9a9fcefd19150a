use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

use super::traits::{JobStartExecutor, JobStartRequest, JobStartResponse};
use crate::error::Result;

/// Accepts every start request without contacting a device.
///
/// Requests are kept so callers can inspect what would have been sent.
#[derive(Default)]
pub struct DryRunExecutor {
    requests: Mutex<Vec<JobStartRequest>>,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<JobStartRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobStartExecutor for DryRunExecutor {
    fn is_dry_run(&self) -> bool {
        true
    }

    async fn start(&self, request: &JobStartRequest) -> Result<JobStartResponse> {
        info!(
            "[DRY RUN] Would start {} (job {}) with leveling={} and {} bindings",
            request.filename,
            request.job_id,
            request.use_leveling,
            request.bindings.len()
        );
        for binding in &request.bindings {
            info!(
                "[DRY RUN]   T{} -> slot {} ({})",
                binding.tool_id,
                binding.slot_display_id(),
                binding.material
            );
        }

        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        Ok(JobStartResponse::started())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_records_requests() {
        let executor = DryRunExecutor::new();
        let request = JobStartRequest {
            job_id: "j1".to_string(),
            filename: "a.gcode".to_string(),
            use_leveling: false,
            bindings: vec![],
        };

        let resp = tokio_test::block_on(executor.start(&request)).expect("start");
        assert!(resp.success);
        assert!(executor.is_dry_run());
        assert_eq!(executor.requests(), vec![request]);
    }
}
