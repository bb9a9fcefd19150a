//! HTTP adapters for the station status endpoint and the job start endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{JobStartExecutor, JobStartRequest, JobStartResponse, StationStatusProvider};
use crate::domain::StationSnapshot;
use crate::error::{Result, SpoolmapError};

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent("spoolmap/0.1")
        .timeout(timeout)
        .build()
        .map_err(|e| SpoolmapError::Other(anyhow::anyhow!("failed to build HTTP client: {}", e)))
}

/// Fetches snapshots with `GET <status_url>?context_id=...`
pub struct HttpStationProvider {
    http: Client,
    status_url: String,
}

impl HttpStationProvider {
    pub fn new(status_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            status_url: status_url.into(),
        })
    }
}

#[async_trait]
impl StationStatusProvider for HttpStationProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, context_id: Option<&str>) -> Result<Option<StationSnapshot>> {
        let mut req = self.http.get(&self.status_url);
        if let Some(id) = context_id {
            req = req.query(&[("context_id", id)]);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if matches!(status, StatusCode::NOT_FOUND | StatusCode::NO_CONTENT) {
            debug!(%status, "Station reported no status");
            return Ok(None);
        }

        let text = resp.text().await?;
        if !status.is_success() {
            return Err(SpoolmapError::FetchFailure(format!(
                "GET {} failed: status={} body={}",
                self.status_url, status, text
            )));
        }

        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(trimmed)?))
    }
}

/// Starts jobs with `POST <start_url>` carrying a `JobStartRequest`
pub struct HttpJobExecutor {
    http: Client,
    start_url: String,
}

impl HttpJobExecutor {
    pub fn new(start_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(timeout)?,
            start_url: start_url.into(),
        })
    }
}

#[async_trait]
impl JobStartExecutor for HttpJobExecutor {
    fn is_dry_run(&self) -> bool {
        false
    }

    async fn start(&self, request: &JobStartRequest) -> Result<JobStartResponse> {
        let resp = self.http.post(&self.start_url).json(request).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        // Executors report refusals in the body; fall back to the status line.
        match serde_json::from_str::<JobStartResponse>(&text) {
            Ok(parsed) if status.is_success() || !parsed.success => Ok(parsed),
            _ if status.is_success() => Ok(JobStartResponse::started()),
            _ => {
                warn!(%status, "Job start endpoint returned an error");
                Ok(JobStartResponse::rejected(format!(
                    "executor returned {}: {}",
                    status,
                    text.trim()
                )))
            }
        }
    }
}
