use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{
    DryRunExecutor, HttpJobExecutor, HttpStationProvider, JobStartExecutor, StaticStationProvider,
    StationStatusProvider,
};
use crate::config::AppConfig;
use crate::error::{Result, SpoolmapError};

/// Create the station provider from `AppConfig`.
///
/// An explicit snapshot file wins over `station.status_url`.
pub fn build_station_provider(
    app_config: &AppConfig,
    snapshot_file: Option<&Path>,
) -> Result<Arc<dyn StationStatusProvider>> {
    if let Some(path) = snapshot_file {
        return Ok(Arc::new(StaticStationProvider::from_file(path)?));
    }

    match app_config.station.status_url.as_deref() {
        Some(url) => {
            info!(url, "Using HTTP station provider");
            Ok(Arc::new(HttpStationProvider::new(
                url,
                app_config.station.fetch_timeout(),
            )?))
        }
        None => Err(SpoolmapError::FetchFailure(
            "no station snapshot file given and station.status_url is not configured".to_string(),
        )),
    }
}

/// Create the job start executor from `AppConfig`.
///
/// Dry run unless `live` is requested or the config turns dry run off.
pub fn build_job_executor(app_config: &AppConfig, live: bool) -> Result<Arc<dyn JobStartExecutor>> {
    if !live && app_config.executor.dry_run {
        return Ok(Arc::new(DryRunExecutor::new()));
    }

    let url = app_config.executor.start_url.as_deref().ok_or_else(|| {
        SpoolmapError::SubmissionFailure(
            "live start requested but executor.start_url is not configured".to_string(),
        )
    })?;
    info!(url, "Using HTTP job executor");
    Ok(Arc::new(HttpJobExecutor::new(
        url,
        app_config.executor.submit_timeout(),
    )?))
}
