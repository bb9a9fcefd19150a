use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    /// Endpoint returning the feed station snapshot (HTTP provider only)
    #[serde(default)]
    pub status_url: Option<String>,
    /// Device identifier forwarded to the status provider
    #[serde(default)]
    pub context_id: Option<String>,
    /// Upper bound on a single snapshot fetch in milliseconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
}

fn default_fetch_timeout() -> u64 {
    10_000
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            status_url: None,
            context_id: None,
            fetch_timeout_ms: default_fetch_timeout(),
        }
    }
}

impl StationConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Endpoint accepting job start requests (HTTP executor only)
    #[serde(default)]
    pub start_url: Option<String>,
    /// Upper bound on a job start request in milliseconds
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_ms: u64,
    /// Log start requests instead of sending them
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_submit_timeout() -> u64 {
    30_000
}

fn default_dry_run() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            start_url: None,
            submit_timeout_ms: default_submit_timeout(),
            dry_run: default_dry_run(),
        }
    }
}

impl ExecutorConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Bed leveling flag sent with every job start
    #[serde(default = "default_use_leveling")]
    pub use_leveling: bool,
    /// Capacity of the actor command channel
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

fn default_use_leveling() -> bool {
    true
}

fn default_command_buffer() -> usize {
    64
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            use_leveling: default_use_leveling(),
            command_buffer: default_command_buffer(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("station.fetch_timeout_ms", default_fetch_timeout() as i64)?
            .set_default("executor.submit_timeout_ms", default_submit_timeout() as i64)?
            .set_default("executor.dry_run", true)?
            .set_default("workflow.use_leveling", true)?
            .set_default("workflow.command_buffer", default_command_buffer() as i64)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SPOOLMAP_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // SPOOLMAP_STATION__STATUS_URL, SPOOLMAP_EXECUTOR__DRY_RUN, ...
            .add_source(
                Environment::with_prefix("SPOOLMAP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
