use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_METRICS_CRON: &str = "0 12 * * *";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 60 * 60;
pub const DEFAULT_PIPELINE_BATCH_SIZE: usize = 500;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Top-level config (whitebox.toml + WHITEBOX_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhiteboxConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pipelines: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Cron schedules for the built-in pipelines and engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Crontab for the metrics pipeline. Also settable via the bare
    /// `METRICS_CRON` env var.
    #[serde(default = "default_metrics_cron")]
    pub metrics_cron: String,
    /// Crontab for the alerts pipeline. Falls back to `metrics_cron`.
    #[serde(default)]
    pub alerts_cron: Option<String>,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Upper bound on a single task run; a run past this is treated as failed.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

impl SchedulerConfig {
    pub fn alerts_cron(&self) -> &str {
        self.alerts_cron.as_deref().unwrap_or(&self.metrics_cron)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            metrics_cron: default_metrics_cron(),
            alerts_cron: None,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rows fetched per page while a pipeline walks a model's inferences.
    #[serde(default = "default_pipeline_batch_size")]
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_PIPELINE_BATCH_SIZE,
        }
    }
}

fn default_metrics_cron() -> String {
    DEFAULT_METRICS_CRON.to_string()
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}
fn default_pipeline_batch_size() -> usize {
    DEFAULT_PIPELINE_BATCH_SIZE
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.whitebox/whitebox.db", home)
}

impl WhiteboxConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Precedence, lowest first:
    ///   1. the TOML file (explicit path, else ~/.whitebox/whitebox.toml)
    ///   2. `WHITEBOX_<SECTION>__<KEY>` env vars
    ///   3. bare `METRICS_CRON`
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: WhiteboxConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WHITEBOX_").split("__"))
            .merge(
                Env::raw()
                    .only(&["METRICS_CRON"])
                    .map(|_| "scheduler.metrics_cron".into()),
            )
            .extract()
            .map_err(|e| crate::error::WhiteboxError::Config(e.to_string()))?;

        tracing::debug!(path = %path, "configuration loaded");
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.whitebox/whitebox.toml", home)
}
