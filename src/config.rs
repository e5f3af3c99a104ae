use crate::error::Result;
use crate::http::RetryPolicy;
use crate::utils::constants::{
    DEFAULT_DOWNLOAD_PATH, DEFAULT_RETRY_BACKOFF_SECS, DEFAULT_RETRY_COUNT, ENV_PREFIX, ENV_SEPARATOR,
};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use validator::Validate;

/// Collector settings shared by both subcommands.
///
/// Layered as defaults, then an optional TOML file, then `COLLECTOR_*`
/// environment variables (`__` separates nested keys, e.g.
/// `COLLECTOR_HTTP__TIMEOUT_SECS`). Command line flags are applied on top
/// by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    pub download_path: PathBuf,
    pub storage_uri: Option<String>,

    #[validate(nested)]
    pub http: HttpSettings,

    #[validate(nested)]
    pub forecast: ForecastSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HttpSettings {
    /// Overrides every vendor timeout when set.
    #[validate(range(min = 0.001, max = 86400.0))]
    pub timeout_secs: Option<f64>,

    #[validate(range(min = 1))]
    pub retry_attempts: u32,

    pub retry_backoff_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ForecastSettings {
    pub sensors: Option<PathBuf>,
    pub include_countries: Vec<String>,
    /// Per-sensor URL with `{id}`, `{lat}` and `{lon}` placeholders.
    pub url_template: Option<String>,
    #[validate(range(min = 1))]
    pub parallelism: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from(DEFAULT_DOWNLOAD_PATH),
            storage_uri: None,
            http: HttpSettings::default(),
            forecast: ForecastSettings::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            retry_attempts: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_RETRY_BACKOFF_SECS,
        }
    }
}

impl HttpSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            backoff: Duration::from_secs(self.retry_backoff_secs),
        }
    }
}

impl Settings {
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("forecast.include_countries"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }
}

/// Positive timeout in seconds from `var`, if set and parseable.
pub fn timeout_from_env(var: &str) -> Option<f64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<f64>() {
        Ok(secs) if secs > 0.0 && secs.is_finite() => Some(secs),
        _ => {
            warn!(%var, value = %raw, "Ignoring invalid timeout override");
            None
        }
    }
}

/// Positive batch size from `var`, if set and parseable.
pub fn batch_size_from_env(var: &str) -> Option<usize> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => Some(size),
        _ => {
            warn!(%var, value = %raw, "Ignoring invalid batch size override");
            None
        }
    }
}
