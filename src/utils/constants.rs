/// HTTP defaults
pub const DEFAULT_RETRY_COUNT: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 1;
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Scheduling defaults
pub const DEFAULT_SENSOR_FREQUENCY: u64 = 600;
pub const DEFAULT_SENSOR_DELAY: u64 = 5;
pub const METAR_FREQUENCY: u64 = 120;
pub const NDBC_FREQUENCY: u64 = 86_400;
pub const NDBC_DELAY: u64 = 43_200;
pub const DEFAULT_FORECAST_PERIOD: u64 = 3600;
pub const SNAPSHOTS_PER_DAY: u64 = 24;

/// Fan-out defaults
pub const DEFAULT_STATION_CHUNK_SIZE: usize = 100;
pub const DEFAULT_WINDOW_HOURS: i64 = 3;
pub const DEFAULT_NDBC_BATCH_SIZE: usize = 40;

/// Artifact extensions
pub const EXT_ZIP: &str = "zip";
pub const EXT_XML: &str = "xml";
pub const EXT_JSON: &str = "json";

/// Storage URI schemes
pub const SCHEME_FILE: &str = "file://";
pub const SCHEME_S3: &str = "s3://";

/// Local paths
pub const DEFAULT_DOWNLOAD_PATH: &str = "/data";

/// Environment
pub const ENV_PREFIX: &str = "COLLECTOR";
pub const ENV_SEPARATOR: &str = "__";

/// Minute-precision UTC format used in API time windows
pub const WINDOW_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";
