use crate::providers::SensorSource;
use crate::utils::constants::{DEFAULT_FORECAST_PERIOD, SNAPSHOTS_PER_DAY};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weather-collector")]
#[command(about = "Periodic weather observation and forecast archiver")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "TOML settings file")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Archive sensor observations from one vendor at every period boundary
    Sensors {
        #[arg(value_enum)]
        source: SensorSource,

        #[arg(long, help = "Destination, file:///path or s3://bucket/prefix/")]
        storage_uri: Option<String>,

        #[arg(long, help = "Scratch directory for in-flight downloads")]
        download_path: Option<PathBuf>,

        #[arg(long, help = "Period in seconds [default: vendor preset]")]
        frequency: Option<u64>,

        #[arg(long, help = "Seconds to wait after each boundary [default: 5]")]
        delay: Option<u64>,

        #[arg(long, help = "Stop after this many ticks")]
        max_ticks: Option<u64>,
    },

    /// Collect zipped per-sensor forecast snapshots at every period boundary
    Forecast {
        #[arg(long, help = "Where snapshot directories and archives are built")]
        download_path: Option<PathBuf>,

        #[arg(long, help = "Upload destination, file:///path or s3://bucket/prefix/")]
        storage_uri: Option<String>,

        #[arg(long, help = "Concurrent requests per snapshot [default: CPU count]")]
        parallelism: Option<usize>,

        #[arg(long, help = "Collect this many days of hourly snapshots, then stop")]
        days: Option<u64>,

        #[arg(long, default_value_t = DEFAULT_FORECAST_PERIOD, help = "Snapshot period in seconds")]
        download_period: u64,

        #[arg(long, help = "Keep local snapshot directories and archives")]
        keep_local_snapshots: bool,

        #[arg(long, help = "CSV file with id,lat,lon,country columns")]
        sensors: Option<PathBuf>,

        #[arg(long, num_args = 1.., help = "Alpha-3 country codes to include")]
        include_countries: Vec<String>,

        #[arg(long, help = "Forecast URL with {id}, {lat} and {lon} placeholders")]
        url_template: Option<String>,
    },
}

/// Snapshot count for `--days`.
pub fn snapshots_for_days(days: Option<u64>) -> Option<u64> {
    days.map(|days| days * SNAPSHOTS_PER_DAY)
}
