//! Vendor presets for the sensor collectors.

use crate::archive::ArtifactKind;
use crate::config::{batch_size_from_env, timeout_from_env};
use crate::error::Result;
use crate::http::{HrefLister, HttpClient, HttpGet, RetryPolicy, StacAssetLister};
use crate::providers::{
    BatchEndpoints, ChunkedApiProvider, DirectoryCrawlProvider, Provider, ProviderSettings,
    SingleEndpointProvider, TarBatchProvider,
};
use crate::sink::Sink;
use crate::utils::constants::{
    DEFAULT_DOWNLOAD_PATH, DEFAULT_NDBC_BATCH_SIZE, DEFAULT_SENSOR_DELAY, DEFAULT_SENSOR_FREQUENCY,
    DEFAULT_TIMEOUT_SECS, METAR_FREQUENCY, NDBC_DELAY, NDBC_FREQUENCY,
};
use clap::ValueEnum;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub const METAR_URL: &str = "https://aviationweather.gov/data/cache/metars.cache.xml.gz";
pub const DWD_BASE_URL: &str =
    "https://opendata.dwd.de/climate_environment/CDC/observations_germany/climate/10_minutes/precipitation/now/";
pub const DWD_METADATA_URL: &str = "https://opendata.dwd.de/climate_environment/CDC/observations_germany/climate/10_minutes/precipitation/now/zehn_now_rr_Beschreibung_Stationen.txt";
pub const FSDI_ITEMS_URL: &str =
    "https://data.geo.admin.ch/api/stac/v1/collections/ch.meteoschweiz.ogd-smn-precip/items";
pub const FSDI_ASSET_SUFFIX: &str = "_t_now.csv";
pub const FSDI_LISTING_ENTRY: &str = "stac_response.json";
pub const GEOSPHERE_ENDPOINT: &str =
    "https://dataset.api.hub.geosphere.at/v1/station/historical/tawes-v1-10min";
pub const GEOSPHERE_PARAMETERS: &str = "RR";
pub const NDBC_INDEX_URL: &str = "https://tao.ndbc.noaa.gov/tao/data_download/tao-esri.html";
pub const NDBC_DOWNLOAD_BASE: &str = "https://tao.ndbc.noaa.gov/tao/data_download";
pub const NDBC_REQUEST_FORMAT: &str = "https://tao.ndbc.noaa.gov/tao/data_download/process_results.php?type=rain&reso=hres&year1=%Y&mon1=%m&day1=%d&year2=%Y&mon2=%m&day2=%d&format=subcdf&compression=gzip&stations=";
pub const NDBC_STATION_PATTERN: &str =
    r"\s{2,}addStation\(-?\d+,\s*-?\d+,\s*'\d+',\s*'(?P<id>[A-Z0-9]+)',\s*'(?P<group>TAO|TRITON)'\)";
pub const NDBC_LINK_PATTERN: &str =
    r#"<a href="(?P<link>cache/\d{6}/[a-zA-Z0-9\-]+\.tar\.gz)">compressed file</a>"#;
pub const NDBC_BATCH_SIZE_ENV: &str = "NDBC_DOWNLOAD_BATCH_SIZE";

/// The vendors the sensor collector knows how to archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    /// Global METAR cache, one gzip XML per tick
    Metar,
    /// DWD 10-minute precipitation directory
    Dwd,
    /// Swiss FSDI STAC precipitation items
    Fsdi,
    /// GeoSphere Austria TAWES station API
    Geosphere,
    /// NDBC TAO/TRITON buoy rain gauges, daily
    #[serde(rename = "tao-triton")]
    TaoTriton,
}

/// Operator overrides applied on top of a preset.
#[derive(Debug, Clone)]
pub struct PresetOptions {
    pub download_path: PathBuf,
    pub frequency: Option<u64>,
    pub delay: Option<u64>,
    pub timeout_secs: Option<f64>,
    pub retry: RetryPolicy,
}

impl Default for PresetOptions {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from(DEFAULT_DOWNLOAD_PATH),
            frequency: None,
            delay: None,
            timeout_secs: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl SensorSource {
    pub fn service(&self) -> &'static str {
        match self {
            SensorSource::Metar => "METAR",
            SensorSource::Dwd => "DWD",
            SensorSource::Fsdi => "FSDIOpenData",
            SensorSource::Geosphere => "GeoSphere",
            SensorSource::TaoTriton => "NDBC",
        }
    }

    /// Environment variable overriding the request timeout, in seconds.
    pub fn timeout_env(&self) -> &'static str {
        match self {
            SensorSource::Metar => "METAR_TIMEOUT",
            SensorSource::Dwd => "DWD_TIMEOUT",
            SensorSource::Fsdi => "FSDIOPENDATA_TIMEOUT",
            SensorSource::Geosphere => "GEOSPHERE_TIMEOUT",
            SensorSource::TaoTriton => "NDBC_TIMEOUT",
        }
    }

    pub fn default_frequency(&self) -> u64 {
        match self {
            SensorSource::Metar => METAR_FREQUENCY,
            SensorSource::TaoTriton => NDBC_FREQUENCY,
            _ => DEFAULT_SENSOR_FREQUENCY,
        }
    }

    pub fn default_delay(&self) -> u64 {
        match self {
            SensorSource::TaoTriton => NDBC_DELAY,
            _ => DEFAULT_SENSOR_DELAY,
        }
    }

    pub fn headers(&self) -> HeaderMap {
        let (agent, accept) = match self {
            SensorSource::Metar => ("MetarWeatherProvider/1.0", "*/*"),
            SensorSource::Dwd => ("DWDWeatherProvider/1.0", "*/*"),
            SensorSource::Fsdi => (
                "FSDIOpenDataWeatherProvider/1.0",
                "application/json,text/csv,*/*",
            ),
            SensorSource::Geosphere => ("GeoSphereWeatherProvider/1.0", "application/json"),
            SensorSource::TaoTriton => ("NDBCWeatherProvider/1.0", "*/*"),
        };

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(agent));
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        if *self == SensorSource::Geosphere {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers
    }

    /// Preset settings with operator overrides, validated.
    pub fn settings(&self, options: &PresetOptions) -> Result<ProviderSettings> {
        let timeout_secs = options
            .timeout_secs
            .or_else(|| timeout_from_env(self.timeout_env()))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let settings = ProviderSettings::new(
            self.service(),
            options.frequency.unwrap_or_else(|| self.default_frequency()),
            options.delay.unwrap_or_else(|| self.default_delay()),
            options.download_path.clone(),
        )
        .with_timeout_secs(timeout_secs);

        settings.validate()?;
        Ok(settings)
    }

    /// Build the provider with a retrying HTTP client.
    pub fn build(self, sink: Arc<dyn Sink>, options: &PresetOptions) -> Result<Box<dyn Provider>> {
        let settings = self.settings(options)?;
        let http = HttpClient::new(settings.timeout()?)?.with_retry(options.retry);
        self.build_with(settings, sink, Arc::new(http))
    }

    /// Build the provider over an arbitrary HTTP capability.
    pub fn build_with(
        self,
        settings: ProviderSettings,
        sink: Arc<dyn Sink>,
        http: Arc<dyn HttpGet>,
    ) -> Result<Box<dyn Provider>> {
        info!(
            service = %settings.service,
            frequency = settings.frequency,
            delay = settings.delay,
            timeout_secs = settings.timeout_secs,
            "Initialized provider"
        );
        let headers = self.headers();

        let provider: Box<dyn Provider> = match self {
            SensorSource::Metar => Box::new(
                SingleEndpointProvider::new(settings, sink, http, METAR_URL, ArtifactKind::Xml)
                    .with_headers(headers)
                    .gzipped(true),
            ),
            SensorSource::Dwd => {
                let lister = HrefLister::new(http.clone(), headers.clone())?;
                Box::new(
                    DirectoryCrawlProvider::new(settings, sink, http, Arc::new(lister), DWD_BASE_URL)
                        .with_metadata_url(DWD_METADATA_URL)
                        .with_headers(headers),
                )
            }
            SensorSource::Fsdi => {
                let lister = StacAssetLister::new(http.clone(), headers.clone(), FSDI_ASSET_SUFFIX);
                Box::new(
                    DirectoryCrawlProvider::new(settings, sink, http, Arc::new(lister), FSDI_ITEMS_URL)
                        .with_listing_entry(FSDI_LISTING_ENTRY)
                        .with_headers(headers),
                )
            }
            SensorSource::Geosphere => Box::new(
                ChunkedApiProvider::new(settings, sink, http, GEOSPHERE_ENDPOINT, GEOSPHERE_PARAMETERS)
                    .with_headers(headers),
            ),
            SensorSource::TaoTriton => {
                let batch_size =
                    batch_size_from_env(NDBC_BATCH_SIZE_ENV).unwrap_or(DEFAULT_NDBC_BATCH_SIZE);
                Box::new(
                    TarBatchProvider::new(settings, sink, http, ndbc_endpoints(), batch_size)?
                        .with_headers(headers),
                )
            }
        };

        Ok(provider)
    }
}

fn ndbc_endpoints() -> BatchEndpoints {
    BatchEndpoints {
        index_url: NDBC_INDEX_URL.to_string(),
        station_pattern: NDBC_STATION_PATTERN.to_string(),
        request_format: NDBC_REQUEST_FORMAT.to_string(),
        link_pattern: NDBC_LINK_PATTERN.to_string(),
        download_base: NDBC_DOWNLOAD_BASE.to_string(),
    }
}
