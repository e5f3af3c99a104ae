use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// A forecast point read from the sensors CSV (`id,lat,lon,country`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Sensor {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub lon: f64,

    #[serde(default)]
    pub country: String,
}

impl Sensor {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64, country: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            country: country.into(),
        }
    }

    pub fn is_in(&self, countries: &[String]) -> bool {
        countries.is_empty()
            || countries
                .iter()
                .any(|code| code.eq_ignore_ascii_case(&self.country))
    }

    /// Read and validate sensors, keeping those in `include_countries`
    /// (alpha-3 codes; empty keeps everything).
    pub fn from_csv(path: &Path, include_countries: &[String]) -> Result<Vec<Sensor>> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut sensors = Vec::new();

        for record in reader.deserialize() {
            let sensor: Sensor = record?;
            sensor.validate()?;
            if sensor.is_in(include_countries) {
                sensors.push(sensor);
            }
        }

        Ok(sensors)
    }
}
