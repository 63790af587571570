//! Weather Providers
//!
//! A provider turns a site and a time range into a [`WeatherSeries`]: horizontal
//! irradiance, sun position, air temperature and wind speed for every
//! requested timestamp.
//!
//! Two implementations ship with the crate:
//! - [`ClearSkyProvider`]: analytic Ineichen-Perez clear sky.
//! - [`CsvWeatherProvider`]: hourly records in the PVGIS CSV layout, used
//!   either as a typical year (reused for any calendar year) or as a
//!   historical year (exact timestamps only).

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::WeatherError;
use crate::irradiance::{self, ClearSkyIrradiance, DEFAULT_LINKE_TURBIDITY};
use crate::series::{TimeRange, TimeSeries};
use crate::solar::{SolarCalc, Site};

/// Header of the first data column in PVGIS exports.
const PVGIS_TIME_COLUMN: &str = "time(UTC)";

/// PVGIS timestamp layout, e.g. `20150101:0010`.
const PVGIS_TIME_FORMAT: &str = "%Y%m%d:%H%M";

pub const DEFAULT_TEMP_AIR: f64 = 20.0;
pub const DEFAULT_WIND_SPEED: f64 = 0.0;

// ===================== TYPES =====================

/// Where weather comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeatherSource {
    /// Analytic clear-sky model
    #[default]
    ClearSky,
    /// Typical meteorological year, reused for any calendar year
    TypicalYear,
    /// Measured year, timestamps must exist in the file
    HistoricalYear,
}

/// Weather at one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherSample {
    /// Global horizontal irradiance (W/m²)
    pub ghi: f64,
    /// Direct normal irradiance (W/m²)
    pub dni: f64,
    /// Diffuse horizontal irradiance (W/m²)
    pub dhi: f64,
    /// Apparent sun zenith (degrees)
    pub apparent_zenith: f64,
    /// Sun azimuth (degrees clockwise from north)
    pub solar_azimuth: f64,
    /// Air temperature at 2 m (°C)
    pub temp_air: f64,
    /// Wind speed at 10 m (m/s)
    pub wind_speed: f64,
}

impl WeatherSample {
    pub fn irradiance(&self) -> ClearSkyIrradiance {
        ClearSkyIrradiance { ghi: self.ghi, dni: self.dni, dhi: self.dhi }
    }
}

pub type WeatherSeries = TimeSeries<WeatherSample>;

/// Source of weather series for a site.
pub trait WeatherProvider {
    /// Weather for every timestamp of `range`, both ends included.
    fn weather(&self, site: &Site, range: &TimeRange) -> Result<WeatherSeries, WeatherError>;
}

// ===================== CLEAR SKY =====================

/// Ineichen-Perez clear sky with constant ambient conditions.
#[derive(Debug, Clone, Copy)]
pub struct ClearSkyProvider {
    pub linke_turbidity: f64,
    pub temp_air: f64,
    pub wind_speed: f64,
}

impl Default for ClearSkyProvider {
    fn default() -> Self {
        Self {
            linke_turbidity: DEFAULT_LINKE_TURBIDITY,
            temp_air: DEFAULT_TEMP_AIR,
            wind_speed: DEFAULT_WIND_SPEED,
        }
    }
}

impl ClearSkyProvider {
    pub fn with_linke_turbidity(mut self, lt: f64) -> Self {
        self.linke_turbidity = lt;
        self
    }

    pub fn with_temp_air(mut self, temp_air: f64) -> Self {
        self.temp_air = temp_air;
        self
    }

    pub fn with_wind_speed(mut self, wind_speed: f64) -> Self {
        self.wind_speed = wind_speed;
        self
    }
}

impl WeatherProvider for ClearSkyProvider {
    fn weather(&self, site: &Site, range: &TimeRange) -> Result<WeatherSeries, WeatherError> {
        let index = range.index()?;
        let calc = SolarCalc::for_site(site, range.start)?;
        debug!(site = %site.name, samples = index.len(), "computing clear-sky weather");

        TimeSeries::try_from_fn(index, |t| {
            let sun = calc.position(t)?;
            let sky = irradiance::clear_sky(
                sun.apparent_zenith,
                site.altitude_m,
                t.ordinal(),
                self.linke_turbidity,
            );
            Ok(WeatherSample {
                ghi: sky.ghi,
                dni: sky.dni,
                dhi: sky.dhi,
                apparent_zenith: sun.apparent_zenith,
                solar_azimuth: sun.azimuth,
                temp_air: self.temp_air,
                wind_speed: self.wind_speed,
            })
        })
    }
}

// ===================== CSV (PVGIS) =====================

#[derive(Debug, Deserialize)]
struct PvgisRecord {
    #[serde(rename = "time(UTC)")]
    time: String,
    #[serde(rename = "G(h)")]
    ghi: f64,
    #[serde(rename = "Gb(n)")]
    dni: f64,
    #[serde(rename = "Gd(h)")]
    dhi: f64,
    #[serde(rename = "T2m", default = "default_temp_air")]
    temp_air: f64,
    #[serde(rename = "WS10m", default)]
    wind_speed: f64,
}

fn default_temp_air() -> f64 {
    DEFAULT_TEMP_AIR
}

/// Measured quantities of one hourly record.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HourlyRecord {
    ghi: f64,
    dni: f64,
    dhi: f64,
    temp_air: f64,
    wind_speed: f64,
}

/// Record lookup key: (year, month, day, hour). Typical years store year 0.
type HourKey = (i32, u32, u32, u32);

/// Hourly weather loaded from a PVGIS-style CSV.
#[derive(Debug, Clone)]
pub struct CsvWeatherProvider {
    mode: WeatherSource,
    records: HashMap<HourKey, HourlyRecord>,
}

impl CsvWeatherProvider {
    /// Load a typical-year file.
    pub fn typical_year(path: impl AsRef<Path>) -> Result<Self, WeatherError> {
        Self::from_path(path, WeatherSource::TypicalYear)
    }

    /// Load a historical-year file.
    pub fn historical_year(path: impl AsRef<Path>) -> Result<Self, WeatherError> {
        Self::from_path(path, WeatherSource::HistoricalYear)
    }

    fn from_path(path: impl AsRef<Path>, mode: WeatherSource) -> Result<Self, WeatherError> {
        let path = path.as_ref();
        let provider = Self::from_reader(fs::File::open(path)?, mode)?;
        info!(path = %path.display(), records = provider.len(), ?mode, "loaded weather file");
        Ok(provider)
    }

    /// Parse records from any reader.
    ///
    /// Metadata lines before the `time(UTC)` header and the footer after the
    /// first blank line are skipped, as found in PVGIS downloads.
    pub fn from_reader(mut reader: impl Read, mode: WeatherSource) -> Result<Self, WeatherError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;

        let start = text
            .lines()
            .position(|line| line.starts_with(PVGIS_TIME_COLUMN))
            .ok_or(WeatherError::Empty)?;
        let table: Vec<&str> =
            text.lines().skip(start).take_while(|line| !line.trim().is_empty()).collect();
        let table = table.join("\n");

        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(table.as_bytes());

        let mut records = HashMap::new();
        for row in rdr.deserialize::<PvgisRecord>() {
            let row = row?;
            let time = NaiveDateTime::parse_from_str(&row.time, PVGIS_TIME_FORMAT)
                .map_err(|_| WeatherError::Timestamp(row.time.clone()))?;
            let key = Self::key_for(mode, time.year(), time.month(), time.day(), time.hour());
            records.insert(
                key,
                HourlyRecord {
                    ghi: row.ghi,
                    dni: row.dni,
                    dhi: row.dhi,
                    temp_air: row.temp_air,
                    wind_speed: row.wind_speed,
                },
            );
        }

        if records.is_empty() {
            return Err(WeatherError::Empty);
        }
        Ok(Self { mode, records })
    }

    pub fn mode(&self) -> WeatherSource {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn key_for(mode: WeatherSource, year: i32, month: u32, day: u32, hour: u32) -> HourKey {
        match mode {
            WeatherSource::HistoricalYear => (year, month, day, hour),
            _ => (0, month, day, hour),
        }
    }

    fn lookup(&self, t: DateTime<Utc>) -> Result<HourlyRecord, WeatherError> {
        let key = Self::key_for(self.mode, t.year(), t.month(), t.day(), t.hour());
        let found = self.records.get(&key).or_else(|| match (self.mode, t.month(), t.day()) {
            (WeatherSource::TypicalYear, 2, 29) => self.records.get(&(0, 2, 28, t.hour())),
            _ => None,
        });
        found.copied().ok_or_else(|| WeatherError::MissingData { timestamp: t.to_rfc3339() })
    }
}

impl WeatherProvider for CsvWeatherProvider {
    fn weather(&self, site: &Site, range: &TimeRange) -> Result<WeatherSeries, WeatherError> {
        let index = range.index()?;
        let calc = SolarCalc::for_site(site, range.start)?;

        TimeSeries::try_from_fn(index, |t| {
            let rec = self.lookup(t)?;
            let sun = calc.position(t)?;
            Ok(WeatherSample {
                ghi: rec.ghi,
                dni: rec.dni,
                dhi: rec.dhi,
                apparent_zenith: sun.apparent_zenith,
                solar_azimuth: sun.azimuth,
                temp_air: rec.temp_air,
                wind_speed: rec.wind_speed,
            })
        })
    }
}

// ===================== TESTS =====================
