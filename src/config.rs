//! Study Configuration
//!
//! A study is described by one TOML file. `[site]`, `[period]` and
//! `objective.negative_generation` are required; every other value falls back
//! to the case-study defaults. Every report shows self-consumption, so the
//! night-time tare policy is always named explicitly.
//!
//! ```toml
//! [site]
//! name = "Oban"
//! latitude = 56.41
//! longitude = -5.47
//! timezone = "Europe/London"
//!
//! [period]
//! start = "2021-01-01T00:00:00Z"
//! end = "2021-12-31T23:00:00Z"
//! step_minutes = 60
//!
//! [objective]
//! metric = "self-consumption"
//! negative_generation = "clamp-to-zero"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{InverterCatalog, ModuleCatalog};
use crate::consumption::{ConstantConsumption, ConsumptionProvider, SeasonalProfile};
use crate::energy::NegativeGeneration;
use crate::error::{Error, Result};
use crate::irradiance::DEFAULT_LINKE_TURBIDITY;
use crate::optimize::{LocalSearchOptions, MultiStartOptions, ObjectiveMetric, SearchBounds};
use crate::series::TimeRange;
use crate::simulator::{ArrayConfig, Orientation};
use crate::solar::Site;
use crate::sweep::GridSpec;
use crate::weather::{
    ClearSkyProvider, CsvWeatherProvider, DEFAULT_TEMP_AIR, DEFAULT_WIND_SPEED, WeatherProvider,
    WeatherSource,
};

// ===================== SECTIONS =====================

/// Root of a study file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    pub site: Site,
    pub period: PeriodConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub array: ArrayConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub consumption: ConsumptionConfig,
    #[serde(default)]
    pub objective: ObjectiveConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub grid: GridSpec,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Simulated time span, both ends included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_step_minutes")]
    pub step_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub source: WeatherSource,
    /// PVGIS CSV, required for the typical and historical sources
    pub path: Option<PathBuf>,
    pub linke_turbidity: f64,
    /// Air temperature used with clear sky (°C)
    pub temp_air: f64,
    /// Wind speed used with clear sky (m/s)
    pub wind_speed: f64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            source: WeatherSource::ClearSky,
            path: None,
            linke_turbidity: DEFAULT_LINKE_TURBIDITY,
            temp_air: DEFAULT_TEMP_AIR,
            wind_speed: DEFAULT_WIND_SPEED,
        }
    }
}

/// Extra catalog files merged over the built-in entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub modules: Option<PathBuf>,
    pub inverters: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsumptionKind {
    #[default]
    Seasonal,
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumptionConfig {
    pub profile: ConsumptionKind,
    /// Multiplier of the seasonal profile
    pub scale: f64,
    /// Demand of the constant profile (W)
    pub constant_w: f64,
}

impl Default for ConsumptionConfig {
    fn default() -> Self {
        Self { profile: ConsumptionKind::Seasonal, scale: 1.0, constant_w: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    #[default]
    TotalGeneration,
    SelfConsumption,
    NetExport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveConfig {
    pub metric: MetricKind,
    /// How negative (tare) generation enters self-consumption; required
    pub negative_generation: Option<NegativeGeneration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub tilt_range: Option<[f64; 2]>,
    pub azimuth_range: Option<[f64; 2]>,
    pub restarts: usize,
    pub seed: u64,
    pub parallel: bool,
    pub max_iterations: usize,
    pub initial_tilt: f64,
    pub initial_azimuth: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let multi = MultiStartOptions::default();
        Self {
            tilt_range: None,
            azimuth_range: None,
            restarts: multi.restarts,
            seed: multi.seed,
            parallel: multi.parallel,
            max_iterations: LocalSearchOptions::default().max_iterations,
            initial_tilt: multi.initial_guess.tilt,
            initial_azimuth: multi.initial_guess.azimuth,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Persisted optimum rows, appended across runs
    pub optimum_csv: Option<PathBuf>,
    pub grid_csv: Option<PathBuf>,
    pub trace_csv: Option<PathBuf>,
}

fn default_step_minutes() -> u32 {
    60
}

// ===================== LOADING =====================

impl StudyConfig {
    /// Read, parse and validate a study file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), site = %config.site.name, "loaded study configuration");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: StudyConfig = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let site = &self.site;
        if !(-90.0..=90.0).contains(&site.latitude) {
            return Err(Error::Config(format!("Latitude must be between -90 and 90, got {}", site.latitude)));
        }
        if !(-180.0..=180.0).contains(&site.longitude) {
            return Err(Error::Config(format!(
                "Longitude must be between -180 and 180, got {}",
                site.longitude
            )));
        }

        if self.period.step_minutes == 0 {
            return Err(Error::Config("period step must be at least one minute".into()));
        }
        if self.period.end < self.period.start {
            return Err(Error::Config(format!(
                "period ends ({}) before it starts ({})",
                self.period.end, self.period.start
            )));
        }

        if self.weather.source != WeatherSource::ClearSky && self.weather.path.is_none() {
            return Err(Error::Config(format!("weather source {:?} needs a path", self.weather.source)));
        }

        self.array.validate()?;
        self.report_policy()?;
        self.objective_metric()?;
        self.bounds().validate()?;
        self.local_search_options().validate()?;
        if self.search.restarts == 0 {
            return Err(Error::Config("search needs at least one restart".into()));
        }
        self.grid.validate()?;
        Ok(())
    }

    // ===================== BUILDERS =====================

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(
            self.period.start,
            self.period.end,
            Duration::minutes(i64::from(self.period.step_minutes)),
        )
    }

    pub fn weather_provider(&self) -> Result<Box<dyn WeatherProvider>> {
        let w = &self.weather;
        let provider: Box<dyn WeatherProvider> = match (w.source, &w.path) {
            (WeatherSource::ClearSky, _) => Box::new(
                ClearSkyProvider::default()
                    .with_linke_turbidity(w.linke_turbidity)
                    .with_temp_air(w.temp_air)
                    .with_wind_speed(w.wind_speed),
            ),
            (WeatherSource::TypicalYear, Some(path)) => Box::new(CsvWeatherProvider::typical_year(path)?),
            (WeatherSource::HistoricalYear, Some(path)) => {
                Box::new(CsvWeatherProvider::historical_year(path)?)
            }
            (source, None) => return Err(Error::Config(format!("weather source {source:?} needs a path"))),
        };
        Ok(provider)
    }

    pub fn consumption_provider(&self) -> Box<dyn ConsumptionProvider> {
        match self.consumption.profile {
            ConsumptionKind::Seasonal => {
                Box::new(SeasonalProfile::new(self.site.timezone).with_scale(self.consumption.scale))
            }
            ConsumptionKind::Constant => Box::new(ConstantConsumption(self.consumption.constant_w)),
        }
    }

    /// Built-in catalogs with the configured files merged in.
    pub fn catalogs(&self) -> Result<(ModuleCatalog, InverterCatalog)> {
        let mut modules = ModuleCatalog::builtin();
        let mut inverters = InverterCatalog::builtin();
        if let Some(path) = &self.catalog.modules {
            modules.extend(ModuleCatalog::from_path(path)?);
        }
        if let Some(path) = &self.catalog.inverters {
            inverters.extend(InverterCatalog::from_path(path)?);
        }
        Ok((modules, inverters))
    }

    pub fn objective_metric(&self) -> Result<ObjectiveMetric> {
        match (self.objective.metric, self.objective.negative_generation) {
            (MetricKind::TotalGeneration, _) => Ok(ObjectiveMetric::TotalGeneration),
            (MetricKind::NetExport, _) => Ok(ObjectiveMetric::NetExport),
            (MetricKind::SelfConsumption, Some(policy)) => Ok(ObjectiveMetric::SelfConsumption(policy)),
            (MetricKind::SelfConsumption, None) => Err(Error::Config(
                "self-consumption objective needs negative_generation (\"keep\" or \"clamp-to-zero\")"
                    .into(),
            )),
        }
    }

    /// Policy for reported self-consumption figures.
    pub fn report_policy(&self) -> Result<NegativeGeneration> {
        self.objective.negative_generation.ok_or_else(|| {
            Error::Config(
                "objective.negative_generation must be \"keep\" or \"clamp-to-zero\"; reports include self-consumption"
                    .into(),
            )
        })
    }

    pub fn bounds(&self) -> SearchBounds {
        SearchBounds::default()
            .with_tilt_range(self.search.tilt_range.map(|[lo, hi]| (lo, hi)))
            .with_azimuth_range(self.search.azimuth_range.map(|[lo, hi]| (lo, hi)))
    }

    pub fn local_search_options(&self) -> LocalSearchOptions {
        LocalSearchOptions::default().with_max_iterations(self.search.max_iterations)
    }

    pub fn multi_start_options(&self) -> MultiStartOptions {
        MultiStartOptions::default()
            .with_restarts(self.search.restarts)
            .with_seed(self.search.seed)
            .with_parallel(self.search.parallel)
            .with_initial_guess(Orientation::new(self.search.initial_tilt, self.search.initial_azimuth))
    }
}

/// Read sites for a latitude study from a CSV with `name,latitude,longitude`
/// columns; `altitude_m` and `timezone` columns are optional.
pub fn load_sites(path: impl AsRef<Path>) -> Result<Vec<Site>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let sites = reader.deserialize::<Site>().collect::<std::result::Result<Vec<_>, _>>()?;
    if sites.is_empty() {
        return Err(Error::Config(format!("{} lists no sites", path.display())));
    }
    info!(path = %path.display(), sites = sites.len(), "loaded study sites");
    Ok(sites)
}

// ===================== TESTS =====================
