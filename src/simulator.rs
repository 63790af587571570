//! PV System Simulation
//!
//! Turns a weather series and an orientation into DC and AC power series.
//!
//! The chain per timestamp is:
//! 1. Front (and for bifacial arrays, rear) irradiance on the panel plane
//! 2. SAPM cell temperature
//! 3. PVWatts DC power scaled by the string layout
//! 4. PVWatts inverter efficiency, clipping and night tare

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{
    CASE_STUDY_INVERTER, CASE_STUDY_MODULE, InverterCatalog, InverterParameters, ModuleCatalog,
    ModuleParameters,
};
use crate::error::SimulationError;
use crate::irradiance::{self, DEFAULT_ALBEDO};
use crate::series::{PowerSeries, TimeSeries};
use crate::solar::Site;
use crate::weather::{WeatherSample, WeatherSeries};

/// Irradiance at standard test conditions (W/m²)
const STC_IRRADIANCE: f64 = 1000.0;

/// Cell temperature at standard test conditions (°C)
const STC_TEMPERATURE: f64 = 25.0;

// ===================== ORIENTATION =====================

/// Panel orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Inclination from horizontal, 0 (flat) to 90 (vertical)
    pub tilt: f64,
    /// Facing direction clockwise from north
    pub azimuth: f64,
}

impl Orientation {
    pub fn new(tilt: f64, azimuth: f64) -> Self {
        Self { tilt, azimuth }
    }

    /// Check ranges and fold azimuth 360 onto 0.
    pub fn validated(self) -> Result<Self, SimulationError> {
        let valid = self.tilt.is_finite()
            && self.azimuth.is_finite()
            && (0.0..=90.0).contains(&self.tilt)
            && (0.0..=360.0).contains(&self.azimuth);
        if !valid {
            return Err(SimulationError::InvalidOrientation { tilt: self.tilt, azimuth: self.azimuth });
        }
        Ok(Self { tilt: self.tilt, azimuth: self.azimuth % 360.0 })
    }
}

// ===================== ARRAY CONFIGURATION =====================

/// Module construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    #[default]
    Monofacial,
    Bifacial,
}

/// Sandia (SAPM) cell temperature model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SapmTemperature {
    pub a: f64,
    pub b: f64,
    /// Cell to back-of-module difference at 1000 W/m² (°C)
    pub delta_t: f64,
}

impl SapmTemperature {
    /// Open rack, glass/glass modules
    pub const OPEN_RACK_GLASS_GLASS: Self = Self { a: -3.47, b: -0.0594, delta_t: 3.0 };

    /// Cell temperature for plane irradiance `poa` (W/m²).
    pub fn cell_temperature(&self, poa: f64, temp_air: f64, wind_speed: f64) -> f64 {
        let module = poa * (self.a + self.b * wind_speed).exp() + temp_air;
        module + poa / STC_IRRADIANCE * self.delta_t
    }
}

impl Default for SapmTemperature {
    fn default() -> Self {
        Self::OPEN_RACK_GLASS_GLASS
    }
}

/// Everything about the array except its orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    pub technology: Technology,
    /// Module catalog identifier
    pub module: String,
    /// Inverter catalog identifier
    pub inverter: String,
    pub modules_per_string: u32,
    pub strings: u32,
    /// Share of rear irradiance credited to generation, [0, 1]
    pub bifaciality: f64,
    pub albedo: f64,
    /// Ground coverage ratio of the rows
    pub gcr: f64,
    pub temperature: SapmTemperature,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            technology: Technology::Monofacial,
            module: CASE_STUDY_MODULE.to_string(),
            inverter: CASE_STUDY_INVERTER.to_string(),
            modules_per_string: 5,
            strings: 2,
            bifaciality: 0.95,
            albedo: DEFAULT_ALBEDO,
            gcr: 0.1,
            temperature: SapmTemperature::default(),
        }
    }
}

impl ArrayConfig {
    pub fn with_technology(mut self, technology: Technology) -> Self {
        self.technology = technology;
        self
    }

    pub fn with_bifaciality(mut self, bifaciality: f64) -> Self {
        self.bifaciality = bifaciality;
        self
    }

    pub fn with_albedo(mut self, albedo: f64) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_inverter(mut self, inverter: impl Into<String>) -> Self {
        self.inverter = inverter.into();
        self
    }

    pub fn with_layout(mut self, modules_per_string: u32, strings: u32) -> Self {
        self.modules_per_string = modules_per_string;
        self.strings = strings;
        self
    }

    pub fn module_count(&self) -> u64 {
        u64::from(self.modules_per_string) * u64::from(self.strings)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(0.0..=1.0).contains(&self.bifaciality) {
            return Err(SimulationError::InvalidBifaciality(self.bifaciality));
        }
        if matches!(self.modules_per_string.checked_mul(self.strings), None | Some(0)) {
            return Err(SimulationError::InvalidLayout(format!(
                "{} modules per string x {} strings",
                self.modules_per_string, self.strings
            )));
        }
        if !(0.0..=1.0).contains(&self.albedo) {
            return Err(SimulationError::InvalidLayout(format!("albedo {} outside [0, 1]", self.albedo)));
        }
        if !(0.0..1.0).contains(&self.gcr) {
            return Err(SimulationError::InvalidLayout(format!("gcr {} outside [0, 1)", self.gcr)));
        }
        Ok(())
    }
}

// ===================== RESULTS =====================

/// Output of one simulation, all series on the weather index.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Array DC power (W)
    pub dc_power: PowerSeries,
    /// Inverter AC power (W), negative at night by the inverter tare
    pub ac_power: PowerSeries,
    /// Irradiance reaching the cells, rear gain included (W/m²)
    pub effective_irradiance: TimeSeries<f64>,
    /// Cell temperature (°C)
    pub cell_temperature: TimeSeries<f64>,
}

/// Anything that can simulate an array at a given orientation.
pub trait PvSimulator {
    fn simulate(
        &self,
        orientation: Orientation,
        weather: &WeatherSeries,
    ) -> Result<SimulationResult, SimulationError>;
}

// ===================== MODEL CHAIN =====================

/// Array configuration with its catalog entries resolved.
#[derive(Debug, Clone)]
pub struct ModelChain {
    site: Site,
    array: ArrayConfig,
    module: ModuleParameters,
    inverter: InverterParameters,
}

/// Per-timestamp output of the chain.
#[derive(Debug, Clone, Copy)]
struct StepOutput {
    effective_irradiance: f64,
    cell_temperature: f64,
    dc: f64,
    ac: f64,
}

impl ModelChain {
    /// Resolve the array's module and inverter; unknown identifiers fail.
    pub fn new(
        site: &Site,
        array: &ArrayConfig,
        modules: &ModuleCatalog,
        inverters: &InverterCatalog,
    ) -> Result<Self, SimulationError> {
        array.validate()?;
        let module = modules.get(&array.module)?.clone();
        let inverter = inverters.get(&array.inverter)?.clone();

        Ok(Self { site: site.clone(), array: array.clone(), module, inverter })
    }

    pub fn array(&self) -> &ArrayConfig {
        &self.array
    }

    /// Nameplate DC rating of the whole array (W)
    pub fn rated_dc_power(&self) -> f64 {
        self.module.pdc0 * self.array.module_count() as f64
    }

    fn effective_irradiance(&self, o: Orientation, w: &WeatherSample) -> f64 {
        let sky = w.irradiance();
        let front = irradiance::plane_of_array(
            sky,
            w.apparent_zenith,
            w.solar_azimuth,
            o.tilt,
            o.azimuth,
            self.array.albedo,
        );

        match self.array.technology {
            Technology::Monofacial => front.poa,
            Technology::Bifacial => {
                let rear = irradiance::rear_irradiance(
                    sky,
                    w.apparent_zenith,
                    w.solar_azimuth,
                    o.tilt,
                    o.azimuth,
                    self.array.albedo,
                    self.array.gcr,
                );
                front.poa + self.array.bifaciality * rear
            }
        }
    }

    /// PVWatts DC model.
    fn dc_power(&self, effective_irradiance: f64, cell_temperature: f64) -> f64 {
        self.rated_dc_power() * effective_irradiance / STC_IRRADIANCE
            * (1.0 + self.module.gamma_pdc * (cell_temperature - STC_TEMPERATURE))
    }

    /// PVWatts inverter model with clipping at `paco` and tare below zero DC.
    fn ac_power(&self, dc: f64) -> f64 {
        let inv = &self.inverter;
        if dc <= 0.0 {
            return -inv.night_tare;
        }
        let zeta = dc / inv.pdc0;
        let eta = inv.eta_inv_nom / inv.eta_inv_ref * (-0.0162 * zeta - 0.0059 / zeta + 0.9858);
        (eta * dc).clamp(0.0, inv.paco)
    }

    fn step(&self, o: Orientation, w: &WeatherSample) -> StepOutput {
        let effective_irradiance = self.effective_irradiance(o, w).max(0.0);
        let cell_temperature =
            self.array.temperature.cell_temperature(effective_irradiance, w.temp_air, w.wind_speed);
        let dc = self.dc_power(effective_irradiance, cell_temperature).max(0.0);
        StepOutput { effective_irradiance, cell_temperature, dc, ac: self.ac_power(dc) }
    }
}

impl PvSimulator for ModelChain {
    fn simulate(
        &self,
        orientation: Orientation,
        weather: &WeatherSeries,
    ) -> Result<SimulationResult, SimulationError> {
        let o = orientation.validated()?;
        let steps = weather.map(|w| self.step(o, w));

        let result = SimulationResult {
            dc_power: steps.map(|s| s.dc),
            ac_power: steps.map(|s| s.ac),
            effective_irradiance: steps.map(|s| s.effective_irradiance),
            cell_temperature: steps.map(|s| s.cell_temperature),
        };

        debug!(
            site = %self.site.name,
            tilt = o.tilt,
            azimuth = o.azimuth,
            technology = ?self.array.technology,
            peak_dc = result.dc_power.max().unwrap_or(0.0),
            "simulated array"
        );
        Ok(result)
    }
}

/// One-shot simulation: resolve catalogs, then run the chain.
pub fn simulate(
    orientation: Orientation,
    array: &ArrayConfig,
    weather: &WeatherSeries,
    site: &Site,
    modules: &ModuleCatalog,
    inverters: &InverterCatalog,
) -> Result<SimulationResult, SimulationError> {
    ModelChain::new(site, array, modules, inverters)?.simulate(orientation, weather)
}

// ===================== TESTS =====================
