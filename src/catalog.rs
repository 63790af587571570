//! Module and Inverter Catalogs
//!
//! Typed lookup tables keyed by manufacturer identifier. A missing identifier
//! is always a [`CatalogError::NotFound`]; there is no fallback system.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CatalogError;

/// Identifier of the case-study module
pub const CASE_STUDY_MODULE: &str = "Merlin_Solar_Technologies_Inc__RFP_F036W175S";

/// Identifier of the case-study inverter
pub const CASE_STUDY_INVERTER: &str = "OutBack_Power_Technologies___Inc___GS4048A__240V_";

// ===================== ENTRIES =====================

/// A row that can live in a [`Catalog`].
pub trait CatalogEntry: Clone + DeserializeOwned {
    /// Human-readable kind used in error messages
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// Reject parameters the models cannot run with.
    fn check(&self) -> Result<(), String>;
}

fn positive(name: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{name} must be positive, got {value}"))
    }
}

fn efficiency(name: &str, value: f64) -> Result<(), String> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(format!("{name} must be within (0, 1], got {value}"))
    }
}

/// PVWatts-style module parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleParameters {
    pub name: String,
    /// DC power at 1000 W/m² and 25 °C cell temperature (W)
    pub pdc0: f64,
    /// Temperature coefficient of power (1/°C)
    pub gamma_pdc: f64,
}

impl CatalogEntry for ModuleParameters {
    const KIND: &'static str = "module";

    fn id(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<(), String> {
        positive("pdc0", self.pdc0)?;
        if !self.gamma_pdc.is_finite() {
            return Err(format!("gamma_pdc must be finite, got {}", self.gamma_pdc));
        }
        Ok(())
    }
}

/// PVWatts-style inverter parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverterParameters {
    pub name: String,
    /// AC power rating (W)
    pub paco: f64,
    /// DC input at which `paco` is reached (W)
    pub pdc0: f64,
    /// Nominal efficiency
    #[serde(default = "default_eta_inv_nom")]
    pub eta_inv_nom: f64,
    /// Reference efficiency of the PVWatts curve
    #[serde(default = "default_eta_inv_ref")]
    pub eta_inv_ref: f64,
    /// Power drawn from the grid with no DC input (W)
    #[serde(default)]
    pub night_tare: f64,
}

fn default_eta_inv_nom() -> f64 {
    0.96
}

fn default_eta_inv_ref() -> f64 {
    0.9637
}

impl CatalogEntry for InverterParameters {
    const KIND: &'static str = "inverter";

    fn id(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<(), String> {
        positive("paco", self.paco)?;
        positive("pdc0", self.pdc0)?;
        efficiency("eta_inv_nom", self.eta_inv_nom)?;
        efficiency("eta_inv_ref", self.eta_inv_ref)?;
        if !(self.night_tare.is_finite() && self.night_tare >= 0.0) {
            return Err(format!("night_tare must be zero or positive, got {}", self.night_tare));
        }
        Ok(())
    }
}

// ===================== CATALOG =====================

#[derive(Debug, Clone)]
pub struct Catalog<T> {
    entries: BTreeMap<String, T>,
}

pub type ModuleCatalog = Catalog<ModuleParameters>;
pub type InverterCatalog = Catalog<InverterParameters>;

impl<T> Default for Catalog<T> {
    fn default() -> Self {
        Self { entries: BTreeMap::new() }
    }
}

impl<T: CatalogEntry> Catalog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; identifiers must be unique and parameters usable.
    pub fn insert(&mut self, entry: T) -> Result<(), CatalogError> {
        let id = entry.id().to_string();
        if self.entries.contains_key(&id) {
            return Err(CatalogError::Duplicate { kind: T::KIND, id });
        }
        if let Err(reason) = entry.check() {
            return Err(CatalogError::InvalidParameter { kind: T::KIND, id, reason });
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&T, CatalogError> {
        self.entries.get(id).ok_or_else(|| CatalogError::NotFound { kind: T::KIND, id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load entries from CSV with a `name` column and one column per parameter.
    pub fn from_reader(reader: impl Read) -> Result<Self, CatalogError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut catalog = Self::new();
        for row in rdr.deserialize::<T>() {
            catalog.insert(row?)?;
        }
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let catalog = Self::from_reader(File::open(path)?)?;
        info!(path = %path.display(), kind = T::KIND, entries = catalog.len(), "loaded catalog");
        Ok(catalog)
    }

    /// Merge `other` into this catalog; entries in `other` replace existing ones.
    pub fn extend(&mut self, other: Catalog<T>) {
        self.entries.extend(other.entries);
    }
}

// ===================== BUILT-IN ENTRIES =====================

fn module(name: &str, pdc0: f64, gamma_pdc: f64) -> ModuleParameters {
    ModuleParameters { name: name.to_string(), pdc0, gamma_pdc }
}

impl ModuleCatalog {
    /// Nameplate values of the modules used in the case study.
    pub fn builtin() -> Self {
        let entries = [
            module(CASE_STUDY_MODULE, 175.0, -0.0036),
            module("JA_Solar_JAM54S30_415_MR", 415.0, -0.0035),
            module("JA_Solar_JAM60S10_330_PR", 330.0, -0.0037),
            module("United_Renewable_Energy_Co__Ltd__D7K360H8A", 360.0, -0.0037),
        ];
        Self { entries: entries.into_iter().map(|m| (m.name.clone(), m)).collect() }
    }
}

impl InverterCatalog {
    /// Nameplate values of the case-study inverter.
    pub fn builtin() -> Self {
        let outback = InverterParameters {
            name: CASE_STUDY_INVERTER.to_string(),
            paco: 4000.0,
            pdc0: 4000.0 / 0.955,
            eta_inv_nom: 0.955,
            eta_inv_ref: default_eta_inv_ref(),
            night_tare: 30.0,
        };
        Self { entries: BTreeMap::from([(outback.name.clone(), outback)]) }
    }
}

// ===================== TESTS =====================
