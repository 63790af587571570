//! Error Types
//!
//! One enum per layer: series construction/alignment, catalogs, weather,
//! simulation, and the crate-level [`Error`] that tags failing objective
//! evaluations with the orientation that produced them.

use thiserror::Error;

/// Errors raised while building or combining time series.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("time step must be positive")]
    NonPositiveStep,

    #[error("timestamps are not strictly increasing at position {position}")]
    NotIncreasing { position: usize },

    #[error("irregular spacing at position {position}: expected {expected_secs}s, found {found_secs}s")]
    IrregularStep { position: usize, expected_secs: i64, found_secs: i64 },

    #[error("index has {index} timestamps but {values} values were supplied")]
    LengthMismatch { index: usize, values: usize },

    /// Input misalignment: generation and consumption indices differ.
    #[error("series are misaligned: {left} vs {right} samples, first difference at {first_difference:?}")]
    Misaligned { left: usize, right: usize, first_difference: Option<usize> },

    #[error("time range end {end} precedes start {start}")]
    InvertedRange { start: String, end: String },
}

/// Errors raised by module/inverter catalogs.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{kind} '{id}' not found in catalog")]
    NotFound { kind: &'static str, id: String },

    #[error("duplicate {kind} '{id}' in catalog")]
    Duplicate { kind: &'static str, id: String },

    #[error("{kind} '{id}' has unusable parameters: {reason}")]
    InvalidParameter { kind: &'static str, id: String, reason: String },

    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors raised by weather providers.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("solar position failed at {timestamp}: {message}")]
    SolarPosition { timestamp: String, message: String },

    #[error("no weather record covers {timestamp}")]
    MissingData { timestamp: String },

    #[error("weather file contains no records")]
    Empty,

    #[error("invalid weather timestamp '{0}'")]
    Timestamp(String),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("weather I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("weather CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors raised by a PV simulator for an invalid system or input.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("invalid orientation: tilt {tilt}°, azimuth {azimuth}°")]
    InvalidOrientation { tilt: f64, azimuth: f64 },

    #[error("bifaciality must be within [0, 1], got {0}")]
    InvalidBifaciality(f64),

    #[error("invalid array layout: {0}")]
    InvalidLayout(String),

    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("simulation failed: {0}")]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// An objective evaluation failed; the search was aborted at this point.
    #[error("evaluation at tilt {tilt:.3}°, azimuth {azimuth:.3}° failed: {source}")]
    Evaluation {
        tilt: f64,
        azimuth: f64,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid search settings: {0}")]
    Search(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Orientation of the failed evaluation, if this error carries one.
    pub fn failed_orientation(&self) -> Option<(f64, f64)> {
        match self {
            Self::Evaluation { tilt, azimuth, .. } => Some((*tilt, *azimuth)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
