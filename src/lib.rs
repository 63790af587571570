//! PV Orientation Studies
//!
//! Simulates fixed PV arrays over a period of weather and searches the
//! tilt/azimuth that maximizes total generation, self-consumption or export.
//!
//! The layers, bottom-up:
//! - [`series`]: timestamp-indexed series and their alignment checks
//! - [`solar`], [`irradiance`], [`weather`]: sun position, clear sky and weather providers
//! - [`catalog`], [`simulator`]: module/inverter parameters and the model chain
//! - [`consumption`], [`energy`]: household demand and energy aggregation
//! - [`optimize`], [`sweep`]: multi-start local search and exhaustive grids
//! - [`analysis`]: latitude trends and checks against measured data
//! - [`config`], [`output`]: study files, reports and CSV sinks

pub mod analysis;
pub mod catalog;
pub mod config;
pub mod consumption;
pub mod energy;
pub mod error;
pub mod irradiance;
pub mod optimize;
pub mod output;
pub mod series;
pub mod simulator;
pub mod solar;
pub mod sweep;
pub mod weather;

pub use energy::{EnergyReport, NegativeGeneration, net_energy, self_consumption, total_energy};
pub use error::{Error, Result};
pub use optimize::{Objective, ObjectiveMetric, local_search, multi_start};
pub use simulator::{ArrayConfig, ModelChain, Orientation, PvSimulator, Technology};
pub use sweep::{GridSpec, GridTable, grid_sweep, grid_sweep_with};
