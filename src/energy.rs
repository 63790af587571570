//! Energy Aggregation
//!
//! Scalar energy metrics from power series. `total_energy` integrates with the
//! trapezoidal rule; the generation/consumption comparisons are plain sums.
//! All three use unit spacing between samples, so their results are in
//! watt-samples. [`EnergyReport`] rescales by the index step to watt-hours.
//!
//! Empty series aggregate to zero.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SeriesError;
use crate::series::PowerSeries;
use crate::simulator::SimulationResult;

// ===================== POLICY =====================

/// Treatment of negative generation (inverter night tare) before it is
/// compared with consumption. Callers always name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegativeGeneration {
    /// Use generation values as they are
    Keep,
    /// Replace negative generation with zero
    ClampToZero,
}

impl NegativeGeneration {
    fn apply(self, value: f64) -> f64 {
        match self {
            NegativeGeneration::Keep => value,
            NegativeGeneration::ClampToZero => value.max(0.0),
        }
    }
}

// ===================== AGGREGATES =====================

/// Trapezoidal integral of `power` with unit sample spacing.
///
/// Zero for series with fewer than two samples.
pub fn total_energy(power: &PowerSeries) -> f64 {
    power.values().windows(2).map(|w| (w[0] + w[1]) / 2.0).sum()
}

/// Sum over timestamps of `min(generation, consumption)`.
///
/// Both series must share the same index.
pub fn self_consumption(
    generation: &PowerSeries,
    consumption: &PowerSeries,
    policy: NegativeGeneration,
) -> Result<f64, SeriesError> {
    generation.ensure_aligned(consumption)?;
    Ok(generation
        .values()
        .iter()
        .zip(consumption.values())
        .map(|(&g, &c)| policy.apply(g).min(c))
        .sum())
}

/// Sum of generation in excess of consumption, over timestamps with a surplus.
pub fn net_energy(generation: &PowerSeries, consumption: &PowerSeries) -> Result<f64, SeriesError> {
    generation.ensure_aligned(consumption)?;
    Ok(generation
        .values()
        .iter()
        .zip(consumption.values())
        .map(|(&g, &c)| (g - c).max(0.0))
        .sum())
}

/// Sum of `generation - consumption` over all timestamps, deficits included.
pub fn energy_balance(
    generation: &PowerSeries,
    consumption: &PowerSeries,
) -> Result<f64, SeriesError> {
    generation.ensure_aligned(consumption)?;
    Ok(generation.values().iter().zip(consumption.values()).map(|(&g, &c)| g - c).sum())
}

// ===================== REPORT =====================

/// Energy metrics of one simulation in watt-hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyReport {
    /// Integrated generation
    pub total_generation_wh: f64,
    /// Generation used on site
    pub self_consumption_wh: f64,
    /// Generation exported (surplus only)
    pub net_export_wh: f64,
    /// Generation minus consumption, deficits included
    pub balance_wh: f64,
    pub total_consumption_wh: f64,
    /// Share of consumption covered by generation (%)
    pub self_consumption_pct: f64,
}

impl EnergyReport {
    /// Report where the same series is integrated and compared.
    pub fn from_series(
        generation: &PowerSeries,
        consumption: &PowerSeries,
        policy: NegativeGeneration,
    ) -> Result<Self, SeriesError> {
        Self::build(generation, generation, consumption, policy)
    }

    /// Report for a simulation: DC power is integrated as generation, AC power
    /// is what the household sees.
    pub fn from_simulation(
        result: &SimulationResult,
        consumption: &PowerSeries,
        policy: NegativeGeneration,
    ) -> Result<Self, SeriesError> {
        Self::build(&result.dc_power, &result.ac_power, consumption, policy)
    }

    fn build(
        integrated: &PowerSeries,
        delivered: &PowerSeries,
        consumption: &PowerSeries,
        policy: NegativeGeneration,
    ) -> Result<Self, SeriesError> {
        let hours = delivered.index().step_hours();

        let self_consumption_wh = self_consumption(delivered, consumption, policy)? * hours;
        let net_export_wh = net_energy(delivered, consumption)? * hours;
        let balance_wh = energy_balance(delivered, consumption)? * hours;
        let total_consumption_wh = consumption.sum() * hours;
        let total_generation_wh = total_energy(integrated) * integrated.index().step_hours();

        let self_consumption_pct = if total_consumption_wh > 0.0 {
            self_consumption_wh / total_consumption_wh * 100.0
        } else {
            0.0
        };

        debug!(total_generation_wh, self_consumption_wh, net_export_wh, "aggregated energy");

        Ok(Self {
            total_generation_wh,
            self_consumption_wh,
            net_export_wh,
            balance_wh,
            total_consumption_wh,
            self_consumption_pct,
        })
    }
}

// ===================== TESTS =====================
