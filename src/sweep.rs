//! Exhaustive Grid Sweep
//!
//! Evaluates every (tilt, azimuth) cell of an inclusive grid. Cells are
//! visited tilt-major; results are stored by cell key so the visiting order
//! (or thread scheduling) never changes the table.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::optimize::Objective;
use crate::simulator::Orientation;

/// Tolerance when deciding whether a step lands on the upper bound
const AXIS_EPSILON: f64 = 1e-9;

// ===================== GRID SPECIFICATION =====================

/// One axis of the grid: `min..=max` by `step` (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl AxisSpec {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(Error::Search(format!("{name} step must be positive, got {}", self.step)));
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.min <= self.max) {
            return Err(Error::Search(format!("{name} range [{}, {}] is empty", self.min, self.max)));
        }
        Ok(())
    }

    /// Axis values, both bounds included.
    ///
    /// When `step` does not divide the span the upper bound is appended after
    /// the last whole step.
    pub fn points(&self) -> Vec<f64> {
        let n = ((self.max - self.min) / self.step + AXIS_EPSILON).floor() as usize;
        let mut points: Vec<f64> = (0..=n).map(|i| self.min + i as f64 * self.step).collect();
        if let Some(last) = points.last_mut() {
            if (self.max - *last).abs() <= AXIS_EPSILON * self.step.max(1.0) {
                *last = self.max;
            } else {
                points.push(self.max);
            }
        }
        points
    }
}

/// Tilt and azimuth axes of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub tilt: AxisSpec,
    pub azimuth: AxisSpec,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { tilt: AxisSpec::new(0.0, 90.0, 3.0), azimuth: AxisSpec::new(0.0, 360.0, 5.0) }
    }
}

impl GridSpec {
    pub fn validate(&self) -> Result<()> {
        self.tilt.validate("tilt")?;
        self.azimuth.validate("azimuth")
    }

    pub fn cell_count(&self) -> usize {
        self.tilt.points().len() * self.azimuth.points().len()
    }
}

// ===================== RESULT TABLE =====================

/// Key of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GridCell {
    pub tilt_idx: usize,
    pub azimuth_idx: usize,
}

/// Values of a sweep, keyed by cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridTable<T> {
    tilts: Vec<f64>,
    azimuths: Vec<f64>,
    cells: BTreeMap<GridCell, T>,
}

/// A cell flattened for export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridRow<'a, T> {
    pub tilt: f64,
    pub azimuth: f64,
    pub value: &'a T,
}

impl<T> GridTable<T> {
    pub fn tilts(&self) -> &[f64] {
        &self.tilts
    }

    pub fn azimuths(&self) -> &[f64] {
        &self.azimuths
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, cell: GridCell) -> Option<&T> {
        self.cells.get(&cell)
    }

    /// Value at axis values, matched exactly against the grid points.
    pub fn value_at(&self, tilt: f64, azimuth: f64) -> Option<&T> {
        let tilt_idx = self.tilts.iter().position(|&t| t == tilt)?;
        let azimuth_idx = self.azimuths.iter().position(|&a| a == azimuth)?;
        self.get(GridCell { tilt_idx, azimuth_idx })
    }

    pub fn orientation(&self, cell: GridCell) -> Orientation {
        Orientation::new(self.tilts[cell.tilt_idx], self.azimuths[cell.azimuth_idx])
    }

    /// Cells in tilt-major order.
    pub fn rows(&self) -> impl Iterator<Item = GridRow<'_, T>> + '_ {
        self.cells.iter().map(|(cell, value)| GridRow {
            tilt: self.tilts[cell.tilt_idx],
            azimuth: self.azimuths[cell.azimuth_idx],
            value,
        })
    }

    /// Project every cell through `f`.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> GridTable<U> {
        GridTable {
            tilts: self.tilts.clone(),
            azimuths: self.azimuths.clone(),
            cells: self.cells.iter().map(|(k, v)| (*k, f(v))).collect(),
        }
    }
}

impl GridTable<f64> {
    /// Highest cell; ties resolve to the first cell in tilt-major order.
    pub fn best(&self) -> Option<(Orientation, f64)> {
        let mut best: Option<(GridCell, f64)> = None;
        for (cell, &v) in &self.cells {
            match best {
                Some((_, b)) if b >= v => {}
                _ => best = Some((*cell, v)),
            }
        }
        best.map(|(cell, v)| (self.orientation(cell), v))
    }

    /// Row of values for one tilt index, in azimuth order.
    pub fn tilt_row(&self, tilt_idx: usize) -> Vec<f64> {
        (0..self.azimuths.len())
            .filter_map(|azimuth_idx| self.get(GridCell { tilt_idx, azimuth_idx }).copied())
            .collect()
    }
}

// ===================== SWEEP =====================

/// Evaluate `eval` at every grid cell.
///
/// The first failing cell aborts the sweep with [`Error::Evaluation`].
pub fn grid_sweep_with<T, F>(spec: &GridSpec, parallel: bool, eval: F) -> Result<GridTable<T>>
where
    T: Send,
    F: Fn(Orientation) -> Result<T> + Sync,
{
    spec.validate()?;
    let tilts = spec.tilt.points();
    let azimuths = spec.azimuth.points();

    let cells: Vec<GridCell> = (0..tilts.len())
        .flat_map(|tilt_idx| {
            (0..azimuths.len()).map(move |azimuth_idx| GridCell { tilt_idx, azimuth_idx })
        })
        .collect();

    info!(cells = cells.len(), parallel, "starting grid sweep");

    let run = |cell: &GridCell| -> Result<(GridCell, T)> {
        let (tilt, azimuth) = (tilts[cell.tilt_idx], azimuths[cell.azimuth_idx]);
        match eval(Orientation::new(tilt, azimuth)) {
            Ok(v) => Ok((*cell, v)),
            Err(e @ Error::Evaluation { .. }) => Err(e),
            Err(e) => Err(Error::Evaluation { tilt, azimuth, source: Box::new(e) }),
        }
    };

    let values: Vec<(GridCell, T)> = if parallel {
        cells.par_iter().map(run).collect::<Result<_>>()?
    } else {
        cells.iter().map(run).collect::<Result<_>>()?
    };

    info!(cells = values.len(), "grid sweep finished");

    Ok(GridTable { tilts, azimuths, cells: values.into_iter().collect() })
}

/// Evaluate `objective` at every grid cell.
pub fn grid_sweep<O: Objective + ?Sized>(
    objective: &O,
    spec: &GridSpec,
    parallel: bool,
) -> Result<GridTable<f64>> {
    grid_sweep_with(spec, parallel, |o| objective.evaluate(o))
}

// ===================== TESTS =====================
