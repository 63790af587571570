//! Orientation Search
//!
//! Maximizes an [`Objective`] over tilt and azimuth with a bounded
//! quasi-Newton method (projected BFGS, finite-difference gradients), run
//! from one or more starting points.
//!
//! Every objective evaluation is assumed expensive. A failed evaluation aborts
//! the search with [`Error::Evaluation`] carrying the failing orientation.

use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::energy::{self, EnergyReport, NegativeGeneration};
use crate::error::{Error, Result};
use crate::series::PowerSeries;
use crate::simulator::{Orientation, PvSimulator};
use crate::weather::WeatherSeries;

// ===================== CONSTANTS =====================

/// Sufficient-decrease constant of the Armijo condition
const ARMIJO_C1: f64 = 1e-4;

/// Maximum step halvings per line search
const MAX_BACKTRACKS: usize = 20;

/// Curvature below which the BFGS update is skipped
const MIN_CURVATURE: f64 = 1e-12;

// ===================== OBJECTIVES =====================

/// Score to maximize at an orientation.
pub trait Objective: Sync {
    fn evaluate(&self, orientation: Orientation) -> Result<f64>;
}

impl<F> Objective for F
where
    F: Fn(Orientation) -> Result<f64> + Sync,
{
    fn evaluate(&self, orientation: Orientation) -> Result<f64> {
        self(orientation)
    }
}

/// Energy metric used as the search score, in watt-hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectiveMetric {
    /// Integrated DC generation
    TotalGeneration,
    /// AC power used on site, under the given negative-generation policy
    SelfConsumption(NegativeGeneration),
    /// AC power exported above consumption
    NetExport,
}

/// Objective backed by a full simulation per evaluation.
pub struct SimulationObjective<'a, S> {
    simulator: &'a S,
    weather: &'a WeatherSeries,
    consumption: &'a PowerSeries,
    metric: ObjectiveMetric,
}

impl<'a, S: PvSimulator + Sync> SimulationObjective<'a, S> {
    pub fn new(
        simulator: &'a S,
        weather: &'a WeatherSeries,
        consumption: &'a PowerSeries,
        metric: ObjectiveMetric,
    ) -> Self {
        Self { simulator, weather, consumption, metric }
    }

    pub fn metric(&self) -> ObjectiveMetric {
        self.metric
    }

    /// All energy metrics at `orientation` from a single simulation.
    pub fn report(&self, orientation: Orientation, policy: NegativeGeneration) -> Result<EnergyReport> {
        let sim = self.simulator.simulate(orientation, self.weather)?;
        Ok(EnergyReport::from_simulation(&sim, self.consumption, policy)?)
    }
}

impl<S: PvSimulator + Sync> Objective for SimulationObjective<'_, S> {
    fn evaluate(&self, orientation: Orientation) -> Result<f64> {
        let sim = self.simulator.simulate(orientation, self.weather)?;
        let hours = sim.ac_power.index().step_hours();

        let value = match self.metric {
            ObjectiveMetric::TotalGeneration => energy::total_energy(&sim.dc_power),
            ObjectiveMetric::SelfConsumption(policy) => {
                energy::self_consumption(&sim.ac_power, self.consumption, policy)?
            }
            ObjectiveMetric::NetExport => energy::net_energy(&sim.ac_power, self.consumption)?,
        };
        Ok(value * hours)
    }
}

/// Evaluate and tag failures with the orientation.
fn evaluate_tagged<O: Objective + ?Sized>(objective: &O, x: [f64; 2]) -> Result<f64> {
    let orientation = Orientation::new(x[0], x[1]);
    objective.evaluate(orientation).map_err(|e| match e {
        tagged @ Error::Evaluation { .. } => tagged,
        other => Error::Evaluation { tilt: x[0], azimuth: x[1], source: Box::new(other) },
    })
}

// ===================== BOUNDS & OPTIONS =====================

/// Box constraints for tilt and azimuth (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchBounds {
    pub tilt_min: f64,
    pub tilt_max: f64,
    pub azimuth_min: f64,
    pub azimuth_max: f64,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self { tilt_min: 0.0, tilt_max: 90.0, azimuth_min: 0.0, azimuth_max: 360.0 }
    }
}

impl SearchBounds {
    pub fn with_tilt_range(mut self, range: Option<(f64, f64)>) -> Self {
        if let Some((min, max)) = range {
            self.tilt_min = min.clamp(0.0, 90.0);
            self.tilt_max = max.clamp(0.0, 90.0);
        }
        self
    }

    pub fn with_azimuth_range(mut self, range: Option<(f64, f64)>) -> Self {
        if let Some((min, max)) = range {
            self.azimuth_min = min.clamp(0.0, 360.0);
            self.azimuth_max = max.clamp(0.0, 360.0);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tilt_min <= self.tilt_max && self.azimuth_min <= self.azimuth_max) {
            return Err(Error::Search(format!(
                "empty bounds: tilt [{}, {}], azimuth [{}, {}]",
                self.tilt_min, self.tilt_max, self.azimuth_min, self.azimuth_max
            )));
        }
        Ok(())
    }

    fn lower(&self) -> [f64; 2] {
        [self.tilt_min, self.azimuth_min]
    }

    fn upper(&self) -> [f64; 2] {
        [self.tilt_max, self.azimuth_max]
    }

    fn project(&self, x: [f64; 2]) -> [f64; 2] {
        [x[0].clamp(self.tilt_min, self.tilt_max), x[1].clamp(self.azimuth_min, self.azimuth_max)]
    }

    /// Clamp an orientation into the box.
    pub fn clamp(&self, o: Orientation) -> Orientation {
        let [tilt, azimuth] = self.project([o.tilt, o.azimuth]);
        Orientation { tilt, azimuth }
    }

    fn sample(&self, rng: &mut StdRng) -> Orientation {
        let tilt = if self.tilt_max > self.tilt_min {
            rng.gen_range(self.tilt_min..=self.tilt_max)
        } else {
            self.tilt_min
        };
        let azimuth = if self.azimuth_max > self.azimuth_min {
            rng.gen_range(self.azimuth_min..=self.azimuth_max)
        } else {
            self.azimuth_min
        };
        Orientation { tilt, azimuth }
    }
}

/// Settings of one local search run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalSearchOptions {
    pub max_iterations: usize,
    /// Stop when the projected gradient's largest component falls below this
    pub gtol: f64,
    /// Stop when the relative objective decrease falls below this
    pub ftol: f64,
    /// Finite-difference step (degrees)
    pub fd_step: f64,
    /// Length of the first step, taken before curvature is known (degrees)
    pub initial_step: f64,
}

impl Default for LocalSearchOptions {
    fn default() -> Self {
        Self { max_iterations: 100, gtol: 1e-5, ftol: 2.2e-9, fd_step: 1e-3, initial_step: 5.0 }
    }
}

impl LocalSearchOptions {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_initial_step(mut self, step: f64) -> Self {
        self.initial_step = step;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(positive(self.fd_step) && positive(self.initial_step)) {
            return Err(Error::Search("fd_step and initial_step must be positive".into()));
        }
        if !(self.gtol >= 0.0 && self.ftol >= 0.0) {
            return Err(Error::Search("tolerances must be non-negative".into()));
        }
        Ok(())
    }
}

// ===================== RESULTS =====================

/// One accepted iterate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchRecord {
    pub iteration: usize,
    pub orientation: Orientation,
    pub objective: f64,
}

/// Iterates of one run in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvergenceTrace {
    pub records: Vec<SearchRecord>,
}

impl ConvergenceTrace {
    fn push(&mut self, iteration: usize, x: [f64; 2], objective: f64) {
        self.records.push(SearchRecord {
            iteration,
            orientation: Orientation::new(x[0], x[1]),
            objective,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Why a local search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    GradientTolerance,
    FunctionTolerance,
    /// No step satisfied the sufficient-decrease condition
    LineSearchStalled,
    MaxIterations,
}

impl Termination {
    pub fn converged(self) -> bool {
        matches!(self, Termination::GradientTolerance | Termination::FunctionTolerance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalSearchOutcome {
    pub start: Orientation,
    /// Best point found, reported even when not converged
    pub best: SearchRecord,
    pub converged: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub evaluations: usize,
    pub trace: ConvergenceTrace,
}

// ===================== LOCAL SEARCH =====================

type Matrix = [[f64; 2]; 2];

const IDENTITY: Matrix = [[1.0, 0.0], [0.0, 1.0]];

fn dot(a: [f64; 2], b: [f64; 2]) -> f64 {
    a[0] * b[0] + a[1] * b[1]
}

fn mat_vec(m: &Matrix, v: [f64; 2]) -> [f64; 2] {
    [m[0][0] * v[0] + m[0][1] * v[1], m[1][0] * v[0] + m[1][1] * v[1]]
}

fn inf_norm(v: [f64; 2]) -> f64 {
    v[0].abs().max(v[1].abs())
}

/// Inverse-Hessian BFGS update with step `s` and gradient change `y`.
fn bfgs_update(h: &Matrix, s: [f64; 2], y: [f64; 2]) -> Matrix {
    let rho = 1.0 / dot(s, y);
    let hy = mat_vec(h, y);
    let yhy = dot(y, hy);
    let mut out = *h;
    for i in 0..2 {
        for j in 0..2 {
            out[i][j] += -rho * (s[i] * hy[j] + hy[i] * s[j]) + (rho * rho * yhy + rho) * s[i] * s[j];
        }
    }
    out
}

/// Minimization state for `f = -score`.
struct Minimizer<'a, O: ?Sized> {
    objective: &'a O,
    bounds: &'a SearchBounds,
    options: &'a LocalSearchOptions,
    evaluations: usize,
}

impl<O: Objective + ?Sized> Minimizer<'_, O> {
    fn f(&mut self, x: [f64; 2]) -> Result<f64> {
        self.evaluations += 1;
        Ok(-evaluate_tagged(self.objective, x)?)
    }

    /// Central differences inside the box, one-sided at the bounds.
    fn gradient(&mut self, x: [f64; 2], fx: f64) -> Result<[f64; 2]> {
        let (lo, hi) = (self.bounds.lower(), self.bounds.upper());
        let h = self.options.fd_step;
        let mut g = [0.0; 2];

        for i in 0..2 {
            if hi[i] - lo[i] <= 0.0 {
                continue;
            }
            let mut plus = x;
            let mut minus = x;
            plus[i] += h;
            minus[i] -= h;

            g[i] = match (plus[i] <= hi[i], minus[i] >= lo[i]) {
                (true, true) => (self.f(plus)? - self.f(minus)?) / (2.0 * h),
                (true, false) => (self.f(plus)? - fx) / h,
                (false, true) => (fx - self.f(minus)?) / h,
                (false, false) => 0.0,
            };
        }
        Ok(g)
    }

    /// Zero the components that would push past an active bound.
    fn project_gradient(&self, x: [f64; 2], g: [f64; 2]) -> [f64; 2] {
        let (lo, hi) = (self.bounds.lower(), self.bounds.upper());
        let mut pg = g;
        for i in 0..2 {
            let at_lower = x[i] <= lo[i] && g[i] > 0.0;
            let at_upper = x[i] >= hi[i] && g[i] < 0.0;
            if at_lower || at_upper || hi[i] <= lo[i] {
                pg[i] = 0.0;
            }
        }
        pg
    }
}

/// Maximize `objective` from `start` within `bounds`.
///
/// Hitting a bound is a valid result. Running out of iterations or failing the
/// line search returns the best point with `converged == false`.
pub fn local_search<O: Objective + ?Sized>(
    objective: &O,
    start: Orientation,
    bounds: &SearchBounds,
    options: &LocalSearchOptions,
) -> Result<LocalSearchOutcome> {
    bounds.validate()?;
    options.validate()?;

    let mut m = Minimizer { objective, bounds, options, evaluations: 0 };
    let start = bounds.clamp(start);

    let mut x = [start.tilt, start.azimuth];
    let mut fx = m.f(x)?;
    let mut g = m.gradient(x, fx)?;
    let mut h = IDENTITY;
    let mut curvature_known = false;

    let mut trace = ConvergenceTrace::default();
    trace.push(0, x, -fx);

    let mut iterations = 0;
    let termination = loop {
        let pg = m.project_gradient(x, g);
        if inf_norm(pg) <= options.gtol {
            break Termination::GradientTolerance;
        }
        if iterations >= options.max_iterations {
            break Termination::MaxIterations;
        }

        // Search direction restricted to the free variables
        let mut d = mat_vec(&h, pg).map(|v| -v);
        for i in 0..2 {
            if pg[i] == 0.0 {
                d[i] = 0.0;
            }
        }
        if dot(d, pg) >= 0.0 {
            h = IDENTITY;
            curvature_known = false;
            d = pg.map(|v| -v);
        }
        if !curvature_known {
            let scale = options.initial_step / inf_norm(d);
            d = d.map(|v| v * scale);
        }

        // Projected backtracking line search
        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let candidate = bounds.project([x[0] + alpha * d[0], x[1] + alpha * d[1]]);
            let s = [candidate[0] - x[0], candidate[1] - x[1]];
            if inf_norm(s) < f64::EPSILON {
                break;
            }
            let fc = m.f(candidate)?;
            if fc <= fx + ARMIJO_C1 * dot(g, s) {
                accepted = Some((candidate, fc, s));
                break;
            }
            alpha *= 0.5;
        }

        let Some((x_new, f_new, s)) = accepted else {
            break Termination::LineSearchStalled;
        };

        let g_new = m.gradient(x_new, f_new)?;
        let y = [g_new[0] - g[0], g_new[1] - g[1]];
        let sy = dot(s, y);
        if sy > MIN_CURVATURE {
            if !curvature_known {
                // Shanno-Phua scaling of the initial inverse Hessian
                let gamma = sy / dot(y, y);
                h = [[gamma, 0.0], [0.0, gamma]];
                curvature_known = true;
            }
            h = bfgs_update(&h, s, y);
        }

        let decrease = (fx - f_new) / fx.abs().max(f_new.abs()).max(1.0);
        x = x_new;
        fx = f_new;
        g = g_new;
        iterations += 1;
        trace.push(iterations, x, -fx);

        debug!(iteration = iterations, tilt = x[0], azimuth = x[1], objective = -fx, "search step");

        if decrease <= options.ftol {
            break Termination::FunctionTolerance;
        }
    };

    let best = trace
        .records
        .iter()
        .copied()
        .fold(None::<SearchRecord>, |best, r| match best {
            Some(b) if b.objective >= r.objective => Some(b),
            _ => Some(r),
        })
        .unwrap_or(SearchRecord { iteration: 0, orientation: start, objective: -fx });

    Ok(LocalSearchOutcome {
        start,
        best,
        converged: termination.converged(),
        termination,
        iterations,
        evaluations: m.evaluations,
        trace,
    })
}

// ===================== MULTI-START =====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MultiStartOptions {
    /// Number of independent runs, at least one
    pub restarts: usize,
    /// Seed of the random starting points
    pub seed: u64,
    /// Run restarts on the rayon pool
    pub parallel: bool,
    /// Starting point of the first run; the others are drawn uniformly
    pub initial_guess: Orientation,
}

impl Default for MultiStartOptions {
    fn default() -> Self {
        Self { restarts: 5, seed: 0, parallel: false, initial_guess: Orientation::new(35.0, 180.0) }
    }
}

impl MultiStartOptions {
    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_initial_guess(mut self, guess: Orientation) -> Self {
        self.initial_guess = guess;
        self
    }

    /// Starting points of every run, independent of scheduling.
    pub fn starts(&self, bounds: &SearchBounds) -> Vec<Orientation> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.restarts)
            .map(|i| if i == 0 { bounds.clamp(self.initial_guess) } else { bounds.sample(&mut rng) })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiStartOutcome {
    /// One outcome per restart, in restart order
    pub runs: Vec<LocalSearchOutcome>,
    /// Index of the run with the highest objective; ties go to the lowest index
    pub best_restart: usize,
}

impl MultiStartOutcome {
    pub fn best(&self) -> &LocalSearchOutcome {
        &self.runs[self.best_restart]
    }

    pub fn converged_runs(&self) -> usize {
        self.runs.iter().filter(|r| r.converged).count()
    }

    /// Spread of the optimal orientations across runs: (tilt, azimuth) ranges.
    pub fn spread(&self) -> (f64, f64) {
        let range = |f: fn(&LocalSearchOutcome) -> f64| {
            let (lo, hi) = self
                .runs
                .iter()
                .map(f)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            if lo.is_finite() { hi - lo } else { 0.0 }
        };
        (range(|r| r.best.orientation.tilt), range(|r| r.best.orientation.azimuth))
    }
}

/// Run independent local searches and report the best.
pub fn multi_start<O: Objective + ?Sized>(
    objective: &O,
    bounds: &SearchBounds,
    options: &LocalSearchOptions,
    multi: &MultiStartOptions,
) -> Result<MultiStartOutcome> {
    if multi.restarts == 0 {
        return Err(Error::Search("at least one restart is required".into()));
    }
    let starts = multi.starts(bounds);

    let run = |(i, start): (usize, &Orientation)| -> Result<LocalSearchOutcome> {
        let outcome = local_search(objective, *start, bounds, options)?;
        info!(
            restart = i,
            tilt = outcome.best.orientation.tilt,
            azimuth = outcome.best.orientation.azimuth,
            objective = outcome.best.objective,
            converged = outcome.converged,
            evaluations = outcome.evaluations,
            "restart finished"
        );
        Ok(outcome)
    };

    let runs = if multi.parallel {
        starts.par_iter().enumerate().map(run).collect::<Result<Vec<_>>>()?
    } else {
        starts.iter().enumerate().map(run).collect::<Result<Vec<_>>>()?
    };

    let mut best_restart = 0;
    for (i, r) in runs.iter().enumerate() {
        if r.best.objective > runs[best_restart].best.objective {
            best_restart = i;
        }
    }

    Ok(MultiStartOutcome { runs, best_restart })
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;

    fn bowl(o: Orientation) -> Result<f64> {
        Ok(1000.0 - ((o.tilt - 30.0).powi(2) + (o.azimuth - 200.0).powi(2) / 4.0))
    }

    #[test]
    fn test_local_search_finds_interior_maximum() {
        let out = local_search(
            &bowl,
            Orientation::new(60.0, 120.0),
            &SearchBounds::default(),
            &LocalSearchOptions::default(),
        )
        .unwrap();

        assert!(out.converged, "Search stopped with {:?}", out.termination);
        assert!((out.best.orientation.tilt - 30.0).abs() < 0.05, "Tilt {}", out.best.orientation.tilt);
        assert!(
            (out.best.orientation.azimuth - 200.0).abs() < 0.05,
            "Azimuth {}",
            out.best.orientation.azimuth
        );
        assert_eq!(out.trace.records[0].orientation, Orientation::new(60.0, 120.0));
        assert_eq!(out.trace.len(), out.iterations + 1);
    }

    #[test]
    fn test_monotone_objective_converges_to_bound() {
        let steeper = |o: Orientation| -> Result<f64> { Ok(o.tilt) };
        let out = local_search(
            &steeper,
            Orientation::new(30.0, 180.0),
            &SearchBounds::default(),
            &LocalSearchOptions::default(),
        )
        .unwrap();

        assert!(out.converged);
        assert_eq!(out.termination, Termination::GradientTolerance);
        assert_eq!(out.best.orientation.tilt, 90.0);
    }

    #[test]
    fn test_trace_objective_never_decreases() {
        let out = local_search(
            &bowl,
            Orientation::new(5.0, 10.0),
            &SearchBounds::default(),
            &LocalSearchOptions::default(),
        )
        .unwrap();

        for pair in out.trace.records.windows(2) {
            assert!(pair[1].objective >= pair[0].objective, "Trace went downhill: {:?}", pair);
        }
    }

    #[test]
    fn test_iteration_limit_is_not_an_error() {
        let out = local_search(
            &bowl,
            Orientation::new(80.0, 20.0),
            &SearchBounds::default(),
            &LocalSearchOptions::default().with_max_iterations(1),
        )
        .unwrap();

        assert!(!out.converged);
        assert_eq!(out.termination, Termination::MaxIterations);
        assert_eq!(out.iterations, 1);
        assert!(out.best.objective > bowl(Orientation::new(80.0, 20.0)).unwrap());
    }

    #[test]
    fn test_failing_evaluation_is_tagged() {
        let picky = |o: Orientation| -> Result<f64> {
            if o.tilt > 50.0 {
                return Err(SimulationError::InvalidOrientation { tilt: o.tilt, azimuth: o.azimuth }.into());
            }
            Ok(-(o.tilt - 70.0).powi(2))
        };
        let err = local_search(
            &picky,
            Orientation::new(40.0, 180.0),
            &SearchBounds::default(),
            &LocalSearchOptions::default(),
        )
        .unwrap_err();

        let (tilt, azimuth) = err.failed_orientation().expect("error should carry the orientation");
        assert!(tilt > 50.0, "Tagged tilt {}", tilt);
        assert_eq!(azimuth, 180.0);
        assert!(matches!(err, Error::Evaluation { ref source, .. } if matches!(**source, Error::Simulation(_))));
    }

    #[test]
    fn test_bounds_are_respected() {
        let bounds = SearchBounds::default()
            .with_tilt_range(Some((10.0, 20.0)))
            .with_azimuth_range(Some((150.0, 170.0)));
        let out = local_search(&bowl, Orientation::new(0.0, 0.0), &bounds, &LocalSearchOptions::default())
            .unwrap();

        assert_eq!(out.start, Orientation::new(10.0, 150.0));
        for r in &out.trace.records {
            assert!((10.0..=20.0).contains(&r.orientation.tilt));
            assert!((150.0..=170.0).contains(&r.orientation.azimuth));
        }
        assert!((out.best.orientation.tilt - 20.0).abs() < 1e-9);
        assert!((out.best.orientation.azimuth - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_starts_are_seeded_and_first_is_guess() {
        let bounds = SearchBounds::default();
        let opts = MultiStartOptions::default().with_restarts(6).with_seed(42);
        let a = opts.starts(&bounds);
        let b = opts.starts(&bounds);

        assert_eq!(a, b);
        assert_eq!(a[0], Orientation::new(35.0, 180.0));
        assert!(a.iter().all(|o| (0.0..=90.0).contains(&o.tilt) && (0.0..=360.0).contains(&o.azimuth)));
        assert_ne!(a, opts.with_seed(43).starts(&bounds));
    }

    #[test]
    fn test_multi_start_parallel_matches_sequential() {
        let two_hills = |o: Orientation| -> Result<f64> {
            let a = 100.0 * (-((o.tilt - 20.0).powi(2) / 800.0 + (o.azimuth - 90.0).powi(2) / 5000.0)).exp();
            let b = 150.0 * (-((o.tilt - 60.0).powi(2) / 800.0 + (o.azimuth - 270.0).powi(2) / 5000.0)).exp();
            Ok(a + b)
        };
        let bounds = SearchBounds::default();
        let local = LocalSearchOptions::default();
        let multi = MultiStartOptions::default().with_restarts(4).with_seed(7);

        let seq = multi_start(&two_hills, &bounds, &local, &multi).unwrap();
        let par = multi_start(&two_hills, &bounds, &local, &multi.with_parallel(true)).unwrap();

        assert_eq!(seq, par);
        assert_eq!(seq.runs.len(), 4);
        for r in &seq.runs {
            assert!(seq.best().best.objective >= r.best.objective);
        }
    }

    #[test]
    fn test_multi_start_ties_go_to_first_restart() {
        let flat = |_: Orientation| -> Result<f64> { Ok(7.0) };
        let out = multi_start(
            &flat,
            &SearchBounds::default(),
            &LocalSearchOptions::default(),
            &MultiStartOptions::default().with_restarts(3),
        )
        .unwrap();

        assert_eq!(out.best_restart, 0);
        assert_eq!(out.converged_runs(), 3);
    }

    #[test]
    fn test_zero_restarts_rejected() {
        let err = multi_start(
            &bowl,
            &SearchBounds::default(),
            &LocalSearchOptions::default(),
            &MultiStartOptions::default().with_restarts(0),
        );
        assert!(matches!(err, Err(Error::Search(_))));
    }
}
