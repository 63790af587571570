//! Post-Study Analysis
//!
//! Trend lines of the optimal orientation against latitude, and comparisons
//! of modelled series with measured data over the measured window.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::optimize::SearchBounds;
use crate::output::OptimumRow;
use crate::series::TimeSeries;
use crate::simulator::SimulationResult;
use crate::weather::WeatherSeries;

/// Tilts this close to a search bound count as stuck on it (degrees)
const BOUND_TOLERANCE: f64 = 1e-6;

/// Singular values below this are treated as zero by the solver
const SVD_EPSILON: f64 = 1e-12;

// ===================== POLYNOMIAL FIT =====================

/// Least-squares polynomial, coefficients in ascending powers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolynomialFit {
    pub coefficients: Vec<f64>,
    /// Sum of squared residuals
    pub residual: f64,
    pub points: usize,
}

impl PolynomialFit {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

/// Fit `y ≈ c0 + c1·x + ... + cd·x^d`; needs more distinct `x` than `degree`.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Result<PolynomialFit> {
    if x.len() != y.len() {
        return Err(Error::Analysis(format!("{} x values but {} y values", x.len(), y.len())));
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(Error::Analysis("fit input contains non-finite values".into()));
    }
    let distinct = distinct_count(x);
    if distinct <= degree {
        return Err(Error::Analysis(format!(
            "degree {} fit needs {} distinct x values, got {}",
            degree,
            degree + 1,
            distinct
        )));
    }

    let design = DMatrix::from_fn(x.len(), degree + 1, |i, j| x[i].powi(j as i32));
    let target = DVector::from_column_slice(y);
    let solution = design
        .clone()
        .svd(true, true)
        .solve(&target, SVD_EPSILON)
        .map_err(|e| Error::Analysis(e.to_string()))?;
    let residual = (&design * &solution - &target).norm_squared();

    Ok(PolynomialFit { coefficients: solution.iter().copied().collect(), residual, points: x.len() })
}

// ===================== LATITUDE TREND =====================

/// Optimal orientation as a function of latitude.
#[derive(Debug, Clone, Serialize)]
pub struct LatitudeTrend {
    /// Sites that entered the fits
    pub sites: Vec<String>,
    /// Southern sites and sites whose tilt converged onto a search bound
    pub excluded: Vec<String>,
    pub tilt_linear: PolynomialFit,
    /// Needs three distinct latitudes
    pub tilt_quadratic: Option<PolynomialFit>,
    pub azimuth_linear: PolynomialFit,
}

/// Fit tilt and azimuth trends over northern-hemisphere optima. A tilt sitting
/// on `bounds` means the search hit a wall, so those sites are left out.
pub fn latitude_trend(rows: &[OptimumRow], bounds: &SearchBounds) -> Result<LatitudeTrend> {
    let on_bound = |tilt: f64| {
        (tilt - bounds.tilt_min).abs() < BOUND_TOLERANCE || (tilt - bounds.tilt_max).abs() < BOUND_TOLERANCE
    };
    let (kept, dropped): (Vec<&OptimumRow>, Vec<&OptimumRow>) =
        rows.iter().partition(|r| r.latitude > 0.0 && !on_bound(r.tilt));

    let latitude: Vec<f64> = kept.iter().map(|r| r.latitude).collect();
    let tilt: Vec<f64> = kept.iter().map(|r| r.tilt).collect();
    let azimuth: Vec<f64> = kept.iter().map(|r| r.azimuth).collect();

    let tilt_linear = polyfit(&latitude, &tilt, 1)?;
    let tilt_quadratic = if distinct_count(&latitude) > 2 { Some(polyfit(&latitude, &tilt, 2)?) } else { None };
    let azimuth_linear = polyfit(&latitude, &azimuth, 1)?;

    if !dropped.is_empty() {
        info!(excluded = dropped.len(), "sites left out of the latitude trend");
    }

    Ok(LatitudeTrend {
        sites: kept.iter().map(|r| r.site_name.clone()).collect(),
        excluded: dropped.iter().map(|r| r.site_name.clone()).collect(),
        tilt_linear,
        tilt_quadratic,
        azimuth_linear,
    })
}

// ===================== MEASURED DATA =====================

/// Quantity compared against measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quantity {
    /// Global horizontal irradiance of the weather source (W/m²)
    Ghi,
    /// Array DC power (W)
    DcPower,
    /// Inverter AC power (W)
    AcPower,
}

impl Quantity {
    /// Modelled series of this quantity.
    pub fn select(self, weather: &WeatherSeries, result: &SimulationResult) -> TimeSeries<f64> {
        match self {
            Self::Ghi => weather.map(|w| w.ghi),
            Self::DcPower => result.dc_power.clone(),
            Self::AcPower => result.ac_power.clone(),
        }
    }

    /// Unit of the integrated quantity
    pub fn energy_unit(self) -> &'static str {
        match self {
            Self::Ghi => "Wh/m²",
            Self::DcPower | Self::AcPower => "Wh",
        }
    }
}

impl FromStr for Quantity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ghi" => Ok(Self::Ghi),
            "dc" | "dc-power" => Ok(Self::DcPower),
            "ac" | "ac-power" => Ok(Self::AcPower),
            _ => Err(format!("Unknown quantity '{}' (expected ghi, dc or ac)", s)),
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ghi => "GHI",
            Self::DcPower => "DC power",
            Self::AcPower => "AC power",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Deserialize)]
struct MeasuredRecord {
    timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "csv::invalid_option")]
    value: Option<f64>,
}

/// Logged measurements: sorted, one value per timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredSeries {
    points: Vec<(DateTime<Utc>, f64)>,
}

impl MeasuredSeries {
    /// Read `timestamp,value` CSV. Empty or non-numeric values are dropped and
    /// a repeated timestamp keeps its first value.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut points = BTreeMap::new();
        let mut skipped = 0usize;

        for record in rdr.deserialize::<MeasuredRecord>() {
            let record = record?;
            match record.value.filter(|v| v.is_finite()) {
                Some(value) => {
                    points.entry(record.timestamp).or_insert(value);
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(skipped, "dropped measurements without a numeric value");
        }
        Ok(Self { points: points.into_iter().collect() })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let series = Self::from_reader(File::open(path)?)?;
        info!(path = %path.display(), samples = series.len(), "loaded measurements");
        Ok(series)
    }

    pub fn points(&self) -> &[(DateTime<Utc>, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Trapezoid integral over actual timestamps, in value-hours.
pub fn integrate_hours(points: &[(DateTime<Utc>, f64)]) -> f64 {
    points
        .windows(2)
        .map(|w| {
            let hours = (w[1].0 - w[0].0).num_seconds() as f64 / 3600.0;
            0.5 * (w[0].1 + w[1].1) * hours
        })
        .sum()
}

// ===================== COMPARISON =====================

/// Modelled against measured integrals over the measured window.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub quantity: Quantity,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub modelled_samples: usize,
    pub measured_samples: usize,
    pub modelled: f64,
    pub measured: f64,
    /// `(modelled - measured) / modelled`, in percent
    pub percent_difference: f64,
}

/// Integrate both series between the first and last measurement and compare.
pub fn compare(quantity: Quantity, modelled: &TimeSeries<f64>, measured: &MeasuredSeries) -> Result<Comparison> {
    let (Some(&(start, _)), Some(&(end, _))) = (measured.points.first(), measured.points.last()) else {
        return Err(Error::Analysis("no measurements to compare against".into()));
    };
    if measured.len() < 2 {
        return Err(Error::Analysis("at least two measurements are needed".into()));
    }

    let window: Vec<(DateTime<Utc>, f64)> =
        modelled.iter().filter(|(t, _)| (start..=end).contains(t)).map(|(t, v)| (t, *v)).collect();
    if window.len() < 2 {
        return Err(Error::Analysis(format!("modelled series does not cover {start} to {end}")));
    }

    let modelled_total = integrate_hours(&window);
    let measured_total = integrate_hours(&measured.points);
    if modelled_total == 0.0 {
        return Err(Error::Analysis("modelled total is zero; percent difference undefined".into()));
    }

    let comparison = Comparison {
        quantity,
        start,
        end,
        modelled_samples: window.len(),
        measured_samples: measured.len(),
        modelled: modelled_total,
        measured: measured_total,
        percent_difference: (modelled_total - measured_total) / modelled_total * 100.0,
    };
    info!(
        quantity = %quantity,
        modelled = comparison.modelled,
        measured = comparison.measured,
        percent = comparison.percent_difference,
        "compared modelled and measured"
    );
    Ok(comparison)
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimeIndex;
    use chrono::{Duration, TimeZone};

    fn row(name: &str, latitude: f64, tilt: f64, azimuth: f64) -> OptimumRow {
        OptimumRow {
            site_name: name.to_string(),
            latitude,
            longitude: -4.0,
            objective: 1000.0,
            tilt,
            azimuth,
        }
    }

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    #[test]
    fn test_polyfit_recovers_line() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|x| 2.0 * x + 1.0).collect();
        let fit = polyfit(&x, &y, 1).unwrap();

        assert_eq!(fit.degree(), 1);
        assert!((fit.coefficients[0] - 1.0).abs() < 1e-9, "Intercept {}", fit.coefficients[0]);
        assert!((fit.coefficients[1] - 2.0).abs() < 1e-9, "Slope {}", fit.coefficients[1]);
        assert!(fit.residual < 1e-12);
        assert!((fit.evaluate(10.0) - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_polyfit_recovers_quadratic_at_high_latitudes() {
        let x: Vec<f64> = (50..=70).step_by(4).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|x| 0.02 * x * x - 1.5 * x + 60.0).collect();
        let fit = polyfit(&x, &y, 2).unwrap();

        assert!((fit.coefficients[2] - 0.02).abs() < 1e-6, "Quadratic term {}", fit.coefficients[2]);
        for (&xi, &yi) in x.iter().zip(&y) {
            assert!((fit.evaluate(xi) - yi).abs() < 1e-6, "Fit misses ({}, {})", xi, yi);
        }
    }

    #[test]
    fn test_polyfit_least_squares_residual() {
        // Best line through (0,0), (1,1), (2,0) is y = 1/3 with residual 2/3
        let fit = polyfit(&[0.0, 1.0, 2.0], &[0.0, 1.0, 0.0], 1).unwrap();
        assert!((fit.coefficients[0] - 1.0 / 3.0).abs() < 1e-9);
        assert!(fit.coefficients[1].abs() < 1e-9);
        assert!((fit.residual - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_polyfit_needs_distinct_points() {
        assert!(matches!(polyfit(&[55.0, 55.0, 55.0], &[30.0, 31.0, 32.0], 1), Err(Error::Analysis(_))));
        assert!(matches!(polyfit(&[50.0, 60.0], &[30.0, 40.0], 2), Err(Error::Analysis(_))));
        assert!(matches!(polyfit(&[50.0, 60.0], &[30.0], 1), Err(Error::Analysis(_))));
        assert!(matches!(polyfit(&[50.0, f64::NAN], &[30.0, 40.0], 1), Err(Error::Analysis(_))));
    }

    #[test]
    fn test_latitude_trend_skips_bound_and_southern_sites() {
        let rows = vec![
            row("A", 50.0, 35.0, 180.0),
            row("B", 55.0, 37.5, 180.0),
            row("C", 60.0, 40.0, 180.0),
            row("D", 65.0, 42.5, 180.0),
            row("Stuck vertical", 80.0, 90.0, 181.0),
            row("Stuck flat", 10.0, 0.0, 90.0),
            row("South", -35.0, 30.0, 0.0),
        ];
        let trend = latitude_trend(&rows, &SearchBounds::default()).unwrap();

        assert_eq!(trend.sites, vec!["A", "B", "C", "D"]);
        assert_eq!(trend.excluded, vec!["Stuck vertical", "Stuck flat", "South"]);
        assert!((trend.tilt_linear.coefficients[0] - 10.0).abs() < 1e-6, "{:?}", trend.tilt_linear);
        assert!((trend.tilt_linear.coefficients[1] - 0.5).abs() < 1e-9, "{:?}", trend.tilt_linear);
        assert!((trend.azimuth_linear.evaluate(58.0) - 180.0).abs() < 1e-6);

        let quadratic = trend.tilt_quadratic.unwrap();
        assert!(quadratic.coefficients[2].abs() < 1e-6, "{:?}", quadratic);
    }

    #[test]
    fn test_latitude_trend_honours_custom_bounds() {
        let rows = vec![row("A", 50.0, 20.0, 180.0), row("B", 60.0, 40.0, 180.0), row("C", 70.0, 60.0, 180.0)];
        let bounds = SearchBounds::default().with_tilt_range(Some((20.0, 60.0)));

        let err = latitude_trend(&rows, &bounds).unwrap_err();
        assert!(matches!(err, Error::Analysis(_)), "One free site cannot carry a line: {err}");

        let trend = latitude_trend(&rows, &SearchBounds::default()).unwrap();
        assert_eq!(trend.sites.len(), 3);
    }

    #[test]
    fn test_measured_series_drops_bad_rows_and_duplicates() {
        let csv = "timestamp,value\n\
                   2024-03-01T02:00:00Z,80\n\
                   2024-03-01T01:00:00Z,n/a\n\
                   2024-03-01T03:00:00Z,90\n\
                   2024-03-01T03:00:00Z,999\n\
                   2024-03-01T04:00:00Z,\n\
                   2024-03-01T05:00:00Z,70\n";
        let measured = MeasuredSeries::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(measured.points(), &[(hour(2), 80.0), (hour(3), 90.0), (hour(5), 70.0)]);
    }

    #[test]
    fn test_integrate_hours_uses_timestamps() {
        let points = [(hour(0), 100.0), (hour(1), 100.0), (hour(3), 200.0)];
        // 100 Wh + 2 h * 150 W
        assert!((integrate_hours(&points) - 400.0).abs() < 1e-9);
        assert_eq!(integrate_hours(&points[..1]), 0.0);
    }

    #[test]
    fn test_compare_over_measured_window() {
        let index = TimeIndex::regular(hour(0), hour(10), Duration::hours(1)).unwrap();
        let modelled = TimeSeries::new(index, vec![100.0; 11]).unwrap();
        let csv = "timestamp,value\n\
                   2024-03-01T02:00:00Z,80\n\
                   2024-03-01T03:00:00Z,80\n\
                   2024-03-01T04:00:00Z,80\n\
                   2024-03-01T06:00:00Z,80\n";
        let measured = MeasuredSeries::from_reader(csv.as_bytes()).unwrap();

        let c = compare(Quantity::AcPower, &modelled, &measured).unwrap();
        assert_eq!((c.start, c.end), (hour(2), hour(6)));
        assert_eq!(c.modelled_samples, 5);
        assert!((c.modelled - 400.0).abs() < 1e-9, "Modelled {}", c.modelled);
        assert!((c.measured - 320.0).abs() < 1e-9, "Measured {}", c.measured);
        assert!((c.percent_difference - 20.0).abs() < 1e-9, "Difference {}", c.percent_difference);
    }

    #[test]
    fn test_compare_rejects_uncovered_or_zero_model() {
        let index = TimeIndex::regular(hour(0), hour(3), Duration::hours(1)).unwrap();
        let dark = TimeSeries::new(index.clone(), vec![0.0; 4]).unwrap();
        let lit = TimeSeries::new(index, vec![50.0; 4]).unwrap();

        let inside = MeasuredSeries::from_reader("timestamp,value\n2024-03-01T01:00:00Z,5\n2024-03-01T02:00:00Z,5\n".as_bytes())
            .unwrap();
        assert!(matches!(compare(Quantity::Ghi, &dark, &inside), Err(Error::Analysis(_))));
        assert!(compare(Quantity::Ghi, &lit, &inside).is_ok());

        let later = MeasuredSeries::from_reader("timestamp,value\n2024-03-02T01:00:00Z,5\n2024-03-02T02:00:00Z,5\n".as_bytes())
            .unwrap();
        assert!(matches!(compare(Quantity::Ghi, &lit, &later), Err(Error::Analysis(_))));

        let single = MeasuredSeries::from_reader("timestamp,value\n2024-03-01T01:00:00Z,5\n".as_bytes()).unwrap();
        assert!(matches!(compare(Quantity::Ghi, &lit, &single), Err(Error::Analysis(_))));
    }

    #[test]
    fn test_quantity_parsing() {
        assert_eq!("ghi".parse::<Quantity>(), Ok(Quantity::Ghi));
        assert_eq!("AC".parse::<Quantity>(), Ok(Quantity::AcPower));
        assert_eq!("dc-power".parse::<Quantity>(), Ok(Quantity::DcPower));
        assert!("poa".parse::<Quantity>().is_err());
    }
}
