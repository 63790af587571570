//! Output Formatting Module
//!
//! Terminal reports, CSV sinks (persisted optimum rows, grid tables,
//! convergence traces) and JSON rendering.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::analysis::{Comparison, LatitudeTrend, PolynomialFit};
use crate::energy::EnergyReport;
use crate::error::Result;
use crate::optimize::{MultiStartOutcome, ObjectiveMetric};
use crate::simulator::{ArrayConfig, Orientation, SimulationResult};
use crate::solar::Site;
use crate::sweep::GridTable;

// ===================== FORMATTING =====================

/// Format power for display
pub fn format_power(watts: f64) -> String {
    if watts.abs() >= 1000.0 { format!("{:.2} kW", watts / 1000.0) } else { format!("{:.1} W", watts) }
}

/// Format energy for display
pub fn format_energy(watt_hours: f64) -> String {
    if watt_hours.abs() >= 1_000_000.0 {
        format!("{:.2} MWh", watt_hours / 1_000_000.0)
    } else if watt_hours.abs() >= 1000.0 {
        format!("{:.2} kWh", watt_hours / 1000.0)
    } else {
        format!("{:.1} Wh", watt_hours)
    }
}

pub fn metric_label(metric: ObjectiveMetric) -> &'static str {
    match metric {
        ObjectiveMetric::TotalGeneration => "total generation",
        ObjectiveMetric::SelfConsumption(_) => "self-consumption",
        ObjectiveMetric::NetExport => "net export",
    }
}

fn facing(azimuth: f64) -> &'static str {
    let az = azimuth.rem_euclid(360.0);
    if az > 135.0 && az < 225.0 {
        "south"
    } else if !(45.0..=315.0).contains(&az) {
        "north"
    } else if az <= 135.0 {
        "east"
    } else {
        "west"
    }
}

// ===================== TERMINAL OUTPUT =====================

fn print_site(site: &Site) {
    println!(
        "Site      : {} ({:.4}°, {:.4}°, {:.0} m, {})",
        site.name, site.latitude, site.longitude, site.altitude_m, site.timezone
    );
}

fn print_report(report: &EnergyReport) {
    println!("Energy:");
    println!("  Generation    : {}", format_energy(report.total_generation_wh));
    println!("  Consumption   : {}", format_energy(report.total_consumption_wh));
    println!("  Self-consumed : {}", format_energy(report.self_consumption_wh));
    println!("  Net export    : {}", format_energy(report.net_export_wh));
    println!("  Balance       : {}", format_energy(report.balance_wh));
    println!("  Self-suff.    : {:8.2}%", report.self_consumption_pct);
}

/// Print one simulation at a fixed orientation.
///
/// # Arguments
/// * `site` - Simulated site
/// * `array` - Array configuration
/// * `orientation` - Panel orientation
/// * `result` - Simulated power series
/// * `report` - Energy metrics of the run
pub fn print_simulation(
    site: &Site,
    array: &ArrayConfig,
    orientation: Orientation,
    result: &SimulationResult,
    report: &EnergyReport,
) {
    println!();
    println!("=== PV Simulation ===");
    print_site(site);
    println!(
        "Array     : {} x {} ({} strings of {}), {:?}",
        array.module_count(),
        array.module,
        array.strings,
        array.modules_per_string,
        array.technology
    );
    println!("Inverter  : {}", array.inverter);
    println!(
        "Panel     : {:.1}° tilt, {:.1}° azimuth (facing {})",
        orientation.tilt,
        orientation.azimuth,
        facing(orientation.azimuth)
    );
    println!();
    println!("Power:");
    println!("  Peak DC       : {}", format_power(result.dc_power.max().unwrap_or(0.0)));
    println!("  Peak AC       : {}", format_power(result.ac_power.max().unwrap_or(0.0)));
    println!("  Max cell temp : {:8.1}°C", result.cell_temperature.max().unwrap_or(0.0));
    println!();
    print_report(report);
}

/// Print the outcome of a multi-start search.
pub fn print_optimum(site: &Site, metric: ObjectiveMetric, outcome: &MultiStartOutcome, report: &EnergyReport) {
    let best = outcome.best();
    let (tilt_spread, azimuth_spread) = outcome.spread();

    println!();
    println!("=== Orientation Search ({}) ===", metric_label(metric));
    print_site(site);
    println!();
    println!("{:-<72}", "");
    println!(
        "{:<4} {:>16} {:>16} {:>16} {:>6} {:>8}",
        "#", "Start", "Optimum", "Objective", "Iter", "Conv."
    );
    println!("{:-<72}", "");
    for (i, run) in outcome.runs.iter().enumerate() {
        println!(
            "{:<4} {:>7.1}/{:<8.1} {:>7.2}/{:<8.2} {:>16} {:>6} {:>8}{}",
            i,
            run.start.tilt,
            run.start.azimuth,
            run.best.orientation.tilt,
            run.best.orientation.azimuth,
            format_energy(run.best.objective),
            run.iterations,
            if run.converged { "yes" } else { "no" },
            if i == outcome.best_restart { " *" } else { "" },
        );
    }
    println!("{:-<72}", "");
    println!();
    println!(
        "Optimum   : {:.2}° tilt, {:.2}° azimuth (facing {})",
        best.best.orientation.tilt,
        best.best.orientation.azimuth,
        facing(best.best.orientation.azimuth)
    );
    println!("Objective : {}", format_energy(best.best.objective));
    println!(
        "Restarts  : {} converged of {} (spread {:.2}° tilt, {:.2}° azimuth)",
        outcome.converged_runs(),
        outcome.runs.len(),
        tilt_spread,
        azimuth_spread
    );
    if !best.converged {
        println!("Note: best run stopped before convergence ({:?})", best.termination);
    }
    println!();
    print_report(report);
}

/// Print the best cells of a grid sweep for each metric.
pub fn print_grid(site: &Site, table: &GridTable<EnergyReport>) {
    println!();
    println!(
        "=== Grid Sweep ({} tilts x {} azimuths) ===",
        table.tilts().len(),
        table.azimuths().len()
    );
    print_site(site);
    println!();

    let metrics: [(&str, fn(&EnergyReport) -> f64); 4] = [
        ("Generation", |r| r.total_generation_wh),
        ("Self-consumed", |r| r.self_consumption_wh),
        ("Net export", |r| r.net_export_wh),
        ("Self-suff. %", |r| r.self_consumption_pct),
    ];
    for (label, metric) in metrics {
        if let Some((o, v)) = table.map(metric).best() {
            let value = if label.ends_with('%') { format!("{v:.2}%") } else { format_energy(v) };
            println!("  {:<14}: {:>12} at {:.0}° tilt, {:.0}° azimuth", label, value, o.tilt, o.azimuth);
        }
    }
}

fn polynomial(fit: &PolynomialFit) -> String {
    let terms: Vec<String> = fit
        .coefficients
        .iter()
        .enumerate()
        .rev()
        .map(|(power, c)| match power {
            0 => format!("{c:.4}"),
            1 => format!("{c:.4}·lat"),
            _ => format!("{c:.6}·lat^{power}"),
        })
        .collect();
    format!("{} (SSR {:.3}, n = {})", terms.join(" + "), fit.residual, fit.points)
}

/// Print the optimum of every site and, when fitted, the latitude trend.
pub fn print_latitude_study(metric: ObjectiveMetric, rows: &[OptimumRow], trend: Option<&LatitudeTrend>) {
    println!();
    println!("=== Latitude Study ({}) ===", metric_label(metric));
    println!("{:<20} {:>10} {:>10} {:>10} {:>10} {:>14}", "Site", "Lat", "Lon", "Tilt", "Azimuth", "Objective");
    for row in rows {
        println!(
            "{:<20} {:>10.3} {:>10.3} {:>10.2} {:>10.2} {:>14}",
            row.site_name,
            row.latitude,
            row.longitude,
            row.tilt,
            row.azimuth,
            format_energy(row.objective)
        );
    }

    let Some(trend) = trend else {
        return;
    };
    println!();
    println!("Trend over {} sites:", trend.sites.len());
    println!("  Tilt (linear)    : {}", polynomial(&trend.tilt_linear));
    if let Some(quadratic) = &trend.tilt_quadratic {
        println!("  Tilt (quadratic) : {}", polynomial(quadratic));
    }
    println!("  Azimuth (linear) : {}", polynomial(&trend.azimuth_linear));
    if !trend.excluded.is_empty() {
        println!("  Left out         : {}", trend.excluded.join(", "));
    }
}

/// Print a modelled/measured comparison.
pub fn print_comparison(site: &Site, orientation: Orientation, comparison: &Comparison) {
    let unit = comparison.quantity.energy_unit();
    println!();
    println!("=== Validation ({}) ===", comparison.quantity);
    print_site(site);
    println!("Panel     : {:.1}° tilt, {:.1}° azimuth", orientation.tilt, orientation.azimuth);
    println!("Window    : {} to {}", comparison.start, comparison.end);
    println!("Modelled  : {:.1} {} ({} samples)", comparison.modelled, unit, comparison.modelled_samples);
    println!("Measured  : {:.1} {} ({} samples)", comparison.measured, unit, comparison.measured_samples);
    println!("Difference: {:+.2}% of modelled", comparison.percent_difference);
}

/// Render any result as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ===================== CSV SINKS =====================

/// One persisted optimum: the site and its best orientation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimumRow {
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub objective: f64,
    pub tilt: f64,
    pub azimuth: f64,
}

impl OptimumRow {
    pub fn new(site: &Site, outcome: &MultiStartOutcome) -> Self {
        let best = &outcome.best().best;
        Self {
            site_name: site.name.clone(),
            latitude: site.latitude,
            longitude: site.longitude,
            objective: best.objective,
            tilt: best.orientation.tilt,
            azimuth: best.orientation.azimuth,
        }
    }
}

/// Append-only CSV of optimum rows, without a header line.
#[derive(Debug, Clone)]
pub struct OptimumCsvSink {
    path: PathBuf,
}

impl OptimumCsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, creating the file if needed.
    pub fn append(&self, row: &OptimumRow) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;
        info!(path = %self.path.display(), site = %row.site_name, "appended optimum row");
        Ok(())
    }
}

#[derive(Serialize)]
struct GridCsvRow {
    tilt: f64,
    azimuth: f64,
    total_generation_wh: f64,
    self_consumption_wh: f64,
    net_export_wh: f64,
    self_consumption_pct: f64,
}

/// Write every grid cell with all metrics, tilt-major.
pub fn write_grid_csv(path: impl AsRef<Path>, table: &GridTable<EnergyReport>) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(path.as_ref())?);
    for row in table.rows() {
        writer.serialize(GridCsvRow {
            tilt: row.tilt,
            azimuth: row.azimuth,
            total_generation_wh: row.value.total_generation_wh,
            self_consumption_wh: row.value.self_consumption_wh,
            net_export_wh: row.value.net_export_wh,
            self_consumption_pct: row.value.self_consumption_pct,
        })?;
    }
    writer.flush()?;
    info!(path = %path.as_ref().display(), cells = table.len(), "wrote grid table");
    Ok(())
}

#[derive(Serialize)]
struct TraceCsvRow {
    restart: usize,
    iteration: usize,
    tilt: f64,
    azimuth: f64,
    objective: f64,
}

/// Write the convergence trace of every restart.
pub fn write_trace_csv(path: impl AsRef<Path>, outcome: &MultiStartOutcome) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(path.as_ref())?);
    for (restart, run) in outcome.runs.iter().enumerate() {
        for record in &run.trace.records {
            writer.serialize(TraceCsvRow {
                restart,
                iteration: record.iteration,
                tilt: record.orientation.tilt,
                azimuth: record.orientation.azimuth,
                objective: record.objective,
            })?;
        }
    }
    writer.flush()?;
    info!(path = %path.as_ref().display(), restarts = outcome.runs.len(), "wrote convergence traces");
    Ok(())
}

// ===================== TESTS =====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::{LocalSearchOptions, MultiStartOptions, SearchBounds, multi_start};
    use crate::sweep::{AxisSpec, GridSpec, grid_sweep_with};

    fn bowl(o: Orientation) -> crate::error::Result<f64> {
        Ok(10_000.0 - (o.tilt - 30.0).powi(2) - (o.azimuth - 200.0).powi(2))
    }

    fn outcome() -> MultiStartOutcome {
        multi_start(
            &bowl,
            &SearchBounds::default(),
            &LocalSearchOptions::default(),
            &MultiStartOptions::default().with_restarts(2),
        )
        .unwrap()
    }

    #[test]
    fn test_format_power_and_energy() {
        assert_eq!(format_power(512.34), "512.3 W");
        assert_eq!(format_power(4000.0), "4.00 kW");
        assert_eq!(format_power(-30.0), "-30.0 W");
        assert_eq!(format_energy(999.0), "999.0 Wh");
        assert_eq!(format_energy(1500.0), "1.50 kWh");
        assert_eq!(format_energy(2_500_000.0), "2.50 MWh");
    }

    #[test]
    fn test_facing_directions() {
        assert_eq!(facing(180.0), "south");
        assert_eq!(facing(0.0), "north");
        assert_eq!(facing(360.0), "north");
        assert_eq!(facing(90.0), "east");
        assert_eq!(facing(270.0), "west");
    }

    #[test]
    fn test_optimum_sink_appends_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OptimumCsvSink::new(dir.path().join("optima.csv"));
        let outcome = outcome();

        sink.append(&OptimumRow::new(&Site::new("Oban", 56.41, -5.47), &outcome)).unwrap();
        sink.append(&OptimumRow::new(&Site::new("Lerwick", 60.15, -1.15), &outcome)).unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2, "Expected one line per row, got {:?}", lines);
        assert!(lines[0].starts_with("Oban,56.41,-5.47,"));
        assert!(lines[1].starts_with("Lerwick,60.15,-1.15,"));

        let fields: Vec<&str> = lines[0].split(',').collect();
        assert_eq!(fields.len(), 6);
        let tilt: f64 = fields[4].parse().unwrap();
        assert!((tilt - 30.0).abs() < 0.01, "Tilt should be ~30, got {}", tilt);
    }

    #[test]
    fn test_trace_csv_has_header_and_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let outcome = outcome();

        write_trace_csv(&path, &outcome).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("restart,iteration,tilt,azimuth,objective"));
        let records: usize = outcome.runs.iter().map(|r| r.trace.len()).sum();
        assert_eq!(lines.count(), records);
    }

    #[test]
    fn test_grid_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.csv");
        let spec = GridSpec { tilt: AxisSpec::new(0.0, 30.0, 30.0), azimuth: AxisSpec::new(90.0, 270.0, 90.0) };
        let table = grid_sweep_with(&spec, false, |o| {
            Ok(EnergyReport {
                total_generation_wh: o.tilt,
                self_consumption_wh: 0.0,
                net_export_wh: 0.0,
                balance_wh: 0.0,
                total_consumption_wh: 0.0,
                self_consumption_pct: 0.0,
            })
        })
        .unwrap();

        write_grid_csv(&path, &table).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "tilt,azimuth,total_generation_wh,self_consumption_wh,net_export_wh,self_consumption_pct"
        );
        assert_eq!(lines.len(), 1 + 2 * 3);
        assert!(lines[4].starts_with("30.0,90.0,30.0"));
    }

    #[test]
    fn test_json_rendering_of_outcome() {
        let value = serde_json::to_value(outcome()).unwrap();
        assert_eq!(value["runs"].as_array().map(Vec::len), Some(2));
        assert!(value["best_restart"].is_u64());
    }
}
