//! Command-Line Interface Module
//!
//! Argument parsing and validation for the pv-orient binary. Study settings
//! come from the TOML file; flags here override single values for one run.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use pv_orient::analysis::Quantity;

// ===================== CLI =====================

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Study configuration file (TOML)
    #[arg(long, short, global = true, env = "PV_ORIENT_CONFIG", default_value = "pv-orient.toml")]
    pub config: PathBuf,

    /// Print results as JSON instead of terminal tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate the array at one orientation and report its energy
    Simulate {
        /// Panel tilt in degrees (0 = flat/horizontal, 90 = vertical)
        #[arg(long, default_value_t = 35.0, value_parser = parse_tilt)]
        tilt: f64,
        /// Panel azimuth in degrees (180 = facing south)
        #[arg(long, default_value_t = 180.0, value_parser = parse_azimuth)]
        azimuth: f64,
    },

    /// Search the best orientation with restarted local searches
    Optimize {
        #[command(flatten)]
        search: SearchOverrides,
        /// Write convergence traces of every restart to this CSV
        #[arg(long)]
        trace_csv: Option<PathBuf>,
    },

    /// Evaluate every cell of the tilt/azimuth grid
    Sweep {
        /// Tilt axis: "MIN-MAX:STEP" (e.g., "0-90:3")
        #[arg(long, value_parser = parse_axis)]
        tilt_axis: Option<(f64, f64, f64)>,
        /// Azimuth axis: "MIN-MAX:STEP" (e.g., "0-360:5")
        #[arg(long, value_parser = parse_axis)]
        azimuth_axis: Option<(f64, f64, f64)>,
        /// Evaluate cells on all cores
        #[arg(long)]
        parallel: bool,
        /// Write every cell to this CSV
        #[arg(long)]
        grid_csv: Option<PathBuf>,
    },

    /// Optimize every site of a CSV (name,latitude,longitude), append the optima
    /// and fit their trend against latitude
    LatitudeStudy {
        /// Sites to optimize
        #[arg(long)]
        sites: PathBuf,
        #[command(flatten)]
        search: SearchOverrides,
    },

    /// Compare a modelled quantity with measurements (timestamp,value CSV)
    Validate {
        /// Measured series
        #[arg(long)]
        measured: PathBuf,
        /// Compared quantity: ghi, dc or ac
        #[arg(long, default_value = "ac")]
        quantity: Quantity,
        /// Panel tilt in degrees
        #[arg(long, default_value_t = 35.0, value_parser = parse_tilt)]
        tilt: f64,
        /// Panel azimuth in degrees
        #[arg(long, default_value_t = 180.0, value_parser = parse_azimuth)]
        azimuth: f64,
    },
}

/// Per-run overrides of the `[search]` and `[output]` sections.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct SearchOverrides {
    /// Number of restarts (the first starts from the initial guess)
    #[arg(long, value_parser = parse_restarts)]
    pub restarts: Option<usize>,
    /// Seed for the random starting points
    #[arg(long)]
    pub seed: Option<u64>,
    /// Run restarts on all cores
    #[arg(long)]
    pub parallel: bool,
    /// Tilt range constraint: "MIN-MAX" (e.g., "20-60" limits tilt to 20°-60°)
    #[arg(long, value_parser = parse_range)]
    pub tilt_range: Option<(f64, f64)>,
    /// Azimuth range constraint: "MIN-MAX" (e.g., "150-210")
    #[arg(long, value_parser = parse_range)]
    pub azimuth_range: Option<(f64, f64)>,
    /// Append the optimum row to this CSV
    #[arg(long)]
    pub optimum_csv: Option<PathBuf>,
}

// ===================== CLI VALUE PARSERS =====================

fn parse_tilt(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=90.0).contains(&v) {
        return Err(format!("Tilt must be between 0 and 90 degrees, got {}", v));
    }
    Ok(v)
}

fn parse_azimuth(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=360.0).contains(&v) {
        return Err(format!("Azimuth must be between 0 and 360 degrees, got {}", v));
    }
    Ok(v)
}

fn parse_restarts(s: &str) -> Result<usize, String> {
    let v: usize = s.parse().map_err(|_| format!("Invalid integer: {}", s))?;
    if v == 0 {
        return Err("At least one restart is required".to_string());
    }
    Ok(v)
}

fn parse_range(s: &str) -> Result<(f64, f64), String> {
    let (min, max) = s
        .split_once('-')
        .ok_or_else(|| format!("Range must be in format MIN-MAX (e.g., '20-60'), got '{}'", s))?;
    let min: f64 = min.parse().map_err(|_| format!("Invalid minimum value: {}", min))?;
    let max: f64 = max.parse().map_err(|_| format!("Invalid maximum value: {}", max))?;
    if min > max {
        return Err(format!("Minimum ({}) cannot be greater than maximum ({})", min, max));
    }
    Ok((min, max))
}

fn parse_axis(s: &str) -> Result<(f64, f64, f64), String> {
    let (range, step) = s
        .split_once(':')
        .ok_or_else(|| format!("Axis must be in format MIN-MAX:STEP (e.g., '0-90:3'), got '{}'", s))?;
    let (min, max) = parse_range(range)?;
    let step: f64 = step.parse().map_err(|_| format!("Invalid step: {}", step))?;
    if step <= 0.0 {
        return Err(format!("Step must be positive, got {}", step));
    }
    Ok((min, max, step))
}

// ===================== TESTS =====================
