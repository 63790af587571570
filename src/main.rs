use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Args, Command, SearchOverrides};
use pv_orient::analysis::{self, LatitudeTrend, MeasuredSeries};
use pv_orient::catalog::{InverterCatalog, ModuleCatalog};
use pv_orient::config::{StudyConfig, load_sites};
use pv_orient::energy::EnergyReport;
use pv_orient::optimize::{self, MultiStartOutcome, SimulationObjective};
use pv_orient::output::{self, OptimumCsvSink, OptimumRow};
use pv_orient::series::PowerSeries;
use pv_orient::simulator::{ModelChain, Orientation, PvSimulator};
use pv_orient::solar::Site;
use pv_orient::sweep::{self, AxisSpec};
use pv_orient::weather::WeatherSeries;

// ===================== MAIN =====================

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "pv_orient=debug" } else { "pv_orient=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = StudyConfig::load(&args.config)
        .with_context(|| format!("Failed to load study {}", args.config.display()))?;
    let (modules, inverters) = config.catalogs().context("Failed to load catalogs")?;

    match args.command {
        Command::Simulate { tilt, azimuth } => {
            let inputs = StudyInputs::prepare(&config, &config.site, &modules, &inverters)?;
            let orientation = Orientation::new(tilt, azimuth);
            let result = inputs
                .chain
                .simulate(orientation, &inputs.weather)
                .with_context(|| format!("Simulation at tilt {tilt}°, azimuth {azimuth}° failed"))?;
            let report = EnergyReport::from_simulation(&result, &inputs.consumption, config.report_policy()?)?;

            if args.json {
                output::print_json(&SimulationSummary { site: &config.site, orientation, report })?;
            } else {
                output::print_simulation(&config.site, inputs.chain.array(), orientation, &result, &report);
            }
        }

        Command::Optimize { search, trace_csv } => {
            apply_search_overrides(&mut config, &search);
            let inputs = StudyInputs::prepare(&config, &config.site, &modules, &inverters)?;
            let (outcome, report) = optimize_site(&config, &inputs)?;

            persist_optimum(&config, &config.site, &outcome)?;
            if let Some(path) = trace_csv.as_ref().or(config.output.trace_csv.as_ref()) {
                output::write_trace_csv(path, &outcome)
                    .with_context(|| format!("Failed to write traces to {}", path.display()))?;
            }

            if args.json {
                output::print_json(&OptimumSummary { site: &config.site, outcome: &outcome, report })?;
            } else {
                output::print_optimum(&config.site, config.objective_metric()?, &outcome, &report);
            }
        }

        Command::Sweep { tilt_axis, azimuth_axis, parallel, grid_csv } => {
            if let Some((min, max, step)) = tilt_axis {
                config.grid.tilt = AxisSpec::new(min, max, step);
            }
            if let Some((min, max, step)) = azimuth_axis {
                config.grid.azimuth = AxisSpec::new(min, max, step);
            }
            let inputs = StudyInputs::prepare(&config, &config.site, &modules, &inverters)?;
            let objective = inputs.objective(&config)?;
            let policy = config.report_policy()?;

            let table = sweep::grid_sweep_with(&config.grid, parallel || config.search.parallel, |o| {
                objective.report(o, policy)
            })
            .context("Grid sweep aborted")?;

            if let Some(path) = grid_csv.as_ref().or(config.output.grid_csv.as_ref()) {
                output::write_grid_csv(path, &table)
                    .with_context(|| format!("Failed to write grid to {}", path.display()))?;
            }

            if args.json {
                let rows: Vec<_> = table.rows().collect();
                output::print_json(&rows)?;
            } else {
                output::print_grid(&config.site, &table);
            }
        }

        Command::LatitudeStudy { sites, search } => {
            apply_search_overrides(&mut config, &search);
            if config.output.optimum_csv.is_none() {
                warn!("no optimum_csv configured; latitude study results are only printed");
            }
            let sites = load_sites(&sites)
                .with_context(|| format!("Failed to read sites from {}", sites.display()))?;

            let mut rows = Vec::with_capacity(sites.len());
            for site in &sites {
                let inputs = StudyInputs::prepare(&config, site, &modules, &inverters)?;
                let (outcome, _) = optimize_site(&config, &inputs)
                    .with_context(|| format!("Optimization failed for site {}", site.name))?;
                persist_optimum(&config, site, &outcome)?;
                rows.push(OptimumRow::new(site, &outcome));
            }

            let trend = match analysis::latitude_trend(&rows, &config.bounds()) {
                Ok(trend) => Some(trend),
                Err(e) => {
                    warn!(error = %e, "no latitude trend fitted");
                    None
                }
            };

            if args.json {
                output::print_json(&LatitudeSummary { rows: &rows, trend: trend.as_ref() })?;
            } else {
                output::print_latitude_study(config.objective_metric()?, &rows, trend.as_ref());
            }
        }

        Command::Validate { measured, quantity, tilt, azimuth } => {
            let inputs = StudyInputs::prepare(&config, &config.site, &modules, &inverters)?;
            let orientation = Orientation::new(tilt, azimuth);
            let result = inputs
                .chain
                .simulate(orientation, &inputs.weather)
                .with_context(|| format!("Simulation at tilt {tilt}°, azimuth {azimuth}° failed"))?;
            let measurements = MeasuredSeries::from_path(&measured)
                .with_context(|| format!("Failed to read measurements from {}", measured.display()))?;
            let comparison =
                analysis::compare(quantity, &quantity.select(&inputs.weather, &result), &measurements)?;

            if args.json {
                output::print_json(&comparison)?;
            } else {
                output::print_comparison(&config.site, orientation, &comparison);
            }
        }
    }

    Ok(())
}

// ===================== STUDY PLUMBING =====================

/// Weather, demand and the resolved model chain of one site.
struct StudyInputs {
    chain: ModelChain,
    weather: WeatherSeries,
    consumption: PowerSeries,
}

impl StudyInputs {
    fn prepare(
        config: &StudyConfig,
        site: &Site,
        modules: &ModuleCatalog,
        inverters: &InverterCatalog,
    ) -> Result<Self> {
        let range = config.time_range();
        let weather = config
            .weather_provider()?
            .weather(site, &range)
            .with_context(|| format!("Failed to build weather for {}", site.name))?;
        let consumption = config.consumption_provider().consumption(weather.index());
        let chain = ModelChain::new(site, &config.array, modules, inverters)
            .with_context(|| format!("Invalid array for {}", site.name))?;

        info!(
            site = %site.name,
            samples = weather.len(),
            rated_w = chain.rated_dc_power(),
            "prepared study inputs"
        );
        Ok(Self { chain, weather, consumption })
    }

    fn objective(&self, config: &StudyConfig) -> Result<SimulationObjective<'_, ModelChain>> {
        Ok(SimulationObjective::new(
            &self.chain,
            &self.weather,
            &self.consumption,
            config.objective_metric()?,
        ))
    }
}

fn apply_search_overrides(config: &mut StudyConfig, search: &SearchOverrides) {
    if let Some(restarts) = search.restarts {
        config.search.restarts = restarts;
    }
    if let Some(seed) = search.seed {
        config.search.seed = seed;
    }
    config.search.parallel |= search.parallel;
    if let Some((min, max)) = search.tilt_range {
        config.search.tilt_range = Some([min, max]);
    }
    if let Some((min, max)) = search.azimuth_range {
        config.search.azimuth_range = Some([min, max]);
    }
    if search.optimum_csv.is_some() {
        config.output.optimum_csv = search.optimum_csv.clone();
    }
}

fn optimize_site(config: &StudyConfig, inputs: &StudyInputs) -> Result<(MultiStartOutcome, EnergyReport)> {
    let objective = inputs.objective(config)?;
    let outcome = optimize::multi_start(
        &objective,
        &config.bounds(),
        &config.local_search_options(),
        &config.multi_start_options(),
    )?;
    let report = objective.report(outcome.best().best.orientation, config.report_policy()?)?;
    Ok((outcome, report))
}

fn persist_optimum(config: &StudyConfig, site: &Site, outcome: &MultiStartOutcome) -> Result<()> {
    if let Some(path) = &config.output.optimum_csv {
        OptimumCsvSink::new(path)
            .append(&OptimumRow::new(site, outcome))
            .with_context(|| format!("Failed to append optimum to {}", path.display()))?;
    }
    Ok(())
}

// ===================== JSON SUMMARIES =====================

#[derive(Serialize)]
struct SimulationSummary<'a> {
    site: &'a Site,
    orientation: Orientation,
    report: EnergyReport,
}

#[derive(Serialize)]
struct LatitudeSummary<'a> {
    rows: &'a [OptimumRow],
    trend: Option<&'a LatitudeTrend>,
}

#[derive(Serialize)]
struct OptimumSummary<'a> {
    site: &'a Site,
    outcome: &'a MultiStartOutcome,
    report: EnergyReport,
}
