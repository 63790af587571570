//! End-to-end scenarios through the public API, on clear-sky weather at the
//! case-study site.

use chrono::{Duration, TimeZone, Utc};

use pv_orient::analysis::{self, MeasuredSeries, Quantity};
use pv_orient::catalog::{InverterCatalog, ModuleCatalog};
use pv_orient::consumption::{ConstantConsumption, ConsumptionProvider};
use pv_orient::error::SimulationError;
use pv_orient::optimize::{
    LocalSearchOptions, MultiStartOptions, SearchBounds, SimulationObjective, local_search,
};
use pv_orient::series::{PowerSeries, TimeRange};
use pv_orient::simulator::{self, SimulationResult};
use pv_orient::solar::Site;
use pv_orient::sweep::{AxisSpec, GridSpec};
use pv_orient::weather::{ClearSkyProvider, WeatherProvider, WeatherSeries};
use pv_orient::{
    ArrayConfig, EnergyReport, Error, ModelChain, NegativeGeneration, ObjectiveMetric, Orientation,
    PvSimulator, Technology, grid_sweep, multi_start, self_consumption, total_energy,
};

const LATITUDE: f64 = 56.82626812132033;
const LONGITUDE: f64 = -5.787276786944142;

fn site() -> Site {
    Site::new("Case Study Site", LATITUDE, LONGITUDE)
}

fn clear_sky(days: i64, step: Duration) -> WeatherSeries {
    let start = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
    let end = start + Duration::days(days) - step;
    ClearSkyProvider::default()
        .weather(&site(), &TimeRange::new(start, end, step))
        .unwrap()
}

fn june_week() -> WeatherSeries {
    clear_sky(7, Duration::hours(1))
}

fn chain(array: &ArrayConfig) -> ModelChain {
    ModelChain::new(&site(), array, &ModuleCatalog::builtin(), &InverterCatalog::builtin()).unwrap()
}

fn demand(weather: &WeatherSeries, watts: f64) -> PowerSeries {
    ConstantConsumption(watts).consumption(weather.index())
}

#[test]
fn test_nominal_clear_sky_peak_dc() {
    let weather = clear_sky(30, Duration::minutes(5));
    let result = chain(&ArrayConfig::default())
        .simulate(Orientation::new(34.3, 180.0), &weather)
        .unwrap();

    let peak = result.dc_power.max().unwrap();
    let (lower, upper) = (1750.0 / 1.15, 1750.0 * 1.15);
    assert!(peak > lower && peak < upper, "Peak DC {:.1} W outside [{:.1}, {:.1}]", peak, lower, upper);
}

#[test]
fn test_free_function_matches_chain() {
    let weather = june_week();
    let array = ArrayConfig::default();
    let o = Orientation::new(30.0, 170.0);

    let direct: SimulationResult = simulator::simulate(
        o,
        &array,
        &weather,
        &site(),
        &ModuleCatalog::builtin(),
        &InverterCatalog::builtin(),
    )
    .unwrap();
    let via_chain = chain(&array).simulate(o, &weather).unwrap();

    assert_eq!(direct.dc_power, via_chain.dc_power);
    assert_eq!(direct.ac_power, via_chain.ac_power);
}

#[test]
fn test_zero_bifaciality_matches_monofacial() {
    let weather = june_week();
    let mono = chain(&ArrayConfig::default());
    let bi = chain(&ArrayConfig::default().with_technology(Technology::Bifacial).with_bifaciality(0.0));

    for o in [Orientation::new(34.3, 180.0), Orientation::new(70.0, 95.0), Orientation::new(10.0, 300.0)] {
        let a = mono.simulate(o, &weather).unwrap();
        let b = bi.simulate(o, &weather).unwrap();
        assert_eq!(a.dc_power, b.dc_power, "DC differs at {:?}", o);
        assert_eq!(a.ac_power, b.ac_power, "AC differs at {:?}", o);
    }
}

#[test]
fn test_flat_panel_ignores_azimuth() {
    let weather = june_week();
    let chain = chain(&ArrayConfig::default());

    let energies: Vec<f64> = [0.0, 90.0, 180.0, 270.0]
        .into_iter()
        .map(|az| total_energy(&chain.simulate(Orientation::new(0.0, az), &weather).unwrap().dc_power))
        .collect();

    for e in &energies[1..] {
        assert!((e - energies[0]).abs() < 1e-9, "Flat panel energy varies with azimuth: {:?}", energies);
    }
}

#[test]
fn test_grid_wraparound_cells_are_equal() {
    let weather = june_week();
    let chain = chain(&ArrayConfig::default());
    let consumption = demand(&weather, 0.0);
    let objective = SimulationObjective::new(&chain, &weather, &consumption, ObjectiveMetric::TotalGeneration);

    let spec = GridSpec { tilt: AxisSpec::new(0.0, 60.0, 30.0), azimuth: AxisSpec::new(0.0, 360.0, 180.0) };
    let table = grid_sweep(&objective, &spec, true).unwrap();

    for &tilt in table.tilts() {
        assert_eq!(
            table.value_at(tilt, 0.0),
            table.value_at(tilt, 360.0),
            "Azimuth 0 and 360 differ at tilt {}",
            tilt
        );
    }
    let (best, _) = table.best().unwrap();
    assert_eq!(best, Orientation::new(30.0, 180.0), "A south-facing 30° tilt beats the other cells");
}

#[test]
fn test_self_consumption_properties_on_simulated_generation() {
    let weather = june_week();
    let result = chain(&ArrayConfig::default()).simulate(Orientation::new(34.3, 180.0), &weather).unwrap();

    // No demand: nothing is self-consumed once the night tare is clamped
    let none = demand(&weather, 0.0);
    let report = EnergyReport::from_simulation(&result, &none, NegativeGeneration::ClampToZero).unwrap();
    assert_eq!(report.self_consumption_wh, 0.0);
    assert_eq!(self_consumption(&result.dc_power, &none, NegativeGeneration::Keep).unwrap(), 0.0);

    // Demand above peak generation: all generation is self-consumed
    let heavy = demand(&weather, 10_000.0);
    let dc = &result.dc_power;
    assert_eq!(dc.values().first(), Some(&0.0));
    assert_eq!(dc.values().last(), Some(&0.0));
    let sc = self_consumption(dc, &heavy, NegativeGeneration::Keep).unwrap();
    let total = total_energy(dc);
    assert!((sc - total).abs() < 1e-9 * total, "{} != {}", sc, total);

    // Night tare is negative generation the policy decides about
    let keep = self_consumption(&result.ac_power, &heavy, NegativeGeneration::Keep).unwrap();
    let clamp = self_consumption(&result.ac_power, &heavy, NegativeGeneration::ClampToZero).unwrap();
    assert!(keep < clamp, "Keeping the night tare should lower self-consumption");
}

#[test]
fn test_misaligned_consumption_is_rejected() {
    let weather = june_week();
    let result = chain(&ArrayConfig::default()).simulate(Orientation::new(34.3, 180.0), &weather).unwrap();
    let short = demand(&clear_sky(6, Duration::hours(1)), 500.0);

    let err = EnergyReport::from_simulation(&result, &short, NegativeGeneration::Keep).unwrap_err();
    assert!(matches!(err, pv_orient::error::SeriesError::Misaligned { .. }));
}

#[test]
fn test_multi_start_finds_south_facing_optimum() {
    let weather = june_week();
    let chain = chain(&ArrayConfig::default());
    let consumption = demand(&weather, 0.0);
    let objective = SimulationObjective::new(&chain, &weather, &consumption, ObjectiveMetric::TotalGeneration);

    let outcome = multi_start(
        &objective,
        &SearchBounds::default(),
        &LocalSearchOptions::default(),
        &MultiStartOptions::default().with_restarts(3).with_seed(1).with_parallel(true),
    )
    .unwrap();

    let best = outcome.best().best;
    assert!((10.0..=35.0).contains(&best.orientation.tilt), "Tilt {:.2}", best.orientation.tilt);
    assert!((170.0..=196.0).contains(&best.orientation.azimuth), "Azimuth {:.2}", best.orientation.azimuth);

    let flat = total_energy(&chain.simulate(Orientation::new(0.0, 180.0), &weather).unwrap().dc_power)
        * weather.index().step_hours();
    assert!(best.objective > flat, "Optimum {:.0} Wh should beat flat {:.0} Wh", best.objective, flat);
}

/// Simulator that refuses steep panels.
struct SteepLimit {
    inner: ModelChain,
    max_tilt: f64,
}

impl PvSimulator for SteepLimit {
    fn simulate(
        &self,
        orientation: Orientation,
        weather: &WeatherSeries,
    ) -> Result<SimulationResult, SimulationError> {
        if orientation.tilt > self.max_tilt {
            return Err(SimulationError::InvalidOrientation {
                tilt: orientation.tilt,
                azimuth: orientation.azimuth,
            });
        }
        self.inner.simulate(orientation, weather)
    }
}

#[test]
fn test_failed_evaluation_reports_orientation() {
    let weather = june_week();
    let simulator = SteepLimit { inner: chain(&ArrayConfig::default()), max_tilt: 60.0 };
    let consumption = demand(&weather, 0.0);
    let objective =
        SimulationObjective::new(&simulator, &weather, &consumption, ObjectiveMetric::TotalGeneration);

    let err = local_search(
        &objective,
        Orientation::new(80.0, 180.0),
        &SearchBounds::default(),
        &LocalSearchOptions::default(),
    )
    .unwrap_err();

    assert_eq!(err.failed_orientation(), Some((80.0, 180.0)));
    match err {
        Error::Evaluation { source, .. } => {
            assert!(matches!(*source, Error::Simulation(SimulationError::InvalidOrientation { .. })))
        }
        other => panic!("Expected an evaluation error, got {other}"),
    }
}

#[test]
fn test_unknown_catalog_entry_fails_fast() {
    let array = ArrayConfig::default().with_module("No_Such_Module");
    let err = ModelChain::new(&site(), &array, &ModuleCatalog::builtin(), &InverterCatalog::builtin())
        .unwrap_err();
    assert!(matches!(err, SimulationError::Catalog(_)), "{err}");
}

#[test]
fn test_validation_against_own_output_matches() {
    let weather = june_week();
    let result = chain(&ArrayConfig::default()).simulate(Orientation::new(34.3, 180.0), &weather).unwrap();

    let mut csv = String::from("timestamp,value\n");
    for (t, v) in result.ac_power.iter().skip(24).take(48) {
        csv.push_str(&format!("{},{}\n", t.to_rfc3339(), v));
    }
    let measured = MeasuredSeries::from_reader(csv.as_bytes()).unwrap();

    let comparison = analysis::compare(Quantity::AcPower, &result.ac_power, &measured).unwrap();
    assert_eq!(comparison.modelled_samples, 48);
    assert!(comparison.percent_difference.abs() < 1e-9, "{:?}", comparison);

    let ghi = analysis::compare(Quantity::Ghi, &Quantity::Ghi.select(&weather, &result), &measured).unwrap();
    assert!(ghi.modelled > 0.0);
}
