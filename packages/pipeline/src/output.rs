//! Result writers.
//!
//! Every table is a flat CSV so downstream reporting can load it without
//! knowing the engine's types; the run summary is pretty-printed JSON.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use serde::Serialize;
use upzone_parcel_models::{
    CalibrationSource, ConstructionType, MarketContext, NeighborhoodProfile, Parcel,
    ParcelEvaluation, ParcelId, PropertyCategory, Scenario,
};

use crate::{PipelineError, PipelineOutput};

pub const PARCEL_SCENARIOS_FILE: &str = "parcel_scenarios.csv";
pub const PARCEL_HBU_FILE: &str = "parcel_hbu.csv";
pub const NEIGHBORHOOD_SCENARIOS_FILE: &str = "neighborhood_scenarios.csv";
pub const NEIGHBORHOOD_PROFILES_FILE: &str = "neighborhood_profiles.csv";
pub const MARKET_CONTEXT_FILE: &str = "market_context.csv";
pub const RUN_SUMMARY_FILE: &str = "run_summary.json";

#[derive(Serialize)]
struct ScenarioRow<'a> {
    pin: &'a str,
    neighborhood: &'a str,
    zone_class: &'a str,
    scenario: Scenario,
    raw_capacity: u32,
    capacity: u32,
    far: f64,
    efficiency: f64,
    gross_floor_area: f64,
    net_rentable_area: f64,
    construction: ConstructionType,
    inherited: bool,
    inherited_from: Option<Scenario>,
    acquisition_cost: f64,
    cost_per_sqft: f64,
    construction_cost: f64,
    total_cost: f64,
    revenue: f64,
    profit: f64,
    feasible: bool,
    gate_zoning_class: bool,
    gate_property_use: bool,
    gate_existing_units: bool,
    gate_age_or_value: bool,
    gate_unit_multiple: bool,
    gate_floor_area_multiple: bool,
    gate_lot_density: bool,
    gate_lot_size: bool,
    all_gates: bool,
    unit_yield: u32,
    regime_scenario: Option<Scenario>,
    regime_yield: u32,
}

#[derive(Serialize)]
struct HbuRow<'a> {
    pin: &'a str,
    members: String,
    parcels_combined: u32,
    neighborhood: &'a str,
    zone_class: &'a str,
    lot_area_sqft: f64,
    address: Option<&'a str>,
    owner_name: Option<&'a str>,
    property_class: Option<&'a str>,
    category: PropertyCategory,
    tax_pin_count: u32,
    existing_units: u32,
    building_age: Option<u32>,
    existing_sqft: f64,
    building_value: f64,
    land_value: f64,
    rail_short: bool,
    rail_long: bool,
    brt_short: bool,
    brt_long: bool,
    bus_routes: usize,
    high_frequency_routes: usize,
    market_stratum: String,
    multiplier: f64,
    multiplier_source: CalibrationSource,
    price_per_sqft: f64,
    price_source: CalibrationSource,
    hbu_scenario: Scenario,
    hbu_units: u32,
    hbu_profit: f64,
}

#[derive(Serialize)]
struct ProfileRow<'a> {
    neighborhood: &'a str,
    total_parcels: u64,
    total_area_sqft: f64,
    multifamily_zoned_parcels: u64,
    multifamily_zoned_area_sqft: f64,
    hbu_units: u64,
    hbu_current: u64,
    hbu_baseline_upzoning: u64,
    hbu_transit_train_and_hf_bus: u64,
    hbu_transit_train_and_bus_combo: u64,
    hbu_transit_train_only: u64,
    hbu_transit_full: u64,
}

#[derive(Serialize)]
struct MarketRow<'a> {
    neighborhood: &'a str,
    stratum: String,
    multiplier: f64,
    multiplier_source: CalibrationSource,
    multiplier_sample: usize,
    price_per_sqft: f64,
    price_source: CalibrationSource,
    price_sample: usize,
}

fn scenario_rows(evaluation: &ParcelEvaluation) -> impl Iterator<Item = ScenarioRow<'_>> {
    evaluation.results.iter().map(move |result| {
        let envelope = &result.envelope;
        let gates = &result.gates;
        let regime = evaluation.regimes.get(&result.scenario);
        ScenarioRow {
            pin: evaluation.pin.as_str(),
            neighborhood: &evaluation.neighborhood,
            zone_class: &evaluation.zone_class,
            scenario: result.scenario,
            raw_capacity: envelope.raw_capacity,
            capacity: envelope.capacity,
            far: envelope.far,
            efficiency: envelope.efficiency,
            gross_floor_area: envelope.gross_floor_area,
            net_rentable_area: envelope.net_rentable_area,
            construction: envelope.construction,
            inherited: envelope.inherited_from.is_some(),
            inherited_from: envelope.inherited_from,
            acquisition_cost: result.acquisition_cost,
            cost_per_sqft: result.cost_per_sqft,
            construction_cost: result.construction_cost,
            total_cost: result.total_cost,
            revenue: result.revenue,
            profit: result.profit,
            feasible: result.feasible,
            gate_zoning_class: gates.zoning_class,
            gate_property_use: gates.property_use,
            gate_existing_units: gates.existing_units,
            gate_age_or_value: gates.age_or_value,
            gate_unit_multiple: gates.unit_multiple,
            gate_floor_area_multiple: gates.floor_area_multiple,
            gate_lot_density: gates.lot_density,
            gate_lot_size: gates.lot_size,
            all_gates: gates.all_pass(),
            unit_yield: result.unit_yield,
            regime_scenario: regime.map(|decision| decision.scenario),
            regime_yield: regime.map_or(0, |decision| decision.unit_yield),
        }
    })
}

fn hbu_row<'a>(lot: &'a Parcel, evaluation: &'a ParcelEvaluation) -> HbuRow<'a> {
    let existing = &lot.characteristics;
    let market = &evaluation.market;
    HbuRow {
        pin: lot.pin.as_str(),
        members: lot
            .members
            .iter()
            .map(ParcelId::as_str)
            .collect::<Vec<_>>()
            .join(";"),
        parcels_combined: lot.parcels_combined,
        neighborhood: &lot.neighborhood,
        zone_class: &lot.zone_class,
        lot_area_sqft: lot.lot_area_sqft,
        address: existing.address.as_deref(),
        owner_name: existing.owner_name.as_deref(),
        property_class: existing.property_class.as_deref(),
        category: existing.category(),
        tax_pin_count: existing.tax_pin_count,
        existing_units: existing.existing_units,
        building_age: existing.building_age,
        existing_sqft: existing.existing_sqft,
        building_value: existing.building_value,
        land_value: existing.land_value,
        rail_short: lot.transit.rail_short,
        rail_long: lot.transit.rail_long,
        brt_short: lot.transit.brt_short,
        brt_long: lot.transit.brt_long,
        bus_routes: lot.transit.bus_route_count(),
        high_frequency_routes: lot.transit.high_frequency_route_count(),
        market_stratum: market.stratum.to_string(),
        multiplier: market.multiplier,
        multiplier_source: market.multiplier_source,
        price_per_sqft: market.price_per_sqft,
        price_source: market.price_source,
        hbu_scenario: evaluation.hbu.scenario,
        hbu_units: evaluation.hbu.unit_yield,
        hbu_profit: evaluation.hbu.profit,
    }
}

fn profile_row(profile: &NeighborhoodProfile) -> ProfileRow<'_> {
    let count = |scenario: Scenario| {
        profile
            .hbu_scenarios
            .get(&scenario)
            .copied()
            .unwrap_or(0)
    };
    ProfileRow {
        neighborhood: &profile.neighborhood,
        total_parcels: profile.total_parcels,
        total_area_sqft: profile.total_area_sqft,
        multifamily_zoned_parcels: profile.multifamily_zoned_parcels,
        multifamily_zoned_area_sqft: profile.multifamily_zoned_area_sqft,
        hbu_units: profile.hbu_units,
        hbu_current: count(Scenario::Current),
        hbu_baseline_upzoning: count(Scenario::BaselineUpzoning),
        hbu_transit_train_and_hf_bus: count(Scenario::TransitTrainAndHfBus),
        hbu_transit_train_and_bus_combo: count(Scenario::TransitTrainAndBusCombo),
        hbu_transit_train_only: count(Scenario::TransitTrainOnly),
        hbu_transit_full: count(Scenario::TransitFull),
    }
}

fn market_row(context: &MarketContext) -> MarketRow<'_> {
    MarketRow {
        neighborhood: &context.neighborhood,
        stratum: context.stratum.to_string(),
        multiplier: context.multiplier,
        multiplier_source: context.multiplier_source,
        multiplier_sample: context.multiplier_sample,
        price_per_sqft: context.price_per_sqft,
        price_source: context.price_source,
        price_sample: context.price_sample,
    }
}

fn write_csv<T: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<usize, PipelineError> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush().map_err(|source| PipelineError::Write {
        path: path.display().to_string(),
        source,
    })?;
    log::debug!("Wrote {count} rows to {}", path.display());
    Ok(count)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let write_error = |source| PipelineError::Write {
        path: path.display().to_string(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(write_error)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(write_error)
}

/// Writes every output table into `dir`, creating it if needed.
///
/// Returns the paths written, in a fixed order.
///
/// # Errors
///
/// * [`PipelineError::Write`] if the directory or a file cannot be written
/// * [`PipelineError::Csv`] or [`PipelineError::Json`] if a row fails to
///   serialize
pub fn write_outputs(dir: &Path, output: &PipelineOutput) -> Result<Vec<PathBuf>, PipelineError> {
    std::fs::create_dir_all(dir).map_err(|source| PipelineError::Write {
        path: dir.display().to_string(),
        source,
    })?;

    let scenarios_path = dir.join(PARCEL_SCENARIOS_FILE);
    write_csv(
        &scenarios_path,
        output.evaluations.iter().flat_map(scenario_rows),
    )?;

    let hbu_path = dir.join(PARCEL_HBU_FILE);
    write_csv(
        &hbu_path,
        output
            .lots
            .iter()
            .zip(&output.evaluations)
            .map(|(lot, evaluation)| hbu_row(lot, evaluation)),
    )?;

    let neighborhoods_path = dir.join(NEIGHBORHOOD_SCENARIOS_FILE);
    write_csv(&neighborhoods_path, &output.aggregates)?;

    let profiles_path = dir.join(NEIGHBORHOOD_PROFILES_FILE);
    write_csv(&profiles_path, output.profiles.iter().map(profile_row))?;

    let market_path = dir.join(MARKET_CONTEXT_FILE);
    write_csv(&market_path, output.market.iter().map(market_row))?;

    let summary_path = dir.join(RUN_SUMMARY_FILE);
    write_json(&summary_path, &output.summary)?;

    log::info!("Wrote results to {}", dir.display());

    Ok(vec![
        scenarios_path,
        hbu_path,
        neighborhoods_path,
        profiles_path,
        market_path,
        summary_path,
    ])
}

#[cfg(test)]
mod tests {
    use upzone_config::EngineConfig;

    use super::*;
    use crate::test_support::tables;
    use crate::{null_progress, run_tables};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("upzone-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn summary_json_round_trips_through_the_file() {
        let output = run_tables(&tables(), &EngineConfig::default(), &null_progress()).unwrap();
        let dir = scratch_dir("summary");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(RUN_SUMMARY_FILE);
        write_json(&path, &output.summary).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["lots_evaluated"], output.summary.lots_evaluated);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn summary_flush_failure_is_reported() {
        let output = run_tables(&tables(), &EngineConfig::default(), &null_progress()).unwrap();
        let result = write_json(Path::new("/dev/full"), &output.summary);
        assert!(matches!(result, Err(PipelineError::Write { .. })));
    }

    #[test]
    fn writes_every_table() {
        let output = run_tables(&tables(), &EngineConfig::default(), &null_progress()).unwrap();
        let dir = scratch_dir("outputs");
        let written = write_outputs(&dir, &output).unwrap();

        assert_eq!(written.len(), 6);
        assert!(written.iter().all(|path| path.is_file()));

        let scenarios = std::fs::read_to_string(dir.join(PARCEL_SCENARIOS_FILE)).unwrap();
        let lines: Vec<&str> = scenarios.lines().collect();
        assert_eq!(lines.len(), 1 + output.evaluations.len() * Scenario::ALL.len());
        assert!(lines[0].starts_with("pin,neighborhood,zone_class,scenario,"));
        assert!(lines[1].starts_with("1428322044,AUSTIN,RS-3,current,"));

        let hbu = std::fs::read_to_string(dir.join(PARCEL_HBU_FILE)).unwrap();
        assert_eq!(hbu.lines().count(), 1 + output.lots.len());
        assert!(hbu.contains("5000 W MADISON ST"));

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.join(RUN_SUMMARY_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["snapshot_date"], "2024-12-31");
        assert_eq!(summary["degraded_market"], true);
        assert_eq!(summary["lots_evaluated"], 3);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn inherited_envelopes_are_flagged() {
        let output = run_tables(&tables(), &EngineConfig::default(), &null_progress()).unwrap();
        let rows: Vec<ScenarioRow<'_>> =
            output.evaluations.iter().flat_map(scenario_rows).collect();

        // No transit nearby, so every transit scenario carries the baseline envelope.
        for row in rows.iter().filter(|row| row.scenario == Scenario::TransitFull) {
            assert!(row.inherited);
            assert_eq!(row.inherited_from, Some(Scenario::BaselineUpzoning));
            assert!(row.regime_scenario.is_some());
        }
    }

    #[test]
    fn profile_row_spreads_hbu_histogram() {
        let profile = NeighborhoodProfile {
            neighborhood: "AUSTIN".to_string(),
            total_parcels: 3,
            total_area_sqft: 15_000.0,
            multifamily_zoned_parcels: 0,
            multifamily_zoned_area_sqft: 0.0,
            hbu_units: 7,
            hbu_scenarios: [(Scenario::Current, 1), (Scenario::TransitFull, 2)]
                .into_iter()
                .collect(),
        };
        let row = profile_row(&profile);
        assert_eq!(row.hbu_current, 1);
        assert_eq!(row.hbu_baseline_upzoning, 0);
        assert_eq!(row.hbu_transit_full, 2);
    }
}
