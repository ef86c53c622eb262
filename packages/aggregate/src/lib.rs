#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Neighborhood rollups of parcel evaluations.
//!
//! Both tables are pure reductions over the evaluated parcels. A
//! neighborhood whose regime yield is zero under every scenario of
//! interest is left out of both.

use std::collections::{BTreeMap, BTreeSet};

use upzone_config::EngineConfig;
use upzone_parcel_models::{NeighborhoodAggregate, NeighborhoodProfile, ParcelEvaluation, Scenario};

#[derive(Default)]
struct ScenarioAccum {
    parcels: u64,
    building_parcels: u64,
    total_units: u64,
    marginal_over_current: i64,
    marginal_over_baseline: i64,
}

/// Neighborhoods with a non-zero regime yield under at least one scenario
/// of interest.
fn producing_neighborhoods<'a>(
    evaluations: &'a [ParcelEvaluation],
    config: &EngineConfig,
) -> BTreeSet<&'a str> {
    let scenarios = config.aggregate.scenarios();
    evaluations
        .iter()
        .filter(|evaluation| scenarios.iter().any(|s| evaluation.regime_yield(*s) > 0))
        .map(|evaluation| evaluation.neighborhood.as_str())
        .collect()
}

/// Per-neighborhood, per-scenario totals, sorted by neighborhood then
/// scenario.
///
/// Yields are regime outcomes: the units a parcel delivers when that
/// scenario is the law in force.
#[must_use]
pub fn aggregate(
    evaluations: &[ParcelEvaluation],
    config: &EngineConfig,
) -> Vec<NeighborhoodAggregate> {
    let keep = producing_neighborhoods(evaluations, config);
    let mut totals: BTreeMap<(&str, Scenario), ScenarioAccum> = BTreeMap::new();

    for evaluation in evaluations {
        let neighborhood = evaluation.neighborhood.as_str();
        if !keep.contains(neighborhood) {
            continue;
        }

        let current = i64::from(evaluation.regime_yield(Scenario::Current));
        let baseline = i64::from(evaluation.regime_yield(Scenario::BaselineUpzoning));

        for scenario in Scenario::ALL {
            let units = evaluation.regime_yield(scenario);
            let entry = totals.entry((neighborhood, scenario)).or_default();
            entry.parcels += 1;
            if units > 0 {
                entry.building_parcels += 1;
            }
            entry.total_units += u64::from(units);
            entry.marginal_over_current += i64::from(units) - current;
            entry.marginal_over_baseline += i64::from(units) - baseline;
        }
    }

    let rows: Vec<NeighborhoodAggregate> = totals
        .into_iter()
        .map(|((neighborhood, scenario), accum)| NeighborhoodAggregate {
            neighborhood: neighborhood.to_string(),
            scenario,
            parcels: accum.parcels,
            building_parcels: accum.building_parcels,
            total_units: accum.total_units,
            marginal_over_current: accum.marginal_over_current,
            marginal_over_baseline: accum.marginal_over_baseline,
        })
        .collect();

    log::info!(
        "Aggregated {} parcels into {} neighborhood rows across {} neighborhoods",
        evaluations.len(),
        rows.len(),
        keep.len(),
    );

    rows
}

/// Scenario-independent profile of each producing neighborhood, sorted by
/// name.
#[must_use]
pub fn profiles(
    evaluations: &[ParcelEvaluation],
    config: &EngineConfig,
) -> Vec<NeighborhoodProfile> {
    let keep = producing_neighborhoods(evaluations, config);
    let mut profiles: BTreeMap<&str, NeighborhoodProfile> = BTreeMap::new();

    for evaluation in evaluations {
        let neighborhood = evaluation.neighborhood.as_str();
        if !keep.contains(neighborhood) {
            continue;
        }

        let profile = profiles
            .entry(neighborhood)
            .or_insert_with(|| NeighborhoodProfile {
                neighborhood: neighborhood.to_string(),
                total_parcels: 0,
                total_area_sqft: 0.0,
                multifamily_zoned_parcels: 0,
                multifamily_zoned_area_sqft: 0.0,
                hbu_units: 0,
                hbu_scenarios: BTreeMap::new(),
            });

        profile.total_parcels += 1;
        profile.total_area_sqft += evaluation.lot_area_sqft;
        if config.zoning.is_multifamily_zoned(&evaluation.zone_class) {
            profile.multifamily_zoned_parcels += 1;
            profile.multifamily_zoned_area_sqft += evaluation.lot_area_sqft;
        }
        profile.hbu_units += u64::from(evaluation.hbu.unit_yield);
        *profile
            .hbu_scenarios
            .entry(evaluation.hbu.scenario)
            .or_insert(0) += 1;
    }

    profiles.into_values().collect()
}

/// Citywide regime yield per scenario.
#[must_use]
pub fn scenario_totals(rows: &[NeighborhoodAggregate]) -> BTreeMap<Scenario, u64> {
    let mut totals = BTreeMap::new();
    for row in rows {
        *totals.entry(row.scenario).or_insert(0) += row.total_units;
    }
    totals
}
