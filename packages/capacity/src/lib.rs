#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Legal unit capacity per zoning scenario.
//!
//! Each scenario has its own density rule: a per-class lot-area step for
//! current zoning, a coarse step for the baseline upzoning of
//! single-family districts, and transit-triggered densities for the
//! transit variants. A raw capacity is turned into a building envelope in
//! two passes (capacity picks an efficiency tier, the tier bounds net
//! area, net area clamps capacity), and scenarios are then chained so a
//! more permissive regime never delivers less than the one it builds on.

use upzone_config::EngineConfig;
use upzone_parcel_models::{Parcel, Scenario, ScenarioEnvelope, TransitProximityFacts};

/// Square feet per acre, for density-based capacities.
pub const SQFT_PER_ACRE: f64 = 43_560.0;

/// Lot area per dwelling unit under current zoning.
///
/// Residential districts match by class prefix, so variants such as
/// `RM-5.5` or `RT-4A` take their base district's density. First match
/// wins.
#[must_use]
pub fn sqft_per_unit(zone_class: &str) -> f64 {
    let zone = zone_class.trim().to_ascii_uppercase();

    if starts_with_any(&zone, &["RS-1", "RS-2"]) {
        5000.0
    } else if zone.starts_with("RS-3") {
        2500.0
    } else if zone.starts_with("RT-3.5") {
        1250.0
    } else if zone.starts_with("RT-4") {
        1000.0
    } else if starts_with_any(&zone, &["RM-4.5", "RM-5"]) {
        400.0
    } else if zone.starts_with("RM-6") {
        200.0
    } else if ends_with_any(&zone, &["-2", "-3"]) {
        400.0
    } else if ends_with_any(&zone, &["-5", "-6"]) {
        200.0
    } else {
        // Classes ending in -1 and everything unlisted.
        1000.0
    }
}

fn starts_with_any(zone: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| zone.starts_with(*prefix))
}

fn ends_with_any(zone: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|suffix| zone.ends_with(*suffix))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_units(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.floor().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

/// Units allowed under current zoning; never below one.
#[must_use]
pub fn current_capacity(zone_class: &str, lot_area_sqft: f64) -> u32 {
    floor_units(lot_area_sqft / sqft_per_unit(zone_class)).max(1)
}

/// The baseline upzoning step for a single lot.
#[must_use]
pub fn baseline_step(lot_area_sqft: f64) -> u32 {
    if lot_area_sqft < 2500.0 {
        1
    } else if lot_area_sqft < 5000.0 {
        4
    } else if lot_area_sqft < 7500.0 {
        6
    } else {
        8
    }
}

/// Units allowed under the baseline upzoning.
///
/// Zero outside single-family districts. An assembled lot gets the step
/// for its average member area once per member.
#[must_use]
pub fn baseline_capacity(parcel: &Parcel, config: &EngineConfig) -> u32 {
    if !config.zoning.is_single_family(&parcel.zone_class) {
        return 0;
    }

    let members = parcel.parcels_combined.max(1);
    let average_area = parcel.lot_area_sqft / f64::from(members);
    baseline_step(average_area).saturating_mul(members)
}

/// Units per acre a transit scenario grants for the given proximity
/// facts, or `None` when the scenario's trigger is not met.
#[must_use]
pub fn transit_density(
    scenario: Scenario,
    facts: &TransitProximityFacts,
    config: &EngineConfig,
) -> Option<f64> {
    let transit = &config.transit;
    let high = transit.high_density_units_per_acre;
    let mid = transit.mid_density_units_per_acre;
    let low = transit.low_density_units_per_acre;
    let rail_tier = if facts.rail_short { high } else { mid };

    match scenario {
        Scenario::Current | Scenario::BaselineUpzoning => None,
        Scenario::TransitFull => {
            if facts.rail_short {
                Some(high)
            } else if facts.rail_long
                || facts.brt_short
                || facts.high_frequency_route_count() >= transit.bus_intersection_routes
            {
                Some(mid)
            } else if facts.brt_long {
                Some(low)
            } else {
                None
            }
        }
        Scenario::TransitTrainOnly => facts.rail_long.then_some(rail_tier),
        Scenario::TransitTrainAndHfBus => {
            (facts.rail_long && facts.high_frequency_short()).then_some(rail_tier)
        }
        Scenario::TransitTrainAndBusCombo => (facts.rail_long
            && (facts.high_frequency_short()
                || facts.bus_route_count() >= transit.bus_intersection_routes))
            .then_some(rail_tier),
    }
}

/// Units allowed under a transit scenario.
#[must_use]
pub fn transit_capacity(
    scenario: Scenario,
    lot_area_sqft: f64,
    facts: &TransitProximityFacts,
    config: &EngineConfig,
) -> u32 {
    if lot_area_sqft < config.transit.min_lot_area_sqft {
        return 0;
    }
    transit_density(scenario, facts, config)
        .map_or(0, |density| floor_units(lot_area_sqft / SQFT_PER_ACRE * density))
}

/// Capacity from the scenario's density rule alone, before the unit
/// ceiling and envelope clamp.
#[must_use]
pub fn raw_capacity(parcel: &Parcel, scenario: Scenario, config: &EngineConfig) -> u32 {
    match scenario {
        Scenario::Current => current_capacity(&parcel.zone_class, parcel.lot_area_sqft)
            .max(parcel.parcels_combined),
        Scenario::BaselineUpzoning => baseline_capacity(parcel, config),
        Scenario::TransitTrainAndHfBus
        | Scenario::TransitTrainAndBusCombo
        | Scenario::TransitTrainOnly
        | Scenario::TransitFull => {
            transit_capacity(scenario, parcel.lot_area_sqft, &parcel.transit, config)
        }
    }
}

/// The scenario's own building envelope, ignoring inheritance.
///
/// Capacity is capped, the capped value picks an efficiency tier, and the
/// final capacity is bounded by how many minimum-size units fit in the
/// resulting net area.
#[must_use]
pub fn envelope(parcel: &Parcel, scenario: Scenario, config: &EngineConfig) -> ScenarioEnvelope {
    let settings = config.scenarios.get(scenario);
    let raw_capacity = raw_capacity(parcel, scenario, config);
    let provisional_capacity = raw_capacity.min(config.capacity.max_units);

    let gross_floor_area = parcel.lot_area_sqft * settings.far;
    let efficiency = config.capacity.efficiency_for(provisional_capacity);
    let net_rentable_area = gross_floor_area * efficiency;
    let capacity =
        provisional_capacity.min(floor_units(net_rentable_area / config.capacity.min_unit_sqft));

    ScenarioEnvelope {
        scenario,
        raw_capacity,
        provisional_capacity,
        far: settings.far,
        efficiency,
        gross_floor_area,
        net_rentable_area,
        capacity,
        construction: settings.construction,
        inherited_from: None,
    }
}

/// Effective envelopes for every scenario, in scenario order.
///
/// A scenario keeps its own envelope only when it delivers strictly more
/// units than its parent's effective envelope; otherwise the parent's
/// envelope is carried forward and `inherited_from` names the scenario it
/// originated in.
#[must_use]
pub fn envelopes(parcel: &Parcel, config: &EngineConfig) -> Vec<ScenarioEnvelope> {
    let mut effective: Vec<ScenarioEnvelope> = Vec::with_capacity(Scenario::ALL.len());

    for scenario in Scenario::ALL {
        let own = envelope(parcel, scenario, config);
        let parent = scenario
            .parent()
            .and_then(|parent| effective.iter().find(|e| e.scenario == parent));

        let chosen = match parent {
            Some(parent) if own.capacity <= parent.capacity => ScenarioEnvelope {
                scenario,
                inherited_from: parent.inherited_from.or(Some(parent.scenario)),
                ..parent.clone()
            },
            _ => own,
        };
        effective.push(chosen);
    }

    effective
}
