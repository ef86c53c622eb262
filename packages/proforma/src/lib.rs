#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pro forma feasibility and highest-and-best-use selection.
//!
//! For each scenario envelope of a parcel, [`pro_forma`] prices the
//! acquisition and construction, projects sale revenue from net rentable
//! area, and checks the result against the target margin and the
//! eligibility gates. [`evaluate`] runs every scenario for one parcel and
//! applies the [`waterfall`] both per regime and across all scenarios.
//!
//! Evaluation of one parcel reads only shared references, so callers can
//! fan parcels out across threads freely.

pub mod gates;
pub mod waterfall;

use std::collections::BTreeMap;

use upzone_config::EngineConfig;
use upzone_parcel_models::{
    HbuDecision, MarketContext, Parcel, ParcelEvaluation, ProFormaResult, Scenario,
    ScenarioEnvelope,
};

pub use gates::evaluate_gates;
pub use waterfall::waterfall;

/// Prices one parcel under one scenario's envelope.
#[must_use]
pub fn pro_forma(
    parcel: &Parcel,
    envelope: &ScenarioEnvelope,
    market: &MarketContext,
    config: &EngineConfig,
) -> ProFormaResult {
    let acquisition_cost = (parcel.characteristics.total_value() * market.multiplier)
        .max(config.proforma.min_acquisition_cost);
    let cost_per_sqft = config
        .construction
        .cost_per_sqft(&parcel.neighborhood, envelope.construction);
    let construction_cost = envelope.gross_floor_area * cost_per_sqft;
    let total_cost = acquisition_cost + construction_cost;
    let revenue = envelope.net_rentable_area * market.price_per_sqft;
    let profit = revenue - total_cost;
    let feasible = revenue > total_cost * config.proforma.target_margin;

    let gates = evaluate_gates(parcel, envelope, config);
    let unit_yield = if feasible && gates.all_pass() {
        envelope
            .capacity
            .saturating_sub(parcel.characteristics.existing_units)
    } else {
        0
    };

    ProFormaResult {
        scenario: envelope.scenario,
        envelope: envelope.clone(),
        acquisition_cost,
        cost_per_sqft,
        construction_cost,
        total_cost,
        revenue,
        profit,
        feasible,
        gates,
        unit_yield,
    }
}

/// Waterfall outcome for a set of results, starting from current zoning
/// with nothing built when the set is empty.
fn decide<'a>(results: impl IntoIterator<Item = &'a ProFormaResult>) -> HbuDecision {
    waterfall(results).unwrap_or(HbuDecision {
        scenario: Scenario::Current,
        unit_yield: 0,
        profit: 0.0,
    })
}

/// Evaluates every scenario for one parcel.
///
/// Each scenario's regime outcome runs the waterfall over the scenarios in
/// force when it is enacted (its inheritance chain); the overall decision
/// runs it over every scenario.
#[must_use]
pub fn evaluate(
    parcel: &Parcel,
    market: &MarketContext,
    config: &EngineConfig,
) -> ParcelEvaluation {
    let results: Vec<ProFormaResult> = upzone_capacity::envelopes(parcel, config)
        .iter()
        .map(|envelope| pro_forma(parcel, envelope, market, config))
        .collect();

    let regimes: BTreeMap<Scenario, HbuDecision> = Scenario::ALL
        .into_iter()
        .map(|scenario| {
            let chain = scenario.regime_chain();
            let decision = decide(results.iter().filter(|r| chain.contains(&r.scenario)));
            (scenario, decision)
        })
        .collect();
    let hbu = decide(&results);

    ParcelEvaluation {
        pin: parcel.pin.clone(),
        neighborhood: parcel.neighborhood.clone(),
        zone_class: parcel.zone_class.clone(),
        lot_area_sqft: parcel.lot_area_sqft,
        existing_units: parcel.characteristics.existing_units,
        market: market.clone(),
        results,
        regimes,
        hbu,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use geo::MultiPolygon;
    use upzone_config::EngineConfig;
    use upzone_parcel_models::{
        CalibrationSource, ConstructionType, EligibilityGates, MarketContext, MarketStratum,
        Parcel, ParcelId, PropertyCategory, ProFormaResult, ResolvedCharacteristics, Scenario,
        ScenarioEnvelope, TransitProximityFacts,
    };

    /// A 5000 sqft single-family lot with a 60-year-old house.
    pub fn parcel() -> Parcel {
        Parcel {
            pin: ParcelId::parse("1428322044").unwrap(),
            members: vec![ParcelId::parse("1428322044").unwrap()],
            geometry: MultiPolygon(vec![]),
            lot_area_sqft: 5000.0,
            zone_class: "RS-3".to_string(),
            neighborhood: "AUSTIN".to_string(),
            transit: TransitProximityFacts::default(),
            characteristics: ResolvedCharacteristics {
                property_class: Some("203".to_string()),
                tax_pin_count: 1,
                existing_units: 1,
                building_age: Some(60),
                existing_sqft: 1400.0,
                building_value: 150_000.0,
                land_value: 50_000.0,
                address: None,
                owner_name: None,
            },
            parcels_combined: 1,
        }
    }

    pub fn market(multiplier: f64, price_per_sqft: f64) -> MarketContext {
        MarketContext {
            neighborhood: "AUSTIN".to_string(),
            stratum: MarketStratum::Category(PropertyCategory::SingleFamily),
            multiplier,
            multiplier_source: CalibrationSource::Default,
            multiplier_sample: 0,
            price_per_sqft,
            price_source: CalibrationSource::Default,
            price_sample: 0,
        }
    }

    pub fn envelope_for(parcel: &Parcel, scenario: Scenario) -> ScenarioEnvelope {
        upzone_capacity::envelope(parcel, scenario, &EngineConfig::default())
    }

    /// A synthetic result whose buildability is fixed by `buildable`.
    pub fn result(
        scenario: Scenario,
        buildable: bool,
        profit: f64,
        unit_yield: u32,
    ) -> ProFormaResult {
        ProFormaResult {
            scenario,
            envelope: ScenarioEnvelope {
                scenario,
                raw_capacity: unit_yield,
                provisional_capacity: unit_yield,
                far: 1.0,
                efficiency: 1.0,
                gross_floor_area: 0.0,
                net_rentable_area: 0.0,
                capacity: unit_yield,
                construction: ConstructionType::LowRise,
                inherited_from: None,
            },
            acquisition_cost: 0.0,
            cost_per_sqft: 0.0,
            construction_cost: 0.0,
            total_cost: 0.0,
            revenue: profit,
            profit,
            feasible: buildable,
            gates: EligibilityGates {
                zoning_class: true,
                property_use: true,
                existing_units: true,
                age_or_value: true,
                unit_multiple: true,
                floor_area_multiple: true,
                lot_density: true,
                lot_size: true,
            },
            unit_yield: if buildable { unit_yield } else { 0 },
        }
    }
}
