//! Computed outputs: building envelopes, pro forma results, waterfall
//! decisions, and neighborhood rollups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CalibrationSource, ConstructionType, MarketStratum, ParcelId, Scenario};

/// Market statistics resolved for one parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub neighborhood: String,
    pub stratum: MarketStratum,
    /// Assessed-to-market sales-ratio correction.
    pub multiplier: f64,
    pub multiplier_source: CalibrationSource,
    /// Sales backing the multiplier (0 for static and default values).
    pub multiplier_sample: usize,
    /// New-construction sale price per square foot.
    pub price_per_sqft: f64,
    pub price_source: CalibrationSource,
    pub price_sample: usize,
}

/// Pass/fail state of every eligibility gate for one parcel and scenario.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityGates {
    /// Zone class is not open space, parks, or planned manufacturing.
    pub zoning_class: bool,
    /// Property class is not condominium, exempt, or right-of-way.
    pub property_use: bool,
    /// Existing unit count is below the ceiling.
    pub existing_units: bool,
    /// Building is old enough, or effectively vacant.
    pub age_or_value: bool,
    /// Capacity is a large enough multiple of existing units.
    pub unit_multiple: bool,
    /// Gross floor area is a large enough multiple of existing floor area.
    pub floor_area_multiple: bool,
    /// Existing floor area relative to lot area is below the ceiling.
    pub lot_density: bool,
    /// Lot is not larger than the maximum size.
    pub lot_size: bool,
}

impl EligibilityGates {
    #[must_use]
    pub const fn all_pass(&self) -> bool {
        self.zoning_class
            && self.property_use
            && self.existing_units
            && self.age_or_value
            && self.unit_multiple
            && self.floor_area_multiple
            && self.lot_density
            && self.lot_size
    }

    /// Names of the gates that failed, in evaluation order.
    #[must_use]
    pub fn failures(&self) -> Vec<&'static str> {
        [
            (self.zoning_class, "zoning_class"),
            (self.property_use, "property_use"),
            (self.existing_units, "existing_units"),
            (self.age_or_value, "age_or_value"),
            (self.unit_multiple, "unit_multiple"),
            (self.floor_area_multiple, "floor_area_multiple"),
            (self.lot_density, "lot_density"),
            (self.lot_size, "lot_size"),
        ]
        .into_iter()
        .filter_map(|(pass, name)| (!pass).then_some(name))
        .collect()
    }
}

/// Legal building envelope for one parcel under one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEnvelope {
    pub scenario: Scenario,
    /// Capacity from the density rule before the unit ceiling.
    pub raw_capacity: u32,
    /// Capacity after the unit ceiling, used to pick the efficiency tier.
    pub provisional_capacity: u32,
    pub far: f64,
    pub efficiency: f64,
    pub gross_floor_area: f64,
    pub net_rentable_area: f64,
    /// Final capacity after the minimum-unit-size clamp.
    pub capacity: u32,
    pub construction: ConstructionType,
    /// Set when this scenario grants nothing beyond its parent and the
    /// parent's envelope was carried forward.
    pub inherited_from: Option<Scenario>,
}

/// Pro forma outcome for one parcel under one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProFormaResult {
    pub scenario: Scenario,
    pub envelope: ScenarioEnvelope,
    pub acquisition_cost: f64,
    pub cost_per_sqft: f64,
    pub construction_cost: f64,
    pub total_cost: f64,
    pub revenue: f64,
    pub profit: f64,
    /// Revenue clears total cost times the target margin.
    pub feasible: bool,
    pub gates: EligibilityGates,
    /// New units delivered; zero unless [`Self::buildable`].
    pub unit_yield: u32,
}

impl ProFormaResult {
    /// Feasible and clear of every eligibility gate.
    #[must_use]
    pub const fn buildable(&self) -> bool {
        self.feasible && self.gates.all_pass()
    }

    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.envelope.capacity
    }
}

/// The scenario a developer would pick for a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HbuDecision {
    pub scenario: Scenario,
    pub unit_yield: u32,
    pub profit: f64,
}

/// Everything computed for one parcel across all scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelEvaluation {
    pub pin: ParcelId,
    pub neighborhood: String,
    pub zone_class: String,
    pub lot_area_sqft: f64,
    pub existing_units: u32,
    pub market: MarketContext,
    /// One result per scenario, in scenario order.
    pub results: Vec<ProFormaResult>,
    /// Outcome when each scenario is the law in force.
    pub regimes: BTreeMap<Scenario, HbuDecision>,
    /// Outcome across every scenario.
    pub hbu: HbuDecision,
}

impl ParcelEvaluation {
    #[must_use]
    pub fn result(&self, scenario: Scenario) -> Option<&ProFormaResult> {
        self.results.iter().find(|x| x.scenario == scenario)
    }

    /// Units delivered when `scenario` is in force.
    #[must_use]
    pub fn regime_yield(&self, scenario: Scenario) -> u32 {
        self.regimes.get(&scenario).map_or(0, |x| x.unit_yield)
    }
}

/// Totals for one neighborhood under one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborhoodAggregate {
    pub neighborhood: String,
    pub scenario: Scenario,
    pub parcels: u64,
    /// Parcels whose regime outcome delivers at least one unit.
    pub building_parcels: u64,
    pub total_units: u64,
    pub marginal_over_current: i64,
    pub marginal_over_baseline: i64,
}

/// Scenario-independent rollup of one neighborhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodProfile {
    pub neighborhood: String,
    pub total_parcels: u64,
    pub total_area_sqft: f64,
    /// Parcels zoned for something other than single-family.
    pub multifamily_zoned_parcels: u64,
    pub multifamily_zoned_area_sqft: f64,
    pub hbu_units: u64,
    /// How many parcels picked each scenario as highest and best use.
    pub hbu_scenarios: BTreeMap<Scenario, u64>,
}
