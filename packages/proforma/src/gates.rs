//! Eligibility gates: preconditions for any redevelopment yield.

use upzone_config::EngineConfig;
use upzone_parcel_models::{EligibilityGates, Parcel, ScenarioEnvelope};

/// Evaluates every gate for a parcel under one scenario's envelope.
///
/// Denominators are floored at one so vacant lots and zero-area
/// geometries never divide by zero.
#[must_use]
pub fn evaluate_gates(
    parcel: &Parcel,
    envelope: &ScenarioEnvelope,
    config: &EngineConfig,
) -> EligibilityGates {
    let rules = &config.eligibility;
    let existing = &parcel.characteristics;

    let age_or_value = existing.building_age.map_or(
        existing.building_value < rules.vacant_building_value,
        |age| age >= rules.min_building_age,
    );
    let property_use = existing
        .property_class
        .as_deref()
        .is_none_or(|class| !rules.is_excluded_class(class));

    EligibilityGates {
        zoning_class: !config.zoning.is_excluded(&parcel.zone_class),
        property_use,
        existing_units: existing.existing_units < rules.max_existing_units,
        age_or_value,
        unit_multiple: f64::from(envelope.capacity)
            >= rules.min_unit_multiple * f64::from(existing.existing_units.max(1)),
        floor_area_multiple: envelope.gross_floor_area
            >= rules.min_floor_area_multiple * existing.existing_sqft.max(1.0),
        lot_density: existing.existing_sqft / parcel.lot_area_sqft.max(1.0)
            < rules.max_existing_far,
        lot_size: parcel.lot_area_sqft <= rules.max_lot_area_sqft,
    }
}
