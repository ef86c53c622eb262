//! Parcel shapes as they move through the join, resolution, and assembly
//! stages.

use std::collections::BTreeSet;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use crate::{ParcelId, PropertyCategory};

/// Transit proximity derived for one parcel (or assembled lot).
///
/// Route sets are kept rather than bare counts so that facts for two
/// parcels can be merged exactly when lots are assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitProximityFacts {
    /// A rail stop lies within the short radius.
    pub rail_short: bool,
    /// A rail stop lies within the long radius.
    pub rail_long: bool,
    /// A bus rapid transit route lies within the short radius.
    pub brt_short: bool,
    /// A bus rapid transit route lies within the long radius.
    pub brt_long: bool,
    /// Distinct bus routes within the short radius.
    pub bus_routes: BTreeSet<String>,
    /// Distinct high-frequency bus routes within the short radius.
    pub high_frequency_routes: BTreeSet<String>,
}

impl TransitProximityFacts {
    /// Whether any high-frequency route lies within the short radius.
    #[must_use]
    pub fn high_frequency_short(&self) -> bool {
        !self.high_frequency_routes.is_empty()
    }

    #[must_use]
    pub fn bus_route_count(&self) -> usize {
        self.bus_routes.len()
    }

    #[must_use]
    pub fn high_frequency_route_count(&self) -> usize {
        self.high_frequency_routes.len()
    }

    /// Combines the facts of two adjacent lots.
    ///
    /// Distances from a union are the minimum of the members' distances, so
    /// every flag is OR-ed and every route set is unioned.
    pub fn merge(&mut self, other: &Self) {
        self.rail_short |= other.rail_short;
        self.rail_long |= other.rail_long;
        self.brt_short |= other.brt_short;
        self.brt_long |= other.brt_long;
        self.bus_routes.extend(other.bus_routes.iter().cloned());
        self.high_frequency_routes
            .extend(other.high_frequency_routes.iter().cloned());
    }
}

/// A parcel that intersects an eligible zoning district.
#[derive(Debug, Clone)]
pub struct EligibleParcel {
    pub pin: ParcelId,
    pub geometry: MultiPolygon<f64>,
    /// Planar lot area in square feet.
    pub lot_area_sqft: f64,
    pub zone_class: String,
    pub neighborhood: String,
    pub transit: TransitProximityFacts,
}

/// Assessment, characteristics, and address data resolved onto a base
/// parcel identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCharacteristics {
    /// Dominant assessor class, `None` if no assessment rows matched.
    pub property_class: Option<String>,
    /// Number of assessment rows (tax pins) under the base identifier.
    pub tax_pin_count: u32,
    pub existing_units: u32,
    /// Age in years, `None` when no year built is known.
    pub building_age: Option<u32>,
    pub existing_sqft: f64,
    /// Estimated market value of improvements.
    pub building_value: f64,
    /// Estimated market value of land.
    pub land_value: f64,
    pub address: Option<String>,
    pub owner_name: Option<String>,
}

impl ResolvedCharacteristics {
    #[must_use]
    pub fn total_value(&self) -> f64 {
        self.building_value + self.land_value
    }

    #[must_use]
    pub fn category(&self) -> PropertyCategory {
        self.property_class
            .as_deref()
            .map_or(PropertyCategory::Other, PropertyCategory::from_class)
    }
}

/// A fully resolved parcel or assembled lot, ready for evaluation.
#[derive(Debug, Clone)]
pub struct Parcel {
    pub pin: ParcelId,
    /// Member parcels of an assembled lot; just `pin` otherwise.
    pub members: Vec<ParcelId>,
    pub geometry: MultiPolygon<f64>,
    pub lot_area_sqft: f64,
    pub zone_class: String,
    pub neighborhood: String,
    pub transit: TransitProximityFacts,
    pub characteristics: ResolvedCharacteristics,
    pub parcels_combined: u32,
}

impl Parcel {
    /// Pairs an eligibility row with its resolved characteristics.
    #[must_use]
    pub fn from_eligible(
        eligible: EligibleParcel,
        characteristics: ResolvedCharacteristics,
    ) -> Self {
        Self {
            members: vec![eligible.pin.clone()],
            pin: eligible.pin,
            geometry: eligible.geometry,
            lot_area_sqft: eligible.lot_area_sqft,
            zone_class: eligible.zone_class,
            neighborhood: eligible.neighborhood,
            transit: eligible.transit,
            characteristics,
            parcels_combined: 1,
        }
    }

    #[must_use]
    pub const fn is_assembled(&self) -> bool {
        self.parcels_combined > 1
    }
}
