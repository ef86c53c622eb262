//! Raw input rows as loaded from the upstream tables.
//!
//! Identifiers here are kept in their 14-digit unit-level form (see
//! [`crate::full_pin`]); the resolver folds them onto base identifiers.

use chrono::NaiveDate;
use geo::{MultiLineString, MultiPolygon, Point};

use crate::ParcelId;

#[derive(Debug, Clone)]
pub struct ParcelGeometry {
    pub pin: ParcelId,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct ZoningDistrict {
    pub zone_class: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct NeighborhoodBoundary {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct TransitStop {
    pub name: Option<String>,
    pub location: Point<f64>,
}

#[derive(Debug, Clone)]
pub struct BusRoute {
    pub route: String,
    pub geometry: MultiLineString<f64>,
}

/// One row of the tax-assessment roll.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentRecord {
    pub pin: String,
    pub property_class: String,
    /// Assessed (not market) improvement value.
    pub assessed_building: f64,
    /// Assessed (not market) land value.
    pub assessed_land: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicsRecord {
    pub pin: String,
    pub year_built: Option<i32>,
    pub building_sqft: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub pin: String,
    pub address: Option<String>,
    pub owner_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub pin: String,
    pub price: f64,
    pub date: NaiveDate,
    pub buyer: Option<String>,
}
