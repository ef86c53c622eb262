#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Assessment and characteristics resolution.
//!
//! The assessor publishes one row per tax pin, and condominium buildings
//! carry one pin per unit under a shared base identifier. This crate folds
//! the assessment, characteristics, and address rolls onto base
//! identifiers and produces one [`ResolvedCharacteristics`] per parcel.
//!
//! Missing rows are never an error: a parcel without assessment data
//! resolves to zero units and value with unknown class and age, and the
//! eligibility gates decide what that means downstream.

use std::collections::BTreeMap;

use upzone_config::EngineConfig;
use upzone_parcel_models::records::{AddressRecord, AssessmentRecord, CharacteristicsRecord};
use upzone_parcel_models::{
    BASE_PIN_DIGITS, EligibleParcel, Parcel, ParcelId, ResolvedCharacteristics,
};

/// Existing units implied by one assessment row of `class`.
///
/// Returns `None` for large apartment and commercial classes, whose unit
/// count comes from floor area instead.
#[must_use]
pub fn units_for_class(class: &str) -> Option<u32> {
    let class = class.trim();
    if class.starts_with('3') || class.starts_with('9') {
        return None;
    }

    // Single-family, condominium, and unlisted classes count one unit.
    Some(match class {
        "211" => 2,
        "212" => 3,
        "213" => 5,
        "214" => 10,
        _ => 1,
    })
}

/// Units estimated from floor area for large buildings, at least one.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn units_from_floor_area(sqft: f64) -> u32 {
    let units = (sqft / 1000.0).floor();
    if units.is_finite() && units >= 1.0 {
        units.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

fn base_of(full_pin: &str) -> &str {
    full_pin.get(..BASE_PIN_DIGITS).unwrap_or(full_pin)
}

/// Per-base accumulators built from the raw rolls.
#[derive(Debug, Default)]
struct BaseRows<'a> {
    assessments: Vec<&'a AssessmentRecord>,
    characteristics: Vec<&'a CharacteristicsRecord>,
    addresses: Vec<&'a AddressRecord>,
}

/// Lookup from base identifier to resolved characteristics.
///
/// Built once per run; every lookup afterward is read-only.
#[derive(Debug, Clone, Default)]
pub struct AssessmentIndex {
    resolved: BTreeMap<String, ResolvedCharacteristics>,
    buildings_by_pin: BTreeMap<String, CharacteristicsRecord>,
    buildings_by_base: BTreeMap<String, CharacteristicsRecord>,
}

impl AssessmentIndex {
    /// Groups every roll by base identifier and resolves each group.
    #[must_use]
    pub fn build(
        assessments: &[AssessmentRecord],
        characteristics: &[CharacteristicsRecord],
        addresses: &[AddressRecord],
        config: &EngineConfig,
    ) -> Self {
        let mut bases: BTreeMap<&str, BaseRows<'_>> = BTreeMap::new();
        for row in assessments {
            bases.entry(base_of(&row.pin)).or_default().assessments.push(row);
        }
        for row in characteristics {
            bases
                .entry(base_of(&row.pin))
                .or_default()
                .characteristics
                .push(row);
        }
        for row in addresses {
            bases.entry(base_of(&row.pin)).or_default().addresses.push(row);
        }

        let resolved: BTreeMap<String, ResolvedCharacteristics> = bases
            .into_iter()
            .map(|(base, rows)| (base.to_string(), resolve_rows(rows, config)))
            .collect();

        let mut sorted: Vec<&CharacteristicsRecord> = characteristics.iter().collect();
        sorted.sort_by(|a, b| a.pin.cmp(&b.pin));
        let mut buildings_by_pin = BTreeMap::new();
        let mut buildings_by_base = BTreeMap::new();
        for row in sorted {
            buildings_by_pin
                .entry(row.pin.clone())
                .or_insert_with(|| row.clone());
            buildings_by_base
                .entry(base_of(&row.pin).to_string())
                .or_insert_with(|| row.clone());
        }

        log::info!(
            "Resolved characteristics for {} base parcels from {} assessment rows",
            resolved.len(),
            assessments.len()
        );

        Self {
            resolved,
            buildings_by_pin,
            buildings_by_base,
        }
    }

    /// Resolved characteristics for a base parcel, or the empty default
    /// when no roll mentions it.
    #[must_use]
    pub fn characteristics_for(&self, pin: &ParcelId) -> ResolvedCharacteristics {
        self.resolved.get(pin.as_str()).cloned().unwrap_or_default()
    }

    /// Whether any roll row exists for a base parcel.
    #[must_use]
    pub fn contains(&self, pin: &ParcelId) -> bool {
        self.resolved.contains_key(pin.as_str())
    }

    /// Building characteristics for a sale's unit-level identifier,
    /// falling back to the first row under the same base identifier.
    #[must_use]
    pub fn building_for_sale(&self, full_pin: &str) -> Option<&CharacteristicsRecord> {
        self.buildings_by_pin
            .get(full_pin)
            .or_else(|| self.buildings_by_base.get(base_of(full_pin)))
    }

    /// Attaches resolved characteristics to every eligible parcel.
    #[must_use]
    pub fn resolve(&self, eligible: Vec<EligibleParcel>) -> Vec<Parcel> {
        let mut missing = 0_usize;
        let parcels: Vec<Parcel> = eligible
            .into_iter()
            .map(|parcel| {
                if !self.contains(&parcel.pin) {
                    missing += 1;
                    log::debug!("No assessment data for parcel {}", parcel.pin);
                }
                let characteristics = self.characteristics_for(&parcel.pin);
                Parcel::from_eligible(parcel, characteristics)
            })
            .collect();

        if missing > 0 {
            log::info!("{missing} eligible parcels have no assessment or characteristics rows");
        }
        parcels
    }
}

fn resolve_rows(rows: BaseRows<'_>, config: &EngineConfig) -> ResolvedCharacteristics {
    let existing_sqft: f64 = rows
        .characteristics
        .iter()
        .filter_map(|row| row.building_sqft)
        .sum();

    let mut class_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut units = 0_u32;
    let mut large_building = false;
    let mut building_value = 0.0;
    let mut land_value = 0.0;

    for row in &rows.assessments {
        let class = row.property_class.trim();
        if !class.is_empty() {
            *class_counts.entry(class).or_default() += 1;
        }

        match units_for_class(class) {
            Some(n) => units = units.saturating_add(n),
            None => large_building = true,
        }

        let level = config.assessment.level_for(class);
        building_value += row.assessed_building / level;
        land_value += row.assessed_land / level;
    }

    if large_building {
        units = units.saturating_add(units_from_floor_area(existing_sqft));
    }

    let tax_pin_count = u32::try_from(rows.assessments.len()).unwrap_or(u32::MAX);
    let existing_units = units.max(tax_pin_count);

    // Ties go to the lexicographically smallest class (BTreeMap order).
    let property_class = class_counts
        .iter()
        .fold(None::<(&str, usize)>, |best, (class, count)| match best {
            Some((_, best_count)) if best_count >= *count => best,
            _ => Some((class, *count)),
        })
        .map(|(class, _)| class.to_string());

    let building_age = rows
        .characteristics
        .iter()
        .filter_map(|row| row.year_built)
        .max()
        .map(|year| {
            u32::try_from(config.snapshot_year().saturating_sub(year)).unwrap_or_default()
        });

    let mut addresses = rows.addresses;
    addresses.sort_by(|a, b| a.pin.cmp(&b.pin));
    let address = addresses.iter().find_map(|row| row.address.clone());
    let owner_name = addresses.iter().find_map(|row| row.owner_name.clone());

    ResolvedCharacteristics {
        property_class,
        tax_pin_count,
        existing_units,
        building_age,
        existing_sqft,
        building_value,
        land_value,
        address,
        owner_name,
    }
}

#[cfg(test)]
mod tests {
    use upzone_parcel_models::TransitProximityFacts;

    use super::*;

    fn assessment(pin: &str, class: &str, building: f64, land: f64) -> AssessmentRecord {
        AssessmentRecord {
            pin: pin.to_string(),
            property_class: class.to_string(),
            assessed_building: building,
            assessed_land: land,
        }
    }

    fn building(pin: &str, year: Option<i32>, sqft: Option<f64>) -> CharacteristicsRecord {
        CharacteristicsRecord {
            pin: pin.to_string(),
            year_built: year,
            building_sqft: sqft,
        }
    }

    fn address(pin: &str, address: Option<&str>, owner: Option<&str>) -> AddressRecord {
        AddressRecord {
            pin: pin.to_string(),
            address: address.map(str::to_string),
            owner_name: owner.map(str::to_string),
        }
    }

    fn pin(raw: &str) -> ParcelId {
        ParcelId::parse(raw).unwrap()
    }

    #[test]
    fn single_family_resolves_market_values_and_age() {
        let index = AssessmentIndex::build(
            &[assessment("14283220440000", "203", 15_000.0, 5_000.0)],
            &[building("14283220440000", Some(1964), Some(1400.0))],
            &[address("14283220440000", Some("2100 N HALSTED ST"), Some("JANE DOE"))],
            &EngineConfig::default(),
        );
        let resolved = index.characteristics_for(&pin("1428322044"));

        assert_eq!(resolved.property_class.as_deref(), Some("203"));
        assert_eq!(resolved.existing_units, 1);
        assert_eq!(resolved.tax_pin_count, 1);
        assert_eq!(resolved.building_age, Some(60));
        assert!((resolved.building_value - 150_000.0).abs() < 1e-6);
        assert!((resolved.land_value - 50_000.0).abs() < 1e-6);
        assert_eq!(resolved.address.as_deref(), Some("2100 N HALSTED ST"));
        assert_eq!(resolved.owner_name.as_deref(), Some("JANE DOE"));
    }

    #[test]
    fn condominium_units_fold_onto_the_base_identifier() {
        let index = AssessmentIndex::build(
            &[
                assessment("14283220441001", "299", 3_000.0, 500.0),
                assessment("14283220441002", "299", 3_000.0, 500.0),
                assessment("14283220441003", "299", 3_000.0, 500.0),
            ],
            &[],
            &[],
            &EngineConfig::default(),
        );
        let resolved = index.characteristics_for(&pin("1428322044"));

        assert_eq!(resolved.existing_units, 3);
        assert_eq!(resolved.tax_pin_count, 3);
        assert_eq!(resolved.property_class.as_deref(), Some("299"));
        assert!((resolved.building_value - 90_000.0).abs() < 1e-6);
        assert_eq!(resolved.building_age, None);
    }

    #[test]
    fn large_buildings_count_units_from_floor_area_once() {
        let index = AssessmentIndex::build(
            &[
                assessment("14283220440000", "318", 50_000.0, 10_000.0),
                assessment("14283220440001", "318", 0.0, 0.0),
            ],
            &[building("14283220440000", Some(1925), Some(12_500.0))],
            &[],
            &EngineConfig::default(),
        );
        let resolved = index.characteristics_for(&pin("1428322044"));
        assert_eq!(resolved.existing_units, 12);
    }

    #[test]
    fn commercial_values_use_the_higher_level() {
        let index = AssessmentIndex::build(
            &[assessment("14283220440000", "517", 25_000.0, 25_000.0)],
            &[],
            &[],
            &EngineConfig::default(),
        );
        let resolved = index.characteristics_for(&pin("1428322044"));
        assert!((resolved.total_value() - 200_000.0).abs() < 1e-6);
    }

    #[test]
    fn most_frequent_class_wins_with_lexicographic_ties() {
        let index = AssessmentIndex::build(
            &[
                assessment("14283220440001", "212", 0.0, 0.0),
                assessment("14283220440002", "211", 0.0, 0.0),
            ],
            &[],
            &[],
            &EngineConfig::default(),
        );
        let resolved = index.characteristics_for(&pin("1428322044"));
        assert_eq!(resolved.property_class.as_deref(), Some("211"));
        assert_eq!(resolved.existing_units, 5);

        let index = AssessmentIndex::build(
            &[
                assessment("14283220440001", "212", 0.0, 0.0),
                assessment("14283220440002", "299", 0.0, 0.0),
                assessment("14283220440003", "299", 0.0, 0.0),
            ],
            &[],
            &[],
            &EngineConfig::default(),
        );
        let resolved = index.characteristics_for(&pin("1428322044"));
        assert_eq!(resolved.property_class.as_deref(), Some("299"));
    }

    #[test]
    fn newest_year_built_sets_age() {
        let index = AssessmentIndex::build(
            &[],
            &[
                building("14283220440000", Some(1900), Some(1000.0)),
                building("14283220440001", Some(2010), Some(500.0)),
            ],
            &[],
            &EngineConfig::default(),
        );
        let resolved = index.characteristics_for(&pin("1428322044"));
        assert_eq!(resolved.building_age, Some(14));
        assert!((resolved.existing_sqft - 1500.0).abs() < f64::EPSILON);
        assert_eq!(resolved.existing_units, 0);
    }

    #[test]
    fn address_comes_from_smallest_identifier_with_a_value() {
        let index = AssessmentIndex::build(
            &[],
            &[],
            &[
                address("14283220441002", Some("UNIT 2"), Some("OWNER B")),
                address("14283220441001", None, Some("OWNER A")),
                address("14283220441003", Some("UNIT 3"), None),
            ],
            &EngineConfig::default(),
        );
        let resolved = index.characteristics_for(&pin("1428322044"));
        assert_eq!(resolved.address.as_deref(), Some("UNIT 2"));
        assert_eq!(resolved.owner_name.as_deref(), Some("OWNER A"));
    }

    #[test]
    fn unknown_parcels_resolve_to_empty_characteristics() {
        let index = AssessmentIndex::default();
        let parcels = index.resolve(vec![EligibleParcel {
            pin: pin("1428322044"),
            geometry: geo::MultiPolygon(vec![]),
            lot_area_sqft: 5000.0,
            zone_class: "RS-3".to_string(),
            neighborhood: "AUSTIN".to_string(),
            transit: TransitProximityFacts::default(),
        }]);

        let resolved = &parcels[0].characteristics;
        assert_eq!(resolved.existing_units, 0);
        assert!(resolved.total_value().abs() < f64::EPSILON);
        assert_eq!(resolved.property_class, None);
        assert_eq!(resolved.building_age, None);
    }

    #[test]
    fn sale_building_lookup_falls_back_to_base() {
        let index = AssessmentIndex::build(
            &[],
            &[
                building("14283220441001", Some(2020), Some(900.0)),
                building("14283220440000", Some(1920), Some(3000.0)),
            ],
            &[],
            &EngineConfig::default(),
        );

        let exact = index.building_for_sale("14283220441001").unwrap();
        assert_eq!(exact.year_built, Some(2020));

        let fallback = index.building_for_sale("14283220449999").unwrap();
        assert_eq!(fallback.pin, "14283220440000");

        assert!(index.building_for_sale("99999999990000").is_none());
    }
}
