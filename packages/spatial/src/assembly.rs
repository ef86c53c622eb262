//! Lot assembly: combining touching parcels into a single redevelopment
//! site.
//!
//! Parcels are grouped by block and zone class (and optionally owner),
//! each group is split into geometrically connected components, and every
//! component with more than one member becomes one assembled [`Parcel`].

use std::collections::BTreeMap;

use geo::{Area, BooleanOps, Intersects};
use upzone_config::AssemblyMode;
use upzone_parcel_models::{Parcel, ResolvedCharacteristics};

/// Grouping key for candidate assemblies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    block: String,
    zone_class: String,
    owner: Option<String>,
}

/// Uppercases and collapses whitespace so owner spellings compare equal.
fn normalize_owner(owner: &str) -> Option<String> {
    let normalized = owner
        .split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect::<Vec<_>>()
        .join(" ");
    (!normalized.is_empty()).then_some(normalized)
}

fn group_key(parcel: &Parcel, mode: AssemblyMode) -> Option<GroupKey> {
    let owner = match mode {
        AssemblyMode::None => return None,
        AssemblyMode::Block => None,
        AssemblyMode::Owner => Some(
            parcel
                .characteristics
                .owner_name
                .as_deref()
                .and_then(normalize_owner)?,
        ),
    };

    Some(GroupKey {
        block: parcel.pin.block_id().to_string(),
        zone_class: parcel.zone_class.clone(),
        owner,
    })
}

/// Combines adjacent parcels according to `mode`.
///
/// Parcels that are not grouped pass through unchanged. The result is
/// sorted by identifier.
#[must_use]
pub fn assemble(parcels: Vec<Parcel>, mode: AssemblyMode) -> Vec<Parcel> {
    if mode == AssemblyMode::None {
        return parcels;
    }

    let input_count = parcels.len();
    let mut groups: BTreeMap<GroupKey, Vec<Parcel>> = BTreeMap::new();
    let mut output = Vec::with_capacity(parcels.len());

    for parcel in parcels {
        match group_key(&parcel, mode) {
            Some(key) => groups.entry(key).or_default().push(parcel),
            None => output.push(parcel),
        }
    }

    let mut assembled = 0_usize;
    for (_, members) in groups {
        for component in connected_components(members) {
            if component.len() > 1 {
                assembled += 1;
                output.push(merge(component));
            } else {
                output.extend(component);
            }
        }
    }

    output.sort_by(|a, b| a.pin.cmp(&b.pin));
    log::info!(
        "Assembled {input_count} parcels into {} lots ({assembled} multi-parcel, mode {mode})",
        output.len()
    );
    output
}

/// Splits a group into sets of parcels connected by touching or
/// overlapping geometry.
fn connected_components(members: Vec<Parcel>) -> Vec<Vec<Parcel>> {
    let n = members.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if members[i].geometry.intersects(&members[j].geometry) {
                let a = find(&mut parent, i);
                let b = find(&mut parent, j);
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<Parcel>> = BTreeMap::new();
    for (i, parcel) in members.into_iter().enumerate() {
        let root = find(&mut parent, i);
        components.entry(root).or_default().push(parcel);
    }
    components.into_values().collect()
}

/// Merges a connected component into one assembled lot.
fn merge(mut members: Vec<Parcel>) -> Parcel {
    members.sort_by(|a, b| a.pin.cmp(&b.pin));

    let mut geometry = members[0].geometry.clone();
    for member in &members[1..] {
        geometry = geometry.union(&member.geometry);
    }

    let mut transit = members[0].transit.clone();
    for member in &members[1..] {
        transit.merge(&member.transit);
    }

    let dominant = members
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| {
            a.characteristics
                .building_value
                .total_cmp(&b.characteristics.building_value)
                .then(ib.cmp(ia))
        })
        .map_or(0, |(i, _)| i);

    let characteristics = ResolvedCharacteristics {
        property_class: members[dominant].characteristics.property_class.clone(),
        tax_pin_count: members.iter().map(|m| m.characteristics.tax_pin_count).sum(),
        existing_units: members.iter().map(|m| m.characteristics.existing_units).sum(),
        building_age: members
            .iter()
            .filter_map(|m| m.characteristics.building_age)
            .min(),
        existing_sqft: members.iter().map(|m| m.characteristics.existing_sqft).sum(),
        building_value: members.iter().map(|m| m.characteristics.building_value).sum(),
        land_value: members.iter().map(|m| m.characteristics.land_value).sum(),
        address: members
            .iter()
            .find_map(|m| m.characteristics.address.clone()),
        owner_name: members
            .iter()
            .find_map(|m| m.characteristics.owner_name.clone()),
    };

    #[allow(clippy::cast_possible_truncation)]
    let parcels_combined = members.len() as u32;
    let lot_area_sqft = geometry.unsigned_area();

    Parcel {
        pin: members[0].pin.clone(),
        members: members.iter().map(|m| m.pin.clone()).collect(),
        lot_area_sqft,
        zone_class: members[0].zone_class.clone(),
        neighborhood: members[0].neighborhood.clone(),
        transit,
        characteristics,
        parcels_combined,
        geometry,
    }
}

#[cfg(test)]
mod tests {
    use upzone_parcel_models::{EligibleParcel, ParcelId, TransitProximityFacts};

    use super::*;
    use crate::test_support::rect;

    fn parcel(pin: &str, x0: f64, x1: f64, owner: Option<&str>) -> Parcel {
        let geometry = rect(x0, 0.0, x1, 100.0);
        Parcel::from_eligible(
            EligibleParcel {
                pin: ParcelId::parse(pin).unwrap(),
                lot_area_sqft: geometry.unsigned_area(),
                geometry,
                zone_class: "RS-3".to_string(),
                neighborhood: "AUSTIN".to_string(),
                transit: TransitProximityFacts::default(),
            },
            ResolvedCharacteristics {
                property_class: Some("203".to_string()),
                tax_pin_count: 1,
                existing_units: 1,
                building_age: Some(90),
                existing_sqft: 1200.0,
                building_value: 150_000.0,
                land_value: 60_000.0,
                address: None,
                owner_name: owner.map(str::to_string),
            },
        )
    }

    #[test]
    fn none_mode_passes_parcels_through() {
        let parcels = vec![
            parcel("1428322001", 0.0, 25.0, None),
            parcel("1428322002", 25.0, 50.0, None),
        ];
        let out = assemble(parcels, AssemblyMode::None);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| !p.is_assembled()));
    }

    #[test]
    fn touching_parcels_on_a_block_are_combined() {
        let mut second = parcel("1428322002", 25.0, 50.0, None);
        second.characteristics.building_value = 300_000.0;
        second.characteristics.property_class = Some("211".to_string());
        second.characteristics.building_age = Some(40);
        second.transit.rail_long = true;

        let parcels = vec![parcel("1428322001", 0.0, 25.0, None), second];
        let out = assemble(parcels, AssemblyMode::Block);

        assert_eq!(out.len(), 1);
        let lot = &out[0];
        assert_eq!(lot.pin.as_str(), "1428322001");
        assert_eq!(lot.parcels_combined, 2);
        assert_eq!(lot.members.len(), 2);
        assert!((lot.lot_area_sqft - 5000.0).abs() < 1e-6);
        assert_eq!(lot.characteristics.existing_units, 2);
        assert_eq!(lot.characteristics.tax_pin_count, 2);
        assert_eq!(lot.characteristics.building_age, Some(40));
        assert_eq!(lot.characteristics.property_class.as_deref(), Some("211"));
        assert!((lot.characteristics.existing_sqft - 2400.0).abs() < f64::EPSILON);
        assert!(lot.transit.rail_long);
    }

    #[test]
    fn separated_parcels_stay_apart() {
        let parcels = vec![
            parcel("1428322001", 0.0, 25.0, None),
            parcel("1428322002", 30.0, 55.0, None),
        ];
        let out = assemble(parcels, AssemblyMode::Block);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn different_blocks_are_never_combined() {
        let parcels = vec![
            parcel("1428322001", 0.0, 25.0, None),
            parcel("1428323002", 25.0, 50.0, None),
        ];
        let out = assemble(parcels, AssemblyMode::Block);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn owner_mode_requires_a_shared_owner() {
        let parcels = vec![
            parcel("1428322001", 0.0, 25.0, Some("Jane  Doe")),
            parcel("1428322002", 25.0, 50.0, Some("JANE DOE")),
            parcel("1428322003", 50.0, 75.0, Some("JOHN ROE")),
            parcel("1428322004", 75.0, 100.0, None),
        ];
        let out = assemble(parcels, AssemblyMode::Owner);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].parcels_combined, 2);
        assert_eq!(out[1].pin.as_str(), "1428322003");
        assert_eq!(out[2].pin.as_str(), "1428322004");
    }

    #[test]
    fn owner_mode_joins_a_vacant_lot_to_the_house_next_door() {
        let mut vacant = parcel("1428322001", 0.0, 30.0, Some("JANE DOE"));
        vacant.characteristics = ResolvedCharacteristics {
            property_class: Some("100".to_string()),
            tax_pin_count: 1,
            existing_units: 0,
            building_age: None,
            existing_sqft: 0.0,
            building_value: 1.0,
            land_value: 40_000.0,
            address: None,
            owner_name: Some("JANE DOE".to_string()),
        };
        let built = parcel("1428322002", 30.0, 50.0, Some("Jane Doe"));
        let separate_area = vacant.lot_area_sqft + built.lot_area_sqft;

        let out = assemble(vec![vacant, built], AssemblyMode::Owner);

        assert_eq!(out.len(), 1);
        let lot = &out[0];
        assert_eq!(lot.parcels_combined, 2);
        assert!((lot.lot_area_sqft - separate_area).abs() < 1e-6);
        assert!((lot.lot_area_sqft - lot.geometry.unsigned_area()).abs() < 1e-6);
        assert_eq!(lot.characteristics.existing_units, 1);
        assert_eq!(lot.characteristics.building_age, Some(90));
        assert_eq!(lot.characteristics.property_class.as_deref(), Some("203"));
        assert!((lot.characteristics.building_value - 150_001.0).abs() < 1e-6);
        assert!((lot.characteristics.land_value - 100_000.0).abs() < 1e-6);
    }
}
