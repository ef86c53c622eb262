#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial join for parcel eligibility.
//!
//! Builds R-tree indexes over eligible zoning districts, neighborhood
//! boundaries, rail stops, and bus routes, then tags every parcel that
//! overlaps an eligible district with its zone class, neighborhood, and
//! transit proximity facts. Candidate lookups go through bounding boxes;
//! exact `geo` predicates and distances decide.
//!
//! The [`assembly`] module combines touching parcels into assembled lots
//! once their characteristics are resolved.

pub mod assembly;

use geo::{
    Area, BoundingRect, Centroid, Contains, Distance, Euclidean, MultiLineString, MultiPolygon,
    Point, Relate,
};
use rstar::{AABB, RTree, RTreeObject};
use upzone_config::EngineConfig;
use upzone_parcel_models::records::{
    BusRoute, NeighborhoodBoundary, ParcelGeometry, TransitStop, ZoningDistrict,
};
use upzone_parcel_models::{EligibleParcel, TransitProximityFacts, UNASSIGNED_NEIGHBORHOOD};

/// A polygon stored in an R-tree with its label and input position.
struct PolygonEntry {
    /// Position in the input layer, used for stable tie-breaks.
    index: usize,
    label: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for PolygonEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

struct StopEntry {
    point: Point<f64>,
}

impl RTreeObject for StopEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.point.x(), self.point.y()])
    }
}

struct RouteEntry {
    route: String,
    brt: bool,
    high_frequency: bool,
    envelope: AABB<[f64; 2]>,
    lines: MultiLineString<f64>,
}

impl RTreeObject for RouteEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial indexes for the eligibility join.
///
/// Constructed once per run and read-only afterward.
pub struct SpatialJoin {
    zoning: RTree<PolygonEntry>,
    neighborhoods: RTree<PolygonEntry>,
    stops: RTree<StopEntry>,
    routes: RTree<RouteEntry>,
    short_radius: f64,
    long_radius: f64,
}

impl SpatialJoin {
    /// Indexes every reference layer. Zoning districts outside the
    /// configured eligible prefixes are dropped up front.
    #[must_use]
    pub fn new(
        zoning: &[ZoningDistrict],
        neighborhoods: &[NeighborhoodBoundary],
        stops: &[TransitStop],
        routes: &[BusRoute],
        config: &EngineConfig,
    ) -> Self {
        let zoning_entries: Vec<PolygonEntry> = zoning
            .iter()
            .enumerate()
            .filter(|(_, d)| config.zoning.is_eligible(&d.zone_class))
            .map(|(index, d)| PolygonEntry {
                index,
                label: d.zone_class.clone(),
                envelope: polygon_envelope(&d.geometry),
                polygon: d.geometry.clone(),
            })
            .collect();
        log::info!(
            "Indexed {} of {} zoning districts as eligible",
            zoning_entries.len(),
            zoning.len()
        );

        let neighborhood_entries: Vec<PolygonEntry> = neighborhoods
            .iter()
            .enumerate()
            .map(|(index, n)| PolygonEntry {
                index,
                label: n.name.clone(),
                envelope: polygon_envelope(&n.geometry),
                polygon: n.geometry.clone(),
            })
            .collect();

        let stop_entries: Vec<StopEntry> = stops
            .iter()
            .map(|s| StopEntry { point: s.location })
            .collect();

        let route_entries: Vec<RouteEntry> = routes
            .iter()
            .map(|r| RouteEntry {
                route: r.route.clone(),
                brt: config.transit.is_brt(&r.route),
                high_frequency: config.transit.is_high_frequency(&r.route),
                envelope: lines_envelope(&r.geometry),
                lines: r.geometry.clone(),
            })
            .collect();
        log::info!(
            "Indexed {} neighborhoods, {} rail stops, {} bus route segments",
            neighborhood_entries.len(),
            stop_entries.len(),
            route_entries.len()
        );

        Self {
            zoning: RTree::bulk_load(zoning_entries),
            neighborhoods: RTree::bulk_load(neighborhood_entries),
            stops: RTree::bulk_load(stop_entries),
            routes: RTree::bulk_load(route_entries),
            short_radius: config.transit.short_radius_ft,
            long_radius: config.transit.long_radius_ft,
        }
    }

    /// Tags every parcel that overlaps an eligible district.
    ///
    /// Output order follows input order; each parcel appears at most once.
    #[must_use]
    pub fn join(&self, parcels: &[ParcelGeometry]) -> Vec<EligibleParcel> {
        let eligible: Vec<EligibleParcel> =
            parcels.iter().filter_map(|p| self.join_one(p)).collect();
        log::info!(
            "{} of {} parcels intersect eligible zoning",
            eligible.len(),
            parcels.len()
        );
        eligible
    }

    /// Tags one parcel, or returns `None` if it overlaps no eligible
    /// district.
    #[must_use]
    pub fn join_one(&self, parcel: &ParcelGeometry) -> Option<EligibleParcel> {
        let centroid = parcel.geometry.centroid();
        let zone_class = self.zone_for(&parcel.geometry, centroid.as_ref())?;

        Some(EligibleParcel {
            pin: parcel.pin.clone(),
            lot_area_sqft: parcel.geometry.unsigned_area(),
            zone_class: zone_class.to_string(),
            neighborhood: centroid.as_ref().map_or_else(
                || UNASSIGNED_NEIGHBORHOOD.to_string(),
                |c| self.neighborhood_for(c).to_string(),
            ),
            transit: self.transit_facts(&parcel.geometry),
            geometry: parcel.geometry.clone(),
        })
    }

    /// Neighborhood of any parcel, eligible or not. Used to place sales.
    #[must_use]
    pub fn neighborhood_of(&self, polygon: &MultiPolygon<f64>) -> String {
        polygon.centroid().map_or_else(
            || UNASSIGNED_NEIGHBORHOOD.to_string(),
            |c| self.neighborhood_for(&c).to_string(),
        )
    }

    /// Picks exactly one zone class for a parcel.
    ///
    /// Districts that only touch the parcel's boundary do not count. Among
    /// overlapping districts, one containing the parcel's centroid wins;
    /// remaining ties go to the earliest district in the input layer.
    fn zone_for(&self, polygon: &MultiPolygon<f64>, centroid: Option<&Point<f64>>) -> Option<&str> {
        let envelope = polygon_envelope(polygon);
        let mut candidates: Vec<&PolygonEntry> = self
            .zoning
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| {
                let matrix = entry.polygon.relate(polygon);
                matrix.is_intersects() && !matrix.is_touches()
            })
            .collect();
        candidates.sort_by_key(|entry| entry.index);

        let containing = centroid.and_then(|c| {
            candidates
                .iter()
                .find(|entry| entry.polygon.contains(c))
                .copied()
        });

        containing
            .or_else(|| candidates.first().copied())
            .map(|entry| entry.label.as_str())
    }

    /// Neighborhood containing a point, else the nearest one.
    fn neighborhood_for(&self, point: &Point<f64>) -> &str {
        let query = AABB::from_point([point.x(), point.y()]);
        let containing = self
            .neighborhoods
            .locate_in_envelope_intersecting(&query)
            .filter(|entry| entry.polygon.contains(point))
            .min_by_key(|entry| entry.index);
        if let Some(entry) = containing {
            return &entry.label;
        }

        let mut nearest: Option<(f64, &PolygonEntry)> = None;
        for entry in self.neighborhoods.iter() {
            let distance = distance_to_point(&entry.polygon, point);
            let closer = nearest.is_none_or(|(best, best_entry)| {
                distance < best || (distance <= best && entry.index < best_entry.index)
            });
            if closer {
                nearest = Some((distance, entry));
            }
        }

        nearest.map_or(UNASSIGNED_NEIGHBORHOOD, |(_, entry)| entry.label.as_str())
    }

    /// Distance-based transit facts for a parcel or lot.
    #[must_use]
    pub fn transit_facts(&self, polygon: &MultiPolygon<f64>) -> TransitProximityFacts {
        let mut facts = TransitProximityFacts::default();
        let search = expand(&polygon_envelope(polygon), self.long_radius);

        let nearest_stop = self
            .stops
            .locate_in_envelope(&search)
            .map(|stop| distance_to_point(polygon, &stop.point))
            .fold(f64::INFINITY, f64::min);
        facts.rail_short = nearest_stop <= self.short_radius;
        facts.rail_long = nearest_stop <= self.long_radius;

        for entry in self.routes.locate_in_envelope_intersecting(&search) {
            let distance = distance_to_lines(polygon, &entry.lines);
            if entry.brt {
                facts.brt_short |= distance <= self.short_radius;
                facts.brt_long |= distance <= self.long_radius;
            }
            if distance <= self.short_radius {
                facts.bus_routes.insert(entry.route.clone());
                if entry.high_frequency {
                    facts.high_frequency_routes.insert(entry.route.clone());
                }
            }
        }

        facts
    }
}

/// Minimum distance from any member polygon to a point (0 inside).
fn distance_to_point(polygon: &MultiPolygon<f64>, point: &Point<f64>) -> f64 {
    polygon
        .0
        .iter()
        .map(|p| Euclidean.distance(p, point))
        .fold(f64::INFINITY, f64::min)
}

/// Minimum distance from any member polygon to any member line.
fn distance_to_lines(polygon: &MultiPolygon<f64>, lines: &MultiLineString<f64>) -> f64 {
    polygon
        .0
        .iter()
        .flat_map(|p| lines.0.iter().map(move |line| Euclidean.distance(p, line)))
        .fold(f64::INFINITY, f64::min)
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn polygon_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

fn lines_envelope(lines: &MultiLineString<f64>) -> AABB<[f64; 2]> {
    lines.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

fn expand(envelope: &AABB<[f64; 2]>, by: f64) -> AABB<[f64; 2]> {
    let lower = envelope.lower();
    let upper = envelope.upper();
    AABB::from_corners([lower[0] - by, lower[1] - by], [upper[0] + by, upper[1] + by])
}

#[cfg(test)]
pub(crate) mod test_support {
    use geo::{LineString, MultiLineString, MultiPolygon, Point, Polygon, polygon};
    use upzone_parcel_models::ParcelId;
    use upzone_parcel_models::records::{
        BusRoute, NeighborhoodBoundary, ParcelGeometry, TransitStop, ZoningDistrict,
    };

    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        let p: Polygon<f64> = polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ];
        MultiPolygon(vec![p])
    }

    pub fn parcel(pin: &str, geometry: MultiPolygon<f64>) -> ParcelGeometry {
        ParcelGeometry {
            pin: ParcelId::parse(pin).unwrap(),
            geometry,
        }
    }

    pub fn district(zone_class: &str, geometry: MultiPolygon<f64>) -> ZoningDistrict {
        ZoningDistrict {
            zone_class: zone_class.to_string(),
            geometry,
        }
    }

    pub fn neighborhood(name: &str, geometry: MultiPolygon<f64>) -> NeighborhoodBoundary {
        NeighborhoodBoundary {
            name: name.to_string(),
            geometry,
        }
    }

    pub fn stop(x: f64, y: f64) -> TransitStop {
        TransitStop {
            name: None,
            location: Point::new(x, y),
        }
    }

    /// A vertical route line at `x`.
    pub fn route(id: &str, x: f64) -> BusRoute {
        BusRoute {
            route: id.to_string(),
            geometry: MultiLineString(vec![LineString::from(vec![(x, -10_000.0), (x, 10_000.0)])]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn join_with(
        zoning: &[ZoningDistrict],
        neighborhoods: &[NeighborhoodBoundary],
        stops: &[TransitStop],
        routes: &[BusRoute],
    ) -> SpatialJoin {
        SpatialJoin::new(zoning, neighborhoods, stops, routes, &EngineConfig::default())
    }

    #[test]
    fn ineligible_districts_are_not_joined() {
        let join = join_with(
            &[district("PMD-4", rect(0.0, 0.0, 1000.0, 1000.0))],
            &[],
            &[],
            &[],
        );
        assert!(
            join.join_one(&parcel("1428322044", rect(10.0, 10.0, 60.0, 110.0)))
                .is_none()
        );
    }

    #[test]
    fn lot_area_and_zone_class_are_recorded() {
        let join = join_with(
            &[district("RS-3", rect(0.0, 0.0, 1000.0, 1000.0))],
            &[neighborhood("LAKE VIEW", rect(0.0, 0.0, 1000.0, 1000.0))],
            &[],
            &[],
        );
        let eligible = join
            .join_one(&parcel("1428322044", rect(10.0, 10.0, 60.0, 110.0)))
            .unwrap();

        assert_eq!(eligible.zone_class, "RS-3");
        assert_eq!(eligible.neighborhood, "LAKE VIEW");
        assert!((eligible.lot_area_sqft - 5000.0).abs() < 1e-6);
    }

    #[test]
    fn split_parcel_gets_exactly_one_zone_preferring_centroid() {
        // Parcel spans x 90..140; centroid (115, 50) lies in the second district.
        let join = join_with(
            &[
                district("RS-3", rect(0.0, 0.0, 100.0, 100.0)),
                district("B3-2", rect(100.0, 0.0, 200.0, 100.0)),
            ],
            &[],
            &[],
            &[],
        );
        let eligible = join
            .join_one(&parcel("1428322044", rect(90.0, 0.0, 140.0, 100.0)))
            .unwrap();
        assert_eq!(eligible.zone_class, "B3-2");
    }

    #[test]
    fn boundary_touch_does_not_count_as_overlap() {
        let join = join_with(
            &[
                district("RS-3", rect(0.0, 0.0, 100.0, 100.0)),
                district("OS", rect(100.0, 0.0, 200.0, 100.0)),
            ],
            &[],
            &[],
            &[],
        );
        assert!(
            join.join_one(&parcel("1428322044", rect(100.0, 10.0, 150.0, 60.0)))
                .is_none()
        );
    }

    #[test]
    fn parcel_outside_every_neighborhood_gets_nearest() {
        let join = join_with(
            &[district("RT-4", rect(0.0, 0.0, 5000.0, 5000.0))],
            &[
                neighborhood("FAR", rect(3000.0, 3000.0, 4000.0, 4000.0)),
                neighborhood("NEAR", rect(0.0, 200.0, 100.0, 300.0)),
            ],
            &[],
            &[],
        );
        let eligible = join
            .join_one(&parcel("1428322044", rect(0.0, 0.0, 50.0, 100.0)))
            .unwrap();
        assert_eq!(eligible.neighborhood, "NEAR");
    }

    #[test]
    fn no_neighborhood_layer_means_unassigned() {
        let join = join_with(&[district("RT-4", rect(0.0, 0.0, 500.0, 500.0))], &[], &[], &[]);
        let eligible = join
            .join_one(&parcel("1428322044", rect(0.0, 0.0, 50.0, 100.0)))
            .unwrap();
        assert_eq!(eligible.neighborhood, UNASSIGNED_NEIGHBORHOOD);
    }

    #[test]
    fn rail_radii_are_measured_from_the_parcel_edge() {
        let join = join_with(&[], &[], &[stop(50.0 + 1300.0, 50.0), stop(-2000.0, 50.0)], &[]);
        let facts = join.transit_facts(&rect(0.0, 0.0, 50.0, 100.0));
        assert!(facts.rail_short);
        assert!(facts.rail_long);

        let join = join_with(&[], &[], &[stop(50.0 + 2000.0, 50.0)], &[]);
        let facts = join.transit_facts(&rect(0.0, 0.0, 50.0, 100.0));
        assert!(!facts.rail_short);
        assert!(facts.rail_long);

        let join = join_with(&[], &[], &[stop(50.0 + 3000.0, 50.0)], &[]);
        let facts = join.transit_facts(&rect(0.0, 0.0, 50.0, 100.0));
        assert!(!facts.rail_long);
    }

    #[test]
    fn bus_routes_are_counted_once_per_route() {
        let join = join_with(
            &[],
            &[],
            &[],
            &[
                route("9", 500.0),
                route("9", 600.0),
                route("49", -800.0),
                route("X49", 1000.0),
                route("J14", 2000.0),
                route("72", 5000.0),
            ],
        );
        let facts = join.transit_facts(&rect(0.0, 0.0, 50.0, 100.0));

        assert_eq!(facts.bus_route_count(), 3);
        assert_eq!(facts.high_frequency_route_count(), 2);
        assert!(!facts.brt_short);
        assert!(facts.brt_long);
    }
}
