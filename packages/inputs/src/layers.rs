//! `GeoJSON` layer loading.
//!
//! Each layer is a feature collection; the pipeline reads one geometry and
//! one property per feature. Features with missing or unsupported
//! geometries, or a blank key property, are skipped with a warning count.

use geo::{Geometry, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use geojson::{Feature, GeoJson};
use upzone_parcel_models::ParcelId;
use upzone_parcel_models::records::{
    BusRoute, NeighborhoodBoundary, ParcelGeometry, TransitStop, ZoningDistrict,
};

use crate::InputError;

/// Splits a `GeoJSON` document into its features.
fn features(contents: &str, source: &str) -> Result<Vec<Feature>, InputError> {
    let geojson: GeoJson = contents.parse().map_err(|e| InputError::GeoJson {
        path: source.to_string(),
        source: Box::new(e),
    })?;

    Ok(match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    })
}

/// Reads a feature property as a trimmed string. Numbers are rendered
/// without a trailing `.0` so numeric route ids match their text form.
fn property_string(feature: &Feature, field: &str) -> Option<String> {
    let value = feature.property(field)?;
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| n.to_string(), |i| i.to_string()),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn geometry(feature: &Feature) -> Option<Geometry<f64>> {
    let geometry = feature.geometry.clone()?;
    geometry.try_into().ok()
}

fn to_multipolygon(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::MultiPolygon(mp) => Some(mp),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        Geometry::GeometryCollection(collection) => {
            let polygons: Vec<Polygon<f64>> = collection
                .0
                .into_iter()
                .filter_map(to_multipolygon)
                .flat_map(|mp| mp.0)
                .collect();
            (!polygons.is_empty()).then_some(MultiPolygon(polygons))
        }
        _ => None,
    }
}

fn to_multilinestring(geometry: Geometry<f64>) -> Option<MultiLineString<f64>> {
    match geometry {
        Geometry::MultiLineString(mls) => Some(mls),
        Geometry::LineString(ls) => Some(MultiLineString(vec![ls])),
        Geometry::GeometryCollection(collection) => {
            let lines: Vec<LineString<f64>> = collection
                .0
                .into_iter()
                .filter_map(to_multilinestring)
                .flat_map(|mls| mls.0)
                .collect();
            (!lines.is_empty()).then_some(MultiLineString(lines))
        }
        _ => None,
    }
}

fn to_point(geometry: Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        Geometry::Point(p) => Some(p),
        Geometry::MultiPoint(mp) => mp.0.into_iter().next(),
        _ => None,
    }
}

fn log_skipped(layer: &str, skipped: usize) {
    if skipped > 0 {
        log::warn!("Skipped {skipped} {layer} features with missing geometry or key field");
    }
}

/// Parses parcel polygons keyed by their base identifier.
///
/// # Errors
///
/// Returns [`InputError::GeoJson`] if the document is not valid `GeoJSON`.
pub fn parse_parcels(
    contents: &str,
    id_field: &str,
    source: &str,
) -> Result<Vec<ParcelGeometry>, InputError> {
    let mut skipped = 0;
    let mut parcels = Vec::new();

    for feature in features(contents, source)? {
        let pin = property_string(&feature, id_field).and_then(|raw| ParcelId::parse(&raw));
        let polygon = geometry(&feature).and_then(to_multipolygon);
        match (pin, polygon) {
            (Some(pin), Some(geometry)) => parcels.push(ParcelGeometry { pin, geometry }),
            _ => skipped += 1,
        }
    }

    log_skipped("parcel", skipped);
    Ok(parcels)
}

/// Parses zoning districts with their class codes.
///
/// # Errors
///
/// Returns [`InputError::GeoJson`] if the document is not valid `GeoJSON`.
pub fn parse_zoning(
    contents: &str,
    class_field: &str,
    source: &str,
) -> Result<Vec<ZoningDistrict>, InputError> {
    let mut skipped = 0;
    let mut districts = Vec::new();

    for feature in features(contents, source)? {
        let class = property_string(&feature, class_field);
        let polygon = geometry(&feature).and_then(to_multipolygon);
        match (class, polygon) {
            (Some(zone_class), Some(geometry)) => districts.push(ZoningDistrict {
                zone_class: zone_class.to_ascii_uppercase(),
                geometry,
            }),
            _ => skipped += 1,
        }
    }

    log_skipped("zoning", skipped);
    Ok(districts)
}

/// Parses neighborhood boundaries with their names.
///
/// # Errors
///
/// Returns [`InputError::GeoJson`] if the document is not valid `GeoJSON`.
pub fn parse_neighborhoods(
    contents: &str,
    name_field: &str,
    source: &str,
) -> Result<Vec<NeighborhoodBoundary>, InputError> {
    let mut skipped = 0;
    let mut neighborhoods = Vec::new();

    for feature in features(contents, source)? {
        let name = property_string(&feature, name_field);
        let polygon = geometry(&feature).and_then(to_multipolygon);
        match (name, polygon) {
            (Some(name), Some(geometry)) => neighborhoods.push(NeighborhoodBoundary {
                name: name.to_ascii_uppercase(),
                geometry,
            }),
            _ => skipped += 1,
        }
    }

    log_skipped("neighborhood", skipped);
    Ok(neighborhoods)
}

/// Parses rail stop points. The name property is optional.
///
/// # Errors
///
/// Returns [`InputError::GeoJson`] if the document is not valid `GeoJSON`.
pub fn parse_transit_stops(
    contents: &str,
    name_field: &str,
    source: &str,
) -> Result<Vec<TransitStop>, InputError> {
    let mut skipped = 0;
    let mut stops = Vec::new();

    for feature in features(contents, source)? {
        let Some(location) = geometry(&feature).and_then(to_point) else {
            skipped += 1;
            continue;
        };
        stops.push(TransitStop {
            name: property_string(&feature, name_field),
            location,
        });
    }

    log_skipped("transit stop", skipped);
    Ok(stops)
}

/// Parses bus route lines with their route identifiers.
///
/// # Errors
///
/// Returns [`InputError::GeoJson`] if the document is not valid `GeoJSON`.
pub fn parse_bus_routes(
    contents: &str,
    route_field: &str,
    source: &str,
) -> Result<Vec<BusRoute>, InputError> {
    let mut skipped = 0;
    let mut routes = Vec::new();

    for feature in features(contents, source)? {
        let route = property_string(&feature, route_field);
        let lines = geometry(&feature).and_then(to_multilinestring);
        match (route, lines) {
            (Some(route), Some(geometry)) => routes.push(BusRoute {
                route: route.to_ascii_uppercase(),
                geometry,
            }),
            _ => skipped += 1,
        }
    }

    log_skipped("bus route", skipped);
    Ok(routes)
}
