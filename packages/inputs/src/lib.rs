#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input loading for the upzone pipeline.
//!
//! Reads the geographic layers (`GeoJSON`) and tabular rolls (CSV) named in
//! [`InputsConfig`] from a data directory into an [`InputTables`] snapshot.
//! Parcels and zoning are required; every other table may be absent, in
//! which case it loads empty (or, for sales, as `None`, which switches
//! market calibration to its static fallbacks).

pub mod layers;
pub mod parsing;
pub mod tables;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use upzone_config::InputsConfig;
use upzone_parcel_models::records::{
    AddressRecord, AssessmentRecord, BusRoute, CharacteristicsRecord, NeighborhoodBoundary,
    ParcelGeometry, SaleRecord, TransitStop, ZoningDistrict,
};

/// Errors that can occur while loading input tables.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// A required input file does not exist.
    #[error("Required input {table} not found at {path}")]
    MissingInput { table: &'static str, path: String },

    /// An input file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A `GeoJSON` document failed to parse.
    #[error("Invalid GeoJSON in {path}: {source}")]
    GeoJson {
        path: String,
        source: Box<geojson::Error>,
    },

    /// A CSV file is malformed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A configured column is absent from a CSV header.
    #[error("Column '{column}' not found in {path}")]
    MissingColumn { path: String, column: String },
}

/// Every upstream table, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct InputTables {
    pub parcels: Vec<ParcelGeometry>,
    pub zoning: Vec<ZoningDistrict>,
    pub neighborhoods: Vec<NeighborhoodBoundary>,
    pub transit_stops: Vec<TransitStop>,
    pub bus_routes: Vec<BusRoute>,
    pub assessments: Vec<AssessmentRecord>,
    pub characteristics: Vec<CharacteristicsRecord>,
    pub addresses: Vec<AddressRecord>,
    /// `None` when the sales feed is unavailable.
    pub sales: Option<Vec<SaleRecord>>,
}

fn read_string(path: &Path) -> Result<String, InputError> {
    std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn open(path: &Path) -> Result<BufReader<File>, InputError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| InputError::Io {
            path: path.display().to_string(),
            source,
        })
}

fn require(path: &Path, table: &'static str) -> Result<(), InputError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(InputError::MissingInput {
            table,
            path: path.display().to_string(),
        })
    }
}

/// Loads an optional table, returning an empty table if the file is absent.
fn optional<T>(
    path: &Path,
    table: &str,
    load: impl FnOnce(&Path) -> Result<Vec<T>, InputError>,
) -> Result<Vec<T>, InputError> {
    if path.is_file() {
        load(path)
    } else {
        log::warn!(
            "Optional input {table} not found at {}, continuing without it",
            path.display()
        );
        Ok(Vec::new())
    }
}

/// Loads every input table from `data_dir`.
///
/// # Errors
///
/// Returns [`InputError::MissingInput`] if the parcel or zoning layer is
/// absent, or a parse error for any table that exists but is malformed.
/// A malformed or missing sales table is not an error; it loads as `None`.
pub fn load_inputs(data_dir: &Path, config: &InputsConfig) -> Result<InputTables, InputError> {
    let parcels_path = config.parcels.path(data_dir);
    let zoning_path = config.zoning.path(data_dir);
    require(&parcels_path, "parcels")?;
    require(&zoning_path, "zoning")?;

    let source = parcels_path.display().to_string();
    let parcels = layers::parse_parcels(
        &read_string(&parcels_path)?,
        &config.parcels.field,
        &source,
    )?;
    log::info!("Loaded {} parcels", parcels.len());

    let source = zoning_path.display().to_string();
    let zoning = layers::parse_zoning(&read_string(&zoning_path)?, &config.zoning.field, &source)?;
    log::info!("Loaded {} zoning districts", zoning.len());

    let neighborhoods = optional(
        &config.neighborhoods.path(data_dir),
        "neighborhoods",
        |path| {
            layers::parse_neighborhoods(
                &read_string(path)?,
                &config.neighborhoods.field,
                &path.display().to_string(),
            )
        },
    )?;
    log::info!("Loaded {} neighborhoods", neighborhoods.len());

    let transit_stops = optional(
        &config.transit_stops.path(data_dir),
        "transit stops",
        |path| {
            layers::parse_transit_stops(
                &read_string(path)?,
                &config.transit_stops.field,
                &path.display().to_string(),
            )
        },
    )?;
    let bus_routes = optional(&config.bus_routes.path(data_dir), "bus routes", |path| {
        layers::parse_bus_routes(
            &read_string(path)?,
            &config.bus_routes.field,
            &path.display().to_string(),
        )
    })?;
    log::info!(
        "Loaded {} transit stops and {} bus routes",
        transit_stops.len(),
        bus_routes.len()
    );

    let assessments = optional(&config.assessments.path(data_dir), "assessments", |path| {
        tables::parse_assessments(open(path)?, &config.assessments, &path.display().to_string())
    })?;
    let characteristics = optional(
        &config.characteristics.path(data_dir),
        "characteristics",
        |path| {
            tables::parse_characteristics(
                open(path)?,
                &config.characteristics,
                &path.display().to_string(),
            )
        },
    )?;
    let addresses = optional(&config.addresses.path(data_dir), "addresses", |path| {
        tables::parse_addresses(open(path)?, &config.addresses, &path.display().to_string())
    })?;
    log::info!(
        "Loaded {} assessment, {} characteristics, and {} address rows",
        assessments.len(),
        characteristics.len(),
        addresses.len()
    );

    let sales = load_sales(&config.sales.path(data_dir), config);

    Ok(InputTables {
        parcels,
        zoning,
        neighborhoods,
        transit_stops,
        bus_routes,
        assessments,
        characteristics,
        addresses,
        sales,
    })
}

/// Loads the sales table, or `None` if it is missing or unreadable.
fn load_sales(path: &Path, config: &InputsConfig) -> Option<Vec<SaleRecord>> {
    if !path.is_file() {
        log::warn!("Sales table not found at {}", path.display());
        return None;
    }

    let loaded = open(path).and_then(|reader| {
        tables::parse_sales(reader, &config.sales, &path.display().to_string())
    });
    match loaded {
        Ok(sales) => {
            log::info!("Loaded {} sales", sales.len());
            Some(sales)
        }
        Err(e) => {
            log::warn!("Sales table at {} is unusable: {e}", path.display());
            None
        }
    }
}
