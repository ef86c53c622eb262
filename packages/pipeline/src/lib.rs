#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end upzone run.
//!
//! The reference stages (spatial join, assessment resolution, market
//! calibration, lot assembly) run sequentially and produce read-only
//! tables. Parcel evaluation then fans out across the rayon pool, and the
//! neighborhood rollup runs last as a sequential reduction. Results are
//! written by the [`output`] module.

pub mod output;
pub mod progress;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use upzone_assessment::AssessmentIndex;
use upzone_config::{AssemblyMode, ConfigError, EngineConfig};
use upzone_inputs::{InputError, InputTables};
use upzone_market::{MarketTable, SaleInputs};
use upzone_parcel_models::records::ParcelGeometry;
use upzone_parcel_models::{
    MarketContext, NeighborhoodAggregate, NeighborhoodProfile, Parcel, ParcelEvaluation, ParcelId,
    Scenario,
};
use upzone_spatial::SpatialJoin;

pub use progress::{NullProgress, ProgressCallback, null_progress};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An input table is missing or malformed.
    #[error(transparent)]
    Input(#[from] InputError),

    /// The configuration is out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required table loaded without any rows.
    #[error("Required input {table} has no rows")]
    EmptyInput { table: &'static str },

    /// An output file or directory could not be written.
    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    /// A CSV output failed to serialize.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The run summary failed to serialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Headline numbers for one run, written as `run_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub snapshot_date: NaiveDate,
    /// Market calibration fell back to static tables.
    pub degraded_market: bool,
    pub assembly: AssemblyMode,
    pub parcels_loaded: usize,
    pub parcels_eligible: usize,
    pub lots_evaluated: usize,
    /// Lots built from more than one parcel.
    pub lots_assembled: usize,
    pub neighborhoods: usize,
    /// Lots whose highest and best use delivers at least one unit.
    pub buildable_lots: usize,
    pub hbu_units: u64,
    /// Citywide regime yield per scenario, over reported neighborhoods.
    pub scenario_units: BTreeMap<Scenario, u64>,
}

/// Everything a run produces, in memory.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Evaluated lots in identifier order; parallel to `evaluations`.
    pub lots: Vec<Parcel>,
    pub evaluations: Vec<ParcelEvaluation>,
    pub aggregates: Vec<NeighborhoodAggregate>,
    pub profiles: Vec<NeighborhoodProfile>,
    pub market: Vec<MarketContext>,
    pub summary: RunSummary,
}

/// Loads every input from `data_dir` and runs the pipeline.
///
/// # Errors
///
/// * [`PipelineError::Input`] if the parcel or zoning layer is missing or
///   any present table is malformed
/// * [`PipelineError::EmptyInput`] if parcels or zoning have no rows
/// * [`PipelineError::Config`] if the configuration fails validation
pub fn run(
    data_dir: &Path,
    config: &EngineConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<PipelineOutput, PipelineError> {
    let tables = upzone_inputs::load_inputs(data_dir, &config.inputs)?;
    run_tables(&tables, config, progress)
}

/// Runs the pipeline over tables that are already loaded.
///
/// # Errors
///
/// * [`PipelineError::EmptyInput`] if parcels or zoning have no rows
/// * [`PipelineError::Config`] if the configuration fails validation
pub fn run_tables(
    tables: &InputTables,
    config: &EngineConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<PipelineOutput, PipelineError> {
    let start = Instant::now();
    config.validate()?;
    if tables.parcels.is_empty() {
        return Err(PipelineError::EmptyInput { table: "parcels" });
    }
    if tables.zoning.is_empty() {
        return Err(PipelineError::EmptyInput { table: "zoning" });
    }

    let join = SpatialJoin::new(
        &tables.zoning,
        &tables.neighborhoods,
        &tables.transit_stops,
        &tables.bus_routes,
        config,
    );
    let eligible = join.join(&tables.parcels);
    let parcels_eligible = eligible.len();

    let assessments = AssessmentIndex::build(
        &tables.assessments,
        &tables.characteristics,
        &tables.addresses,
        config,
    );

    let market = match &tables.sales {
        Some(sales) => {
            let neighborhoods = sale_neighborhoods(&join, &tables.parcels);
            MarketTable::calibrate(
                Some(SaleInputs {
                    sales,
                    neighborhoods: &neighborhoods,
                    assessments: &assessments,
                }),
                config,
            )
        }
        None => MarketTable::calibrate(None, config),
    };

    let resolved = assessments.resolve(eligible);
    let mut lots = upzone_spatial::assembly::assemble(resolved, config.assembly.mode);
    lots.sort_by(|a, b| a.pin.cmp(&b.pin));

    let evaluations = evaluate_lots(&lots, &market, config, progress);

    let aggregates = upzone_aggregate::aggregate(&evaluations, config);
    let profiles = upzone_aggregate::profiles(&evaluations, config);
    let market_rows = market.rows(lots.iter().map(|lot| lot.neighborhood.as_str()));

    let summary = RunSummary {
        snapshot_date: config.snapshot_date,
        degraded_market: market.is_degraded(),
        assembly: config.assembly.mode,
        parcels_loaded: tables.parcels.len(),
        parcels_eligible,
        lots_evaluated: lots.len(),
        lots_assembled: lots.iter().filter(|lot| lot.parcels_combined > 1).count(),
        neighborhoods: profiles.len(),
        buildable_lots: evaluations.iter().filter(|e| e.hbu.unit_yield > 0).count(),
        hbu_units: evaluations
            .iter()
            .map(|e| u64::from(e.hbu.unit_yield))
            .sum(),
        scenario_units: upzone_aggregate::scenario_totals(&aggregates),
    };

    log::info!(
        "Pipeline complete in {:.1}s: {} lots, {} HBU units",
        start.elapsed().as_secs_f64(),
        summary.lots_evaluated,
        summary.hbu_units,
    );

    Ok(PipelineOutput {
        lots,
        evaluations,
        aggregates,
        profiles,
        market: market_rows,
        summary,
    })
}

/// Neighborhood of every parcel in the city, eligible or not, so sales on
/// any parcel can be placed. The first geometry seen for an identifier wins.
fn sale_neighborhoods(
    join: &SpatialJoin,
    parcels: &[ParcelGeometry],
) -> BTreeMap<ParcelId, String> {
    let mut neighborhoods = BTreeMap::new();
    for parcel in parcels {
        neighborhoods
            .entry(parcel.pin.clone())
            .or_insert_with(|| join.neighborhood_of(&parcel.geometry));
    }
    log::debug!("Placed {} parcels for sales calibration", neighborhoods.len());
    neighborhoods
}

/// Evaluates every lot in parallel. Output order matches `lots`.
fn evaluate_lots(
    lots: &[Parcel],
    market: &MarketTable,
    config: &EngineConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<ParcelEvaluation> {
    progress.set_total(lots.len() as u64);
    progress.set_message("Evaluating lots".to_string());

    let evaluations: Vec<ParcelEvaluation> = lots
        .par_iter()
        .map(|lot| {
            let context = market.context_for(&lot.neighborhood, &lot.characteristics);
            let evaluation = upzone_proforma::evaluate(lot, &context, config);
            progress.inc(1);
            evaluation
        })
        .collect();

    progress.finish(format!("Evaluated {} lots", evaluations.len()));
    log::info!(
        "Evaluated {} lots across {} scenarios",
        evaluations.len(),
        Scenario::ALL.len()
    );

    evaluations
}

#[cfg(test)]
pub(crate) mod test_support {
    use geo::{MultiPolygon, Rect};
    use upzone_inputs::InputTables;
    use upzone_parcel_models::ParcelId;
    use upzone_parcel_models::records::{
        AddressRecord, AssessmentRecord, CharacteristicsRecord, NeighborhoodBoundary,
        ParcelGeometry, ZoningDistrict,
    };

    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![Rect::new((x0, y0), (x1, y1)).to_polygon()])
    }

    fn assessment(pin: &str, class: &str, building: f64, land: f64) -> AssessmentRecord {
        AssessmentRecord {
            pin: pin.to_string(),
            property_class: class.to_string(),
            assessed_building: building,
            assessed_land: land,
        }
    }

    /// Two single-family lots and a park on one RS-3 block in AUSTIN, plus
    /// a commercial lot in an open-space district.
    pub fn tables() -> InputTables {
        let parcel = |pin: &str, geometry| ParcelGeometry {
            pin: ParcelId::parse(pin).unwrap(),
            geometry,
        };

        InputTables {
            parcels: vec![
                parcel("1428322044", rect(0.0, 0.0, 50.0, 100.0)),
                parcel("1428322045", rect(50.0, 0.0, 150.0, 100.0)),
                parcel("1428322046", rect(150.0, 0.0, 200.0, 100.0)),
                parcel("1428400001", rect(1000.0, 0.0, 1100.0, 100.0)),
            ],
            zoning: vec![
                ZoningDistrict {
                    zone_class: "RS-3".to_string(),
                    geometry: rect(0.0, 0.0, 200.0, 100.0),
                },
                ZoningDistrict {
                    zone_class: "POS-1".to_string(),
                    geometry: rect(1000.0, 0.0, 1100.0, 100.0),
                },
            ],
            neighborhoods: vec![NeighborhoodBoundary {
                name: "AUSTIN".to_string(),
                geometry: rect(-500.0, -500.0, 2000.0, 500.0),
            }],
            assessments: vec![
                assessment("14283220440000", "203", 15_000.0, 5_000.0),
                assessment("14283220450000", "203", 12_000.0, 8_000.0),
                assessment("14283220460000", "299", 0.0, 0.0),
            ],
            characteristics: vec![
                CharacteristicsRecord {
                    pin: "14283220440000".to_string(),
                    year_built: Some(1920),
                    building_sqft: Some(1_400.0),
                },
                CharacteristicsRecord {
                    pin: "14283220450000".to_string(),
                    year_built: Some(1955),
                    building_sqft: Some(2_000.0),
                },
            ],
            addresses: vec![AddressRecord {
                pin: "14283220440000".to_string(),
                address: Some("5000 W MADISON ST".to_string()),
                owner_name: Some("JANE DOE".to_string()),
            }],
            ..InputTables::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::tables;
    use super::*;

    #[test]
    fn empty_parcels_abort_the_run() {
        let mut tables = tables();
        tables.parcels.clear();
        let err = run_tables(&tables, &EngineConfig::default(), &null_progress()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput { table: "parcels" }));
    }

    #[test]
    fn empty_zoning_aborts_the_run() {
        let mut tables = tables();
        tables.zoning.clear();
        let err = run_tables(&tables, &EngineConfig::default(), &null_progress()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput { table: "zoning" }));
    }

    #[test]
    fn invalid_config_aborts_the_run() {
        let mut config = EngineConfig::default();
        config.proforma.target_margin = 0.0;
        let err = run_tables(&tables(), &config, &null_progress()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn evaluates_every_eligible_lot_in_identifier_order() {
        let output = run_tables(&tables(), &EngineConfig::default(), &null_progress()).unwrap();

        assert_eq!(output.summary.parcels_loaded, 4);
        assert_eq!(output.summary.parcels_eligible, 3);
        assert!(output.summary.degraded_market);
        assert_eq!(output.lots.len(), output.evaluations.len());

        let pins: Vec<&str> = output.evaluations.iter().map(|e| e.pin.as_str()).collect();
        assert_eq!(pins, vec!["1428322044", "1428322045", "1428322046"]);
        for (lot, evaluation) in output.lots.iter().zip(&output.evaluations) {
            assert_eq!(lot.pin, evaluation.pin);
            assert_eq!(evaluation.results.len(), Scenario::ALL.len());
            assert_eq!(evaluation.neighborhood, "AUSTIN");
        }

        let first = &output.lots[0];
        assert_eq!(first.characteristics.existing_units, 1);
        assert!((first.characteristics.building_value - 150_000.0).abs() < 1e-6);
        assert!((first.lot_area_sqft - 5_000.0).abs() < 1e-6);
    }

    #[test]
    fn block_assembly_merges_touching_lots() {
        let mut config = EngineConfig::default();
        config.assembly.mode = AssemblyMode::Block;
        let output = run_tables(&tables(), &config, &null_progress()).unwrap();

        assert_eq!(output.lots.len(), 1);
        let lot = &output.lots[0];
        assert_eq!(lot.parcels_combined, 3);
        assert!((lot.lot_area_sqft - 20_000.0).abs() < 1e-6);
        assert_eq!(lot.characteristics.existing_units, 3);
        assert_eq!(output.summary.lots_assembled, 1);
    }

    #[test]
    fn market_rows_cover_evaluated_neighborhoods() {
        let output = run_tables(&tables(), &EngineConfig::default(), &null_progress()).unwrap();
        assert!(!output.market.is_empty());
        assert!(output.market.iter().all(|row| row.neighborhood == "AUSTIN"));
        assert!(output.market.iter().all(|row| (row.multiplier - 1.25).abs() < 1e-9));
    }
}
