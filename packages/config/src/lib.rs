#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Engine configuration for the upzone feasibility pipeline.
//!
//! [`EngineConfig`] collects every tunable the pipeline reads: scenario
//! FARs, construction costs, eligibility thresholds, calibration fallbacks,
//! and the names of the input files and columns. Every field has a default,
//! so an empty TOML document is a valid configuration. The fully commented
//! default file is embedded as [`DEFAULT_CONFIG_TOML`].
//!
//! The config is loaded once at startup, validated, and passed by reference
//! to every stage.

pub mod inputs;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use upzone_parcel_models::{ConstructionType, Scenario};

pub use inputs::InputsConfig;

/// The default configuration, with every field documented.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../defaults/engine.toml");

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`EngineConfig`].
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered as TOML.
    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of its allowed range.
    #[error("Invalid config: {message}")]
    Invalid { message: String },
}

// ── Top-level configuration ──────────────────────────────────────────────

/// Every tunable consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Point in time the analysis describes. Sales recency and building age
    /// are measured from this date.
    pub snapshot_date: NaiveDate,
    pub zoning: ZoningConfig,
    pub transit: TransitConfig,
    pub capacity: CapacityConfig,
    pub scenarios: ScenarioTable,
    pub construction: ConstructionConfig,
    pub proforma: ProFormaConfig,
    pub eligibility: EligibilityConfig,
    pub assessment: AssessmentConfig,
    pub market: MarketConfig,
    pub assembly: AssemblyConfig,
    pub aggregate: AggregateConfig,
    pub inputs: InputsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            zoning: ZoningConfig::default(),
            transit: TransitConfig::default(),
            capacity: CapacityConfig::default(),
            scenarios: ScenarioTable::default(),
            construction: ConstructionConfig::default(),
            proforma: ProFormaConfig::default(),
            eligibility: EligibilityConfig::default(),
            assessment: AssessmentConfig::default(),
            market: MarketConfig::default(),
            assembly: AssemblyConfig::default(),
            aggregate: AggregateConfig::default(),
            inputs: InputsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document does not deserialize
    /// and [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise
    /// the errors of [`Self::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Calendar year of the snapshot, used for building age.
    #[must_use]
    pub fn snapshot_year(&self) -> i32 {
        self.snapshot_date.year()
    }

    /// Checks every range constraint the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proforma.target_margin <= 0.0 {
            return Err(invalid("proforma.target_margin must be positive"));
        }
        if self.proforma.min_acquisition_cost < 0.0 {
            return Err(invalid("proforma.min_acquisition_cost must not be negative"));
        }

        for scenario in Scenario::ALL {
            let far = self.scenarios.get(scenario).far;
            if far <= 0.0 || !far.is_finite() {
                return Err(invalid(format!("scenarios.{scenario}.far must be positive")));
            }
            if let Some(parent) = scenario.parent()
                && far < self.scenarios.get(parent).far
            {
                return Err(invalid(format!(
                    "scenarios.{scenario}.far ({far}) is below scenarios.{parent}.far"
                )));
            }
        }

        self.capacity.validate()?;

        if self.transit.short_radius_ft > self.transit.long_radius_ft {
            return Err(invalid(
                "transit.short_radius_ft must not exceed transit.long_radius_ft",
            ));
        }
        if self.transit.min_lot_area_sqft < 0.0 {
            return Err(invalid("transit.min_lot_area_sqft must not be negative"));
        }

        if self.assessment.residential_level <= 0.0 || self.assessment.other_level <= 0.0 {
            return Err(invalid("assessment levels must be positive"));
        }

        let market = &self.market;
        if market.min_ratio >= market.max_ratio {
            return Err(invalid("market.min_ratio must be below market.max_ratio"));
        }
        if !(0.0..=1.0).contains(&market.price_percentile) {
            return Err(invalid("market.price_percentile must be within [0, 1]"));
        }
        if market.default_multiplier <= 0.0 || market.default_price_per_sqft <= 0.0 {
            return Err(invalid("market defaults must be positive"));
        }
        if market.min_sample == 0 {
            return Err(invalid("market.min_sample must be at least 1"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|x| (*x).to_string()).collect()
}

fn contains_ignore_case(list: &[String], value: &str) -> bool {
    list.iter().any(|x| x.eq_ignore_ascii_case(value))
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn get_ignore_case<'a, V>(map: &'a BTreeMap<String, V>, key: &str) -> Option<&'a V> {
    map.iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}

// ── Zoning ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoningConfig {
    /// Zone class prefixes whose districts can host housing.
    pub eligible_prefixes: Vec<String>,
    /// Zone class prefixes that can never be redeveloped (open space,
    /// parks, planned manufacturing).
    pub excluded_classes: Vec<String>,
    /// Zone classes covered by the baseline upzoning.
    pub single_family_classes: Vec<String>,
}

impl Default for ZoningConfig {
    fn default() -> Self {
        Self {
            eligible_prefixes: strings(&["RS", "RT", "RM", "B", "C"]),
            excluded_classes: strings(&["OS", "POS", "PMD"]),
            single_family_classes: strings(&["RS-1", "RS-2", "RS-3"]),
        }
    }
}

impl ZoningConfig {
    #[must_use]
    pub fn is_eligible(&self, zone_class: &str) -> bool {
        self.eligible_prefixes
            .iter()
            .any(|prefix| starts_with_ignore_case(zone_class.trim(), prefix))
    }

    #[must_use]
    pub fn is_excluded(&self, zone_class: &str) -> bool {
        self.excluded_classes
            .iter()
            .any(|prefix| starts_with_ignore_case(zone_class.trim(), prefix))
    }

    #[must_use]
    pub fn is_single_family(&self, zone_class: &str) -> bool {
        contains_ignore_case(&self.single_family_classes, zone_class.trim())
    }

    /// Whether the class falls outside every single-family district,
    /// variants included (`RS-3(x)` still counts as single-family).
    #[must_use]
    pub fn is_multifamily_zoned(&self, zone_class: &str) -> bool {
        !self
            .single_family_classes
            .iter()
            .any(|prefix| starts_with_ignore_case(zone_class.trim(), prefix))
    }
}

// ── Transit ──────────────────────────────────────────────────────────────

/// Transit trigger radii, route lists, and densities.
///
/// Distances are in the units of the input CRS (feet for the default
/// state-plane projection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitConfig {
    pub short_radius_ft: f64,
    pub long_radius_ft: f64,
    /// Bus rapid transit route identifiers.
    pub brt_routes: Vec<String>,
    /// Bus routes with high-frequency all-day service.
    pub high_frequency_routes: Vec<String>,
    /// Lots smaller than this get no transit density.
    pub min_lot_area_sqft: f64,
    pub high_density_units_per_acre: f64,
    pub mid_density_units_per_acre: f64,
    pub low_density_units_per_acre: f64,
    /// Routes within the short radius that make a bus intersection.
    pub bus_intersection_routes: usize,
}

impl Default for TransitConfig {
    fn default() -> Self {
        Self {
            short_radius_ft: 1320.0,
            long_radius_ft: 2640.0,
            brt_routes: strings(&["J14"]),
            high_frequency_routes: strings(&[
                "4", "9", "12", "14", "J14", "20", "34", "47", "49", "53", "54", "55", "60", "63",
                "66", "72", "77", "79", "81", "82", "95",
            ]),
            min_lot_area_sqft: 5000.0,
            high_density_units_per_acre: 120.0,
            mid_density_units_per_acre: 100.0,
            low_density_units_per_acre: 80.0,
            bus_intersection_routes: 2,
        }
    }
}

impl TransitConfig {
    #[must_use]
    pub fn is_brt(&self, route: &str) -> bool {
        self.brt_routes.iter().any(|x| x == route)
    }

    #[must_use]
    pub fn is_high_frequency(&self, route: &str) -> bool {
        self.high_frequency_routes.iter().any(|x| x == route)
    }
}

// ── Capacity ─────────────────────────────────────────────────────────────

/// Net-to-gross efficiency for buildings up to `max_units` units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyTier {
    /// Upper bound (inclusive); `None` for the open-ended last tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_units: Option<u32>,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Ceiling on any single parcel's capacity.
    pub max_units: u32,
    /// Smallest unit that can be delivered, in net square feet.
    pub min_unit_sqft: f64,
    /// Efficiency by building size. Buildings past the first tier need a
    /// second stair and a corridor, which eats rentable area.
    pub efficiency_tiers: Vec<EfficiencyTier>,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            max_units: 200,
            min_unit_sqft: 800.0,
            efficiency_tiers: vec![
                EfficiencyTier {
                    max_units: Some(4),
                    efficiency: 0.90,
                },
                EfficiencyTier {
                    max_units: Some(24),
                    efficiency: 0.80,
                },
                EfficiencyTier {
                    max_units: None,
                    efficiency: 0.75,
                },
            ],
        }
    }
}

impl CapacityConfig {
    /// Efficiency factor for a building of `units` units.
    #[must_use]
    pub fn efficiency_for(&self, units: u32) -> f64 {
        self.efficiency_tiers
            .iter()
            .find(|tier| tier.max_units.is_none_or(|max| units <= max))
            .or_else(|| self.efficiency_tiers.last())
            .map_or(1.0, |tier| tier.efficiency)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_unit_sqft <= 0.0 {
            return Err(invalid("capacity.min_unit_sqft must be positive"));
        }
        if self.efficiency_tiers.is_empty() {
            return Err(invalid("capacity.efficiency_tiers must not be empty"));
        }

        let mut previous: Option<u32> = None;
        for (i, tier) in self.efficiency_tiers.iter().enumerate() {
            if tier.efficiency <= 0.0 || tier.efficiency > 1.0 {
                return Err(invalid(format!(
                    "capacity.efficiency_tiers[{i}].efficiency must be within (0, 1]"
                )));
            }
            match tier.max_units {
                Some(max) => {
                    if previous.is_some_and(|prev| max <= prev) {
                        return Err(invalid(
                            "capacity.efficiency_tiers must be sorted by max_units",
                        ));
                    }
                    previous = Some(max);
                }
                None if i + 1 != self.efficiency_tiers.len() => {
                    return Err(invalid(
                        "only the last capacity.efficiency_tiers entry may omit max_units",
                    ));
                }
                None => {}
            }
        }

        Ok(())
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSettings {
    /// Floor area ratio granted by the scenario.
    pub far: f64,
    pub construction: ConstructionType,
}

impl ScenarioSettings {
    const fn new(far: f64, construction: ConstructionType) -> Self {
        Self { far, construction }
    }
}

/// Per-scenario settings, one table per [`Scenario`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioTable {
    pub current: ScenarioSettings,
    pub baseline_upzoning: ScenarioSettings,
    pub transit_train_and_hf_bus: ScenarioSettings,
    pub transit_train_and_bus_combo: ScenarioSettings,
    pub transit_train_only: ScenarioSettings,
    pub transit_full: ScenarioSettings,
}

impl Default for ScenarioTable {
    fn default() -> Self {
        let transit = ScenarioSettings::new(3.0, ConstructionType::MidRise);
        Self {
            current: ScenarioSettings::new(1.2, ConstructionType::LowRise),
            baseline_upzoning: ScenarioSettings::new(1.5, ConstructionType::LowRise),
            transit_train_and_hf_bus: transit,
            transit_train_and_bus_combo: transit,
            transit_train_only: transit,
            transit_full: transit,
        }
    }
}

impl ScenarioTable {
    #[must_use]
    pub const fn get(&self, scenario: Scenario) -> &ScenarioSettings {
        match scenario {
            Scenario::Current => &self.current,
            Scenario::BaselineUpzoning => &self.baseline_upzoning,
            Scenario::TransitTrainAndHfBus => &self.transit_train_and_hf_bus,
            Scenario::TransitTrainAndBusCombo => &self.transit_train_and_bus_combo,
            Scenario::TransitTrainOnly => &self.transit_train_only,
            Scenario::TransitFull => &self.transit_full,
        }
    }
}

// ── Construction ─────────────────────────────────────────────────────────

/// Hard plus soft construction cost per gross square foot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionConfig {
    pub low_rise_cost_per_sqft: f64,
    pub mid_rise_cost_per_sqft: f64,
    pub premium_low_rise_cost_per_sqft: f64,
    pub premium_mid_rise_cost_per_sqft: f64,
    /// Neighborhoods where finishes and labor cost more.
    pub premium_neighborhoods: Vec<String>,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            low_rise_cost_per_sqft: 300.0,
            mid_rise_cost_per_sqft: 420.0,
            premium_low_rise_cost_per_sqft: 375.0,
            premium_mid_rise_cost_per_sqft: 525.0,
            premium_neighborhoods: strings(&[
                "LINCOLN PARK",
                "LAKE VIEW",
                "NEAR NORTH SIDE",
                "LOOP",
                "NEAR WEST SIDE",
            ]),
        }
    }
}

impl ConstructionConfig {
    #[must_use]
    pub fn cost_per_sqft(&self, neighborhood: &str, construction: ConstructionType) -> f64 {
        let premium = contains_ignore_case(&self.premium_neighborhoods, neighborhood);
        match (premium, construction) {
            (false, ConstructionType::LowRise) => self.low_rise_cost_per_sqft,
            (false, ConstructionType::MidRise) => self.mid_rise_cost_per_sqft,
            (true, ConstructionType::LowRise) => self.premium_low_rise_cost_per_sqft,
            (true, ConstructionType::MidRise) => self.premium_mid_rise_cost_per_sqft,
        }
    }
}

// ── Pro forma ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProFormaConfig {
    /// Revenue must exceed total cost times this factor.
    pub target_margin: f64,
    /// Floor on acquisition cost for parcels assessed near zero.
    pub min_acquisition_cost: f64,
}

impl Default for ProFormaConfig {
    fn default() -> Self {
        Self {
            target_margin: 1.15,
            min_acquisition_cost: 10_000.0,
        }
    }
}

// ── Eligibility ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    /// Parcels with this many existing units or more are never torn down.
    pub max_existing_units: u32,
    pub min_building_age: u32,
    /// Building value under which an undated building counts as vacant.
    pub vacant_building_value: f64,
    /// Capacity must reach this multiple of existing units.
    pub min_unit_multiple: f64,
    /// Gross floor area must reach this multiple of existing floor area.
    pub min_floor_area_multiple: f64,
    /// Existing floor area over lot area must stay below this.
    pub max_existing_far: f64,
    pub max_lot_area_sqft: f64,
    /// Property class prefixes that are never redeveloped (condominiums,
    /// exempt and institutional property, railroad right-of-way).
    pub excluded_class_prefixes: Vec<String>,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            max_existing_units: 40,
            min_building_age: 35,
            vacant_building_value: 100_000.0,
            min_unit_multiple: 2.0,
            min_floor_area_multiple: 1.25,
            max_existing_far: 1.5,
            max_lot_area_sqft: 100_000.0,
            excluded_class_prefixes: strings(&["299", "599", "8", "EX", "RR"]),
        }
    }
}

impl EligibilityConfig {
    #[must_use]
    pub fn is_excluded_class(&self, class: &str) -> bool {
        let class = class.trim();
        self.excluded_class_prefixes
            .iter()
            .any(|prefix| class.starts_with(prefix.as_str()))
    }
}

// ── Assessment ───────────────────────────────────────────────────────────

/// Statutory assessment levels used to turn assessed values back into
/// market values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    pub residential_level: f64,
    /// Class prefixes assessed at the residential level.
    pub residential_class_prefixes: Vec<String>,
    pub other_level: f64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            residential_level: 0.10,
            residential_class_prefixes: strings(&["2", "3", "9"]),
            other_level: 0.25,
        }
    }
}

impl AssessmentConfig {
    #[must_use]
    pub fn level_for(&self, class: &str) -> f64 {
        let class = class.trim();
        if self
            .residential_class_prefixes
            .iter()
            .any(|prefix| class.starts_with(prefix.as_str()))
        {
            self.residential_level
        } else {
            self.other_level
        }
    }
}

// ── Market ───────────────────────────────────────────────────────────────

/// How sales ratios are grouped below the neighborhood level.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stratification {
    #[default]
    Category,
    ValueTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Sales at or below this price are nominal transfers.
    pub sale_price_floor: f64,
    /// How far back from the snapshot a sale may be.
    pub recency_days: i64,
    /// Buyer names containing any of these terms are not arms-length.
    pub excluded_buyer_terms: Vec<String>,
    /// Parcels assessed at or below this market value are left out of
    /// ratio studies.
    pub min_assessed_value: f64,
    pub min_ratio: f64,
    pub max_ratio: f64,
    /// Sales needed before a grouping's statistic is trusted.
    pub min_sample: usize,
    pub stratify_by: Stratification,
    pub default_multiplier: f64,
    pub new_construction_min_year: i32,
    pub new_construction_min_sqft: f64,
    pub new_construction_price_floor: f64,
    /// Quantile of new-construction price per square foot used as the
    /// neighborhood's sale price.
    pub price_percentile: f64,
    pub default_price_per_sqft: f64,
    /// Multipliers used when no sales table is available.
    pub fallback_multipliers: BTreeMap<String, f64>,
    /// Prices per square foot used when no sales table is available.
    pub fallback_price_per_sqft: BTreeMap<String, f64>,
    /// Region name to member neighborhoods.
    pub regions: BTreeMap<String, Vec<String>>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let fallback_multipliers = [
            ("LINCOLN PARK", 1.65),
            ("LAKE VIEW", 1.55),
            ("NEAR NORTH SIDE", 1.60),
            ("WEST TOWN", 1.55),
            ("LOGAN SQUARE", 1.50),
            ("AUSTIN", 1.25),
            ("ASHBURN", 1.20),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        Self {
            sale_price_floor: 20_000.0,
            recency_days: 730,
            excluded_buyer_terms: strings(&[
                "BANK",
                "MORTGAGE",
                "FEDERAL NATIONAL",
                "FEDERAL HOME LOAN",
                "SECRETARY OF HOUSING",
                "CITY OF CHICAGO",
            ]),
            min_assessed_value: 20_000.0,
            min_ratio: 0.5,
            max_ratio: 3.5,
            min_sample: 5,
            stratify_by: Stratification::Category,
            default_multiplier: 1.40,
            new_construction_min_year: 2018,
            new_construction_min_sqft: 400.0,
            new_construction_price_floor: 50_000.0,
            price_percentile: 0.75,
            default_price_per_sqft: 350.0,
            fallback_multipliers,
            fallback_price_per_sqft: BTreeMap::new(),
            regions: BTreeMap::new(),
        }
    }
}

impl MarketConfig {
    /// Region containing `neighborhood`, matched case-insensitively.
    #[must_use]
    pub fn region_of(&self, neighborhood: &str) -> Option<&str> {
        self.regions
            .iter()
            .find(|(_, members)| contains_ignore_case(members, neighborhood))
            .map(|(region, _)| region.as_str())
    }

    #[must_use]
    pub fn static_multiplier(&self, neighborhood: &str) -> Option<f64> {
        get_ignore_case(&self.fallback_multipliers, neighborhood).copied()
    }

    #[must_use]
    pub fn static_price_per_sqft(&self, neighborhood: &str) -> Option<f64> {
        get_ignore_case(&self.fallback_price_per_sqft, neighborhood).copied()
    }

    /// Whether a buyer name marks a sale as not arms-length.
    #[must_use]
    pub fn is_excluded_buyer(&self, buyer: &str) -> bool {
        let buyer = buyer.to_ascii_uppercase();
        self.excluded_buyer_terms
            .iter()
            .any(|term| buyer.contains(&term.to_ascii_uppercase()))
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────

/// How adjacent parcels are combined into assembled lots.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssemblyMode {
    /// Every parcel is evaluated on its own.
    #[default]
    None,
    /// Touching parcels on the same block with the same zoning.
    Block,
    /// Touching parcels on the same block with the same zoning and owner.
    Owner,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub mode: AssemblyMode,
}

// ── Aggregation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Neighborhoods with no yield under any of these are dropped. Empty
    /// means every scenario.
    pub scenarios_of_interest: Vec<Scenario>,
}

impl AggregateConfig {
    #[must_use]
    pub fn scenarios(&self) -> Vec<Scenario> {
        if self.scenarios_of_interest.is_empty() {
            Scenario::ALL.to_vec()
        } else {
            self.scenarios_of_interest.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_default_impl() {
        let parsed = EngineConfig::from_toml_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }

    #[test]
    fn empty_document_is_default() {
        let parsed = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let parsed = EngineConfig::from_toml_str(
            r#"
            snapshot_date = "2023-06-30"

            [proforma]
            target_margin = 1.25

            [scenarios.transit_full]
            far = 4.0
            construction = "mid_rise"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.snapshot_year(), 2023);
        assert!((parsed.proforma.target_margin - 1.25).abs() < f64::EPSILON);
        assert!((parsed.proforma.min_acquisition_cost - 10_000.0).abs() < f64::EPSILON);
        assert!((parsed.scenarios.get(Scenario::TransitFull).far - 4.0).abs() < f64::EPSILON);
        assert!((parsed.scenarios.get(Scenario::Current).far - 1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn effective_config_round_trips_through_toml() {
        let config = EngineConfig::default();
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn rejects_far_below_parent() {
        let err = EngineConfig::from_toml_str(
            r#"
            [scenarios.transit_train_only]
            far = 1.0
            construction = "mid_rise"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_unsorted_efficiency_tiers() {
        let mut config = EngineConfig::default();
        config.capacity.efficiency_tiers = vec![
            EfficiencyTier {
                max_units: Some(24),
                efficiency: 0.8,
            },
            EfficiencyTier {
                max_units: Some(4),
                efficiency: 0.9,
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_ratio_bounds_and_radii() {
        let mut config = EngineConfig::default();
        config.market.min_ratio = 4.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.transit.short_radius_ft = 3000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn efficiency_steps_down_with_building_size() {
        let capacity = CapacityConfig::default();
        assert!((capacity.efficiency_for(1) - 0.90).abs() < f64::EPSILON);
        assert!((capacity.efficiency_for(4) - 0.90).abs() < f64::EPSILON);
        assert!((capacity.efficiency_for(5) - 0.80).abs() < f64::EPSILON);
        assert!((capacity.efficiency_for(24) - 0.80).abs() < f64::EPSILON);
        assert!((capacity.efficiency_for(200) - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn efficiency_past_last_bounded_tier_uses_last_tier() {
        let capacity = CapacityConfig {
            efficiency_tiers: vec![EfficiencyTier {
                max_units: Some(10),
                efficiency: 0.85,
            }],
            ..CapacityConfig::default()
        };
        assert!((capacity.efficiency_for(50) - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn premium_neighborhoods_cost_more() {
        let construction = ConstructionConfig::default();
        let standard = construction.cost_per_sqft("AUSTIN", ConstructionType::MidRise);
        let premium = construction.cost_per_sqft("Lincoln Park", ConstructionType::MidRise);
        assert!(premium > standard);
        assert!((standard - 420.0).abs() < f64::EPSILON);
    }

    #[test]
    fn assessment_level_by_class() {
        let assessment = AssessmentConfig::default();
        assert!((assessment.level_for("203") - 0.10).abs() < f64::EPSILON);
        assert!((assessment.level_for("318") - 0.10).abs() < f64::EPSILON);
        assert!((assessment.level_for("517") - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn zoning_prefix_checks() {
        let zoning = ZoningConfig::default();
        assert!(zoning.is_eligible("RS-3"));
        assert!(zoning.is_eligible("B3-2"));
        assert!(!zoning.is_eligible("PMD-4"));
        assert!(zoning.is_excluded("POS-1"));
        assert!(zoning.is_single_family("RS-2"));
        assert!(!zoning.is_single_family("RT-4"));
    }

    #[test]
    fn zoning_checks_ignore_case() {
        let zoning = ZoningConfig::default();
        assert!(zoning.is_eligible("rs-3"));
        assert!(zoning.is_eligible(" rt-4 "));
        assert!(zoning.is_excluded("pos-1"));
        assert!(zoning.is_excluded("Pmd-4"));
        assert!(zoning.is_single_family("rs-3"));
    }

    #[test]
    fn multifamily_zoning_treats_single_family_variants_as_single_family() {
        let zoning = ZoningConfig::default();
        assert!(!zoning.is_multifamily_zoned("RS-3"));
        assert!(!zoning.is_multifamily_zoned("RS-3(x)"));
        assert!(!zoning.is_multifamily_zoned("rs-1"));
        assert!(zoning.is_multifamily_zoned("RT-4"));
        assert!(zoning.is_multifamily_zoned("RM-5.5"));
        assert!(!zoning.is_single_family("RS-3(x)"));
    }

    #[test]
    fn market_lookups_ignore_case() {
        let mut market = MarketConfig::default();
        market
            .regions
            .insert("NORTH".to_string(), strings(&["LINCOLN PARK", "LAKE VIEW"]));

        assert_eq!(market.region_of("Lake View"), Some("NORTH"));
        assert_eq!(market.region_of("AUSTIN"), None);
        assert_eq!(market.static_multiplier("austin"), Some(1.25));
        assert!(market.is_excluded_buyer("Deutsche Bank National Trust"));
        assert!(!market.is_excluded_buyer("JANE DOE"));
    }

    #[test]
    fn aggregate_defaults_to_every_scenario() {
        assert_eq!(AggregateConfig::default().scenarios(), Scenario::ALL.to_vec());
    }

    #[test]
    fn assembly_mode_parses_from_cli_strings() {
        assert_eq!("owner".parse::<AssemblyMode>().unwrap(), AssemblyMode::Owner);
        assert_eq!("none".parse::<AssemblyMode>().unwrap(), AssemblyMode::None);
    }
}
