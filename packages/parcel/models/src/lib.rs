#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared domain types for the upzone feasibility pipeline.
//!
//! Every stage of the pipeline (spatial join, assessment resolution, market
//! calibration, capacity, pro forma, aggregation) speaks in terms of the
//! types defined here. Identifiers, scenarios, and classification enums live
//! at the crate root; parcel shapes, raw input records, and computed results
//! live in the [`parcel`], [`records`], and [`result`] modules.

pub mod parcel;
pub mod records;
pub mod result;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use parcel::{EligibleParcel, Parcel, ResolvedCharacteristics, TransitProximityFacts};
pub use result::{
    EligibilityGates, HbuDecision, MarketContext, NeighborhoodAggregate, NeighborhoodProfile,
    ParcelEvaluation, ProFormaResult, ScenarioEnvelope,
};

/// Neighborhood name used for parcels that fall outside every boundary.
pub const UNASSIGNED_NEIGHBORHOOD: &str = "UNASSIGNED";

/// Number of digits in a full (unit-level) parcel identifier.
pub const FULL_PIN_DIGITS: usize = 14;

/// Number of digits in a base parcel identifier.
pub const BASE_PIN_DIGITS: usize = 10;

/// Number of digits identifying the tax block a parcel belongs to.
pub const BLOCK_DIGITS: usize = 7;

/// Base (10-digit) parcel identifier.
///
/// Condominium units and other sub-parcels share a base identifier with
/// their land parcel, so every per-parcel join happens on this key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParcelId(String);

impl ParcelId {
    /// Normalizes a raw identifier (dashes, spaces, short or long forms)
    /// into its base identifier.
    ///
    /// Returns `None` if the input contains no digits.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        full_pin(raw).map(|full| Self(full[..BASE_PIN_DIGITS].to_string()))
    }

    /// The identifier as a digit string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tax block this parcel belongs to.
    #[must_use]
    pub fn block_id(&self) -> &str {
        &self.0[..BLOCK_DIGITS]
    }
}

impl std::fmt::Display for ParcelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes a raw identifier into the 14-digit unit-level form.
///
/// Non-digit characters are stripped, short identifiers are left-padded
/// with zeros, and anything past 14 digits is dropped.
#[must_use]
pub fn full_pin(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }

    let mut full = format!("{digits:0>width$}", width = FULL_PIN_DIGITS);
    full.truncate(FULL_PIN_DIGITS);
    Some(full)
}

/// A zoning regime under which capacity and feasibility are evaluated.
///
/// Variants are declared from least to most permissive; the derived
/// `Ord` is the order the highest-and-best-use waterfall walks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Scenario {
    /// Zoning as currently mapped.
    Current,
    /// Statewide missing-middle upzoning of single-family districts.
    BaselineUpzoning,
    /// Transit upzoning requiring rail plus a high-frequency bus route.
    TransitTrainAndHfBus,
    /// Transit upzoning requiring rail plus frequent bus service.
    TransitTrainAndBusCombo,
    /// Transit upzoning triggered by rail proximity alone.
    TransitTrainOnly,
    /// Transit upzoning triggered by rail, bus rapid transit, or bus
    /// route intersections.
    TransitFull,
}

impl Scenario {
    /// Every scenario in waterfall order.
    pub const ALL: [Self; 6] = [
        Self::Current,
        Self::BaselineUpzoning,
        Self::TransitTrainAndHfBus,
        Self::TransitTrainAndBusCombo,
        Self::TransitTrainOnly,
        Self::TransitFull,
    ];

    /// The regime this scenario builds on top of, if any.
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Current => None,
            Self::BaselineUpzoning => Some(Self::Current),
            Self::TransitTrainAndHfBus
            | Self::TransitTrainAndBusCombo
            | Self::TransitTrainOnly
            | Self::TransitFull => Some(Self::BaselineUpzoning),
        }
    }

    /// The scenarios in effect when this one is enacted, oldest first.
    #[must_use]
    pub fn regime_chain(self) -> Vec<Self> {
        let mut chain = vec![self];
        let mut cursor = self;
        while let Some(parent) = cursor.parent() {
            chain.push(parent);
            cursor = parent;
        }
        chain.reverse();
        chain
    }

    /// Whether this scenario's capacity depends on transit proximity.
    #[must_use]
    pub const fn is_transit(self) -> bool {
        matches!(
            self,
            Self::TransitTrainAndHfBus
                | Self::TransitTrainAndBusCombo
                | Self::TransitTrainOnly
                | Self::TransitFull
        )
    }
}

/// Building typology used to pick a construction cost per square foot.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConstructionType {
    /// Wood-frame walk-ups and small apartment buildings.
    LowRise,
    /// Podium or concrete mid-rise buildings.
    MidRise,
}

/// Coarse use category derived from the assessor's property class.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyCategory {
    SingleFamily,
    MultiFamily,
    Commercial,
    Other,
}

/// Property classes assessed as one dwelling unit.
pub const SINGLE_UNIT_CLASSES: &[&str] = &[
    "202", "203", "204", "205", "206", "207", "208", "209", "210", "234", "278",
];

impl PropertyCategory {
    /// Categorizes an assessor property class code.
    #[must_use]
    pub fn from_class(class: &str) -> Self {
        let class = class.trim();
        if SINGLE_UNIT_CLASSES.contains(&class) {
            Self::SingleFamily
        } else if matches!(class, "211" | "212" | "213" | "214") {
            Self::MultiFamily
        } else if class.starts_with('3') || class.starts_with('5') {
            Self::Commercial
        } else {
            Self::Other
        }
    }
}

/// Estimated-market-value band used to stratify sales ratios.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueTier {
    /// Under $250k.
    T1,
    /// $250k to $500k.
    T2,
    /// $500k to $1M.
    T3,
    /// $1M and up.
    T4,
}

impl ValueTier {
    #[must_use]
    pub fn from_value(value: f64) -> Self {
        if value < 250_000.0 {
            Self::T1
        } else if value < 500_000.0 {
            Self::T2
        } else if value < 1_000_000.0 {
            Self::T3
        } else {
            Self::T4
        }
    }
}

/// Sub-neighborhood grouping a sales ratio is calibrated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarketStratum {
    Category(PropertyCategory),
    Tier(ValueTier),
}

impl std::fmt::Display for MarketStratum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Category(category) => category.fmt(f),
            Self::Tier(tier) => tier.fmt(f),
        }
    }
}

/// Which level of the fallback hierarchy produced a market statistic.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CalibrationSource {
    Stratum,
    Neighborhood,
    Region,
    StaticTable,
    Default,
}
