#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Market calibration.
//!
//! Turns a table of recent sales into two lookups consumed by the pro
//! forma: a sales-ratio multiplier that maps estimated assessed value to
//! acquisition price, and a new-construction sale price per square foot.
//! Both are computed once per run and resolved per parcel through a
//! fallback chain (stratum, neighborhood, region, default) so that thin
//! samples never produce a missing or zero value.
//!
//! When the sales table is unavailable the whole stage runs in degraded
//! mode and answers from the configured static tables instead.

pub mod stats;

use std::collections::{BTreeMap, BTreeSet};

use upzone_assessment::AssessmentIndex;
use upzone_config::{EngineConfig, MarketConfig, Stratification};
use upzone_parcel_models::records::SaleRecord;
use upzone_parcel_models::{
    CalibrationSource, MarketContext, MarketStratum, ParcelId, PropertyCategory,
    ResolvedCharacteristics, ValueTier,
};

pub use stats::Statistic;

const CATEGORY_STRATA: [MarketStratum; 4] = [
    MarketStratum::Category(PropertyCategory::SingleFamily),
    MarketStratum::Category(PropertyCategory::MultiFamily),
    MarketStratum::Category(PropertyCategory::Commercial),
    MarketStratum::Category(PropertyCategory::Other),
];

const TIER_STRATA: [MarketStratum; 4] = [
    MarketStratum::Tier(ValueTier::T1),
    MarketStratum::Tier(ValueTier::T2),
    MarketStratum::Tier(ValueTier::T3),
    MarketStratum::Tier(ValueTier::T4),
];

/// Everything calibration needs to place and price a sale.
#[derive(Debug, Clone, Copy)]
pub struct SaleInputs<'a> {
    pub sales: &'a [SaleRecord],
    /// Neighborhood of every parcel in the city, keyed by base identifier.
    pub neighborhoods: &'a BTreeMap<ParcelId, String>,
    pub assessments: &'a AssessmentIndex,
}

/// Grouped samples, before statistics are taken.
#[derive(Debug, Default)]
struct Samples {
    by_stratum: BTreeMap<(String, MarketStratum), Vec<f64>>,
    by_neighborhood: BTreeMap<String, Vec<f64>>,
    by_region: BTreeMap<String, Vec<f64>>,
}

impl Samples {
    fn push(
        &mut self,
        config: &MarketConfig,
        neighborhood: &str,
        stratum: Option<MarketStratum>,
        value: f64,
    ) {
        if let Some(stratum) = stratum {
            self.by_stratum
                .entry((neighborhood.to_string(), stratum))
                .or_default()
                .push(value);
        }
        self.by_neighborhood
            .entry(neighborhood.to_string())
            .or_default()
            .push(value);
        if let Some(region) = config.region_of(neighborhood) {
            self.by_region
                .entry(region.to_string())
                .or_default()
                .push(value);
        }
    }

    fn summarize(self, statistic: impl Fn(&mut [f64]) -> Option<f64>) -> Summary {
        fn reduce<K: Ord>(
            groups: BTreeMap<K, Vec<f64>>,
            statistic: &impl Fn(&mut [f64]) -> Option<f64>,
        ) -> BTreeMap<K, Statistic> {
            groups
                .into_iter()
                .filter_map(|(key, mut values)| {
                    let sample = values.len();
                    statistic(&mut values).map(|value| (key, Statistic { value, sample }))
                })
                .collect()
        }

        Summary {
            by_stratum: reduce(self.by_stratum, &statistic),
            by_neighborhood: reduce(self.by_neighborhood, &statistic),
            by_region: reduce(self.by_region, &statistic),
        }
    }
}

/// Statistics per grouping level.
#[derive(Debug, Clone, Default)]
struct Summary {
    by_stratum: BTreeMap<(String, MarketStratum), Statistic>,
    by_neighborhood: BTreeMap<String, Statistic>,
    by_region: BTreeMap<String, Statistic>,
}

/// Calibrated market lookups, read-only once built.
#[derive(Debug, Clone)]
pub struct MarketTable {
    config: MarketConfig,
    degraded: bool,
    ratios: Summary,
    prices: Summary,
}

impl MarketTable {
    /// Calibrates from sales, or builds a degraded table from static
    /// fallbacks when `sales` is `None`.
    #[must_use]
    pub fn calibrate(sales: Option<SaleInputs<'_>>, config: &EngineConfig) -> Self {
        let market = config.market.clone();
        let Some(inputs) = sales else {
            log::warn!("No sales table available, market calibration running in degraded mode");
            return Self {
                config: market,
                degraded: true,
                ratios: Summary::default(),
                prices: Summary::default(),
            };
        };

        let mut ratios = Samples::default();
        let mut prices = Samples::default();
        let mut qualifying = 0_usize;

        for sale in inputs.sales {
            if !qualifies(sale, config) {
                continue;
            }
            let Some(pin) = ParcelId::parse(&sale.pin) else {
                continue;
            };
            let Some(neighborhood) = inputs.neighborhoods.get(&pin) else {
                continue;
            };
            qualifying += 1;

            let characteristics = inputs.assessments.characteristics_for(&pin);
            if let Some(ratio) = sale_ratio(sale, &characteristics, &market) {
                let stratum = stratum_for(&characteristics, market.stratify_by);
                ratios.push(&market, neighborhood, Some(stratum), ratio);
            }

            let new_construction = inputs
                .assessments
                .building_for_sale(&sale.pin)
                .and_then(|building| Some((building.year_built?, building.building_sqft?)))
                .filter(|(year, sqft)| {
                    *year >= market.new_construction_min_year
                        && *sqft > market.new_construction_min_sqft
                        && sale.price > market.new_construction_price_floor
                });
            if let Some((_, sqft)) = new_construction {
                prices.push(&market, neighborhood, None, sale.price / sqft);
            }
        }

        let ratio_count: usize = ratios.by_neighborhood.values().map(Vec::len).sum();
        let price_count: usize = prices.by_neighborhood.values().map(Vec::len).sum();
        log::info!(
            "Calibrating from {qualifying} of {} sales \
             ({ratio_count} ratios, {price_count} new-construction prices)",
            inputs.sales.len()
        );

        let percentile = market.price_percentile;
        Self {
            ratios: ratios.summarize(stats::median),
            prices: prices.summarize(|values| stats::quantile(values, percentile)),
            config: market,
            degraded: false,
        }
    }

    /// Whether the table was built without sales data.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Stratum a parcel falls in under the configured stratification.
    #[must_use]
    pub fn stratum_for(&self, characteristics: &ResolvedCharacteristics) -> MarketStratum {
        stratum_for(characteristics, self.config.stratify_by)
    }

    /// Resolves the multiplier and price for one neighborhood and stratum.
    #[must_use]
    pub fn context(&self, neighborhood: &str, stratum: MarketStratum) -> MarketContext {
        let (multiplier, multiplier_source, multiplier_sample) =
            self.multiplier(neighborhood, stratum);
        let (price_per_sqft, price_source, price_sample) = self.price_per_sqft(neighborhood);

        MarketContext {
            neighborhood: neighborhood.to_string(),
            stratum,
            multiplier,
            multiplier_source,
            multiplier_sample,
            price_per_sqft,
            price_source,
            price_sample,
        }
    }

    /// Market context for a resolved parcel.
    #[must_use]
    pub fn context_for(
        &self,
        neighborhood: &str,
        characteristics: &ResolvedCharacteristics,
    ) -> MarketContext {
        self.context(neighborhood, self.stratum_for(characteristics))
    }

    /// One row per neighborhood and stratum, for reporting.
    #[must_use]
    pub fn rows<'a>(&self, neighborhoods: impl IntoIterator<Item = &'a str>) -> Vec<MarketContext> {
        let strata: &[MarketStratum] = match self.config.stratify_by {
            Stratification::Category => &CATEGORY_STRATA,
            Stratification::ValueTier => &TIER_STRATA,
        };
        let neighborhoods: BTreeSet<&str> = neighborhoods.into_iter().collect();

        neighborhoods
            .into_iter()
            .flat_map(|neighborhood| {
                strata
                    .iter()
                    .map(move |stratum| self.context(neighborhood, *stratum))
            })
            .collect()
    }

    fn multiplier(
        &self,
        neighborhood: &str,
        stratum: MarketStratum,
    ) -> (f64, CalibrationSource, usize) {
        let config = &self.config;
        if self.degraded {
            return config.static_multiplier(neighborhood).map_or(
                (config.default_multiplier, CalibrationSource::Default, 0),
                |value| (value, CalibrationSource::StaticTable, 0),
            );
        }

        let stratum_stat = self
            .ratios
            .by_stratum
            .get(&(neighborhood.to_string(), stratum))
            .copied();
        self.resolve(&self.ratios, stratum_stat, neighborhood)
            .unwrap_or((config.default_multiplier, CalibrationSource::Default, 0))
    }

    fn price_per_sqft(&self, neighborhood: &str) -> (f64, CalibrationSource, usize) {
        let config = &self.config;
        if self.degraded {
            return config.static_price_per_sqft(neighborhood).map_or(
                (config.default_price_per_sqft, CalibrationSource::Default, 0),
                |value| (value, CalibrationSource::StaticTable, 0),
            );
        }

        self.resolve(&self.prices, None, neighborhood)
            .unwrap_or((config.default_price_per_sqft, CalibrationSource::Default, 0))
    }

    /// Walks stratum, neighborhood, and region, returning the first level
    /// with a large enough sample.
    fn resolve(
        &self,
        summary: &Summary,
        stratum: Option<Statistic>,
        neighborhood: &str,
    ) -> Option<(f64, CalibrationSource, usize)> {
        let min_sample = self.config.min_sample;
        let trusted = |stat: Option<Statistic>| stat.filter(|s| s.sample >= min_sample);

        if let Some(stat) = trusted(stratum) {
            return Some((stat.value, CalibrationSource::Stratum, stat.sample));
        }
        if let Some(stat) = trusted(summary.by_neighborhood.get(neighborhood).copied()) {
            return Some((stat.value, CalibrationSource::Neighborhood, stat.sample));
        }

        let region = self.config.region_of(neighborhood)?;
        let stat = trusted(summary.by_region.get(region).copied())?;
        log::debug!("Market value for {neighborhood} falls back to region {region}");
        Some((stat.value, CalibrationSource::Region, stat.sample))
    }
}

fn stratum_for(characteristics: &ResolvedCharacteristics, by: Stratification) -> MarketStratum {
    match by {
        Stratification::Category => MarketStratum::Category(characteristics.category()),
        Stratification::ValueTier => {
            MarketStratum::Tier(ValueTier::from_value(characteristics.total_value()))
        }
    }
}

/// Whether a sale is recent, above the noise floor, and arms-length.
fn qualifies(sale: &SaleRecord, config: &EngineConfig) -> bool {
    let market = &config.market;
    let days_before_snapshot = config.snapshot_date.signed_duration_since(sale.date).num_days();

    sale.price > market.sale_price_floor
        && (0..=market.recency_days).contains(&days_before_snapshot)
        && !sale
            .buyer
            .as_deref()
            .is_some_and(|buyer| market.is_excluded_buyer(buyer))
}

/// Sale price over estimated market value, if the parcel's value is
/// large enough and the ratio is plausible.
fn sale_ratio(
    sale: &SaleRecord,
    characteristics: &ResolvedCharacteristics,
    market: &MarketConfig,
) -> Option<f64> {
    let value = characteristics.total_value();
    if value <= market.min_assessed_value {
        return None;
    }
    let ratio = sale.price / value;
    (market.min_ratio..=market.max_ratio)
        .contains(&ratio)
        .then_some(ratio)
}
