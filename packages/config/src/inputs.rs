//! Input file names and field mappings.
//!
//! Geographic layers are `GeoJSON` feature collections keyed by one
//! property; tabular inputs are CSV files with named columns.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A `GeoJSON` layer and the feature property the pipeline reads from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub file: String,
    pub field: String,
}

impl LayerConfig {
    fn new(file: &str, field: &str) -> Self {
        Self {
            file: file.to_string(),
            field: field.to_string(),
        }
    }

    #[must_use]
    pub fn path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentColumns {
    pub file: String,
    pub pin: String,
    pub class: String,
    pub building: String,
    pub land: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicsColumns {
    pub file: String,
    pub pin: String,
    pub year_built: String,
    pub building_sqft: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressColumns {
    pub file: String,
    pub pin: String,
    pub address: String,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesColumns {
    pub file: String,
    pub pin: String,
    pub price: String,
    pub date: String,
    pub buyer: String,
}

impl AssessmentColumns {
    #[must_use]
    pub fn path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.file)
    }
}

impl CharacteristicsColumns {
    #[must_use]
    pub fn path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.file)
    }
}

impl AddressColumns {
    #[must_use]
    pub fn path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.file)
    }
}

impl SalesColumns {
    #[must_use]
    pub fn path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.file)
    }
}

/// Where every input table lives relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub parcels: LayerConfig,
    pub zoning: LayerConfig,
    pub neighborhoods: LayerConfig,
    pub transit_stops: LayerConfig,
    pub bus_routes: LayerConfig,
    pub assessments: AssessmentColumns,
    pub characteristics: CharacteristicsColumns,
    pub addresses: AddressColumns,
    pub sales: SalesColumns,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            parcels: LayerConfig::new("parcels.geojson", "pin10"),
            zoning: LayerConfig::new("zoning.geojson", "zone_class"),
            neighborhoods: LayerConfig::new("neighborhoods.geojson", "community"),
            transit_stops: LayerConfig::new("transit_stops.geojson", "station_name"),
            bus_routes: LayerConfig::new("bus_routes.geojson", "route"),
            assessments: AssessmentColumns {
                file: "assessments.csv".to_string(),
                pin: "pin".to_string(),
                class: "class".to_string(),
                building: "certified_bldg".to_string(),
                land: "certified_land".to_string(),
            },
            characteristics: CharacteristicsColumns {
                file: "characteristics.csv".to_string(),
                pin: "pin".to_string(),
                year_built: "char_yrblt".to_string(),
                building_sqft: "char_bldg_sf".to_string(),
            },
            addresses: AddressColumns {
                file: "addresses.csv".to_string(),
                pin: "pin".to_string(),
                address: "prop_address_full".to_string(),
                owner: "mail_address_name".to_string(),
            },
            sales: SalesColumns {
                file: "sales.csv".to_string(),
                pin: "pin".to_string(),
                price: "sale_price".to_string(),
                date: "sale_date".to_string(),
                buyer: "buyer_name".to_string(),
            },
        }
    }
}
