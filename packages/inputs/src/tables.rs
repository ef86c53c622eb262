//! CSV table loading for the assessment, characteristics, address, and
//! sales rolls.
//!
//! Headers are matched case-insensitively after trimming. Required columns
//! must exist; rows whose identifier cannot be normalized are skipped.

use std::io::Read;

use upzone_config::inputs::{
    AddressColumns, AssessmentColumns, CharacteristicsColumns, SalesColumns,
};
use upzone_parcel_models::full_pin;
use upzone_parcel_models::records::{
    AddressRecord, AssessmentRecord, CharacteristicsRecord, SaleRecord,
};

use crate::InputError;
use crate::parsing::{non_empty, parse_date, parse_number, parse_year};

/// A CSV reader with its header row resolved.
struct Table<R: Read> {
    source: String,
    headers: Vec<String>,
    reader: csv::Reader<R>,
}

impl<R: Read> Table<R> {
    fn new(reader: R, source: &str) -> Result<Self, InputError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();

        Ok(Self {
            source: source.to_string(),
            headers,
            reader,
        })
    }

    fn column(&self, name: &str) -> Option<usize> {
        let name = name.trim().to_ascii_lowercase();
        self.headers.iter().position(|h| *h == name)
    }

    fn required(&self, name: &str) -> Result<usize, InputError> {
        self.column(name).ok_or_else(|| InputError::MissingColumn {
            path: self.source.clone(),
            column: name.to_string(),
        })
    }

    /// Visits every row, skipping rows that `f` rejects.
    fn rows<T>(
        &mut self,
        mut f: impl FnMut(&csv::StringRecord) -> Option<T>,
    ) -> Result<Vec<T>, InputError> {
        let mut rows = Vec::new();
        let mut skipped = 0_usize;

        for record in self.reader.records() {
            let record = record?;
            match f(&record) {
                Some(row) => rows.push(row),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::warn!("Skipped {skipped} unusable rows in {}", self.source);
        }
        Ok(rows)
    }
}

fn cell(record: &csv::StringRecord, index: usize) -> &str {
    record.get(index).unwrap_or("")
}

/// Parses the tax-assessment roll.
///
/// Missing values are read as zero so a parcel with a class but no values
/// still counts its units.
///
/// # Errors
///
/// Returns an error if the CSV is malformed or a required column is absent.
pub fn parse_assessments<R: Read>(
    reader: R,
    columns: &AssessmentColumns,
    source: &str,
) -> Result<Vec<AssessmentRecord>, InputError> {
    let mut table = Table::new(reader, source)?;
    let pin = table.required(&columns.pin)?;
    let class = table.required(&columns.class)?;
    let building = table.required(&columns.building)?;
    let land = table.required(&columns.land)?;

    table.rows(|record| {
        Some(AssessmentRecord {
            pin: full_pin(cell(record, pin))?,
            property_class: cell(record, class).to_ascii_uppercase(),
            assessed_building: parse_number(cell(record, building)).unwrap_or(0.0),
            assessed_land: parse_number(cell(record, land)).unwrap_or(0.0),
        })
    })
}

/// Parses building characteristics.
///
/// # Errors
///
/// Returns an error if the CSV is malformed or a required column is absent.
pub fn parse_characteristics<R: Read>(
    reader: R,
    columns: &CharacteristicsColumns,
    source: &str,
) -> Result<Vec<CharacteristicsRecord>, InputError> {
    let mut table = Table::new(reader, source)?;
    let pin = table.required(&columns.pin)?;
    let year_built = table.required(&columns.year_built)?;
    let building_sqft = table.required(&columns.building_sqft)?;

    table.rows(|record| {
        Some(CharacteristicsRecord {
            pin: full_pin(cell(record, pin))?,
            year_built: parse_year(cell(record, year_built)),
            building_sqft: parse_number(cell(record, building_sqft)).filter(|x| *x > 0.0),
        })
    })
}

/// Parses the address roll. The owner column is optional.
///
/// # Errors
///
/// Returns an error if the CSV is malformed or a required column is absent.
pub fn parse_addresses<R: Read>(
    reader: R,
    columns: &AddressColumns,
    source: &str,
) -> Result<Vec<AddressRecord>, InputError> {
    let mut table = Table::new(reader, source)?;
    let pin = table.required(&columns.pin)?;
    let address = table.required(&columns.address)?;
    let owner = table.column(&columns.owner);

    table.rows(|record| {
        Some(AddressRecord {
            pin: full_pin(cell(record, pin))?,
            address: non_empty(cell(record, address)),
            owner_name: owner.and_then(|i| non_empty(cell(record, i))),
        })
    })
}

/// Parses sales transactions. Rows without a price or date are skipped;
/// the buyer column is optional.
///
/// # Errors
///
/// Returns an error if the CSV is malformed or a required column is absent.
pub fn parse_sales<R: Read>(
    reader: R,
    columns: &SalesColumns,
    source: &str,
) -> Result<Vec<SaleRecord>, InputError> {
    let mut table = Table::new(reader, source)?;
    let pin = table.required(&columns.pin)?;
    let price = table.required(&columns.price)?;
    let date = table.required(&columns.date)?;
    let buyer = table.column(&columns.buyer);

    table.rows(|record| {
        Some(SaleRecord {
            pin: full_pin(cell(record, pin))?,
            price: parse_number(cell(record, price))?,
            date: parse_date(cell(record, date))?,
            buyer: buyer.and_then(|i| non_empty(cell(record, i))),
        })
    })
}
