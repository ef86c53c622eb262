//! Tolerant value parsing for assessor and sales exports.
//!
//! Public exports mix formats freely (`$1,250,000`, `1925.0`, ISO
//! timestamps, US dates). Unparseable values become `None` rather than
//! errors.

use chrono::{NaiveDate, NaiveDateTime};

/// Parses a numeric cell, ignoring currency symbols and thousands
/// separators. Returns `None` for blanks and non-finite values.
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Parses a year cell. Zero and negative years mean "unknown".
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_year(raw: &str) -> Option<i32> {
    let value = parse_number(raw)?;
    if value < 1.0 || value > f64::from(i32::MAX) {
        return None;
    }
    Some(value.trunc() as i32)
}

/// Parses a sale date in ISO, ISO timestamp, or US `MM/DD/YYYY` form.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok()
}

/// Trims a text cell, mapping blanks to `None`.
#[must_use]
pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_currency_formatted_numbers() {
        assert!((parse_number("$1,250,000").unwrap() - 1_250_000.0).abs() < f64::EPSILON);
        assert!((parse_number(" 42.5 ").unwrap() - 42.5).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_blank_and_garbage_numbers() {
        assert!(parse_number("").is_none());
        assert!(parse_number("N/A").is_none());
        assert!(parse_number("NaN").is_none());
    }

    #[test]
    fn parses_float_formatted_years() {
        assert_eq!(parse_year("1925.0"), Some(1925));
        assert_eq!(parse_year("0"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn parses_supported_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 5, 17).unwrap();
        assert_eq!(parse_date("2023-05-17"), Some(expected));
        assert_eq!(parse_date("2023-05-17T00:00:00.000"), Some(expected));
        assert_eq!(parse_date("2023-05-17 12:30:00"), Some(expected));
        assert_eq!(parse_date("05/17/2023"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn blank_text_is_none() {
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(" 123 MAIN ST "), Some("123 MAIN ST".to_string()));
    }
}
