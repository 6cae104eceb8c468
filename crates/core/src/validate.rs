use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use thiserror::Error;

use crate::amount::Amount;
use crate::extraction::Field;
use crate::format::{CsvFormat, DateOrder};

pub const MAX_VENDOR_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 200;

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_slash_date, r"^([0-9]{2})/([0-9]{2})/([0-9]{4})$");

/// A rejected field edit. The record being edited is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct FieldError {
    pub field: Field,
    pub reason: String,
}

impl FieldError {
    fn new(field: Field, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

/// Validate one raw field value for a batch of the given format and return
/// its normalized form.
pub fn validate_field(field: Field, raw: &str, format: CsvFormat) -> Result<String, FieldError> {
    match field {
        Field::Date => validate_date(raw, format),
        Field::Amount => validate_amount(raw),
        Field::Vendor => validate_text(Field::Vendor, raw, MAX_VENDOR_LEN),
        Field::Description => validate_text(Field::Description, raw, MAX_DESCRIPTION_LEN),
    }
}

pub fn validate_date(raw: &str, format: CsvFormat) -> Result<String, FieldError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(FieldError::new(Field::Date, "Date is required"));
    }

    let pattern = format.date_pattern();
    let bad_format = || FieldError::new(Field::Date, format!("Date must be in {pattern} format"));
    let caps = re_slash_date().captures(value).ok_or_else(bad_format)?;

    let first: u32 = caps[1].parse().map_err(|_| bad_format())?;
    let second: u32 = caps[2].parse().map_err(|_| bad_format())?;
    let year: i32 = caps[3].parse().map_err(|_| bad_format())?;

    let (month, day) = match format.date_order() {
        DateOrder::MonthFirst => (first, second),
        DateOrder::DayFirst => (second, first),
    };

    if !(1..=12).contains(&month) {
        return Err(FieldError::new(Field::Date, "Month must be between 01 and 12"));
    }
    if !(1..=31).contains(&day) {
        return Err(FieldError::new(Field::Date, "Day must be between 01 and 31"));
    }
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(FieldError::new(
            Field::Date,
            format!("Year must be between {MIN_YEAR} and {MAX_YEAR}"),
        ));
    }

    // Range checks pass 31/02 and 29/02 in non-leap years; the calendar does not.
    let real = NaiveDate::from_ymd_opt(year, month, day)
        .filter(|d| d.year() == year && d.month() == month && d.day() == day);
    if real.is_none() {
        return Err(FieldError::new(Field::Date, format!("{value} is not a real calendar date")));
    }

    Ok(value.to_string())
}

pub fn validate_amount(raw: &str) -> Result<String, FieldError> {
    Amount::parse(raw)
        .map(|a| a.to_string())
        .map_err(|e| FieldError::new(Field::Amount, e.to_string()))
}

fn validate_text(field: Field, raw: &str, max_len: usize) -> Result<String, FieldError> {
    let value = raw.trim();
    if value.is_empty() {
        let label = match field {
            Field::Vendor => "Vendor",
            _ => "Description",
        };
        return Err(FieldError::new(field, format!("{label} is required")));
    }
    if value.chars().count() > max_len {
        return Err(FieldError::new(
            field,
            format!("Must be {max_len} characters or fewer"),
        ));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const US: CsvFormat = CsvFormat::ThreeColumn;
    const EU: CsvFormat = CsvFormat::FourColumn;

    // ── date ──────────────────────────────────────────────────────────────────

    #[test]
    fn us_dates_follow_the_calendar() {
        assert!(validate_date("02/29/2024", US).is_ok()); // leap year
        assert!(validate_date("02/29/2023", US).is_err());
        assert!(validate_date("02/30/2024", US).is_err());
        assert!(validate_date("04/31/2024", US).is_err());
        assert!(validate_date("12/31/2024", US).is_ok());
    }

    #[test]
    fn every_us_month_day_pair_matches_the_calendar() {
        for month in 1..=12u32 {
            for day in 1..=31u32 {
                let raw = format!("{month:02}/{day:02}/2024");
                let real = NaiveDate::from_ymd_opt(2024, month, day).is_some();
                assert_eq!(validate_date(&raw, US).is_ok(), real, "{raw}");
            }
        }
    }

    #[test]
    fn eu_dates_are_day_first() {
        assert!(validate_date("31/12/2024", EU).is_ok());
        assert!(validate_date("31/02/2024", EU).is_err());
        assert!(validate_date("12/31/2024", EU).is_err()); // month 31
        assert!(validate_date("29/02/2024", EU).is_ok());
    }

    #[test]
    fn date_shape_is_strict() {
        assert!(validate_date("1/5/2024", US).is_err());
        assert!(validate_date("2024-01-05", US).is_err());
        assert!(validate_date("01/05/24", US).is_err());
        let err = validate_date("", US).unwrap_err();
        assert_eq!(err.field, Field::Date);
    }

    #[test]
    fn date_error_names_the_expected_pattern() {
        let err = validate_date("2024/01/01", EU).unwrap_err();
        assert!(err.reason.contains("DD/MM/YYYY"), "{}", err.reason);
    }

    #[test]
    fn non_ascii_digits_are_a_format_error() {
        // Arabic-Indic and fullwidth digits.
        for raw in ["٠١/٠٥/٢٠٢٤", "０１/０５/２０２４"] {
            let err = validate_date(raw, US).unwrap_err();
            assert!(err.reason.contains("MM/DD/YYYY"), "{raw}: {}", err.reason);
        }
    }

    #[test]
    fn year_bounds() {
        assert!(validate_date("01/01/1900", US).is_ok());
        assert!(validate_date("12/31/2100", US).is_ok());
        assert!(validate_date("12/31/1899", US).is_err());
        assert!(validate_date("01/01/2101", US).is_err());
    }

    #[test]
    fn month_and_day_zero_rejected() {
        assert!(validate_date("00/10/2024", US).is_err());
        assert!(validate_date("10/00/2024", US).is_err());
    }

    // ── amount ────────────────────────────────────────────────────────────────

    #[test]
    fn amount_is_canonicalised() {
        assert_eq!(validate_field(Field::Amount, "$1,234.50", US).unwrap(), "1234.5");
        assert_eq!(validate_field(Field::Amount, "1234.5", US).unwrap(), "1234.5");
    }

    #[test]
    fn amount_rejections_carry_the_field() {
        let err = validate_field(Field::Amount, "-3", US).unwrap_err();
        assert_eq!(err.field, Field::Amount);
        assert!(validate_field(Field::Amount, "abc", US).is_err());
        assert!(validate_field(Field::Amount, "", US).is_err());
    }

    // ── text ──────────────────────────────────────────────────────────────────

    #[test]
    fn vendor_length_limit() {
        let ok = "a".repeat(MAX_VENDOR_LEN);
        let too_long = "a".repeat(MAX_VENDOR_LEN + 1);
        assert_eq!(validate_field(Field::Vendor, &ok, US).unwrap(), ok);
        assert!(validate_field(Field::Vendor, &too_long, US).is_err());
    }

    #[test]
    fn description_is_trimmed_and_required() {
        assert_eq!(
            validate_field(Field::Description, "  Office supplies ", US).unwrap(),
            "Office supplies"
        );
        assert!(validate_field(Field::Description, "   ", US).is_err());
        assert!(validate_field(Field::Description, &"é".repeat(MAX_DESCRIPTION_LEN), US).is_ok());
    }
}
