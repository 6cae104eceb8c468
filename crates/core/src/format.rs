use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The two QuickBooks bank-import layouts. Fixed per batch once chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CsvFormat {
    /// Date, Description, Amount (signed). Dates are MM/DD/YYYY.
    #[serde(rename = "3-column")]
    ThreeColumn,
    /// Date, Description, Credit, Debit. Dates are DD/MM/YYYY.
    #[serde(rename = "4-column")]
    FourColumn,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("CSV format must be \"3-column\" or \"4-column\", got \"{0}\"")]
pub struct FormatError(pub String);

/// Which component of a slash date comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    MonthFirst,
    DayFirst,
}

impl CsvFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            CsvFormat::ThreeColumn => "3-column",
            CsvFormat::FourColumn => "4-column",
        }
    }

    pub fn date_order(self) -> DateOrder {
        match self {
            CsvFormat::ThreeColumn => DateOrder::MonthFirst,
            CsvFormat::FourColumn => DateOrder::DayFirst,
        }
    }

    /// Human-readable pattern, used in validation messages and AI prompts.
    pub fn date_pattern(self) -> &'static str {
        match self.date_order() {
            DateOrder::MonthFirst => "MM/DD/YYYY",
            DateOrder::DayFirst => "DD/MM/YYYY",
        }
    }

    pub fn format_date(self, date: NaiveDate) -> String {
        match self.date_order() {
            DateOrder::MonthFirst => date.format("%m/%d/%Y").to_string(),
            DateOrder::DayFirst => date.format("%d/%m/%Y").to_string(),
        }
    }
}

impl fmt::Display for CsvFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CsvFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3-column" => Ok(CsvFormat::ThreeColumn),
            "4-column" => Ok(CsvFormat::FourColumn),
            other => Err(FormatError(other.to_string())),
        }
    }
}
