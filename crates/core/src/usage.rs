use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pages a user may process per calendar month.
pub const MONTHLY_PAGE_LIMIT: u32 = 1500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Monthly page limit reached: {current_usage} used + {requested_pages} requested exceeds {limit}")]
pub struct CapacityError {
    pub current_usage: u32,
    pub requested_pages: u32,
    pub limit: u32,
}

/// Per-user monthly page counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedger {
    pub monthly_usage: u32,
    /// First day on which `monthly_usage` no longer applies.
    pub usage_reset_date: NaiveDate,
}

impl UsageLedger {
    pub fn fresh(today: NaiveDate) -> Self {
        Self { monthly_usage: 0, usage_reset_date: next_reset_date(today) }
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        today >= self.usage_reset_date
    }

    /// Usage that counts against the cap today.
    pub fn current(&self, today: NaiveDate) -> u32 {
        if self.is_due(today) { 0 } else { self.monthly_usage }
    }

    /// The ledger as it should be stored once today's reset has been applied.
    pub fn rolled_over(self, today: NaiveDate) -> Self {
        if self.is_due(today) { Self::fresh(today) } else { self }
    }

    pub fn check_capacity(&self, pages: u32, today: NaiveDate) -> Result<(), CapacityError> {
        let current = self.current(today);
        if current.saturating_add(pages) > MONTHLY_PAGE_LIMIT {
            return Err(CapacityError {
                current_usage: current,
                requested_pages: pages,
                limit: MONTHLY_PAGE_LIMIT,
            });
        }
        Ok(())
    }
}

/// The first day of the month after `today`.
pub fn next_reset_date(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today)
}
