use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::extraction::TransactionType;

/// Largest amount a receipt may carry.
pub const MAX_AMOUNT: i64 = 999_999_999_999;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹', '¢', '₩', '₽', '₺', '₫'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("Amount is required")]
    Empty,
    #[error("Amount must be a number")]
    NotANumber(String),
    #[error("Amount cannot be negative")]
    Negative,
    #[error("Amount cannot exceed 999,999,999,999")]
    TooLarge,
}

/// A non-negative receipt amount, displayed in canonical symbol-free form
/// (`"$1,234.50"` displays as `1234.5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Strict parse used when a user edits the amount field.
    pub fn parse(raw: &str) -> Result<Self, AmountError> {
        let dec = parse_decimal(raw)?;
        if dec.is_sign_negative() && !dec.is_zero() {
            return Err(AmountError::Negative);
        }
        if dec > Decimal::from(MAX_AMOUNT) {
            return Err(AmountError::TooLarge);
        }
        Ok(Amount(dec.normalize()))
    }

    /// Lenient parse used on export: the sign of whatever the extractor returned
    /// is discarded, the transaction type decides the direction instead.
    pub fn magnitude_of(raw: &str) -> Option<Self> {
        parse_decimal(raw).ok().map(|d| Amount(d.abs().normalize()))
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Single-column ledger convention: income positive, expense negative.
    pub fn signed(self, transaction_type: TransactionType) -> Decimal {
        match transaction_type {
            TransactionType::Income => self.0,
            TransactionType::Expense => -self.0,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Strips currency symbols, thousands separators and whitespace, then parses.
pub fn strip_amount_symbols(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && !CURRENCY_SYMBOLS.contains(c))
        .collect()
}

fn re_plain_number() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"^[+-]?[0-9]+(\.[0-9]+)?$").expect("invalid regex"))
}

fn parse_decimal(raw: &str) -> Result<Decimal, AmountError> {
    let cleaned = strip_amount_symbols(raw);
    if cleaned.is_empty() {
        return Err(AmountError::Empty);
    }
    if !re_plain_number().is_match(&cleaned) {
        return Err(AmountError::NotANumber(raw.to_string()));
    }
    // Only plain ASCII digits reach this point, so a failure is overflow.
    Decimal::from_str(&cleaned).map_err(|_| AmountError::TooLarge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_symbols_and_commas() {
        assert_eq!(Amount::parse("$1,234.50").unwrap().to_string(), "1234.5");
        assert_eq!(Amount::parse(" € 99 ").unwrap().to_string(), "99");
        assert_eq!(Amount::parse("£0.10").unwrap().to_string(), "0.1");
    }

    #[test]
    fn parse_is_idempotent_on_canonical_values() {
        for raw in ["1234.5", "0", "42", "0.01", "999999999999"] {
            let once = Amount::parse(raw).unwrap().to_string();
            assert_eq!(once, raw);
            assert_eq!(Amount::parse(&once).unwrap().to_string(), once);
        }
    }

    #[test]
    fn parse_rejects_negative() {
        assert_eq!(Amount::parse("-5.00"), Err(AmountError::Negative));
    }

    #[test]
    fn parse_accepts_negative_zero_as_zero() {
        assert_eq!(Amount::parse("-0").unwrap().to_string(), "0");
    }

    #[test]
    fn parse_rejects_too_large() {
        assert_eq!(Amount::parse("1,000,000,000,000"), Err(AmountError::TooLarge));
        assert!(Amount::parse("999,999,999,999").is_ok());
    }

    #[test]
    fn parse_reports_decimal_overflow_as_too_large() {
        let huge = "9".repeat(32);
        assert_eq!(Amount::parse(&huge), Err(AmountError::TooLarge));
        assert_eq!(Amount::parse(&format!("${huge}.00")), Err(AmountError::TooLarge));
    }

    #[test]
    fn parse_only_strips_symbols_commas_and_whitespace() {
        for raw in ["1_000", "1e3", "0x10", ".5", "5.", "1.2.3", "٣٠", "+-5"] {
            assert!(
                matches!(Amount::parse(raw), Err(AmountError::NotANumber(_))),
                "{raw} should be rejected"
            );
        }
        assert_eq!(Amount::parse("+12.50").unwrap().to_string(), "12.5");
    }

    #[test]
    fn parse_rejects_garbage_and_empty() {
        assert!(matches!(Amount::parse("twelve"), Err(AmountError::NotANumber(_))));
        assert_eq!(Amount::parse("  $ "), Err(AmountError::Empty));
    }

    #[test]
    fn magnitude_drops_sign() {
        assert_eq!(Amount::magnitude_of("-25.99").unwrap().to_string(), "25.99");
        assert_eq!(Amount::magnitude_of("50.00").unwrap().to_string(), "50");
        assert!(Amount::magnitude_of("Unknown").is_none());
    }

    #[test]
    fn signed_follows_transaction_type() {
        let a = Amount::parse("50").unwrap();
        assert_eq!(a.signed(TransactionType::Income).to_string(), "50");
        assert_eq!(a.signed(TransactionType::Expense).to_string(), "-50");
    }
}
