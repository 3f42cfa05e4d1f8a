//! Record validation rules.
//!
//! Each rule fails with its own `ValidationError` variant carrying the values
//! that triggered it. Validation failures are recoverable: the engine skips or
//! filters the offending row and keeps going.

pub mod table;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use table::{validate_table, TableValidation};

/// Name of a validation rule, used for per-rule rejection counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// A field could not be parsed, or the row itself is structurally broken.
    Malformed,
    ValuePositivity,
    DateOrder,
    EmptyTicker,
    /// Daily runs only: the row's date is not the processing date.
    DateMismatch,
}

impl Rule {
    pub fn name(self) -> &'static str {
        match self {
            Rule::Malformed => "malformed",
            Rule::ValuePositivity => "value_positivity",
            Rule::DateOrder => "date_order",
            Rule::EmptyTicker => "empty_ticker",
            Rule::DateMismatch => "date_mismatch",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(
        "value positivity violation: price={price}, book_value={book_value}, dividends={dividends} (each must be finite and > 0)"
    )]
    ValuePositivity {
        price: f64,
        book_value: f64,
        dividends: f64,
    },

    #[error("date order violation: data_date {data_date} is after date {date}")]
    DateOrder { date: NaiveDate, data_date: NaiveDate },

    #[error("empty ticker violation: ticker {ticker:?} is empty after trimming")]
    EmptyTicker { ticker: String },

    #[error("date mismatch: row date {found} is not the processing date {expected}")]
    DateMismatch { expected: NaiveDate, found: NaiveDate },

    #[error("malformed field {column}: {value:?}")]
    MalformedField { column: &'static str, value: String },

    #[error("malformed row: {reason}")]
    MalformedRow { reason: String },
}

impl ValidationError {
    pub fn rule(&self) -> Rule {
        match self {
            ValidationError::ValuePositivity { .. } => Rule::ValuePositivity,
            ValidationError::DateOrder { .. } => Rule::DateOrder,
            ValidationError::EmptyTicker { .. } => Rule::EmptyTicker,
            ValidationError::DateMismatch { .. } => Rule::DateMismatch,
            ValidationError::MalformedField { .. } | ValidationError::MalformedRow { .. } => {
                Rule::Malformed
            }
        }
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Price, book value and dividends must all be positive.
pub fn check_values(price: f64, book_value: f64, dividends: f64) -> Result<(), ValidationError> {
    if [price, book_value, dividends].into_iter().all(is_positive) {
        Ok(())
    } else {
        Err(ValidationError::ValuePositivity {
            price,
            book_value,
            dividends,
        })
    }
}

/// The observation date may not be after the record date.
pub fn check_date_order(date: NaiveDate, data_date: NaiveDate) -> Result<(), ValidationError> {
    if data_date > date {
        Err(ValidationError::DateOrder { date, data_date })
    } else {
        Ok(())
    }
}

pub fn check_ticker(ticker: &str) -> Result<(), ValidationError> {
    if ticker.trim().is_empty() {
        Err(ValidationError::EmptyTicker {
            ticker: ticker.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Daily files must only carry rows for the day being processed.
pub fn check_processing_date(expected: NaiveDate, found: NaiveDate) -> Result<(), ValidationError> {
    if expected == found {
        Ok(())
    } else {
        Err(ValidationError::DateMismatch { expected, found })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn positive_values_pass() {
        assert!(check_values(100.0, 50.0, 2.0).is_ok());
    }

    #[test]
    fn any_non_positive_value_fails() {
        for (p, b, d) in [(0.0, 1.0, 1.0), (1.0, -1.0, 1.0), (1.0, 1.0, 0.0)] {
            let err = check_values(p, b, d).unwrap_err();
            assert_eq!(
                err,
                ValidationError::ValuePositivity {
                    price: p,
                    book_value: b,
                    dividends: d
                }
            );
        }
    }

    #[test]
    fn nan_value_fails() {
        assert!(check_values(f64::NAN, 1.0, 1.0).is_err());
    }

    #[test]
    fn data_date_after_date_fails() {
        let err = check_date_order(date(2021, 8, 9), date(2021, 8, 10)).unwrap_err();
        assert_eq!(err.rule(), Rule::DateOrder);
        assert!(err.to_string().contains("2021-08-10"));
    }

    #[test]
    fn equal_dates_pass() {
        assert!(check_date_order(date(2021, 8, 9), date(2021, 8, 9)).is_ok());
    }

    #[test]
    fn whitespace_ticker_fails() {
        assert_eq!(check_ticker("   ").unwrap_err().rule(), Rule::EmptyTicker);
        assert_eq!(check_ticker("").unwrap_err().rule(), Rule::EmptyTicker);
        assert!(check_ticker("AAPL").is_ok());
    }

    #[test]
    fn processing_date_mismatch_fails() {
        let err = check_processing_date(date(2021, 8, 9), date(2021, 8, 6)).unwrap_err();
        assert_eq!(err.rule(), Rule::DateMismatch);
    }

    #[test]
    fn rule_names_are_stable() {
        assert_eq!(Rule::ValuePositivity.to_string(), "value_positivity");
        assert_eq!(Rule::EmptyTicker.name(), "empty_ticker");
    }
}
