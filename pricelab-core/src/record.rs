//! Canonical price record and its derived ratios.
//!
//! A `PriceRecord` is built exactly once, at ingestion, from parsed field
//! values. Construction runs the record-level validator and computes the three
//! price ratios eagerly; they are never recomputed afterwards.

use chrono::NaiveDate;
use polars::prelude::{col, Expr};
use serde::{Deserialize, Serialize};

use crate::validate::{self, ValidationError};

/// Header names of the vendor file.
pub mod columns {
    pub const PRICE: &str = "Price";
    pub const BOOK_VALUE: &str = "BookValue";
    pub const DIVIDENDS: &str = "Dividends";
    pub const EARNINGS: &str = "Earnings";
    pub const TICKER: &str = "Ticker";
    pub const DATE: &str = "Date";
    pub const DATA_DATE: &str = "DataDate";

    pub const ALL: [&str; 7] = [PRICE, BOOK_VALUE, DIVIDENDS, EARNINGS, TICKER, DATE, DATA_DATE];
}

/// Column names of a stored price-history row.
pub mod fields {
    pub const DATE: &str = "date";
    pub const TICKER: &str = "ticker";
    pub const DATA_DATE: &str = "data_date";
    pub const PRICE: &str = "price";
    pub const BOOK_VALUE: &str = "book_value";
    pub const DIVIDENDS: &str = "dividends";
    pub const EARNINGS: &str = "earnings";
    pub const EARNINGS_TO_PRICE: &str = "earnings_to_price";
    pub const BOOK_VALUE_TO_PRICE: &str = "book_value_to_price";
    pub const DIVIDENDS_TO_PRICE: &str = "dividends_to_price";
    pub const IS_BEST: &str = "is_best";

    pub const ALL: [&str; 11] = [
        DATE,
        TICKER,
        DATA_DATE,
        PRICE,
        BOOK_VALUE,
        DIVIDENDS,
        EARNINGS,
        EARNINGS_TO_PRICE,
        BOOK_VALUE_TO_PRICE,
        DIVIDENDS_TO_PRICE,
        IS_BEST,
    ];
}

/// One line of the vendor file as read, before any parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPriceRow {
    #[serde(rename = "Price")]
    pub price: String,
    #[serde(rename = "BookValue")]
    pub book_value: String,
    #[serde(rename = "Dividends")]
    pub dividends: String,
    #[serde(rename = "Earnings")]
    pub earnings: String,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "DataDate")]
    pub data_date: String,
}

impl RawPriceRow {
    /// Parse every field. Tickers are trimmed; numbers and dates tolerate
    /// surrounding whitespace.
    pub fn parse(&self, date_format: &str) -> Result<PriceFields, ValidationError> {
        Ok(PriceFields {
            date: parse_date(columns::DATE, &self.date, date_format)?,
            ticker: self.ticker.trim().to_string(),
            data_date: parse_date(columns::DATA_DATE, &self.data_date, date_format)?,
            price: parse_number(columns::PRICE, &self.price)?,
            book_value: parse_number(columns::BOOK_VALUE, &self.book_value)?,
            dividends: parse_number(columns::DIVIDENDS, &self.dividends)?,
            earnings: parse_number(columns::EARNINGS, &self.earnings)?,
        })
    }
}

fn parse_number(column: &'static str, value: &str) -> Result<f64, ValidationError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ValidationError::MalformedField {
            column,
            value: value.to_string(),
        })
}

fn parse_date(column: &'static str, value: &str, format: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), format).map_err(|_| ValidationError::MalformedField {
        column,
        value: value.to_string(),
    })
}

/// Parsed field values of one vendor row.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceFields {
    pub date: NaiveDate,
    pub ticker: String,
    pub data_date: NaiveDate,
    pub price: f64,
    pub book_value: f64,
    pub dividends: f64,
    pub earnings: f64,
}

/// One row of the price-history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub data_date: NaiveDate,
    pub price: f64,
    pub book_value: f64,
    pub dividends: f64,
    pub earnings: f64,
    pub earnings_to_price: f64,
    pub book_value_to_price: f64,
    pub dividends_to_price: f64,
    pub is_best: bool,
}

impl PriceRecord {
    /// Validate the fields and compute the derived ratios.
    ///
    /// Checks run in a fixed order (values, date order, ticker) and the first
    /// violation is returned. A zero price is a value violation, so the ratio
    /// division can never see it. New records are always best.
    pub fn new(fields: PriceFields) -> Result<Self, ValidationError> {
        validate::check_values(fields.price, fields.book_value, fields.dividends)?;
        validate::check_date_order(fields.date, fields.data_date)?;
        validate::check_ticker(&fields.ticker)?;

        let PriceFields {
            date,
            ticker,
            data_date,
            price,
            book_value,
            dividends,
            earnings,
        } = fields;

        Ok(Self {
            date,
            ticker,
            data_date,
            price,
            book_value,
            dividends,
            earnings,
            earnings_to_price: earnings / price,
            book_value_to_price: book_value / price,
            dividends_to_price: dividends / price,
            is_best: true,
        })
    }

    /// Natural key within a date partition: `(ticker, data_date)`.
    pub fn partition_key(&self) -> (&str, NaiveDate) {
        (self.ticker.as_str(), self.data_date)
    }
}

/// The derived-ratio columns as table expressions over stored field names.
///
/// Same arithmetic as [`PriceRecord::new`], applied column-wise in bulk mode.
pub fn ratio_exprs() -> [Expr; 3] {
    [
        (col(fields::EARNINGS) / col(fields::PRICE)).alias(fields::EARNINGS_TO_PRICE),
        (col(fields::BOOK_VALUE) / col(fields::PRICE)).alias(fields::BOOK_VALUE_TO_PRICE),
        (col(fields::DIVIDENDS) / col(fields::PRICE)).alias(fields::DIVIDENDS_TO_PRICE),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::Rule;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn aapl_fields() -> PriceFields {
        PriceFields {
            date: date(2021, 8, 9),
            ticker: "AAPL".into(),
            data_date: date(2021, 8, 9),
            price: 100.0,
            book_value: 50.0,
            dividends: 2.0,
            earnings: 5.0,
        }
    }

    #[test]
    fn derived_ratios_computed_on_construction() {
        let record = PriceRecord::new(aapl_fields()).unwrap();
        assert_eq!(record.earnings_to_price, 0.05);
        assert_eq!(record.book_value_to_price, 0.5);
        assert_eq!(record.dividends_to_price, 0.02);
        assert!(record.is_best);
    }

    #[test]
    fn zero_price_is_a_validation_failure() {
        let mut fields = aapl_fields();
        fields.price = 0.0;
        let err = PriceRecord::new(fields).unwrap_err();
        assert_eq!(err.rule(), Rule::ValuePositivity);
    }

    #[test]
    fn negative_earnings_are_allowed() {
        let mut fields = aapl_fields();
        fields.earnings = -5.0;
        let record = PriceRecord::new(fields).unwrap();
        assert_eq!(record.earnings_to_price, -0.05);
    }

    #[test]
    fn raw_row_parses_with_default_format() {
        let raw = RawPriceRow {
            price: "100".into(),
            book_value: " 50 ".into(),
            dividends: "2".into(),
            earnings: "5".into(),
            ticker: "  AAPL ".into(),
            date: "20210809".into(),
            data_date: "20210806".into(),
        };
        let fields = raw.parse("%Y%m%d").unwrap();
        assert_eq!(fields.ticker, "AAPL");
        assert_eq!(fields.book_value, 50.0);
        assert_eq!(fields.data_date, date(2021, 8, 6));
    }

    #[test]
    fn raw_row_rejects_unparseable_number() {
        let raw = RawPriceRow {
            price: "abc".into(),
            book_value: "50".into(),
            dividends: "2".into(),
            earnings: "5".into(),
            ticker: "AAPL".into(),
            date: "20210809".into(),
            data_date: "20210809".into(),
        };
        let err = raw.parse("%Y%m%d").unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MalformedField { column: "Price", .. }
        ));
    }

    #[test]
    fn raw_row_rejects_date_in_wrong_format() {
        let raw = RawPriceRow {
            price: "100".into(),
            book_value: "50".into(),
            dividends: "2".into(),
            earnings: "5".into(),
            ticker: "AAPL".into(),
            date: "2021-08-09".into(),
            data_date: "20210809".into(),
        };
        assert_eq!(raw.parse("%Y%m%d").unwrap_err().rule(), Rule::Malformed);
    }
}
