//! Conversions between `PriceRecord`s and Polars DataFrames.
//!
//! The stored frame uses the snake_case names in [`crate::record::fields`],
//! with `date`/`data_date` as Polars `Date` columns.

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

use crate::record::{fields, PriceRecord};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("null {column} at row {row}")]
    NullValue { column: &'static str, row: usize },
}

/// `NaiveDate::default()` is the Unix epoch.
fn epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Days since 1970-01-01, the physical representation of a Polars `Date`.
pub fn epoch_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub fn date_from_epoch_days(days: i32) -> NaiveDate {
    epoch() + chrono::Duration::days(days as i64)
}

/// Build a stored-schema DataFrame from records.
pub fn records_to_frame(records: &[PriceRecord]) -> Result<DataFrame, FrameError> {
    let dates: Vec<i32> = records.iter().map(|r| epoch_days(r.date)).collect();
    let tickers: Vec<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
    let data_dates: Vec<i32> = records.iter().map(|r| epoch_days(r.data_date)).collect();
    let f64_column = |name: &str, get: fn(&PriceRecord) -> f64| {
        Column::new(name.into(), records.iter().map(get).collect::<Vec<f64>>())
    };
    let best: Vec<bool> = records.iter().map(|r| r.is_best).collect();

    let df = DataFrame::new(vec![
        Column::new(fields::DATE.into(), dates).cast(&DataType::Date)?,
        Column::new(fields::TICKER.into(), tickers),
        Column::new(fields::DATA_DATE.into(), data_dates).cast(&DataType::Date)?,
        f64_column(fields::PRICE, |r| r.price),
        f64_column(fields::BOOK_VALUE, |r| r.book_value),
        f64_column(fields::DIVIDENDS, |r| r.dividends),
        f64_column(fields::EARNINGS, |r| r.earnings),
        f64_column(fields::EARNINGS_TO_PRICE, |r| r.earnings_to_price),
        f64_column(fields::BOOK_VALUE_TO_PRICE, |r| r.book_value_to_price),
        f64_column(fields::DIVIDENDS_TO_PRICE, |r| r.dividends_to_price),
        Column::new(fields::IS_BEST.into(), best),
    ])?;
    Ok(df)
}

/// Read records back out of a stored-schema DataFrame.
///
/// Every column must be present and non-null.
pub fn records_from_frame(df: &DataFrame) -> Result<Vec<PriceRecord>, FrameError> {
    let dates = df.column(fields::DATE)?.date()?;
    let tickers = df.column(fields::TICKER)?.str()?;
    let data_dates = df.column(fields::DATA_DATE)?.date()?;
    let prices = df.column(fields::PRICE)?.f64()?;
    let book_values = df.column(fields::BOOK_VALUE)?.f64()?;
    let dividends = df.column(fields::DIVIDENDS)?.f64()?;
    let earnings = df.column(fields::EARNINGS)?.f64()?;
    let ep = df.column(fields::EARNINGS_TO_PRICE)?.f64()?;
    let bvp = df.column(fields::BOOK_VALUE_TO_PRICE)?.f64()?;
    let dp = df.column(fields::DIVIDENDS_TO_PRICE)?.f64()?;
    let best = df.column(fields::IS_BEST)?.bool()?;

    let float = |ca: &Float64Chunked, column: &'static str, row: usize| {
        ca.get(row).ok_or(FrameError::NullValue { column, row })
    };

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let date = dates.get(row).ok_or(FrameError::NullValue {
            column: fields::DATE,
            row,
        })?;
        let data_date = data_dates.get(row).ok_or(FrameError::NullValue {
            column: fields::DATA_DATE,
            row,
        })?;
        let ticker = tickers.get(row).ok_or(FrameError::NullValue {
            column: fields::TICKER,
            row,
        })?;

        records.push(PriceRecord {
            date: date_from_epoch_days(date),
            ticker: ticker.to_string(),
            data_date: date_from_epoch_days(data_date),
            price: float(prices, fields::PRICE, row)?,
            book_value: float(book_values, fields::BOOK_VALUE, row)?,
            dividends: float(dividends, fields::DIVIDENDS, row)?,
            earnings: float(earnings, fields::EARNINGS, row)?,
            earnings_to_price: float(ep, fields::EARNINGS_TO_PRICE, row)?,
            book_value_to_price: float(bvp, fields::BOOK_VALUE_TO_PRICE, row)?,
            dividends_to_price: float(dp, fields::DIVIDENDS_TO_PRICE, row)?,
            is_best: best.get(row).ok_or(FrameError::NullValue {
                column: fields::IS_BEST,
                row,
            })?,
        });
    }

    Ok(records)
}
