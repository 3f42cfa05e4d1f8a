//! Table-form validation for bulk mode.
//!
//! The whole vendor file is loaded as string columns; parsing and every rule
//! run as column expressions in one pass. The result splits the table into a
//! parsed valid subset (stored field names, no ratios yet) and the rejected
//! subset (raw vendor columns), with rejection counts attributed per rule in
//! the same precedence the record path uses.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::*;

use super::Rule;
use crate::frame::epoch_days;
use crate::record::{columns, fields};

const MALFORMED: &str = "__malformed";
const VALUE_OK: &str = "__value_ok";
const DATE_ORDER_OK: &str = "__date_order_ok";
const TICKER_OK: &str = "__ticker_ok";
const DATE_MATCH: &str = "__date_match";
const VALID: &str = "__valid";

pub struct TableValidation {
    /// Rows passing every rule, as parsed stored fields (without ratios).
    pub valid: DataFrame,
    /// Rows failing any rule, as the raw vendor columns.
    pub rejected: DataFrame,
    pub rejected_by_rule: BTreeMap<Rule, usize>,
}

impl TableValidation {
    pub fn rejected_count(&self) -> usize {
        self.rejected.height()
    }
}

fn trimmed(name: &str) -> Expr {
    col(name).str().strip_chars(lit(NULL))
}

fn positive(name: &str) -> Expr {
    // NaN sorts above +inf in Polars comparisons, so bound from above as well.
    col(name).gt(lit(0.0)).and(col(name).lt(lit(f64::INFINITY)))
}

/// Parse and validate a raw vendor table.
///
/// `processing_date` enables the daily-run date check.
pub fn validate_table(
    raw: LazyFrame,
    date_format: &str,
    processing_date: Option<NaiveDate>,
) -> PolarsResult<TableValidation> {
    let strptime = StrptimeOptions {
        format: Some(date_format.into()),
        strict: false,
        ..Default::default()
    };

    let mut projection: Vec<Expr> = columns::ALL.iter().map(|c| col(*c)).collect();
    projection.extend([
        trimmed(columns::TICKER).alias(fields::TICKER),
        trimmed(columns::DATE).str().to_date(strptime.clone()).alias(fields::DATE),
        trimmed(columns::DATA_DATE).str().to_date(strptime).alias(fields::DATA_DATE),
        trimmed(columns::PRICE).cast(DataType::Float64).alias(fields::PRICE),
        trimmed(columns::BOOK_VALUE).cast(DataType::Float64).alias(fields::BOOK_VALUE),
        trimmed(columns::DIVIDENDS).cast(DataType::Float64).alias(fields::DIVIDENDS),
        trimmed(columns::EARNINGS).cast(DataType::Float64).alias(fields::EARNINGS),
    ]);

    let malformed = col(fields::DATE)
        .is_null()
        .or(col(fields::DATA_DATE).is_null())
        .or(col(fields::PRICE).is_null())
        .or(col(fields::BOOK_VALUE).is_null())
        .or(col(fields::DIVIDENDS).is_null())
        .or(col(fields::EARNINGS).is_null());

    let value_ok = positive(fields::PRICE)
        .and(positive(fields::BOOK_VALUE))
        .and(positive(fields::DIVIDENDS));

    let date_match = match processing_date {
        Some(date) => col(fields::DATE)
            .cast(DataType::Int32)
            .eq(lit(epoch_days(date))),
        None => lit(true),
    };

    let flagged = raw
        .select(projection)
        .with_columns([
            malformed.alias(MALFORMED),
            value_ok.fill_null(lit(false)).alias(VALUE_OK),
            col(fields::DATA_DATE)
                .lt_eq(col(fields::DATE))
                .fill_null(lit(false))
                .alias(DATE_ORDER_OK),
            col(fields::TICKER)
                .neq(lit(""))
                .fill_null(lit(false))
                .alias(TICKER_OK),
            date_match.fill_null(lit(false)).alias(DATE_MATCH),
        ])
        .with_column(
            col(MALFORMED)
                .not()
                .and(col(VALUE_OK))
                .and(col(DATE_ORDER_OK))
                .and(col(TICKER_OK))
                .and(col(DATE_MATCH))
                .alias(VALID),
        )
        .collect()?;

    let valid = flagged
        .clone()
        .lazy()
        .filter(col(VALID))
        .select([
            col(fields::DATE),
            col(fields::TICKER),
            col(fields::DATA_DATE),
            col(fields::PRICE),
            col(fields::BOOK_VALUE),
            col(fields::DIVIDENDS),
            col(fields::EARNINGS),
        ])
        .collect()?;

    let rejected_flagged = flagged.lazy().filter(col(VALID).not()).collect()?;
    let rejected_by_rule = attribute_rules(&rejected_flagged)?;
    let rejected = rejected_flagged
        .lazy()
        .select(columns::ALL.iter().map(|c| col(*c)).collect::<Vec<_>>())
        .collect()?;

    Ok(TableValidation {
        valid,
        rejected,
        rejected_by_rule,
    })
}

/// Count each rejected row under the first rule it fails.
fn attribute_rules(rejected: &DataFrame) -> PolarsResult<BTreeMap<Rule, usize>> {
    let malformed = rejected.column(MALFORMED)?.bool()?;
    let value_ok = rejected.column(VALUE_OK)?.bool()?;
    let date_order_ok = rejected.column(DATE_ORDER_OK)?.bool()?;
    let ticker_ok = rejected.column(TICKER_OK)?.bool()?;

    let mut counts = BTreeMap::new();
    for row in 0..rejected.height() {
        let rule = if malformed.get(row).unwrap_or(true) {
            Rule::Malformed
        } else if !value_ok.get(row).unwrap_or(false) {
            Rule::ValuePositivity
        } else if !date_order_ok.get(row).unwrap_or(false) {
            Rule::DateOrder
        } else if !ticker_ok.get(row).unwrap_or(false) {
            Rule::EmptyTicker
        } else {
            Rule::DateMismatch
        };
        *counts.entry(rule).or_insert(0) += 1;
    }
    Ok(counts)
}
