//! Read-side projection over the price-history store.
//!
//! Three views: `Best` and `All` filter on the record date, `History` filters
//! on the observation date to show how data for a window changed over time.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::frame::{records_to_frame, FrameError};
use crate::record::PriceRecord;
use crate::store::{PriceStore, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryView {
    /// Only the authoritative row per (date, ticker).
    Best,
    /// Every stored row in the date window.
    All,
    /// Every stored row whose `data_date` falls in the window.
    History,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuery {
    pub tickers: BTreeSet<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub view: QueryView,
}

impl PriceQuery {
    /// Build a query, filling defaults: no end date means `today`, no start
    /// date means the end date.
    pub fn new<I, S>(
        tickers: I,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        view: QueryView,
        today: NaiveDate,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let end = end.unwrap_or(today);
        let start = start.unwrap_or(end);
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
            start,
            end,
            view,
        }
    }

    pub fn matches(&self, record: &PriceRecord) -> bool {
        if !self.tickers.contains(&record.ticker) {
            return false;
        }
        let axis = match self.view {
            QueryView::History => record.data_date,
            QueryView::Best | QueryView::All => record.date,
        };
        if axis < self.start || axis > self.end {
            return false;
        }
        self.view != QueryView::Best || record.is_best
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub fn best_data<S: Into<String>>(
    store: &dyn PriceStore,
    tickers: impl IntoIterator<Item = S>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<PriceRecord>, SinkError> {
    store.query(&PriceQuery::new(tickers, start, end, QueryView::Best, today()))
}

pub fn all_data<S: Into<String>>(
    store: &dyn PriceStore,
    tickers: impl IntoIterator<Item = S>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<PriceRecord>, SinkError> {
    store.query(&PriceQuery::new(tickers, start, end, QueryView::All, today()))
}

pub fn history_data_change<S: Into<String>>(
    store: &dyn PriceStore,
    tickers: impl IntoIterator<Item = S>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<PriceRecord>, SinkError> {
    store.query(&PriceQuery::new(tickers, start, end, QueryView::History, today()))
}

/// Render a query result as a table.
pub fn to_table(records: &[PriceRecord]) -> Result<DataFrame, FrameError> {
    records_to_frame(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 8, d).unwrap()
    }

    fn record(ticker: &str, day: u32, data_day: u32, best: bool) -> PriceRecord {
        PriceRecord {
            date: date(day),
            ticker: ticker.into(),
            data_date: date(data_day),
            price: 100.0,
            book_value: 50.0,
            dividends: 2.0,
            earnings: 5.0,
            earnings_to_price: 0.05,
            book_value_to_price: 0.5,
            dividends_to_price: 0.02,
            is_best: best,
        }
    }

    #[test]
    fn missing_dates_default_to_today() {
        let q = PriceQuery::new(["AAPL"], None, None, QueryView::All, date(9));
        assert_eq!((q.start, q.end), (date(9), date(9)));

        let q = PriceQuery::new(["AAPL"], None, Some(date(5)), QueryView::All, date(9));
        assert_eq!((q.start, q.end), (date(5), date(5)));
    }

    #[test]
    fn best_view_hides_superseded_rows() {
        let q = PriceQuery::new(["AAPL"], Some(date(1)), Some(date(9)), QueryView::Best, date(9));
        assert!(q.matches(&record("AAPL", 9, 9, true)));
        assert!(!q.matches(&record("AAPL", 9, 8, false)));
        assert!(!q.matches(&record("MSFT", 9, 9, true)));
    }

    #[test]
    fn all_view_keeps_superseded_rows() {
        let q = PriceQuery::new(["AAPL"], Some(date(1)), Some(date(9)), QueryView::All, date(9));
        assert!(q.matches(&record("AAPL", 9, 8, false)));
        assert!(!q.matches(&record("AAPL", 10, 8, true)));
    }

    #[test]
    fn history_view_filters_on_data_date() {
        let q = PriceQuery::new(["AAPL"], Some(date(1)), Some(date(5)), QueryView::History, date(9));
        assert!(q.matches(&record("AAPL", 9, 3, false)));
        assert!(!q.matches(&record("AAPL", 3, 9, true)));
    }
}
