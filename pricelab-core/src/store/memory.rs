//! In-process store, used by tests and benchmarks.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use super::{by_date, flag_partition, sort_rows, upsert_partition, PriceStore, RevokeOutcome, SinkError};
use crate::batch::DateTickerIndex;
use crate::query::PriceQuery;
use crate::record::PriceRecord;

/// Rows partitioned by date, with optional write-failure injection.
///
/// Each write checks for an injected fault before touching any row, so a
/// failed write leaves the store unchanged.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    partitions: BTreeMap<NaiveDate, Vec<PriceRecord>>,
    writes: usize,
    fail_after: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write after the first `writes` successful ones fail.
    pub fn fail_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    /// Number of writes committed so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rows, ordered by date, ticker, observation date.
    pub fn rows(&self) -> Vec<PriceRecord> {
        let mut rows: Vec<PriceRecord> = self.partitions.values().flatten().cloned().collect();
        sort_rows(&mut rows);
        rows
    }

    fn begin_write(&mut self) -> Result<(), SinkError> {
        if let Some(limit) = self.fail_after {
            if self.writes >= limit {
                return Err(SinkError::Rejected(format!(
                    "injected failure after {limit} writes"
                )));
            }
        }
        self.writes += 1;
        Ok(())
    }

    fn insert_rows(&mut self, records: &[PriceRecord]) -> usize {
        by_date(records)
            .into_iter()
            .map(|(date, group)| upsert_partition(self.partitions.entry(date).or_default(), group))
            .sum()
    }

    fn flag_rows(&mut self, date: NaiveDate, tickers: &BTreeSet<String>, best: bool) -> usize {
        self.partitions
            .get_mut(&date)
            .map_or(0, |rows| flag_partition(rows, tickers, best))
    }
}

impl PriceStore for MemoryStore {
    fn bulk_insert(&mut self, records: &[PriceRecord]) -> Result<usize, SinkError> {
        self.begin_write()?;
        Ok(self.insert_rows(records))
    }

    fn delete_where(&mut self, date: NaiveDate) -> Result<usize, SinkError> {
        self.begin_write()?;
        Ok(self.partitions.remove(&date).map_or(0, |rows| rows.len()))
    }

    fn update_best_flag(
        &mut self,
        date: NaiveDate,
        tickers: &BTreeSet<String>,
        best: bool,
    ) -> Result<usize, SinkError> {
        self.begin_write()?;
        Ok(self.flag_rows(date, tickers, best))
    }

    fn revoke_and_insert(
        &mut self,
        index: &DateTickerIndex,
        records: &[PriceRecord],
    ) -> Result<RevokeOutcome, SinkError> {
        self.begin_write()?;
        let revoked: usize = index
            .iter()
            .map(|(date, tickers)| self.flag_rows(*date, tickers, false))
            .sum();
        let inserted = self.insert_rows(records);
        Ok(RevokeOutcome { inserted, revoked })
    }

    fn query(&self, query: &PriceQuery) -> Result<Vec<PriceRecord>, SinkError> {
        let mut rows: Vec<PriceRecord> = self
            .partitions
            .values()
            .flatten()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        sort_rows(&mut rows);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryView;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 8, d).unwrap()
    }

    fn record(ticker: &str, day: u32, data_day: u32) -> PriceRecord {
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
            is_best: true,
        }
    }

    #[test]
    fn delete_removes_only_that_date() {
        let mut store = MemoryStore::new();
        store
            .bulk_insert(&[record("AAPL", 9, 9), record("AAPL", 10, 10)])
            .unwrap();
        assert_eq!(store.delete_where(date(9)).unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.delete_where(date(9)).unwrap(), 0);
    }

    #[test]
    fn update_best_flag_scopes_to_date_and_tickers() {
        let mut store = MemoryStore::new();
        store
            .bulk_insert(&[record("AAPL", 9, 9), record("MSFT", 9, 9), record("AAPL", 10, 10)])
            .unwrap();
        let tickers: BTreeSet<String> = ["AAPL".to_string()].into();
        assert_eq!(store.update_best_flag(date(9), &tickers, false).unwrap(), 1);

        let best: Vec<_> = store.rows().into_iter().filter(|r| r.is_best).collect();
        assert_eq!(best.len(), 2);
        assert!(best.iter().all(|r| r.ticker != "AAPL" || r.date == date(10)));
    }

    #[test]
    fn revoke_and_insert_leaves_new_row_as_sole_best() {
        let mut store = MemoryStore::new();
        store.bulk_insert(&[record("AAPL", 9, 6)]).unwrap();

        let index: DateTickerIndex = [(date(9), ["AAPL".to_string()].into())].into();
        let outcome = store.revoke_and_insert(&index, &[record("AAPL", 9, 9)]).unwrap();
        assert_eq!(outcome, RevokeOutcome { inserted: 1, revoked: 1 });

        let q = PriceQuery::new(["AAPL"], Some(date(9)), Some(date(9)), QueryView::Best, date(9));
        let best = store.query(&q).unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].data_date, date(9));
    }

    #[test]
    fn injected_failure_leaves_store_untouched() {
        let mut store = MemoryStore::new().fail_after(1);
        store.bulk_insert(&[record("AAPL", 9, 9)]).unwrap();
        let before = store.rows();

        let err = store.bulk_insert(&[record("MSFT", 9, 9)]).unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));
        assert_eq!(store.rows(), before);
        assert_eq!(store.write_count(), 1);
    }
}
