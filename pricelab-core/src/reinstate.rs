//! Best-flag revocation for reinstatement runs.
//!
//! Each reinstatement flush makes its records the sole best rows for every
//! `(date, ticker)` it writes. Revocation and insert happen in one store
//! write, so rerunning the same file converges on the same state.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::batch::DateTickerIndex;
use crate::record::PriceRecord;
use crate::store::{PriceStore, RevokeOutcome, SinkError};

/// Within one batch, keep only the last record per `(date, ticker)` as best.
///
/// Returns the number of records demoted.
pub fn settle_best(records: &mut [PriceRecord]) -> usize {
    let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();
    let mut demoted = 0;
    for record in records.iter_mut().rev() {
        if !seen.insert((record.date, record.ticker.clone())) && record.is_best {
            record.is_best = false;
            demoted += 1;
        }
    }
    demoted
}

/// Revoke the best flag on every stored row the index touches, then insert
/// the batch, as one store write.
pub fn flush_and_revoke(
    store: &mut dyn PriceStore,
    records: &mut [PriceRecord],
    index: &DateTickerIndex,
) -> Result<RevokeOutcome, SinkError> {
    let demoted = settle_best(records);
    if demoted > 0 {
        debug!(demoted, "batch repeats (date, ticker) pairs; last one stays best");
    }

    let outcome = store.revoke_and_insert(index, records)?;
    for (date, tickers) in index {
        debug!(%date, tickers = tickers.len(), "revoked best flag");
    }
    info!(
        dates = index.len(),
        inserted = outcome.inserted,
        revoked = outcome.revoked,
        "reinstated batch"
    );
    Ok(outcome)
}

/// Revoke the best flag for `tickers` at every date in `index` without
/// inserting anything. Each date is its own store write.
pub fn revoke_best(store: &mut dyn PriceStore, index: &DateTickerIndex) -> Result<usize, SinkError> {
    let mut revoked = 0;
    for (date, tickers) in index {
        let changed = store.update_best_flag(*date, tickers, false)?;
        debug!(%date, tickers = tickers.len(), changed, "revoked best flag");
        revoked += changed;
    }
    Ok(revoked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::IngestionBatch;
    use crate::store::MemoryStore;
    use chrono::Datelike;

    fn record(ticker: &str, day: u32, data_day: u32) -> PriceRecord {
        let date = |d| NaiveDate::from_ymd_opt(2021, 8, d).unwrap();
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

    fn best_count(store: &MemoryStore, ticker: &str, day: u32) -> usize {
        store
            .rows()
            .iter()
            .filter(|r| r.ticker == ticker && r.date.day() == day)
            .filter(|r| r.is_best)
            .count()
    }

    #[test]
    fn settle_keeps_last_duplicate() {
        let mut records = vec![record("AAPL", 9, 6), record("MSFT", 9, 9), record("AAPL", 9, 8)];
        assert_eq!(settle_best(&mut records), 1);
        assert!(!records[0].is_best);
        assert!(records[1].is_best);
        assert!(records[2].is_best);
    }

    #[test]
    fn reinstated_record_becomes_sole_best() {
        let mut store = MemoryStore::new();
        store
            .bulk_insert(&[record("AAPL", 9, 5), record("AAPL", 9, 6), record("MSFT", 9, 6)])
            .unwrap();

        let batch = IngestionBatch::from_records(vec![record("AAPL", 9, 8)]);
        let mut records = batch.records().to_vec();
        let outcome = flush_and_revoke(&mut store, &mut records, batch.index()).unwrap();

        assert_eq!(outcome.revoked, 2);
        assert_eq!(best_count(&store, "AAPL", 9), 1);
        assert_eq!(best_count(&store, "MSFT", 9), 1);
    }

    #[test]
    fn rerunning_a_reinstatement_is_idempotent() {
        let mut store = MemoryStore::new();
        store.bulk_insert(&[record("AAPL", 9, 6)]).unwrap();

        for _ in 0..2 {
            let batch = IngestionBatch::from_records(vec![record("AAPL", 9, 8)]);
            let mut records = batch.records().to_vec();
            flush_and_revoke(&mut store, &mut records, batch.index()).unwrap();
        }

        let rows = store.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(best_count(&store, "AAPL", 9), 1);
        assert!(rows.iter().any(|r| r.is_best && r.data_date.day() == 8));
    }

    #[test]
    fn revoke_best_counts_changes() {
        let mut store = MemoryStore::new();
        store
            .bulk_insert(&[record("AAPL", 9, 9), record("AAPL", 10, 10)])
            .unwrap();
        let batch = IngestionBatch::from_records(vec![record("AAPL", 9, 9), record("AAPL", 10, 10)]);
        assert_eq!(revoke_best(&mut store, batch.index()).unwrap(), 2);
        assert_eq!(revoke_best(&mut store, batch.index()).unwrap(), 0);
    }
}
