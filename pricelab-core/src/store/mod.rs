//! Price-history store sinks.
//!
//! The engine writes through the [`PriceStore`] trait. Every write call is
//! one all-or-nothing unit: either its whole effect is committed or none of
//! it is. Rows are keyed by `(date, ticker, data_date)`; inserting a row
//! with an existing key replaces it.

pub mod memory;
pub mod parquet;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::DateTickerIndex;
use crate::frame::FrameError;
use crate::query::PriceQuery;
use crate::record::PriceRecord;

pub use memory::MemoryStore;
pub use parquet::ParquetStore;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("corrupt partition {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("store rejected write: {0}")]
    Rejected(String),
}

impl From<FrameError> for SinkError {
    fn from(e: FrameError) -> Self {
        SinkError::Parquet(e.to_string())
    }
}

/// Result of an atomic revoke-then-insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeOutcome {
    pub inserted: usize,
    pub revoked: usize,
}

/// Transactional sink for price-history rows.
pub trait PriceStore {
    /// Upsert `records` by natural key. Returns the number of rows written.
    fn bulk_insert(&mut self, records: &[PriceRecord]) -> Result<usize, SinkError>;

    /// Delete every row at `date`. Returns the number of rows deleted.
    fn delete_where(&mut self, date: NaiveDate) -> Result<usize, SinkError>;

    /// Set `is_best = best` on every row at `date` whose ticker is in
    /// `tickers`. Returns the number of rows whose flag changed.
    fn update_best_flag(
        &mut self,
        date: NaiveDate,
        tickers: &BTreeSet<String>,
        best: bool,
    ) -> Result<usize, SinkError>;

    /// In one unit: clear the best flag on every existing row matching
    /// `index`, then upsert `records`.
    fn revoke_and_insert(
        &mut self,
        index: &DateTickerIndex,
        records: &[PriceRecord],
    ) -> Result<RevokeOutcome, SinkError>;

    fn query(&self, query: &PriceQuery) -> Result<Vec<PriceRecord>, SinkError>;
}

/// Upsert `incoming` into one date partition by `(ticker, data_date)`.
pub(crate) fn upsert_partition<'a>(
    rows: &mut Vec<PriceRecord>,
    incoming: impl IntoIterator<Item = &'a PriceRecord>,
) -> usize {
    let mut positions: HashMap<(String, NaiveDate), usize> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| ((r.ticker.clone(), r.data_date), i))
        .collect();

    let mut written = 0;
    for record in incoming {
        let key = (record.ticker.clone(), record.data_date);
        match positions.get(&key) {
            Some(&i) => rows[i] = record.clone(),
            None => {
                positions.insert(key, rows.len());
                rows.push(record.clone());
            }
        }
        written += 1;
    }
    written
}

/// Set the best flag on rows of one partition whose ticker is in `tickers`.
pub(crate) fn flag_partition(rows: &mut [PriceRecord], tickers: &BTreeSet<String>, best: bool) -> usize {
    let mut changed = 0;
    for row in rows.iter_mut() {
        if row.is_best != best && tickers.contains(&row.ticker) {
            row.is_best = best;
            changed += 1;
        }
    }
    changed
}

/// Group records by their date partition.
pub(crate) fn by_date(records: &[PriceRecord]) -> BTreeMap<NaiveDate, Vec<&PriceRecord>> {
    let mut groups: BTreeMap<NaiveDate, Vec<&PriceRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.date).or_default().push(record);
    }
    groups
}

/// Deterministic result order: date, ticker, observation date.
pub(crate) fn sort_rows(rows: &mut [PriceRecord]) {
    rows.sort_by(|a, b| {
        (a.date, a.ticker.as_str(), a.data_date).cmp(&(b.date, b.ticker.as_str(), b.data_date))
    });
}
