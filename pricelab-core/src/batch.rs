//! In-memory buffer of accepted records awaiting a flush.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use chrono::NaiveDate;

use crate::record::PriceRecord;

/// Tickers written per date since the last flush.
pub type DateTickerIndex = BTreeMap<NaiveDate, BTreeSet<String>>;

/// Records buffered for the next flush, plus the date → tickers index that
/// drives best-flag revocation.
///
/// Each run builds its own batch; nothing is shared between runs.
#[derive(Debug, Default)]
pub struct IngestionBatch {
    records: Vec<PriceRecord>,
    index: DateTickerIndex,
}

impl IngestionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            index: DateTickerIndex::new(),
        }
    }

    /// Build a batch from an already-validated set, grouping tickers by date.
    pub fn from_records(records: Vec<PriceRecord>) -> Self {
        let mut index = DateTickerIndex::new();
        for record in &records {
            index
                .entry(record.date)
                .or_default()
                .insert(record.ticker.clone());
        }
        Self { records, index }
    }

    pub fn push(&mut self, record: PriceRecord) {
        self.index
            .entry(record.date)
            .or_default()
            .insert(record.ticker.clone());
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn index(&self) -> &DateTickerIndex {
        &self.index
    }

    /// Hand over the buffered records and index, leaving the batch empty.
    pub fn take(&mut self) -> (Vec<PriceRecord>, DateTickerIndex) {
        (mem::take(&mut self.records), mem::take(&mut self.index))
    }
}
