//! Flush paths: how a full batch reaches the store.

use chrono::NaiveDate;
use tracing::{debug, info};

use super::{IngestError, Tally};
use crate::batch::IngestionBatch;
use crate::context::RunKind;
use crate::phase::{PhaseTracker, RunPhase};
use crate::reinstate;
use crate::store::{PriceStore, SinkError};

/// What a flush does beyond inserting the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPath {
    /// Insert only.
    AppendOnly,
    /// Insert and revoke the best flag on the rows the batch supersedes,
    /// as one store write.
    FlushAndRevoke,
}

impl FlushPath {
    pub fn for_kind(kind: RunKind) -> Self {
        match kind {
            RunKind::Daily => FlushPath::AppendOnly,
            RunKind::Reinstatement => FlushPath::FlushAndRevoke,
        }
    }
}

/// Owns the store handle and run phase for one run, and counts what
/// has been committed.
pub(crate) struct Flusher<'s> {
    store: &'s mut dyn PriceStore,
    path: FlushPath,
    phase: PhaseTracker,
    batches_flushed: usize,
    records_revoked: usize,
    records_replaced: usize,
}

impl<'s> Flusher<'s> {
    pub fn new(store: &'s mut dyn PriceStore, path: FlushPath) -> Self {
        Self {
            store,
            path,
            phase: PhaseTracker::new(),
            batches_flushed: 0,
            records_revoked: 0,
            records_replaced: 0,
        }
    }

    pub fn advance(&mut self, next: RunPhase) {
        self.phase.advance(next);
    }

    pub fn batches_flushed(&self) -> usize {
        self.batches_flushed
    }

    pub fn records_revoked(&self) -> usize {
        self.records_revoked
    }

    pub fn records_replaced(&self) -> usize {
        self.records_replaced
    }

    /// Remove every stored row at `date` so a daily rerun replaces rather
    /// than accumulates.
    pub fn clear_date(&mut self, date: NaiveDate, tally: &Tally) -> Result<(), IngestError> {
        let deleted = self
            .store
            .delete_where(date)
            .map_err(|e| self.fail(e, tally))?;
        self.records_replaced += deleted;
        if deleted > 0 {
            info!(%date, deleted, "cleared stored rows for processing date");
        }
        Ok(())
    }

    /// Commit the batch and leave it empty. An empty batch is a no-op.
    pub fn flush(&mut self, batch: &mut IngestionBatch, tally: &Tally) -> Result<(), IngestError> {
        if batch.is_empty() {
            return Ok(());
        }
        let (mut records, index) = batch.take();
        self.advance(RunPhase::Flushing);

        match self.path {
            FlushPath::AppendOnly => {
                let written = self
                    .store
                    .bulk_insert(&records)
                    .map_err(|e| self.fail(e, tally))?;
                debug!(records = written, "flushed batch");
            }
            FlushPath::FlushAndRevoke => {
                self.advance(RunPhase::Revoking);
                let outcome = reinstate::flush_and_revoke(&mut *self.store, &mut records, &index)
                    .map_err(|e| self.fail(e, tally))?;
                self.records_revoked += outcome.revoked;
            }
        }

        self.batches_flushed += 1;
        self.advance(RunPhase::Buffering);
        Ok(())
    }

    fn fail(&self, source: SinkError, tally: &Tally) -> IngestError {
        IngestError::Sink {
            phase: self.phase.current(),
            accepted: tally.accepted,
            rejected: tally.rejected,
            batches_committed: self.batches_flushed,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PriceRecord;
    use crate::store::MemoryStore;

    fn record(ticker: &str) -> PriceRecord {
        let date = NaiveDate::from_ymd_opt(2021, 8, 9).unwrap();
        PriceRecord {
            date,
            ticker: ticker.into(),
            data_date: date,
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
    fn run_kind_selects_flush_path() {
        assert_eq!(FlushPath::for_kind(RunKind::Daily), FlushPath::AppendOnly);
        assert_eq!(FlushPath::for_kind(RunKind::Reinstatement), FlushPath::FlushAndRevoke);
    }

    #[test]
    fn flush_empties_batch_and_counts() {
        let mut store = MemoryStore::new();
        let mut flusher = Flusher::new(&mut store, FlushPath::AppendOnly);
        flusher.advance(RunPhase::Loading);

        let mut batch = IngestionBatch::from_records(vec![record("AAPL"), record("MSFT")]);
        flusher.flush(&mut batch, &Tally::default()).unwrap();
        assert!(batch.is_empty());
        assert!(batch.index().is_empty());

        flusher.flush(&mut batch, &Tally::default()).unwrap();
        assert_eq!(flusher.batches_flushed(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn sink_failure_reports_phase_and_progress() {
        let mut store = MemoryStore::new().fail_after(1);
        let mut flusher = Flusher::new(&mut store, FlushPath::AppendOnly);
        flusher.advance(RunPhase::Loading);
        let tally = Tally {
            accepted: 2,
            ..Tally::default()
        };

        flusher
            .flush(&mut IngestionBatch::from_records(vec![record("AAPL")]), &tally)
            .unwrap();
        let err = flusher
            .flush(&mut IngestionBatch::from_records(vec![record("MSFT")]), &tally)
            .unwrap_err();

        match err {
            IngestError::Sink {
                phase,
                accepted,
                batches_committed,
                ..
            } => {
                assert_eq!(phase, RunPhase::Flushing);
                assert_eq!(accepted, 2);
                assert_eq!(batches_committed, 1);
            }
            other => panic!("expected sink error, got {other:?}"),
        }
    }
}
