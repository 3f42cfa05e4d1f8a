//! Ingestion engine: reads one vendor file, validates and derives each
//! record, and flushes accepted records to a [`PriceStore`].
//!
//! Two read strategies share one contract:
//! - streaming: one row at a time, flushing whenever the batch reaches the
//!   threshold and once more at end of input
//! - bulk: the whole file as a table, validated in one pass and written with
//!   a single flush
//!
//! The run kind picks the flush path. Daily runs append (after clearing the
//! processing date); reinstatement runs also revoke the best flag on the
//! rows each flush supersedes.

mod bulk;
mod flush;
mod streaming;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::context::{ConfigError, RunContext, RunKind};
use crate::frame::FrameError;
use crate::phase::RunPhase;
use crate::store::{PriceStore, SinkError};
use crate::strategy::IngestStrategy;
use crate::validate::Rule;

pub use flush::FlushPath;
use flush::Flusher;

/// Fatal run errors. Per-record validation failures are never fatal.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("read failed in {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(
        "store write failed while {phase} ({accepted} accepted, {rejected} rejected, \
         {batches_committed} batches committed): {source}"
    )]
    Sink {
        phase: RunPhase,
        accepted: usize,
        rejected: usize,
        batches_committed: usize,
        #[source]
        source: SinkError,
    },

    #[error("table processing failed: {0}")]
    Frame(#[from] FrameError),
}

impl From<polars::prelude::PolarsError> for IngestError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        IngestError::Frame(FrameError::Polars(e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Failed,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub records_accepted: usize,
    pub records_rejected: usize,
    pub batches_flushed: usize,
    /// Existing rows whose best flag a reinstatement revoked.
    pub records_revoked: usize,
    /// Rows removed by a daily run's pre-run clear.
    pub records_replaced: usize,
    pub rejected_by_rule: BTreeMap<Rule, usize>,
    pub status: RunStatus,
}

/// Running accept/reject counts.
#[derive(Debug, Default, Clone)]
pub(crate) struct Tally {
    pub accepted: usize,
    pub rejected: usize,
    pub by_rule: BTreeMap<Rule, usize>,
}

impl Tally {
    fn accept(&mut self) {
        self.accepted += 1;
    }

    fn reject(&mut self, rule: Rule) {
        self.reject_many(rule, 1);
    }

    fn reject_many(&mut self, rule: Rule, count: usize) {
        if count == 0 {
            return;
        }
        self.rejected += count;
        *self.by_rule.entry(rule).or_insert(0) += count;
    }
}

/// Runs one ingestion against a store.
pub struct IngestionEngine<'a> {
    ctx: &'a RunContext,
    store: &'a mut dyn PriceStore,
}

impl<'a> IngestionEngine<'a> {
    pub fn new(ctx: &'a RunContext, store: &'a mut dyn PriceStore) -> Self {
        Self { ctx, store }
    }

    /// Ingest the whole input file.
    ///
    /// Configuration problems fail before the store is touched. A store
    /// failure stops the run; flushes committed before it stay committed.
    pub fn ingest(self) -> Result<IngestSummary, IngestError> {
        let ctx = self.ctx;
        let _entered = ctx.span().enter();
        let started = Instant::now();

        if let Err(e) = ctx.validate() {
            error!(error = %e, "run configuration rejected");
            return Err(e.into());
        }
        info!(threshold = ctx.flush_threshold(), "ingestion run started");

        let mut flusher = Flusher::new(self.store, FlushPath::for_kind(ctx.kind()));
        let mut tally = Tally::default();

        match drive(ctx, &mut flusher, &mut tally) {
            Ok(()) => {
                flusher.advance(RunPhase::Done);
                let summary = IngestSummary {
                    records_accepted: tally.accepted,
                    records_rejected: tally.rejected,
                    batches_flushed: flusher.batches_flushed(),
                    records_revoked: flusher.records_revoked(),
                    records_replaced: flusher.records_replaced(),
                    rejected_by_rule: tally.by_rule,
                    status: RunStatus::Done,
                };
                info!(
                    accepted = summary.records_accepted,
                    rejected = summary.records_rejected,
                    batches = summary.batches_flushed,
                    revoked = summary.records_revoked,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "ingestion run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                flusher.advance(RunPhase::Failed);
                error!(
                    error = %e,
                    accepted = tally.accepted,
                    rejected = tally.rejected,
                    batches = flusher.batches_flushed(),
                    "ingestion run failed"
                );
                Err(e)
            }
        }
    }
}

fn drive(ctx: &RunContext, flusher: &mut Flusher<'_>, tally: &mut Tally) -> Result<(), IngestError> {
    flusher.advance(RunPhase::Loading);
    // The input is opened (bulk: fully read) before a daily clear, so a
    // load failure leaves the stored date intact.
    match ctx.strategy() {
        IngestStrategy::Streaming => {
            let reader = streaming::open(ctx)?;
            clear_daily(ctx, flusher, tally)?;
            streaming::run(ctx, reader, flusher, tally)
        }
        IngestStrategy::Bulk => {
            let table = bulk::load_table(ctx)?;
            clear_daily(ctx, flusher, tally)?;
            bulk::run(ctx, table, flusher, tally)
        }
    }
}

fn clear_daily(ctx: &RunContext, flusher: &mut Flusher<'_>, tally: &Tally) -> Result<(), IngestError> {
    if ctx.kind() == RunKind::Daily {
        flusher.clear_date(ctx.processing_date(), tally)?;
    }
    Ok(())
}
