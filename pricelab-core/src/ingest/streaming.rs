//! Record-at-a-time ingestion with a bounded batch.

use std::fs::File;

use tracing::{debug, warn};

use super::flush::Flusher;
use super::{IngestError, Tally};
use crate::batch::IngestionBatch;
use crate::context::{ConfigError, RunContext};
use crate::phase::RunPhase;
use crate::record::{PriceRecord, RawPriceRow};
use crate::validate::{self, ValidationError};

/// Upper bound on the batch pre-allocation; large thresholds grow lazily.
const MAX_PREALLOC: usize = 65_536;

pub(super) fn open(ctx: &RunContext) -> Result<csv::Reader<File>, IngestError> {
    let file = File::open(ctx.input()).map_err(|source| ConfigError::UnreadableInput {
        path: ctx.input().to_path_buf(),
        source,
    })?;
    Ok(csv::Reader::from_reader(file))
}

pub(super) fn run(
    ctx: &RunContext,
    mut reader: csv::Reader<File>,
    flusher: &mut Flusher<'_>,
    tally: &mut Tally,
) -> Result<(), IngestError> {
    let threshold = ctx.flush_threshold();
    let mut batch = IngestionBatch::with_capacity(threshold.min(MAX_PREALLOC));

    for (i, row) in reader.deserialize::<RawPriceRow>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        flusher.advance(RunPhase::Validating);

        let row = match row {
            Ok(row) => Ok(row),
            Err(e) if e.is_io_error() => {
                return Err(IngestError::Read {
                    path: ctx.input().to_path_buf(),
                    source: e,
                })
            }
            Err(e) => Err(ValidationError::MalformedRow {
                reason: e.to_string(),
            }),
        };

        match row.and_then(|raw| admit(ctx, &raw)) {
            Ok(record) => {
                tally.accept();
                flusher.advance(RunPhase::Buffering);
                batch.push(record);
                if batch.len() >= threshold {
                    debug!(line, records = batch.len(), "batch reached threshold");
                    flusher.flush(&mut batch, tally)?;
                }
            }
            Err(e) => {
                warn!(line, rule = %e.rule(), error = %e, "rejected record");
                tally.reject(e.rule());
            }
        }
    }

    flusher.flush(&mut batch, tally)
}

/// Parse, validate and derive one row.
fn admit(ctx: &RunContext, raw: &RawPriceRow) -> Result<PriceRecord, ValidationError> {
    let record = PriceRecord::new(raw.parse(ctx.date_format())?)?;
    if let Some(expected) = ctx.required_date() {
        validate::check_processing_date(expected, record.date)?;
    }
    Ok(record)
}
