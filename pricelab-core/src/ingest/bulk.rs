//! Whole-file ingestion: one table, one validation pass, one flush.

use std::fs::File;

use polars::prelude::*;
use tracing::{debug, warn};

use super::flush::Flusher;
use super::{IngestError, Tally};
use crate::batch::IngestionBatch;
use crate::context::{ConfigError, RunContext};
use crate::frame::records_from_frame;
use crate::phase::RunPhase;
use crate::record::{columns, fields, ratio_exprs};
use crate::validate::{validate_table, TableValidation};

/// Rejected rows shown in the aggregate warning.
const REJECT_SAMPLE: usize = 5;

/// Read the vendor file into string columns named by the vendor header.
///
/// Rows the CSV layer cannot read (wrong field count, invalid UTF-8) become
/// all-null rows, which validation counts as malformed. Only I/O failures
/// are fatal.
pub(super) fn load_table(ctx: &RunContext) -> Result<DataFrame, IngestError> {
    let path = ctx.input();
    let read_failed = |source: csv::Error| IngestError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| ConfigError::UnreadableInput {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers().map_err(read_failed)?.clone();

    let mut positions = [0usize; columns::ALL.len()];
    for (slot, column) in positions.iter_mut().zip(columns::ALL) {
        *slot = headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| ConfigError::MissingColumn {
                path: path.to_path_buf(),
                column,
            })?;
    }

    let mut values: [Vec<Option<String>>; columns::ALL.len()] = Default::default();
    let mut unreadable = 0usize;
    for (i, row) in reader.records().enumerate() {
        match row {
            Ok(row) => {
                for (column, &pos) in values.iter_mut().zip(&positions) {
                    column.push(row.get(pos).map(str::to_string));
                }
            }
            Err(e) if e.is_io_error() => return Err(read_failed(e)),
            Err(e) => {
                // Header is line 1.
                debug!(line = i + 2, error = %e, "unreadable row");
                unreadable += 1;
                for column in values.iter_mut() {
                    column.push(None);
                }
            }
        }
    }
    if unreadable > 0 {
        debug!(unreadable, "rows kept as malformed");
    }

    let table = DataFrame::new(
        columns::ALL
            .iter()
            .zip(values)
            .map(|(name, data)| Column::new((*name).into(), data))
            .collect(),
    )?;
    Ok(table)
}

pub(super) fn run(
    ctx: &RunContext,
    table: DataFrame,
    flusher: &mut Flusher<'_>,
    tally: &mut Tally,
) -> Result<(), IngestError> {
    flusher.advance(RunPhase::Validating);
    let TableValidation {
        valid,
        rejected,
        rejected_by_rule,
    } = validate_table(table.lazy(), ctx.date_format(), ctx.required_date())?;
    for (rule, count) in &rejected_by_rule {
        tally.reject_many(*rule, *count);
    }
    if rejected.height() > 0 {
        warn!(
            rejected = rejected.height(),
            by_rule = ?rejected_by_rule,
            sample = %rejected.head(Some(REJECT_SAMPLE)),
            "rejected records"
        );
    }
    drop(rejected);

    flusher.advance(RunPhase::Buffering);
    let derived = valid
        .lazy()
        .with_columns(ratio_exprs())
        .with_column(lit(true).alias(fields::IS_BEST))
        .collect()?;
    let records = records_from_frame(&derived)?;
    drop(derived);
    tally.accepted += records.len();
    debug!(records = records.len(), "derived valid subset");

    let mut batch = IngestionBatch::from_records(records);
    flusher.flush(&mut batch, tally)
}
