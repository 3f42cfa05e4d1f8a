//! Per-run parameters and configuration errors.

use std::fmt::{self, Write as _};
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info_span, Span};

use crate::record::columns;
use crate::strategy::IngestStrategy;

pub const DEFAULT_DATE_FORMAT: &str = "%Y%m%d";
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10_000;

/// Which kind of vendor feed a run processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Daily append: replaces everything stored for the processing date.
    Daily,
    /// Historical correction: new rows supersede the best rows they touch.
    Reinstatement,
}

impl RunKind {
    pub fn name(self) -> &'static str {
        match self {
            RunKind::Daily => "daily",
            RunKind::Reinstatement => "reinstatement",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fatal problems detected before any row is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read input file {path}: {source}")]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("input file {path} is missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid date format {0:?}: must round-trip a calendar date")]
    DateFormat(String),

    #[error("flush threshold must be at least 1")]
    ZeroThreshold,
}

/// Everything one ingestion run needs to know. Immutable once built.
#[derive(Debug, Clone)]
pub struct RunContext {
    processing_date: NaiveDate,
    input: PathBuf,
    strategy: IngestStrategy,
    kind: RunKind,
    date_format: String,
    flush_threshold: usize,
    span: Span,
}

impl RunContext {
    pub fn new(
        processing_date: NaiveDate,
        input: impl Into<PathBuf>,
        strategy: IngestStrategy,
        kind: RunKind,
    ) -> Self {
        let input = input.into();
        let span = info_span!(
            "ingest_run",
            date = %processing_date,
            kind = %kind,
            strategy = %strategy,
            file = %input.display(),
        );
        Self {
            processing_date,
            input,
            strategy,
            kind,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            span,
        }
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn processing_date(&self) -> NaiveDate {
        self.processing_date
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn strategy(&self) -> IngestStrategy {
        self.strategy
    }

    pub fn kind(&self) -> RunKind {
        self.kind
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// Tracing span every log line of this run is recorded under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// The processing date daily runs hold rows to; `None` for reinstatements.
    pub fn required_date(&self) -> Option<NaiveDate> {
        match self.kind {
            RunKind::Daily => Some(self.processing_date),
            RunKind::Reinstatement => None,
        }
    }

    /// Check parameters and the input header before any processing begins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        check_date_format(&self.date_format)?;
        check_header(&self.input)
    }
}

/// A date format is usable when it parses and round-trips a calendar date.
pub fn check_date_format(format: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::DateFormat(format.to_string());
    if format.is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(invalid());
    }

    let probe = NaiveDate::from_ymd_opt(2021, 8, 9).ok_or_else(invalid)?;
    let mut rendered = String::new();
    write!(rendered, "{}", probe.format(format)).map_err(|_| invalid())?;
    match NaiveDate::parse_from_str(&rendered, format) {
        Ok(parsed) if parsed == probe => Ok(()),
        _ => Err(invalid()),
    }
}

/// The input must open and carry every vendor column in its header.
pub fn check_header(path: &Path) -> Result<(), ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::UnreadableInput {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers().map_err(|source| ConfigError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    for column in columns::ALL {
        if !headers.iter().any(|h| h == column) {
            return Err(ConfigError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn default_format_is_valid() {
        assert!(check_date_format(DEFAULT_DATE_FORMAT).is_ok());
        assert!(check_date_format("%Y-%m-%d").is_ok());
    }

    #[test]
    fn bad_formats_are_rejected() {
        assert!(matches!(check_date_format(""), Err(ConfigError::DateFormat(_))));
        assert!(matches!(check_date_format("%Q"), Err(ConfigError::DateFormat(_))));
        assert!(matches!(check_date_format("%Y"), Err(ConfigError::DateFormat(_))));
    }

    #[test]
    fn header_with_all_columns_passes() {
        let file = write_temp("Price,BookValue,Dividends,Earnings,Ticker,Date,DataDate\n");
        assert!(check_header(file.path()).is_ok());
    }

    #[test]
    fn header_missing_column_fails() {
        let file = write_temp("Price,BookValue,Dividends,Ticker,Date,DataDate\n");
        let err = check_header(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingColumn {
                column: "Earnings",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = check_header(Path::new("/nonexistent/daily.csv")).unwrap_err();
        assert!(matches!(err, ConfigError::UnreadableInput { .. }));
    }

    #[test]
    fn zero_threshold_fails_validation() {
        let file = write_temp("Price,BookValue,Dividends,Earnings,Ticker,Date,DataDate\n");
        let ctx = RunContext::new(
            NaiveDate::from_ymd_opt(2021, 8, 9).unwrap(),
            file.path(),
            IngestStrategy::Streaming,
            RunKind::Daily,
        )
        .with_flush_threshold(0);
        assert!(matches!(ctx.validate(), Err(ConfigError::ZeroThreshold)));
    }

    #[test]
    fn required_date_only_for_daily_runs() {
        let date = NaiveDate::from_ymd_opt(2021, 8, 9).unwrap();
        let daily = RunContext::new(date, "x.csv", IngestStrategy::Bulk, RunKind::Daily);
        let reinst = RunContext::new(date, "x.csv", IngestStrategy::Bulk, RunKind::Reinstatement);
        assert_eq!(daily.required_date(), Some(date));
        assert_eq!(reinst.required_date(), None);
    }
}
