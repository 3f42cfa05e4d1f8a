//! One ingestion job: resolve the input, pick a strategy, run the engine,
//! record the outcome.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use pricelab_core::{
    IngestError, IngestSummary, IngestionEngine, ParquetStore, PriceStore, RunContext, RunKind,
    SinkError,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::artifacts::{self, RunArtifact};
use crate::config::{ConfigFileError, IngestConfig, StrategyChoice};
use crate::probe;
use crate::resolve::{resolve_input, ResolveError};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigFileError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("cannot probe input {path}: {source}")]
    Probe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open store: {0}")]
    Store(#[from] SinkError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("run artifact: {0:#}")]
    Artifact(anyhow::Error),
}

/// What to run. Unset fields fall back to the config.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub date: NaiveDate,
    pub kind: RunKind,
    /// Explicit input file; skips pattern resolution.
    pub input: Option<PathBuf>,
    pub strategy: Option<StrategyChoice>,
    pub flush_threshold: Option<usize>,
}

impl JobRequest {
    pub fn new(date: NaiveDate, kind: RunKind) -> Self {
        Self {
            date,
            kind,
            input: None,
            strategy: None,
            flush_threshold: None,
        }
    }

    /// The config with this request's overrides applied.
    pub fn apply(&self, config: &IngestConfig) -> IngestConfig {
        let mut merged = config.clone();
        if let Some(strategy) = self.strategy {
            merged.strategy = strategy;
        }
        if let Some(threshold) = self.flush_threshold {
            merged.flush_threshold = threshold;
        }
        merged
    }
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub summary: IngestSummary,
    pub artifact: RunArtifact,
    /// Where the artifact was written, when an artifacts dir is configured.
    pub artifact_path: Option<PathBuf>,
}

/// Run a job against the Parquet store at `config.store_dir`.
pub fn run_job(config: &IngestConfig, request: &JobRequest) -> Result<JobOutcome, JobError> {
    let mut store = ParquetStore::open(&config.store_dir)?;
    run_job_with_store(config, request, &mut store)
}

/// Run a job against any store.
pub fn run_job_with_store(
    config: &IngestConfig,
    request: &JobRequest,
    store: &mut dyn PriceStore,
) -> Result<JobOutcome, JobError> {
    let config = request.apply(config);
    config.validate()?;

    let input = match &request.input {
        Some(path) => path.clone(),
        None => resolve_input(&config.input_dir, config.pattern_for(request.kind), request.date)?,
    };
    info!(date = %request.date, kind = %request.kind, input = %input.display(), "resolved job input");

    let probe = probe::decide(&input, config.strategy).map_err(|source| JobError::Probe {
        path: input.clone(),
        source,
    })?;
    let input_hash = artifacts::hash_file(&input).map_err(JobError::Artifact)?;

    let ctx = RunContext::new(request.date, &input, probe.strategy, request.kind)
        .with_date_format(config.date_format.clone())
        .with_flush_threshold(config.flush_threshold);

    let started_at = Utc::now();
    let clock = Instant::now();
    let summary = IngestionEngine::new(&ctx, store).ingest()?;
    let duration_secs = clock.elapsed().as_secs_f64();

    let artifact = RunArtifact::new(
        request.date,
        request.kind,
        &input,
        input_hash,
        &probe,
        started_at,
        duration_secs,
        summary.clone(),
    );

    let artifact_path = match &config.artifacts_dir {
        Some(dir) => match artifacts::save_artifact(&artifact, dir) {
            Ok(path) => {
                info!(path = %path.display(), run_id = %artifact.run_id, "wrote run artifact");
                Some(path)
            }
            Err(e) => {
                // The ingest has already committed.
                warn!(error = %format!("{e:#}"), "failed to write run artifact");
                None
            }
        },
        None => None,
    };

    Ok(JobOutcome {
        summary,
        artifact,
        artifact_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_overrides_config() {
        let config = IngestConfig::default();
        let mut request = JobRequest::new(NaiveDate::from_ymd_opt(2021, 8, 9).unwrap(), RunKind::Daily);
        request.strategy = Some(StrategyChoice::Streaming);
        request.flush_threshold = Some(25);

        let merged = request.apply(&config);
        assert_eq!(merged.strategy, StrategyChoice::Streaming);
        assert_eq!(merged.flush_threshold, 25);
        assert_eq!(merged.store_dir, config.store_dir);
    }

    #[test]
    fn zero_threshold_override_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut request = JobRequest::new(NaiveDate::from_ymd_opt(2021, 8, 9).unwrap(), RunKind::Daily);
        request.flush_threshold = Some(0);
        let mut store = pricelab_core::MemoryStore::new();

        let config = IngestConfig {
            input_dir: dir.path().to_path_buf(),
            ..IngestConfig::default()
        };
        let err = run_job_with_store(&config, &request, &mut store).unwrap_err();
        assert!(matches!(err, JobError::Config(_)));
    }
}
