//! Run artifacts: one JSON summary per ingestion run.
//!
//! Artifacts carry a `schema_version`; unknown versions are rejected on
//! load. Writes are atomic: write to `.tmp`, then rename into place.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use pricelab_core::{IngestStrategy, IngestSummary, RunKind};
use serde::{Deserialize, Serialize};

use crate::probe::ProbeReport;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub schema_version: u32,
    /// BLAKE3 over kind, processing date and input content.
    pub run_id: String,
    pub processing_date: NaiveDate,
    pub kind: RunKind,
    pub strategy: IngestStrategy,
    pub strategy_forced: bool,
    pub input: PathBuf,
    pub input_hash: String,
    pub file_size_bytes: u64,
    pub available_memory_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub summary: IngestSummary,
}

impl RunArtifact {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        processing_date: NaiveDate,
        kind: RunKind,
        input: &Path,
        input_hash: String,
        probe: &ProbeReport,
        started_at: DateTime<Utc>,
        duration_secs: f64,
        summary: IngestSummary,
    ) -> Self {
        let run_id = run_id(kind, processing_date, &input_hash);
        Self {
            schema_version: SCHEMA_VERSION,
            run_id,
            processing_date,
            kind,
            strategy: probe.strategy,
            strategy_forced: probe.forced,
            input: input.to_path_buf(),
            input_hash,
            file_size_bytes: probe.file_size_bytes,
            available_memory_bytes: probe.available_memory_bytes,
            started_at,
            duration_secs,
            summary,
        }
    }

    /// `{date}_{kind}_{run id prefix}.json`
    pub fn file_name(&self) -> String {
        let short = self.run_id.get(..12).unwrap_or(&self.run_id);
        format!("{}_{}_{short}.json", self.processing_date, self.kind)
    }
}

/// Same file content, kind and date always give the same id.
pub fn run_id(kind: RunKind, processing_date: NaiveDate, input_hash: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.name().as_bytes());
    hasher.update(processing_date.to_string().as_bytes());
    hasher.update(input_hash.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// BLAKE3 of a file's bytes, streamed.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    hasher
        .update_reader(file)
        .with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn export_json(artifact: &RunArtifact) -> Result<String> {
    serde_json::to_string_pretty(artifact).context("failed to serialize run artifact to JSON")
}

/// Parse an artifact, rejecting newer schema versions.
pub fn import_json(json: &str) -> Result<RunArtifact> {
    let artifact: RunArtifact =
        serde_json::from_str(json).context("failed to deserialize run artifact from JSON")?;
    if artifact.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            artifact.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(artifact)
}

/// Write the artifact into `dir`. Returns the written path.
pub fn save_artifact(artifact: &RunArtifact, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create artifact dir: {}", dir.display()))?;

    let path = dir.join(artifact.file_name());
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, export_json(artifact)?)
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        anyhow::anyhow!("atomic rename to {} failed: {e}", path.display())
    })?;
    Ok(path)
}

pub fn load_artifact(path: &Path) -> Result<RunArtifact> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricelab_core::RunStatus;
    use std::collections::BTreeMap;

    fn sample() -> RunArtifact {
        let probe = ProbeReport {
            file_size_bytes: 120,
            available_memory_bytes: 1 << 30,
            strategy: IngestStrategy::Bulk,
            forced: false,
        };
        let summary = IngestSummary {
            records_accepted: 3,
            records_rejected: 1,
            batches_flushed: 1,
            records_revoked: 0,
            records_replaced: 0,
            rejected_by_rule: BTreeMap::from([(pricelab_core::Rule::DateOrder, 1)]),
            status: RunStatus::Done,
        };
        RunArtifact::new(
            NaiveDate::from_ymd_opt(2021, 8, 9).unwrap(),
            RunKind::Daily,
            Path::new("daily-2021-08-09.csv"),
            "abc123".into(),
            &probe,
            DateTime::<Utc>::from_timestamp(1_628_467_200, 0).unwrap(),
            0.25,
            summary,
        )
    }

    #[test]
    fn json_roundtrip() {
        let artifact = sample();
        let json = export_json(&artifact).unwrap();
        assert!(json.contains("\"date_order\": 1"));
        assert_eq!(import_json(&json).unwrap(), artifact);
    }

    #[test]
    fn json_rejects_unknown_version() {
        let mut artifact = sample();
        artifact.schema_version = SCHEMA_VERSION + 1;
        let json = export_json(&artifact).unwrap();
        assert!(import_json(&json).is_err());
    }

    #[test]
    fn run_id_depends_on_content() {
        let date = NaiveDate::from_ymd_opt(2021, 8, 9).unwrap();
        let a = run_id(RunKind::Daily, date, "h1");
        assert_eq!(a, run_id(RunKind::Daily, date, "h1"));
        assert_ne!(a, run_id(RunKind::Daily, date, "h2"));
        assert_ne!(a, run_id(RunKind::Reinstatement, date, "h1"));
    }

    #[test]
    fn save_is_atomic_and_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = sample();
        let path = save_artifact(&artifact, dir.path()).unwrap();

        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("2021-08-09_daily_"));
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_artifact(&path).unwrap(), artifact);
    }

    #[test]
    fn file_hash_is_stable() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"Price,BookValue\n").unwrap();
        let h1 = hash_file(file.path()).unwrap();
        assert_eq!(h1, hash_file(file.path()).unwrap());
        assert_eq!(h1, blake3::hash(b"Price,BookValue\n").to_hex().to_string());
    }
}
