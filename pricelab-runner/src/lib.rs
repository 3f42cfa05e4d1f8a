//! PriceLab Runner — job orchestration around the ingestion core.
//!
//! This crate builds on `pricelab-core` to provide:
//! - TOML job configuration with defaults and validation
//! - Input file resolution from date-stamped file-name patterns
//! - The available-memory probe that feeds strategy selection
//! - Single-job execution against the Parquet store
//! - JSON run artifacts with content hashes

pub mod artifacts;
pub mod config;
pub mod job;
pub mod probe;
pub mod resolve;

pub use artifacts::{load_artifact, save_artifact, RunArtifact, SCHEMA_VERSION};
pub use config::{ConfigFileError, IngestConfig, StrategyChoice};
pub use job::{run_job, run_job_with_store, JobError, JobOutcome, JobRequest};
pub use probe::{available_memory_bytes, decide, ProbeReport};
pub use resolve::{expand_pattern, resolve_input, ResolveError};
