//! Environment probe feeding the strategy decision.
//!
//! The OS query lives here; `select_strategy` itself stays a pure
//! comparison of two byte counts.

use std::path::Path;

use pricelab_core::{select_strategy, IngestStrategy};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

use crate::config::StrategyChoice;

/// Bytes of memory the OS reports as available right now.
pub fn available_memory_bytes() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

pub fn file_size_bytes(path: &Path) -> std::io::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

/// The inputs and outcome of one strategy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub file_size_bytes: u64,
    pub available_memory_bytes: u64,
    pub strategy: IngestStrategy,
    /// True when configuration pinned the strategy instead of the probe.
    pub forced: bool,
}

/// Decide the strategy for `input`, honoring a pinned choice.
pub fn decide(input: &Path, choice: StrategyChoice) -> std::io::Result<ProbeReport> {
    decide_with(input, choice, available_memory_bytes())
}

/// [`decide`] with an explicit memory figure.
pub fn decide_with(
    input: &Path,
    choice: StrategyChoice,
    available_memory_bytes: u64,
) -> std::io::Result<ProbeReport> {
    let file_size_bytes = file_size_bytes(input)?;
    let (strategy, forced) = match choice.forced() {
        Some(strategy) => (strategy, true),
        None => (select_strategy(file_size_bytes, available_memory_bytes), false),
    };
    info!(
        file_size_bytes,
        available_memory_bytes,
        %strategy,
        forced,
        "selected ingestion strategy"
    );
    Ok(ProbeReport {
        file_size_bytes,
        available_memory_bytes,
        strategy,
        forced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_of(len: usize) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), vec![b'x'; len]).unwrap();
        file
    }

    #[test]
    fn auto_compares_size_with_memory() {
        let file = file_of(2_000);
        let big = decide_with(file.path(), StrategyChoice::Auto, 1_000).unwrap();
        assert_eq!(big.strategy, IngestStrategy::Streaming);
        assert_eq!(big.file_size_bytes, 2_000);
        assert!(!big.forced);

        let small = decide_with(file.path(), StrategyChoice::Auto, 1_000_000).unwrap();
        assert_eq!(small.strategy, IngestStrategy::Bulk);
    }

    #[test]
    fn pinned_choice_wins() {
        let file = file_of(2_000);
        let report = decide_with(file.path(), StrategyChoice::Bulk, 10).unwrap();
        assert_eq!(report.strategy, IngestStrategy::Bulk);
        assert!(report.forced);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(decide_with(Path::new("/nonexistent.csv"), StrategyChoice::Auto, 10).is_err());
    }

    #[test]
    fn probe_reports_some_memory() {
        assert!(available_memory_bytes() > 0);
    }
}
