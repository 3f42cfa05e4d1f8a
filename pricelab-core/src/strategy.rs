//! Streaming vs bulk selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a run reads its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStrategy {
    /// One record at a time; memory bounded by the flush threshold.
    Streaming,
    /// Whole file as one table; one validation pass and one flush.
    Bulk,
}

impl IngestStrategy {
    pub fn name(self) -> &'static str {
        match self {
            IngestStrategy::Streaming => "streaming",
            IngestStrategy::Bulk => "bulk",
        }
    }
}

impl fmt::Display for IngestStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pick the reading strategy for a file.
///
/// Evaluated once per run, before any row is read. A file larger than the
/// available memory streams; anything else is loaded whole.
pub fn select_strategy(file_size_bytes: u64, available_memory_bytes: u64) -> IngestStrategy {
    if file_size_bytes > available_memory_bytes {
        IngestStrategy::Streaming
    } else {
        IngestStrategy::Bulk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn larger_than_memory_streams() {
        assert_eq!(select_strategy(2_000_000, 1_000_000), IngestStrategy::Streaming);
    }

    #[test]
    fn small_file_loads_whole() {
        assert_eq!(select_strategy(500, 1_000_000), IngestStrategy::Bulk);
    }

    #[test]
    fn equal_size_loads_whole() {
        assert_eq!(select_strategy(1_000, 1_000), IngestStrategy::Bulk);
    }
}
