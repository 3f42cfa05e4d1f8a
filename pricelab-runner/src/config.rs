//! Ingestion job configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration. CLI flags are applied on top by the caller.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pricelab_core::context::{check_date_format, DEFAULT_DATE_FORMAT, DEFAULT_FLUSH_THRESHOLD};
use pricelab_core::{ConfigError, IngestStrategy, RunKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder in file patterns for the processing date (`YYYY-MM-DD`).
pub const DATE_PLACEHOLDER: &str = "{date}";

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigError),

    #[error("invalid file pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: &'static str },
}

/// How the read strategy is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyChoice {
    /// Compare file size with available memory.
    #[default]
    Auto,
    Streaming,
    Bulk,
}

impl StrategyChoice {
    /// The strategy this choice pins, if any.
    pub fn forced(self) -> Option<IngestStrategy> {
        match self {
            StrategyChoice::Auto => None,
            StrategyChoice::Streaming => Some(IngestStrategy::Streaming),
            StrategyChoice::Bulk => Some(IngestStrategy::Bulk),
        }
    }
}

impl fmt::Display for StrategyChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyChoice::Auto => "auto",
            StrategyChoice::Streaming => "streaming",
            StrategyChoice::Bulk => "bulk",
        })
    }
}

impl FromStr for StrategyChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(StrategyChoice::Auto),
            "streaming" => Ok(StrategyChoice::Streaming),
            "bulk" => Ok(StrategyChoice::Bulk),
            other => Err(format!("unknown strategy '{other}' (expected auto, streaming or bulk)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Directory vendor files arrive in.
    pub input_dir: PathBuf,
    /// Root of the partitioned price-history store.
    pub store_dir: PathBuf,
    /// Where run summaries are written; none when unset.
    pub artifacts_dir: Option<PathBuf>,
    pub daily_pattern: String,
    /// May contain one `*` wildcard.
    pub reinstatement_pattern: String,
    pub date_format: String,
    pub flush_threshold: usize,
    pub strategy: StrategyChoice,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            store_dir: PathBuf::from("price_history"),
            artifacts_dir: None,
            daily_pattern: format!("daily-{DATE_PLACEHOLDER}.csv"),
            reinstatement_pattern: format!("historical_reinstatements-*_{DATE_PLACEHOLDER}.csv"),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            strategy: StrategyChoice::Auto,
        }
    }
}

impl IngestConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigFileError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        if self.flush_threshold == 0 {
            return Err(ConfigError::ZeroThreshold.into());
        }
        check_date_format(&self.date_format)?;
        check_pattern(&self.daily_pattern)?;
        check_pattern(&self.reinstatement_pattern)?;
        Ok(())
    }

    pub fn pattern_for(&self, kind: RunKind) -> &str {
        match kind {
            RunKind::Daily => &self.daily_pattern,
            RunKind::Reinstatement => &self.reinstatement_pattern,
        }
    }
}

fn check_pattern(pattern: &str) -> Result<(), ConfigFileError> {
    let invalid = |reason| ConfigFileError::Pattern {
        pattern: pattern.to_string(),
        reason,
    };
    if !pattern.contains(DATE_PLACEHOLDER) {
        return Err(invalid("missing {date} placeholder"));
    }
    if pattern.matches('*').count() > 1 {
        return Err(invalid("at most one '*' wildcard is supported"));
    }
    if pattern.contains('/') || pattern.contains('\\') {
        return Err(invalid("must be a file name, not a path"));
    }
    Ok(())
}
