//! Input file resolution from a file-name pattern and a processing date.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::config::DATE_PLACEHOLDER;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot list input directory {dir}: {source}")]
    ReadDir {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no file in {dir} matches {pattern:?}")]
    NoMatch { dir: PathBuf, pattern: String },
}

/// Substitute the processing date into a pattern.
pub fn expand_pattern(pattern: &str, date: NaiveDate) -> String {
    pattern.replace(DATE_PLACEHOLDER, &date.format("%Y-%m-%d").to_string())
}

/// Find the input file for `date` in `dir`.
///
/// A `*` in the pattern matches any run of characters; with several
/// candidates the first in lexical order wins.
pub fn resolve_input(dir: &Path, pattern: &str, date: NaiveDate) -> Result<PathBuf, ResolveError> {
    let expanded = expand_pattern(pattern, date);
    let no_match = || ResolveError::NoMatch {
        dir: dir.to_path_buf(),
        pattern: expanded.clone(),
    };

    let Some((prefix, suffix)) = expanded.split_once('*') else {
        let path = dir.join(&expanded);
        return if path.is_file() { Ok(path) } else { Err(no_match()) };
    };

    let entries = fs::read_dir(dir).map_err(|source| ResolveError::ReadDir {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut candidates: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| wildcard_match(name, prefix, suffix))
        .collect();
    candidates.sort();
    debug!(pattern = %expanded, candidates = candidates.len(), "resolved input candidates");

    candidates
        .into_iter()
        .next()
        .map(|name| dir.join(name))
        .ok_or_else(no_match)
}

fn wildcard_match(name: &str, prefix: &str, suffix: &str) -> bool {
    name.len() >= prefix.len() + suffix.len() && name.starts_with(prefix) && name.ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aug9() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 8, 9).unwrap()
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "x").unwrap();
    }

    #[test]
    fn expands_date_placeholder() {
        assert_eq!(expand_pattern("daily-{date}.csv", aug9()), "daily-2021-08-09.csv");
    }

    #[test]
    fn exact_pattern_requires_the_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_input(dir.path(), "daily-{date}.csv", aug9()),
            Err(ResolveError::NoMatch { .. })
        ));

        touch(dir.path(), "daily-2021-08-09.csv");
        let path = resolve_input(dir.path(), "daily-{date}.csv", aug9()).unwrap();
        assert_eq!(path, dir.path().join("daily-2021-08-09.csv"));
    }

    #[test]
    fn wildcard_picks_first_lexical_match() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "historical_reinstatements-b_2021-08-09.csv");
        touch(dir.path(), "historical_reinstatements-a_2021-08-09.csv");
        touch(dir.path(), "historical_reinstatements-a_2021-08-10.csv");

        let path = resolve_input(dir.path(), "historical_reinstatements-*_{date}.csv", aug9()).unwrap();
        assert_eq!(path, dir.path().join("historical_reinstatements-a_2021-08-09.csv"));
    }

    #[test]
    fn wildcard_does_not_overlap_prefix_and_suffix() {
        assert!(!wildcard_match("ab", "ab", "b"));
        assert!(wildcard_match("abb", "ab", "b"));
    }
}
