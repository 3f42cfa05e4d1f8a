//! Parquet-backed price-history store with Hive-style date partitions.
//!
//! Layout: `{root}/date={YYYY-MM-DD}/prices.parquet`
//!
//! A write loads every partition it touches, applies the change in memory,
//! then commits in two steps:
//! 1. stage: write each new partition to `prices.parquet.tmp`
//! 2. swap: move the live file to `.bak`, rename the staged file into place
//!
//! Any failure removes the staged files and restores the `.bak` copies
//! already swapped, so a write commits entirely or not at all.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, warn};

use super::{by_date, flag_partition, sort_rows, upsert_partition, PriceStore, RevokeOutcome, SinkError};
use crate::batch::DateTickerIndex;
use crate::frame::{records_from_frame, records_to_frame};
use crate::query::PriceQuery;
use crate::record::PriceRecord;

const PARTITION_FILE: &str = "prices.parquet";
const PARTITION_PREFIX: &str = "date=";

pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| SinkError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!("{PARTITION_PREFIX}{date}"))
    }

    fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.partition_dir(date).join(PARTITION_FILE)
    }

    /// Dates that currently have a partition on disk.
    pub fn partition_dates(&self) -> Result<Vec<NaiveDate>, SinkError> {
        let entries = fs::read_dir(&self.root).map_err(|source| SinkError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut dates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SinkError::Io {
                path: self.root.clone(),
                source,
            })?;
            let name = entry.file_name();
            let Some(date) = name
                .to_str()
                .and_then(|n| n.strip_prefix(PARTITION_PREFIX))
                .and_then(|d| d.parse::<NaiveDate>().ok())
            else {
                continue;
            };
            if entry.path().join(PARTITION_FILE).exists() {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// Load one partition. A missing partition is empty.
    pub fn load_partition(&self, date: NaiveDate) -> Result<Vec<PriceRecord>, SinkError> {
        let path = self.partition_path(date);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&path).map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| SinkError::Parquet(format!("read {}: {e}", path.display())))?;
        let rows = records_from_frame(&df).map_err(|e| SinkError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(stray) = rows.iter().find(|r| r.date != date) {
            return Err(SinkError::Corrupt {
                path,
                reason: format!("row dated {} in partition {date}", stray.date),
            });
        }
        Ok(rows)
    }

    /// Commit new contents for a set of partitions as one unit. An empty row
    /// set deletes the partition.
    fn commit(&self, changes: BTreeMap<NaiveDate, Vec<PriceRecord>>) -> Result<(), SinkError> {
        let mut staged: Vec<(NaiveDate, Option<PathBuf>)> = Vec::with_capacity(changes.len());
        for (date, rows) in &changes {
            if rows.is_empty() {
                staged.push((*date, None));
                continue;
            }
            match self.stage(*date, rows) {
                Ok(tmp) => staged.push((*date, Some(tmp))),
                Err(e) => {
                    discard_staged(&staged);
                    return Err(e);
                }
            }
        }

        let mut swapped: Vec<Swap> = Vec::with_capacity(staged.len());
        for (date, tmp) in &staged {
            match self.swap(*date, tmp.as_deref()) {
                Ok(swap) => swapped.push(swap),
                Err(e) => {
                    warn!(%date, error = %e, "partition commit failed, rolling back");
                    for swap in swapped.iter().rev() {
                        swap.roll_back();
                    }
                    discard_staged(&staged);
                    return Err(e);
                }
            }
        }

        for swap in &swapped {
            swap.finish();
        }
        debug!(partitions = staged.len(), "committed store write");
        Ok(())
    }

    fn stage(&self, date: NaiveDate, rows: &[PriceRecord]) -> Result<PathBuf, SinkError> {
        let dir = self.partition_dir(date);
        fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;

        let tmp = self.partition_path(date).with_extension("parquet.tmp");
        let mut df = records_to_frame(rows)?;
        let file = fs::File::create(&tmp).map_err(|source| SinkError::Io {
            path: tmp.clone(),
            source,
        })?;
        ParquetWriter::new(file).finish(&mut df).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            SinkError::Parquet(format!("write {}: {e}", tmp.display()))
        })?;
        Ok(tmp)
    }

    fn swap(&self, date: NaiveDate, staged: Option<&Path>) -> Result<Swap, SinkError> {
        let live = self.partition_path(date);
        let backup = live.with_extension("parquet.bak");
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SinkError::Io { path, source }
        };

        let had_live = live.exists();
        if had_live {
            fs::rename(&live, &backup).map_err(io_err(&live))?;
        }
        if let Some(tmp) = staged {
            if let Err(e) = fs::rename(tmp, &live) {
                if had_live {
                    let _ = fs::rename(&backup, &live);
                }
                return Err(io_err(&live)(e));
            }
        }
        Ok(Swap {
            live,
            backup: had_live.then_some(backup),
            dir: self.partition_dir(date),
        })
    }

    fn load_touched<'a>(
        &self,
        dates: impl IntoIterator<Item = &'a NaiveDate>,
    ) -> Result<BTreeMap<NaiveDate, Vec<PriceRecord>>, SinkError> {
        let mut loaded = BTreeMap::new();
        for date in dates {
            if !loaded.contains_key(date) {
                loaded.insert(*date, self.load_partition(*date)?);
            }
        }
        Ok(loaded)
    }
}

/// One partition swapped into place, pending cleanup or rollback.
struct Swap {
    live: PathBuf,
    backup: Option<PathBuf>,
    dir: PathBuf,
}

impl Swap {
    fn roll_back(&self) {
        let _ = fs::remove_file(&self.live);
        if let Some(backup) = &self.backup {
            let _ = fs::rename(backup, &self.live);
        }
    }

    fn finish(&self) {
        if let Some(backup) = &self.backup {
            let _ = fs::remove_file(backup);
        }
        if !self.live.exists() {
            // Deleted partition: drop the now-empty directory.
            let _ = fs::remove_dir(&self.dir);
        }
    }
}

fn discard_staged(staged: &[(NaiveDate, Option<PathBuf>)]) {
    for tmp in staged.iter().filter_map(|(_, tmp)| tmp.as_ref()) {
        let _ = fs::remove_file(tmp);
    }
}

impl PriceStore for ParquetStore {
    fn bulk_insert(&mut self, records: &[PriceRecord]) -> Result<usize, SinkError> {
        let groups = by_date(records);
        let mut partitions = self.load_touched(groups.keys())?;
        let mut written = 0;
        for (date, group) in groups {
            written += upsert_partition(partitions.entry(date).or_default(), group);
        }
        self.commit(partitions)?;
        Ok(written)
    }

    fn delete_where(&mut self, date: NaiveDate) -> Result<usize, SinkError> {
        let existing = self.load_partition(date)?.len();
        if existing > 0 {
            self.commit(BTreeMap::from([(date, Vec::new())]))?;
        }
        Ok(existing)
    }

    fn update_best_flag(
        &mut self,
        date: NaiveDate,
        tickers: &BTreeSet<String>,
        best: bool,
    ) -> Result<usize, SinkError> {
        let mut rows = self.load_partition(date)?;
        let changed = flag_partition(&mut rows, tickers, best);
        if changed > 0 {
            self.commit(BTreeMap::from([(date, rows)]))?;
        }
        Ok(changed)
    }

    fn revoke_and_insert(
        &mut self,
        index: &DateTickerIndex,
        records: &[PriceRecord],
    ) -> Result<RevokeOutcome, SinkError> {
        let groups = by_date(records);
        let mut partitions = self.load_touched(index.keys().chain(groups.keys()))?;

        let mut outcome = RevokeOutcome::default();
        for (date, tickers) in index {
            if let Some(rows) = partitions.get_mut(date) {
                outcome.revoked += flag_partition(rows, tickers, false);
            }
        }
        for (date, group) in groups {
            outcome.inserted += upsert_partition(partitions.entry(date).or_default(), group);
        }

        partitions.retain(|_, rows| !rows.is_empty());
        self.commit(partitions)?;
        Ok(outcome)
    }

    fn query(&self, query: &PriceQuery) -> Result<Vec<PriceRecord>, SinkError> {
        let mut rows = Vec::new();
        for date in self.partition_dates()? {
            // History queries filter on data_date, which can only be <= date.
            if date > query.end && query.view != crate::query::QueryView::History {
                continue;
            }
            if date < query.start {
                continue;
            }
            rows.extend(
                self.load_partition(date)?
                    .into_iter()
                    .filter(|r| query.matches(r)),
            );
        }
        sort_rows(&mut rows);
        Ok(rows)
    }
}
