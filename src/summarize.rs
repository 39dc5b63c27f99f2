//! Per-column file summaries.
//!
//! The splitter leaves one value per line in each column file; this module
//! reads those files back and reports length statistics plus the number of
//! runs of consecutive distinct values. Profiling by split-then-summarize
//! trades disk space for memory: no column is ever held in full.

use crate::config::ProfileConfig;
use crate::error::Result;
use crate::source::{Header, LineSource};
use crate::split::{ColumnFiles, Splitter};
use crate::stats::RowLengthHistogram;
use anyhow::Context;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Statistics of one column file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnFileSummary {
    pub path: PathBuf,
    /// Lines (values) in the file.
    pub values: u64,
    pub fill_count: u64,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub avg_len: Option<f64>,
    /// Runs of consecutive equal values. Equals the distinct count for sorted input.
    pub unique_runs: u64,
}

/// Summarize the column file at `path` (gzip/zstd decompressed by extension or magic bytes).
///
/// # Errors
/// Fails if the file cannot be opened or read.
#[allow(clippy::cast_precision_loss)]
pub fn summarize_column_file(path: impl AsRef<Path>) -> Result<ColumnFileSummary> {
    let path = path.as_ref();
    // Values may end in `\r`; only the `\n` the splitter appended is a terminator.
    let source = LineSource::open(path)?.newline_only();

    let mut values = 0u64;
    let mut fill_count = 0u64;
    let mut sum_len = 0u64;
    let mut min_len: Option<usize> = None;
    let mut max_len: Option<usize> = None;
    let mut unique_runs = 0u64;
    let mut prev: Option<String> = None;

    for line in source {
        let value = line.with_context(|| format!("summarize {}", path.display()))?;
        let len = value.len();
        values += 1;
        sum_len += len as u64;
        if len > 0 {
            fill_count += 1;
        }
        min_len = Some(min_len.map_or(len, |m| m.min(len)));
        max_len = Some(max_len.map_or(len, |m| m.max(len)));
        if prev.as_deref() != Some(value.as_str()) {
            unique_runs += 1;
            prev = Some(value);
        }
    }

    debug!("summarized {} ({values} values)", path.display());
    Ok(ColumnFileSummary {
        path: path.to_path_buf(),
        values,
        fill_count,
        min_len,
        max_len,
        avg_len: (values > 0).then(|| sum_len as f64 / values as f64),
        unique_runs,
    })
}

/// Summarize every file, returning summaries in the order of `paths`.
///
/// With the `parallel-io` feature the files are read on the rayon pool.
///
/// # Errors
/// The first file that fails to open or read.
#[cfg(feature = "parallel-io")]
pub fn summarize_files<P: AsRef<Path> + Sync>(paths: &[P]) -> Result<Vec<ColumnFileSummary>> {
    use rayon::prelude::*;
    paths.par_iter().map(summarize_column_file).collect()
}

/// Summarize every file, returning summaries in the order of `paths`.
///
/// # Errors
/// The first file that fails to open or read.
#[cfg(not(feature = "parallel-io"))]
pub fn summarize_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<ColumnFileSummary>> {
    paths.iter().map(summarize_column_file).collect()
}

/// Result of [`profile_columns`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub header: Header,
    pub histogram: RowLengthHistogram,
    /// One summary per header column. Paths point into the removed scratch directory.
    pub columns: Vec<ColumnFileSummary>,
}

/// Split `input` into a scratch directory, summarize each column file, and
/// remove the scratch files.
///
/// # Errors
/// Any split or summarize failure, or failure to create the scratch directory.
pub fn profile_columns(input: impl AsRef<Path>, config: &ProfileConfig) -> Result<ColumnProfile> {
    let scratch = tempfile::tempdir().context("create scratch directory")?;
    let outcome = Splitter::new(config.clone()).split_to_dir(input, &ColumnFiles::new(scratch.path()))?;
    let columns = summarize_files(&outcome.sinks)?;
    info!(
        "profiled {} columns through {}",
        columns.len(),
        scratch.path().display()
    );
    scratch.close().context("remove scratch directory")?;
    Ok(ColumnProfile {
        header: outcome.header,
        histogram: outcome.histogram,
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn runs_count_changes_between_neighbours() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("col-0.txt");
        fs::write(&p, "a\na\nb\n\na\n")?;
        let s = summarize_column_file(&p)?;
        assert_eq!(s.values, 5);
        assert_eq!(s.unique_runs, 4);
        assert_eq!(s.fill_count, 4);
        assert_eq!((s.min_len, s.max_len), (Some(0), Some(1)));
        assert_eq!(s.avg_len, Some(0.8));
        Ok(())
    }

    #[test]
    fn empty_file_has_no_runs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("col-0.txt");
        fs::write(&p, "")?;
        let s = summarize_column_file(&p)?;
        assert_eq!((s.values, s.unique_runs, s.min_len, s.avg_len), (0, 0, None, None));
        Ok(())
    }
}
