//! Per-column accumulators and their order-independent merge.
//!
//! A worker owns one [`PartialResult`] and feeds it rows through
//! [`RowProfiler::add_row`]. Partials are combined with
//! [`RowProfiler::merge`], which is associative and commutative, and turned
//! into an [`AggregateResult`] by [`RowProfiler::finish`]. The shape follows
//! the usual combiner lifecycle: `create`, `add_row`, `merge`, `finish`.
//!
//! Value lengths are measured in bytes of the UTF-8 field text.

use crate::config::StatsSelection;
use crate::source::Header;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row width → number of rows with that width, over every row seen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowLengthHistogram {
    counts: BTreeMap<usize, u64>,
}

impl RowLengthHistogram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, width: usize) {
        self.record_n(width, 1);
    }

    pub fn record_n(&mut self, width: usize, n: u64) {
        if n > 0 {
            *self.counts.entry(width).or_insert(0) += n;
        }
    }

    pub fn merge(&mut self, other: Self) {
        if self.counts.is_empty() {
            self.counts = other.counts;
            return;
        }
        for (width, n) in other.counts {
            self.record_n(width, n);
        }
    }

    /// Rows observed with exactly `width` fields.
    #[must_use]
    pub fn count(&self, width: usize) -> u64 {
        self.counts.get(&width).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.counts.values().sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// `(width, count)` pairs in ascending width order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.counts.iter().map(|(w, n)| (*w, *n))
    }
}

impl FromIterator<(usize, u64)> for RowLengthHistogram {
    fn from_iter<I: IntoIterator<Item = (usize, u64)>>(iter: I) -> Self {
        let mut h = Self::new();
        for (width, n) in iter {
            h.record_n(width, n);
        }
        h
    }
}

/// Running statistics for one column.
///
/// `min_len` / `max_len` stay `None` until the first value is observed.
/// Counters that the [`StatsSelection`] does not track stay `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub fill_count: Option<u64>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub sum_len: Option<u64>,
}

impl ColumnStats {
    #[must_use]
    pub fn new(selection: StatsSelection) -> Self {
        Self {
            fill_count: selection.fill_count.then_some(0),
            min_len: None,
            max_len: None,
            sum_len: selection.sum_len.then_some(0),
        }
    }

    fn observe(&mut self, len: usize, selection: StatsSelection) {
        if let Some(fill) = self.fill_count.as_mut()
            && len > 0
        {
            *fill += 1;
        }
        if let Some(sum) = self.sum_len.as_mut() {
            *sum += len as u64;
        }
        if selection.min_len {
            self.min_len = Some(self.min_len.map_or(len, |m| m.min(len)));
        }
        if selection.max_len {
            self.max_len = Some(self.max_len.map_or(len, |m| m.max(len)));
        }
    }

    pub fn merge(&mut self, other: Self) {
        self.fill_count = add_opt(self.fill_count, other.fill_count);
        self.sum_len = add_opt(self.sum_len, other.sum_len);
        self.min_len = combine_opt(self.min_len, other.min_len, usize::min);
        self.max_len = combine_opt(self.max_len, other.max_len, usize::max);
    }
}

fn add_opt(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    combine_opt(a, b, |x, y| x + y)
}

/// `None` is the identity element, which keeps merges associative and
/// commutative no matter which side saw data first.
fn combine_opt<T>(a: Option<T>, b: Option<T>, f: impl FnOnce(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(x), Some(y)) => Some(f(x, y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// One worker's private accumulator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResult {
    pub histogram: RowLengthHistogram,
    pub columns: Vec<ColumnStats>,
}

/// What `avg_len` divides the summed lengths by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageBasis {
    /// Rows whose width equals the header width: the rows that contributed lengths.
    MatchingRows,
    /// Every row, malformed ones included.
    #[default]
    AllRows,
}

/// Final per-column figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub index: usize,
    pub name: String,
    pub fill_count: Option<u64>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    /// `None` when no row contributed (division undefined) or lengths are untracked.
    pub avg_len: Option<f64>,
}

/// Merged statistics for a whole run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub header: Header,
    pub histogram: RowLengthHistogram,
    pub columns: Vec<ColumnSummary>,
}

impl AggregateResult {
    /// Rows whose width matched the header and fed the column statistics.
    #[must_use]
    pub fn matching_rows(&self) -> u64 {
        self.histogram.count(self.header.width())
    }

    #[must_use]
    pub fn malformed_rows(&self) -> u64 {
        self.histogram.total_rows() - self.matching_rows()
    }

    /// No row matched the header width, so there are no column figures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matching_rows() == 0
    }
}

/// Builds, updates, merges and finalizes [`PartialResult`]s for one header.
#[derive(Clone, Debug)]
pub struct RowProfiler {
    header: Header,
    selection: StatsSelection,
    basis: AverageBasis,
}

impl RowProfiler {
    #[must_use]
    pub fn new(header: Header, selection: StatsSelection) -> Self {
        Self {
            header,
            selection,
            basis: AverageBasis::default(),
        }
    }

    #[must_use]
    pub fn with_basis(mut self, basis: AverageBasis) -> Self {
        self.basis = basis;
        self
    }

    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.header.width()
    }

    /// An accumulator that has seen nothing.
    #[must_use]
    pub fn create(&self) -> PartialResult {
        PartialResult {
            histogram: RowLengthHistogram::new(),
            columns: vec![ColumnStats::new(self.selection); self.width()],
        }
    }

    /// Tally one row. Rows of the wrong width only touch the histogram.
    pub fn add_row<S: AsRef<str>>(&self, acc: &mut PartialResult, fields: &[S]) {
        acc.histogram.record(fields.len());
        if fields.len() != self.width() {
            return;
        }
        for (col, field) in acc.columns.iter_mut().zip(fields) {
            col.observe(field.as_ref().len(), self.selection);
        }
    }

    pub fn merge(&self, acc: &mut PartialResult, other: PartialResult) {
        acc.histogram.merge(other.histogram);
        for (mine, theirs) in acc.columns.iter_mut().zip(other.columns) {
            mine.merge(theirs);
        }
    }

    /// Final figures. Averages are `None` when no row matched the header
    /// width, whatever the basis.
    #[must_use]
    pub fn finish(&self, acc: PartialResult) -> AggregateResult {
        let divisor = match self.basis {
            _ if acc.histogram.count(self.width()) == 0 => 0,
            AverageBasis::MatchingRows => acc.histogram.count(self.width()),
            AverageBasis::AllRows => acc.histogram.total_rows(),
        };
        let columns = acc
            .columns
            .into_iter()
            .zip(self.header.names())
            .enumerate()
            .map(|(index, (stats, name))| ColumnSummary {
                index,
                name: name.clone(),
                fill_count: stats.fill_count,
                min_len: stats.min_len,
                max_len: stats.max_len,
                avg_len: average(stats.sum_len, divisor),
            })
            .collect();
        AggregateResult {
            header: self.header.clone(),
            histogram: acc.histogram,
            columns,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn average(sum: Option<u64>, rows: u64) -> Option<f64> {
    match (sum, rows) {
        (_, 0) | (None, _) => None,
        (Some(s), n) => Some(s as f64 / n as f64),
    }
}
