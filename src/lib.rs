//! # colprofile
//!
//! Streaming profiler and column splitter for large delimited text files.
//!
//! The first line of the input is the header; every following line is a data
//! row. Two pipelines share the same reading, batching and queueing pieces:
//!
//! - **Aggregator** ([`Profiler`]): N workers pull line batches from one shared
//!   queue, each keeps a private [`PartialResult`], and the partials are merged
//!   into an [`AggregateResult`]: a row-length histogram plus per-column fill
//!   counts and min / max / average value lengths.
//! - **Splitter** ([`Splitter`]): rows are partitioned by column and handed to
//!   one writer thread per column, which appends each value on its own line.
//!
//! Rows whose width differs from the header are counted in the histogram and
//! otherwise ignored.
//!
//! ## Quick Start
//!
//! ```
//! use colprofile::{ProfileConfig, profile_reader};
//!
//! # fn main() -> colprofile::Result<()> {
//! let input = "a|b\n1|\nfoobar|baz\nx";
//! let result = profile_reader(input.as_bytes(), &ProfileConfig::default().with_workers(2))?;
//!
//! assert_eq!(result.histogram.count(2), 2);
//! assert_eq!(result.malformed_rows(), 1);
//! assert_eq!(result.columns[0].fill_count, Some(2));
//! assert_eq!(result.columns[0].max_len, Some(6));
//! assert_eq!(result.columns[1].min_len, Some(0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution modes
//!
//! [`ExecMode::Parallel`] (the default) runs scoped threads over
//! `crossbeam-channel` queues. [`ExecMode::Sequential`] drives a single unit
//! from the calling thread over an in-process queue. Both produce the same
//! result for the same input.
//!
//! ## Feature Flags
//!
//! - `io-csv`: CSV report writer
//! - `compression-gzip` / `compression-zstd`: transparent (de)compression by
//!   extension or magic bytes
//! - `parallel-io`: summarize split column files on the rayon pool
//!
//! ## Logging
//!
//! Progress is reported through the `log` facade. Install any logger to see it.

pub mod aggregate;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod io;
pub mod queue;
pub mod report;
pub mod source;
pub mod split;
pub mod stats;
pub mod summarize;
pub mod testing;
pub mod tokenize;

pub use aggregate::{ColumnWorker, LineBatch, Profiler, collate, profile_path, profile_reader};
pub use batch::{Batches, make_batches};
pub use cancel::CancelToken;
pub use config::{DEFAULT_BATCH_SIZE, DEFAULT_DELIMITER, ExecMode, ProfileConfig, StatsSelection};
pub use error::{ProfileError, Result};
pub use queue::{ChannelQueue, LocalQueue, Message, WorkQueue};
pub use report::{write_jsonl, write_report};
pub use source::{Header, LineSource};
pub use split::{
    ColumnBatch, ColumnFiles, ColumnWriter, SplitOutcome, Splitter, partition_batch, split_reader,
    split_to_dir, writer_task,
};
pub use stats::{
    AggregateResult, AverageBasis, ColumnStats, ColumnSummary, PartialResult, RowLengthHistogram,
    RowProfiler,
};
pub use summarize::{
    ColumnFileSummary, ColumnProfile, profile_columns, summarize_column_file, summarize_files,
};
pub use tokenize::{DelimitedTokenizer, Tokenizer};

#[cfg(feature = "io-csv")]
pub use report::write_csv_report;
