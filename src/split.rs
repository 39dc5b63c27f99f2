//! The column splitter.
//!
//! Rows are read and tokenized on the calling thread, buffered into batches,
//! and each batch is partitioned into one value list per column. Every column
//! has its own queue drained by a dedicated writer thread that appends the
//! values, one per line, to that column's sink. Rows whose width differs from
//! the header only count toward the histogram.
//!
//! Completion is declared only after *every* column queue has been joined
//! (all batches acknowledged) and every writer has flushed its sink.
//!
//! ```
//! use colprofile::{ProfileConfig, Splitter};
//!
//! # fn main() -> colprofile::Result<()> {
//! let input = "a|b\n1|\nfoobar|baz\nx\n";
//! let out = Splitter::new(ProfileConfig::default())
//!     .split_reader(input.as_bytes(), |_, _| Ok(Vec::<u8>::new()))?;
//! assert_eq!(out.sinks[0], b"1\nfoobar\n");
//! assert_eq!(out.sinks[1], b"\nbaz\n");
//! assert_eq!(out.histogram.count(1), 1);
//! # Ok(())
//! # }
//! ```

use crate::aggregate::first_failure;
use crate::batch::make_batches;
use crate::cancel::CancelToken;
use crate::config::{ExecMode, ProfileConfig};
use crate::error::{ProfileError, Result};
use crate::io::compression::FinishWrite;
use crate::queue::{ChannelQueue, LocalQueue, Message, WorkQueue};
use crate::source::{Header, LineSource};
use crate::stats::RowLengthHistogram;
use crate::tokenize::{DelimitedTokenizer, Tokenizer};
use anyhow::Context;
use log::{debug, info, warn};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

/// One column's values from one batch of rows, in row order.
pub type ColumnBatch = Vec<String>;

/// A tokenized row.
pub type Row = Vec<String>;

/// Split a batch of rows into `width` column batches, recording every row's
/// width in `histogram`. Rows of any other width are left out of the columns.
pub fn partition_batch(
    width: usize,
    batch: Vec<Row>,
    histogram: &mut RowLengthHistogram,
) -> Vec<ColumnBatch> {
    let mut columns: Vec<ColumnBatch> = (0..width)
        .map(|_| Vec::with_capacity(batch.len()))
        .collect();
    for row in batch {
        histogram.record(row.len());
        if row.len() != width {
            continue;
        }
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }
    columns
}

/// Appends column batches to one sink.
pub struct ColumnWriter<W> {
    column: usize,
    sink: W,
    written: u64,
    ended: bool,
}

impl<W: Write> ColumnWriter<W> {
    pub fn new(column: usize, sink: W) -> Self {
        Self {
            column,
            sink,
            written: 0,
            ended: false,
        }
    }

    /// Write one queue item. Returns `true` once the end marker is seen.
    ///
    /// # Errors
    /// Sink write failures, or a protocol violation for items after the end marker.
    pub fn handle(&mut self, msg: Message<ColumnBatch>) -> Result<bool> {
        if self.ended {
            return Err(ProfileError::protocol(
                format!("column {}", self.column),
                "item received after the end marker",
            ));
        }
        match msg {
            Message::Data(values) => {
                for v in &values {
                    self.sink.write_all(v.as_bytes())?;
                    self.sink.write_all(b"\n")?;
                }
                self.written += values.len() as u64;
            }
            Message::End => self.ended = true,
        }
        Ok(self.ended)
    }

    /// Flush and hand back the sink with the number of values written.
    ///
    /// # Errors
    /// Flush failures, or a protocol violation if no end marker was seen.
    pub fn finish(mut self) -> Result<(W, u64)> {
        if !self.ended {
            return Err(ProfileError::protocol(
                format!("column {}", self.column),
                "writer finished without observing an end marker",
            ));
        }
        self.sink
            .flush()
            .with_context(|| format!("flush column {}", self.column))?;
        Ok((self.sink, self.written))
    }
}

/// Drain `queue` into `sink` until the end marker, acknowledging every item.
///
/// # Errors
/// Queue errors, sink write/flush failures.
pub fn writer_task<Q, W>(queue: &Q, column: usize, sink: W) -> Result<(W, u64)>
where
    Q: WorkQueue<ColumnBatch> + ?Sized,
    W: Write,
{
    let mut writer = ColumnWriter::new(column, sink);
    loop {
        let msg = queue.pop()?;
        let done = writer
            .handle(msg)
            .map_err(|e| annotate_column(e, column));
        queue.task_done();
        if done? {
            break;
        }
    }
    writer.finish()
}

fn annotate_column(e: ProfileError, column: usize) -> ProfileError {
    match e {
        ProfileError::Io(err) => ProfileError::Io(err.context(format!("write column {column}"))),
        other => other,
    }
}

/// What a split run produced.
#[derive(Debug)]
pub struct SplitOutcome<W> {
    pub header: Header,
    /// Widths of every data row, malformed ones included.
    pub histogram: RowLengthHistogram,
    /// Values written per column; equals the matching-row count for each.
    pub values_written: Vec<u64>,
    pub sinks: Vec<W>,
}

impl<W> SplitOutcome<W> {
    /// Consume each sink, replacing it with `f(column, sink)`. Stops at the
    /// first error.
    ///
    /// # Errors
    /// Whatever `f` returns first.
    pub fn try_map_sinks<U, E>(
        self,
        mut f: impl FnMut(usize, W) -> std::result::Result<U, E>,
    ) -> std::result::Result<SplitOutcome<U>, E> {
        let sinks = self
            .sinks
            .into_iter()
            .enumerate()
            .map(|(i, w)| f(i, w))
            .collect::<std::result::Result<Vec<U>, E>>()?;
        Ok(SplitOutcome {
            header: self.header,
            histogram: self.histogram,
            values_written: self.values_written,
            sinks,
        })
    }
}

/// File layout for column outputs: `<dir>/col-<index>.<extension>`.
///
/// An extension ending in `.gz` or `.zst` produces compressed column files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnFiles {
    dir: PathBuf,
    extension: String,
}

impl ColumnFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "txt".to_string(),
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, column: usize) -> PathBuf {
        self.dir.join(format!("col-{column}.{}", self.extension))
    }
}

/// Splitter front end: configuration, scheduling mode and cancellation.
///
/// In [`ExecMode::Parallel`] there is one writer thread per column regardless
/// of the configured worker count. [`ExecMode::Sequential`] writes every
/// column from the calling thread through in-process queues.
#[derive(Clone, Debug)]
pub struct Splitter {
    config: ProfileConfig,
    mode: ExecMode,
    cancel: CancelToken,
}

impl Splitter {
    #[must_use]
    pub fn new(config: ProfileConfig) -> Self {
        Self {
            config,
            mode: ExecMode::default(),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Split a stream whose first line is the header. `open_sink` receives
    /// each column's index and name.
    ///
    /// # Errors
    /// [`ProfileError::EmptyInput`] without a header; sink, I/O, cancellation
    /// and protocol errors abort the run.
    pub fn split_reader<R, W, F>(&self, reader: R, open_sink: F) -> Result<SplitOutcome<W>>
    where
        R: Read,
        W: Write + Send,
        F: FnMut(usize, &str) -> anyhow::Result<W>,
    {
        self.config.validate()?;
        let tokenizer = DelimitedTokenizer::new(self.config.delimiter);
        let mut source = LineSource::from_reader(reader);
        let header = source.read_header(&tokenizer)?;
        self.split_lines(header, source, open_sink)
    }

    /// Split the file at `input` into the column files described by `files`.
    /// Every file is finished (compressed trailers written) before success is
    /// reported.
    ///
    /// # Errors
    /// See [`split_reader`](Self::split_reader); also a column file that fails
    /// to finish.
    pub fn split_to_dir(
        &self,
        input: impl AsRef<Path>,
        files: &ColumnFiles,
    ) -> Result<SplitOutcome<PathBuf>> {
        let reader = crate::io::open_input(input)?;
        let outcome =
            self.split_reader(reader, |column, _| crate::io::create_output(files.path_for(column)))?;
        let outcome = outcome.try_map_sinks(|column, sink| -> anyhow::Result<PathBuf> {
            let path = files.path_for(column);
            sink.finish().with_context(|| format!("finish {}", path.display()))?;
            Ok(path)
        })?;
        Ok(outcome)
    }

    /// Split data lines against an already-read header.
    ///
    /// # Errors
    /// See [`split_reader`](Self::split_reader).
    pub fn split_lines<I, W, F>(
        &self,
        header: Header,
        lines: I,
        mut open_sink: F,
    ) -> Result<SplitOutcome<W>>
    where
        I: IntoIterator<Item = anyhow::Result<String>>,
        W: Write + Send,
        F: FnMut(usize, &str) -> anyhow::Result<W>,
    {
        self.config.validate()?;
        let tokenizer = DelimitedTokenizer::new(self.config.delimiter);
        let sinks = header
            .names()
            .iter()
            .enumerate()
            .map(|(i, name)| open_sink(i, name).with_context(|| format!("open sink for column {i}")))
            .collect::<anyhow::Result<Vec<W>>>()?;
        let run = self.cancel.child();
        let started = Instant::now();

        let result = match self.mode {
            ExecMode::Sequential => self.run_sequential(&header, &tokenizer, lines, sinks, &run),
            ExecMode::Parallel { .. } => self.run_parallel(&header, &tokenizer, lines, sinks, &run),
        };
        match result {
            Ok((histogram, written)) => {
                info!(
                    "split {} rows into {} columns in {:?}",
                    histogram.total_rows(),
                    header.width(),
                    started.elapsed()
                );
                let (sinks, values_written) = written.into_iter().unzip();
                Ok(SplitOutcome {
                    header,
                    histogram,
                    values_written,
                    sinks,
                })
            }
            Err(e) => {
                warn!("split failed: {e}");
                Err(e)
            }
        }
    }

    fn tokenize_batch(
        tokenizer: &dyn Tokenizer,
        batch: Vec<anyhow::Result<String>>,
    ) -> anyhow::Result<Vec<Row>> {
        batch
            .into_iter()
            .map(|line| {
                line.map(|l| tokenizer.tokenize(&l).into_iter().map(str::to_owned).collect())
            })
            .collect()
    }

    fn run_sequential<I, W>(
        &self,
        header: &Header,
        tokenizer: &dyn Tokenizer,
        lines: I,
        sinks: Vec<W>,
        run: &CancelToken,
    ) -> Result<(RowLengthHistogram, Vec<(W, u64)>)>
    where
        I: IntoIterator<Item = anyhow::Result<String>>,
        W: Write,
    {
        let queues: Vec<LocalQueue<ColumnBatch>> = (0..header.width())
            .map(|i| LocalQueue::new(format!("column {i}"), run.clone()))
            .collect();
        let mut writers: Vec<ColumnWriter<W>> = sinks
            .into_iter()
            .enumerate()
            .map(|(i, sink)| ColumnWriter::new(i, sink))
            .collect();
        let mut histogram = RowLengthHistogram::new();

        let step = |queue: &LocalQueue<ColumnBatch>, writer: &mut ColumnWriter<W>| -> Result<()> {
            let msg = queue.pop()?;
            let res = writer.handle(msg);
            queue.task_done();
            res.map(|_| ())
        };

        for batch in make_batches(lines, self.config.batch_size) {
            let rows = Self::tokenize_batch(tokenizer, batch)?;
            let columns = partition_batch(header.width(), rows, &mut histogram);
            for ((queue, writer), values) in queues.iter().zip(&mut writers).zip(columns) {
                if values.is_empty() {
                    continue;
                }
                queue.push(values)?;
                step(queue, writer)?;
            }
        }
        for (queue, writer) in queues.iter().zip(&mut writers) {
            queue.push_end()?;
            queue.close();
            step(queue, writer)?;
            queue.join()?;
        }
        let written = writers
            .into_iter()
            .map(ColumnWriter::finish)
            .collect::<Result<Vec<_>>>()?;
        Ok((histogram, written))
    }

    fn run_parallel<I, W>(
        &self,
        header: &Header,
        tokenizer: &dyn Tokenizer,
        lines: I,
        sinks: Vec<W>,
        run: &CancelToken,
    ) -> Result<(RowLengthHistogram, Vec<(W, u64)>)>
    where
        I: IntoIterator<Item = anyhow::Result<String>>,
        W: Write + Send,
    {
        let width = header.width();
        info!(
            "splitting {width} columns, batch size {}",
            self.config.batch_size
        );
        let queues: Vec<ChannelQueue<ColumnBatch>> = (0..width)
            .map(|i| ChannelQueue::new(format!("column {i}"), self.config.queue_capacity, run.clone()))
            .collect();

        let written = thread::scope(|s| {
            let handles: Vec<_> = queues
                .iter()
                .zip(sinks)
                .enumerate()
                .map(|(column, (queue, sink))| {
                    s.spawn(move || {
                        let res = writer_task(queue, column, sink);
                        match &res {
                            Ok((_, n)) => debug!("column {column} writer done, {n} values"),
                            Err(_) => run.cancel(),
                        }
                        res
                    })
                })
                .collect();

            let fed = populate_queues(
                queues.as_slice(),
                lines,
                tokenizer,
                width,
                self.config.batch_size,
            );
            let mut errors = Vec::new();
            match &fed {
                Ok(_) => {
                    for q in &queues {
                        if let Err(e) = q.join() {
                            errors.push(e);
                            break;
                        }
                    }
                }
                Err(e) => {
                    debug!("distributor stopped: {e}");
                    run.cancel();
                }
            }

            let mut written = Vec::with_capacity(width);
            for h in handles {
                match h.join() {
                    Ok(Ok(w)) => written.push(w),
                    Ok(Err(e)) => errors.push(e),
                    Err(payload) => {
                        run.cancel();
                        errors.push(ProfileError::from_panic(payload));
                    }
                }
            }
            match fed {
                Ok(histogram) => match first_failure(errors) {
                    Some(e) => Err(e),
                    None => Ok((histogram, written)),
                },
                Err(e) => {
                    errors.insert(0, e);
                    Err(first_failure(errors).unwrap_or(ProfileError::Cancelled))
                }
            }
        })?;

        for q in &queues {
            if !q.is_empty() {
                return Err(ProfileError::protocol(
                    q.name(),
                    format!("{} item(s) left after the writer ended", q.len()),
                ));
            }
        }
        Ok(written)
    }
}

/// Batch, tokenize and partition `lines`, feeding every column queue; then
/// push one end marker per queue and close them all.
fn populate_queues<Q, I>(
    queues: &[Q],
    lines: I,
    tokenizer: &dyn Tokenizer,
    width: usize,
    batch_size: usize,
) -> Result<RowLengthHistogram>
where
    Q: WorkQueue<ColumnBatch>,
    I: IntoIterator<Item = anyhow::Result<String>>,
{
    let mut histogram = RowLengthHistogram::new();
    let fed = (|| -> Result<()> {
        for (n, batch) in make_batches(lines, batch_size).enumerate() {
            let rows = Splitter::tokenize_batch(tokenizer, batch)?;
            let columns = partition_batch(width, rows, &mut histogram);
            for (queue, values) in queues.iter().zip(columns) {
                if !values.is_empty() {
                    queue.push(values)?;
                }
            }
            debug!("queued batch {n}");
        }
        for queue in queues {
            queue.push_end()?;
        }
        Ok(())
    })();
    for queue in queues {
        queue.close();
    }
    fed.map(|()| histogram)
}

/// Split `reader` with `config`, one writer thread per column.
///
/// # Errors
/// See [`Splitter::split_reader`].
pub fn split_reader<R, W, F>(reader: R, config: &ProfileConfig, open_sink: F) -> Result<SplitOutcome<W>>
where
    R: Read,
    W: Write + Send,
    F: FnMut(usize, &str) -> anyhow::Result<W>,
{
    Splitter::new(config.clone()).split_reader(reader, open_sink)
}

/// Split the file at `input` into `dir/col-<index>.txt` files.
///
/// # Errors
/// See [`Splitter::split_reader`].
pub fn split_to_dir(
    input: impl AsRef<Path>,
    dir: impl Into<PathBuf>,
    config: &ProfileConfig,
) -> Result<SplitOutcome<PathBuf>> {
    Splitter::new(config.clone()).split_to_dir(input, &ColumnFiles::new(dir))
}
