//! The parallel column-statistics aggregator.
//!
//! The distributor reads lines, groups them into batches and pushes the
//! batches onto one shared queue. `N` [`ColumnWorker`]s pop batches,
//! tokenize each line and accumulate a private [`PartialResult`]. After the
//! last batch the distributor pushes one end marker per worker; a worker that
//! pops its marker stops and hands its partial back. [`collate`] folds the
//! partials into the final [`AggregateResult`].
//!
//! No state is shared between workers while they run, and the merge does not
//! depend on which worker saw which rows. The result is identical for any
//! worker count, including the single-threaded [`ExecMode::Sequential`] mode.
//!
//! ```
//! use colprofile::{Profiler, ProfileConfig};
//!
//! # fn main() -> colprofile::Result<()> {
//! let input = "a|b\n1|\nfoobar|baz\nx\n";
//! let result = Profiler::new(ProfileConfig::default().with_workers(2))
//!     .profile_reader(input.as_bytes())?;
//! assert_eq!(result.histogram.count(2), 2);
//! assert_eq!(result.columns[0].max_len, Some(6));
//! # Ok(())
//! # }
//! ```

use crate::batch::make_batches;
use crate::cancel::CancelToken;
use crate::config::{ExecMode, ProfileConfig};
use crate::error::{ProfileError, Result};
use crate::queue::{ChannelQueue, LocalQueue, Message, WorkQueue};
use crate::source::{Header, LineSource};
use crate::stats::{AggregateResult, PartialResult, RowProfiler};
use crate::tokenize::{DelimitedTokenizer, Tokenizer};
use log::{debug, info, warn};
use std::io::Read;
use std::path::Path;
use std::thread;
use std::time::Instant;

/// Queue item for the aggregator: a batch of raw lines.
pub type LineBatch = Vec<String>;

/// Consumes line batches and accumulates one partial result.
pub struct ColumnWorker<'a> {
    profiler: &'a RowProfiler,
    tokenizer: &'a dyn Tokenizer,
    acc: PartialResult,
    ended: bool,
}

impl<'a> ColumnWorker<'a> {
    pub fn new(profiler: &'a RowProfiler, tokenizer: &'a dyn Tokenizer) -> Self {
        Self {
            profiler,
            tokenizer,
            acc: profiler.create(),
            ended: false,
        }
    }

    /// Process one queue item. Returns `true` once the end marker is seen.
    ///
    /// # Errors
    /// A protocol violation if anything arrives after the end marker.
    pub fn handle(&mut self, msg: Message<LineBatch>) -> Result<bool> {
        if self.ended {
            return Err(ProfileError::protocol(
                "worker",
                "item received after the end marker",
            ));
        }
        match msg {
            Message::Data(lines) => {
                for line in &lines {
                    let fields = self.tokenizer.tokenize(line);
                    self.profiler.add_row(&mut self.acc, &fields);
                }
            }
            Message::End => self.ended = true,
        }
        Ok(self.ended)
    }

    /// Pop and process items until the end marker, acknowledging each one.
    ///
    /// # Errors
    /// Propagates queue errors (cancellation, protocol violations).
    pub fn run<Q: WorkQueue<LineBatch> + ?Sized>(mut self, queue: &Q) -> Result<PartialResult> {
        loop {
            let msg = queue.pop()?;
            let done = self.handle(msg);
            queue.task_done();
            if done? {
                break;
            }
        }
        self.into_partial()
    }

    /// Hand back the accumulator.
    ///
    /// # Errors
    /// A protocol violation if the end marker was never observed.
    pub fn into_partial(self) -> Result<PartialResult> {
        if !self.ended {
            return Err(ProfileError::protocol(
                "worker",
                "finished without observing an end marker",
            ));
        }
        Ok(self.acc)
    }
}

/// Merge partial results in any order into the final aggregate.
pub fn collate<I>(profiler: &RowProfiler, partials: I) -> AggregateResult
where
    I: IntoIterator<Item = PartialResult>,
{
    let mut acc = profiler.create();
    for partial in partials {
        profiler.merge(&mut acc, partial);
    }
    profiler.finish(acc)
}

/// Push `lines` in batches, then one end marker per consumer, then close.
///
/// The queue is closed even on failure so consumers cannot wait forever.
fn distribute<Q, I>(queue: &Q, lines: I, batch_size: usize, consumers: usize) -> Result<u64>
where
    Q: WorkQueue<LineBatch> + ?Sized,
    I: Iterator<Item = anyhow::Result<String>>,
{
    let fed = (|| -> Result<u64> {
        let mut pushed = 0u64;
        for batch in make_batches(lines, batch_size) {
            let batch = batch.into_iter().collect::<anyhow::Result<LineBatch>>()?;
            pushed += batch.len() as u64;
            queue.push(batch)?;
        }
        for _ in 0..consumers {
            queue.push_end()?;
        }
        Ok(pushed)
    })();
    queue.close();
    fed
}

/// Prefer a real failure over the cancellations it caused in other units.
pub(crate) fn first_failure(errors: Vec<ProfileError>) -> Option<ProfileError> {
    let mut cancelled = None;
    for e in errors {
        if matches!(e, ProfileError::Cancelled) {
            cancelled.get_or_insert(e);
        } else {
            return Some(e);
        }
    }
    cancelled
}

/// Aggregator front end: configuration, scheduling mode and cancellation.
#[derive(Clone, Debug)]
pub struct Profiler {
    config: ProfileConfig,
    mode: ExecMode,
    cancel: CancelToken,
}

impl Profiler {
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

    #[must_use]
    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Profile a stream whose first line is the header.
    ///
    /// # Errors
    /// [`ProfileError::EmptyInput`] without a header line; I/O, cancellation
    /// and protocol errors abort the run without a partial result.
    pub fn profile_reader<R: Read>(&self, reader: R) -> Result<AggregateResult> {
        self.config.validate()?;
        let tokenizer = DelimitedTokenizer::new(self.config.delimiter);
        let mut source = LineSource::from_reader(reader);
        let header = source.read_header(&tokenizer)?;
        self.profile_lines(header, source)
    }

    /// Profile a file, decompressing gzip/zstd input transparently.
    ///
    /// # Errors
    /// See [`profile_reader`](Self::profile_reader).
    pub fn profile_path(&self, path: impl AsRef<Path>) -> Result<AggregateResult> {
        self.profile_reader(crate::io::open_input(path)?)
    }

    /// Profile data lines against an already-read header.
    ///
    /// # Errors
    /// See [`profile_reader`](Self::profile_reader).
    pub fn profile_lines<I>(&self, header: Header, lines: I) -> Result<AggregateResult>
    where
        I: IntoIterator<Item = anyhow::Result<String>>,
    {
        self.config.validate()?;
        let tokenizer = DelimitedTokenizer::new(self.config.delimiter);
        let profiler =
            RowProfiler::new(header, self.config.stats).with_basis(self.config.average_basis);
        let run = self.cancel.child();
        let started = Instant::now();

        let result = match self.mode {
            ExecMode::Sequential => self.run_sequential(&profiler, &tokenizer, lines, &run),
            ExecMode::Parallel { workers } => {
                let workers = workers.unwrap_or_else(|| self.config.workers()).max(1);
                self.run_parallel(&profiler, &tokenizer, lines, workers, &run)
            }
        };
        match &result {
            Ok(agg) => info!(
                "profiled {} rows ({} malformed, {} columns) in {:?}",
                agg.histogram.total_rows(),
                agg.malformed_rows(),
                agg.header.width(),
                started.elapsed()
            ),
            Err(ProfileError::Cancelled) => warn!("profiling cancelled after {:?}", started.elapsed()),
            Err(e) => warn!("profiling failed: {e}"),
        }
        result
    }

    fn run_sequential<I>(
        &self,
        profiler: &RowProfiler,
        tokenizer: &dyn Tokenizer,
        lines: I,
        run: &CancelToken,
    ) -> Result<AggregateResult>
    where
        I: IntoIterator<Item = anyhow::Result<String>>,
    {
        debug!("profiling sequentially, batch size {}", self.config.batch_size);
        let queue = LocalQueue::new("lines", run.clone());
        let mut worker = ColumnWorker::new(profiler, tokenizer);
        for batch in make_batches(lines, self.config.batch_size) {
            let batch = batch.into_iter().collect::<anyhow::Result<LineBatch>>()?;
            queue.push(batch)?;
            worker.handle(queue.pop()?)?;
            queue.task_done();
        }
        queue.push_end()?;
        queue.close();
        worker.handle(queue.pop()?)?;
        queue.task_done();
        queue.join()?;
        Ok(collate(profiler, [worker.into_partial()?]))
    }

    fn run_parallel<I>(
        &self,
        profiler: &RowProfiler,
        tokenizer: &dyn Tokenizer,
        lines: I,
        workers: usize,
        run: &CancelToken,
    ) -> Result<AggregateResult>
    where
        I: IntoIterator<Item = anyhow::Result<String>>,
    {
        info!(
            "profiling with {workers} workers, batch size {}",
            self.config.batch_size
        );
        let queue = ChannelQueue::new("lines", self.config.queue_capacity, run.clone());

        let partials = thread::scope(|s| {
            let queue = &queue;
            let handles: Vec<_> = (0..workers)
                .map(|id| {
                    s.spawn(move || {
                        let res = ColumnWorker::new(profiler, tokenizer).run(queue);
                        match &res {
                            Ok(p) => debug!("worker {id} done after {} rows", p.histogram.total_rows()),
                            Err(_) => run.cancel(),
                        }
                        res
                    })
                })
                .collect();

            let fed = distribute(queue, lines.into_iter(), self.config.batch_size, workers);
            if fed.is_err() {
                run.cancel();
            }

            let mut partials = Vec::with_capacity(workers);
            let mut errors = Vec::new();
            if let Err(e) = fed {
                errors.push(e);
            }
            for h in handles {
                match h.join() {
                    Ok(Ok(p)) => partials.push(p),
                    Ok(Err(e)) => errors.push(e),
                    Err(payload) => {
                        run.cancel();
                        errors.push(ProfileError::from_panic(payload));
                    }
                }
            }
            match first_failure(errors) {
                Some(e) => Err(e),
                None => Ok(partials),
            }
        })?;

        queue.join()?;
        if !queue.is_empty() {
            return Err(ProfileError::protocol(
                queue.name(),
                format!("{} item(s) left after every worker ended", queue.len()),
            ));
        }
        Ok(collate(profiler, partials))
    }
}

/// Profile `reader` with `config` using the threaded mode.
///
/// # Errors
/// See [`Profiler::profile_reader`].
pub fn profile_reader<R: Read>(reader: R, config: &ProfileConfig) -> Result<AggregateResult> {
    Profiler::new(config.clone()).profile_reader(reader)
}

/// Profile the file at `path` with `config` using the threaded mode.
///
/// # Errors
/// See [`Profiler::profile_reader`].
pub fn profile_path(path: impl AsRef<Path>, config: &ProfileConfig) -> Result<AggregateResult> {
    Profiler::new(config.clone()).profile_path(path)
}
