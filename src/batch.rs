//! Fixed-size batching of an iterator.
//!
//! Both pipelines move work through their queues in batches so the cost of
//! one queue handoff is shared by many rows. The batch size trades memory for
//! throughput.

/// Iterator adapter yielding `Vec`s of at most `size` items.
///
/// Every batch but the last is full; the last holds the remainder and is
/// never empty.
pub struct Batches<I> {
    inner: I,
    size: usize,
}

/// Group `iter` into batches of `size` items (`size` is clamped to at least 1).
///
/// ```
/// use colprofile::make_batches;
///
/// let got: Vec<Vec<u32>> = make_batches([1, 2, 3], 2).collect();
/// assert_eq!(got, vec![vec![1, 2], vec![3]]);
/// ```
pub fn make_batches<I: IntoIterator>(iter: I, size: usize) -> Batches<I::IntoIter> {
    Batches {
        inner: iter.into_iter(),
        size: size.max(1),
    }
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<_> = self.inner.by_ref().take(self.size).collect();
        (!batch.is_empty()).then_some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.inner.size_hint();
        (lo.div_ceil(self.size), hi.map(|h| h.div_ceil(self.size)))
    }
}
