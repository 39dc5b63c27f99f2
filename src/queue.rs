//! Work queues connecting the distributor to its consumers.
//!
//! Every queue carries [`Message`] items: real work travels as
//! [`Message::Data`] and termination is the first-class [`Message::End`]
//! case. The distributor pushes exactly one `End` per consumer after the last
//! data item, then [`close`](WorkQueue::close)s the queue.
//!
//! Two implementations share the [`WorkQueue`] interface so worker and writer
//! logic is written once:
//!
//! - [`ChannelQueue`] -- a `crossbeam-channel` queue shared between threads,
//!   bounded or unbounded.
//! - [`LocalQueue`] -- a `VecDeque` for sequential, single-threaded runs.
//!
//! Both count outstanding items: a consumer acknowledges each popped item
//! with [`task_done`](WorkQueue::task_done) and [`join`](WorkQueue::join)
//! blocks until every pushed item (end markers included) has been acknowledged.

use crate::cancel::CancelToken;
use crate::error::{ProfileError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// How long a blocked queue operation waits before re-checking cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A queue item: work, or the termination marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message<T> {
    Data(T),
    End,
}

impl<T> Message<T> {
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// FIFO of [`Message`]s with drain tracking.
pub trait WorkQueue<T> {
    /// Queue label used in protocol-violation errors and logs.
    fn name(&self) -> &str;

    /// Enqueue one data item, blocking while a bounded queue is full.
    ///
    /// # Errors
    /// `Cancelled` if the run is cancelled while waiting; a protocol violation
    /// if the queue was already closed.
    fn push(&self, item: T) -> Result<()>;

    /// Enqueue one termination marker.
    ///
    /// # Errors
    /// Same conditions as [`push`](Self::push).
    fn push_end(&self) -> Result<()>;

    /// Dequeue the next item, blocking while the queue is empty.
    ///
    /// # Errors
    /// A protocol violation if the queue can never deliver another item
    /// (closed and drained); `Cancelled` on cancellation.
    fn pop(&self) -> Result<Message<T>>;

    /// Acknowledge one popped item.
    fn task_done(&self);

    /// Block until every pushed item has been acknowledged.
    ///
    /// # Errors
    /// `Cancelled` on cancellation; a protocol violation if a local queue is
    /// joined with unacknowledged items.
    fn join(&self) -> Result<()>;

    /// Producer side is finished; no further pushes are accepted.
    fn close(&self);

    /// Items currently buffered.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outstanding-item counter behind `task_done` / `join`.
#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn wait(&self, cancel: &CancelToken) -> Result<()> {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            cancel.check()?;
            count = self
                .drained
                .wait_timeout(count, POLL_INTERVAL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }
}

/// Thread-safe queue over a `crossbeam-channel`.
///
/// Share it by reference across scoped threads; the channel ends are `Sync`.
pub struct ChannelQueue<T> {
    name: String,
    tx: Mutex<Option<Sender<Message<T>>>>,
    rx: Receiver<Message<T>>,
    pending: Pending,
    cancel: CancelToken,
}

impl<T: Send> ChannelQueue<T> {
    /// `capacity` of `None` builds an unbounded queue.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: Option<usize>, cancel: CancelToken) -> Self {
        let (tx, rx) = match capacity {
            Some(cap) => crossbeam_channel::bounded(cap.max(1)),
            None => crossbeam_channel::unbounded(),
        };
        Self {
            name: name.into(),
            tx: Mutex::new(Some(tx)),
            rx,
            pending: Pending::default(),
            cancel,
        }
    }

    fn send(&self, msg: Message<T>) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ProfileError::protocol(&self.name, "push after close"))?;
        self.pending.add();
        let mut msg = msg;
        loop {
            if let Err(e) = self.cancel.check() {
                self.pending.done();
                return Err(e);
            }
            match tx.send_timeout(msg, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => msg = back,
                Err(SendTimeoutError::Disconnected(_)) => {
                    self.pending.done();
                    return Err(ProfileError::protocol(&self.name, "receiver disconnected"));
                }
            }
        }
    }
}

impl<T: Send> WorkQueue<T> for ChannelQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&self, item: T) -> Result<()> {
        self.send(Message::Data(item))
    }

    fn push_end(&self) -> Result<()> {
        self.send(Message::End)
    }

    fn pop(&self) -> Result<Message<T>> {
        loop {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(msg) => return Ok(msg),
                Err(RecvTimeoutError::Timeout) => self.cancel.check()?,
                Err(RecvTimeoutError::Disconnected) => {
                    // A producer that stopped on cancellation closes without markers.
                    self.cancel.check()?;
                    return Err(ProfileError::protocol(
                        &self.name,
                        "queue closed and drained before an end marker was received",
                    ));
                }
            }
        }
    }

    fn task_done(&self) {
        self.pending.done();
    }

    fn join(&self) -> Result<()> {
        self.pending.wait(&self.cancel)
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn len(&self) -> usize {
        self.rx.len()
    }
}

/// Single-threaded queue for sequential runs.
///
/// Nothing can refill a local queue while its consumer waits, so popping an
/// empty one is reported as a protocol violation instead of blocking.
pub struct LocalQueue<T> {
    name: String,
    items: RefCell<VecDeque<Message<T>>>,
    pending: Cell<usize>,
    closed: Cell<bool>,
    cancel: CancelToken,
}

impl<T> LocalQueue<T> {
    #[must_use]
    pub fn new(name: impl Into<String>, cancel: CancelToken) -> Self {
        Self {
            name: name.into(),
            items: RefCell::new(VecDeque::new()),
            pending: Cell::new(0),
            closed: Cell::new(false),
            cancel,
        }
    }

    fn enqueue(&self, msg: Message<T>) -> Result<()> {
        self.cancel.check()?;
        if self.closed.get() {
            return Err(ProfileError::protocol(&self.name, "push after close"));
        }
        self.items.borrow_mut().push_back(msg);
        self.pending.set(self.pending.get() + 1);
        Ok(())
    }
}

impl<T> WorkQueue<T> for LocalQueue<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&self, item: T) -> Result<()> {
        self.enqueue(Message::Data(item))
    }

    fn push_end(&self) -> Result<()> {
        self.enqueue(Message::End)
    }

    fn pop(&self) -> Result<Message<T>> {
        self.cancel.check()?;
        self.items.borrow_mut().pop_front().ok_or_else(|| {
            ProfileError::protocol(&self.name, "queue drained before an end marker was received")
        })
    }

    fn task_done(&self) {
        self.pending.set(self.pending.get().saturating_sub(1));
    }

    fn join(&self) -> Result<()> {
        self.cancel.check()?;
        match self.pending.get() {
            0 => Ok(()),
            n => Err(ProfileError::protocol(
                &self.name,
                format!("{n} item(s) never acknowledged"),
            )),
        }
    }

    fn close(&self) {
        self.closed.set(true);
    }

    fn len(&self) -> usize {
        self.items.borrow().len()
    }
}
