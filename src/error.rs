//! Error types shared by the aggregator and the splitter.
//!
//! Only structural failures are errors. A row whose width differs from the
//! header is tallied in the row-length histogram and never surfaces here, and
//! an average over zero matching rows is reported as `None` rather than as a
//! failure.

use thiserror::Error;

/// Result alias used by every pipeline entry point.
pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Debug, Error)]
pub enum ProfileError {
    /// The input stream ended before a header line could be read.
    #[error("input stream has no header line")]
    EmptyInput,

    /// A queue consumer observed something the termination protocol forbids.
    #[error("queue protocol violation on {queue}: {detail}")]
    QueueProtocol { queue: String, detail: String },

    /// The run was cancelled through its [`CancelToken`](crate::CancelToken).
    #[error("run cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A worker or writer thread panicked; the payload message is kept if it was a string.
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl ProfileError {
    pub(crate) fn protocol(queue: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::QueueProtocol {
            queue: queue.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::WorkerPanicked(msg)
    }

    /// `true` for [`ProfileError::QueueProtocol`].
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::QueueProtocol { .. })
    }
}

impl From<std::io::Error> for ProfileError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(anyhow::Error::new(e))
    }
}
