//! Shared error types for the services crate.

use thiserror::Error;

use assess_core::model::{ConfigError, ItemId, SessionMode, SummaryError};
use assess_core::timer::TimerError;
use storage::repository::StorageError;

/// Rejected navigation request. Position is left unchanged.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NavigationError {
    #[error("position {requested} is out of range for {len} items")]
    OutOfRange { requested: usize, len: usize },
    #[error("already at the first item")]
    BeforeStart,
    #[error("already at the last item")]
    PastEnd,
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Rejected at start: negative limits, out-of-range threshold or an
    /// empty bank.
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("item {0} is not part of this session")]
    UnknownItem(ItemId),
    #[error("self-assessed responses are not accepted in graded sessions")]
    SelfAssessmentNotAllowed,
    #[error("session was started in {actual:?} mode, expected {expected:?}")]
    ModeMismatch {
        expected: SessionMode,
        actual: SessionMode,
    },
    #[error("session was abandoned")]
    Abandoned,
    #[error("session is not completed yet")]
    NotCompleted,
    #[error("no current item")]
    NoCurrentItem,
    #[error("session runner has stopped")]
    Closed,
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Persistence failures can be retried; the summary stays in memory.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Storage(_))
    }
}
