use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use assess_core::model::{
    CompletionReason, ItemId, Outcome, ResultSummary, SessionId, SessionMode, SessionStatus,
};
use storage::repository::{ResultId, ResultRepository, ResultRow};

use crate::error::SessionError;

/// Where the terminal summary stands with respect to the result recorder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PersistenceState {
    /// Not completed yet, or persistence has not been attempted.
    #[default]
    Pending,
    Stored { id: ResultId },
    /// Retryable; the summary is still held in memory.
    Failed { message: String },
}

/// Read-only session state for the host UI.
///
/// Published on every transition; hosts re-render from it instead of polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub position: usize,
    pub item_count: usize,
    /// Item ids in session order.
    pub item_ids: Vec<ItemId>,
    pub current_item: Option<ItemId>,
    pub per_item_status: Vec<Outcome>,
    /// Whole seconds left, rounded up; `None` for untimed sessions.
    pub remaining_secs: Option<u64>,
    pub timer_paused: bool,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub skipped_count: u32,
    pub unanswered_count: u32,
    pub completion_percentage: u8,
    pub completion_reason: Option<CompletionReason>,
    pub persistence: PersistenceState,
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Presentation-agnostic list item for a stored result.
///
/// No pre-formatted strings and no localization assumptions; the UI formats
/// timestamps and percentages as needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultListItem {
    pub id: ResultId,
    pub session_id: SessionId,
    pub mode: SessionMode,
    pub completed_at: DateTime<Utc>,
    pub completion_reason: CompletionReason,

    pub total: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub skipped: u32,
    pub unanswered: u32,
    pub percentage: u8,
    pub passed: bool,
    pub time_spent_secs: u64,
}

impl ResultListItem {
    #[must_use]
    pub fn from_summary(id: ResultId, summary: &ResultSummary) -> Self {
        Self {
            id,
            session_id: summary.session_id(),
            mode: summary.mode(),
            completed_at: summary.completed_at(),
            completion_reason: summary.completion_reason(),
            total: summary.item_count(),
            correct: summary.correct_count(),
            incorrect: summary.incorrect_count(),
            skipped: summary.skipped_count(),
            unanswered: summary.unanswered_count(),
            percentage: summary.percentage(),
            passed: summary.passed(),
            time_spent_secs: summary.time_spent_secs(),
        }
    }

    #[must_use]
    pub fn from_row(row: &ResultRow) -> Self {
        Self::from_summary(row.id, &row.summary)
    }
}

/// Read-side queries over persisted results.
#[derive(Clone)]
pub struct ResultHistoryService {
    results: Arc<dyn ResultRepository>,
}

impl ResultHistoryService {
    #[must_use]
    pub fn new(results: Arc<dyn ResultRepository>) -> Self {
        Self { results }
    }

    /// Most recent results, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the query fails.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<ResultListItem>, SessionError> {
        let rows = self.results.list_results(None, None, limit).await?;
        Ok(rows.iter().map(ResultListItem::from_row).collect())
    }

    /// Results completed within `[from, until]`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the query fails.
    pub async fn list_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ResultListItem>, SessionError> {
        let rows = self
            .results
            .list_results(Some(from), Some(until), limit)
            .await?;
        Ok(rows.iter().map(ResultListItem::from_row).collect())
    }

    /// Full summary for one session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` (`NotFound` if missing).
    pub async fn get(&self, session_id: SessionId) -> Result<ResultSummary, SessionError> {
        Ok(self.results.get_result(session_id).await?.summary)
    }
}
