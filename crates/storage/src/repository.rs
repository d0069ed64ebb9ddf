use async_trait::async_trait;
use chrono::{DateTime, Utc};
use assess_core::model::{ResultSummary, SessionId};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage identifier for a persisted result.
///
/// `i64` to match `SQLite` row IDs.
pub type ResultId = i64;

/// A persisted summary together with its storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub id: ResultId,
    pub summary: ResultSummary,
}

impl ResultRow {
    #[must_use]
    pub fn new(id: ResultId, summary: ResultSummary) -> Self {
        Self { id, summary }
    }
}

/// Sink for completed sessions.
#[async_trait]
pub trait ResultRecorder: Send + Sync {
    /// Persist a terminal summary.
    ///
    /// Persisting the same summary twice returns the existing id, so retries
    /// after an ambiguous failure are safe.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a different summary was already
    /// stored for the same session, or other storage errors.
    async fn persist(&self, summary: &ResultSummary) -> Result<ResultId, StorageError>;
}

/// Read access to persisted results.
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// Fetch the result stored for a session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_result(&self, session_id: SessionId) -> Result<ResultRow, StorageError>;

    /// List results, newest completion first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_results(
        &self,
        completed_from: Option<DateTime<Utc>>,
        completed_until: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    results: Arc<Mutex<Vec<ResultRow>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of stored results.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.len())
    }
}

#[async_trait]
impl ResultRecorder for InMemoryRepository {
    async fn persist(&self, summary: &ResultSummary) -> Result<ResultId, StorageError> {
        let mut guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if let Some(existing) = guard
            .iter()
            .find(|row| row.summary.session_id() == summary.session_id())
        {
            return if existing.summary == *summary {
                Ok(existing.id)
            } else {
                Err(StorageError::Conflict)
            };
        }

        let id = guard.last().map_or(1, |row| row.id + 1);
        guard.push(ResultRow::new(id, summary.clone()));
        Ok(id)
    }
}

#[async_trait]
impl ResultRepository for InMemoryRepository {
    async fn get_result(&self, session_id: SessionId) -> Result<ResultRow, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .iter()
            .find(|row| row.summary.session_id() == session_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_results(
        &self,
        completed_from: Option<DateTime<Utc>>,
        completed_until: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ResultRow>, StorageError> {
        let guard = self
            .results
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut rows: Vec<ResultRow> = guard
            .iter()
            .filter(|row| completed_from.is_none_or(|from| row.summary.completed_at() >= from))
            .filter(|row| completed_until.is_none_or(|until| row.summary.completed_at() <= until))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.summary
                .completed_at()
                .cmp(&a.summary.completed_at())
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

/// Aggregates result repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub recorder: Arc<dyn ResultRecorder>,
    pub results: Arc<dyn ResultRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let recorder: Arc<dyn ResultRecorder> = Arc::new(repo.clone());
        let results: Arc<dyn ResultRepository> = Arc::new(repo);
        Self { recorder, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{
        CompletionReason, ItemId, ItemOutcome, Outcome, SessionMode, SummaryHeader,
    };
    use assess_core::time::fixed_now;

    fn summary(completed_after_secs: i64, outcome: Outcome) -> ResultSummary {
        ResultSummary::from_outcomes(
            SummaryHeader {
                session_id: SessionId::generate(),
                mode: SessionMode::GradedTimed,
                completion_reason: CompletionReason::Manual,
                pass_threshold: 50,
                started_at: fixed_now(),
                completed_at: fixed_now() + chrono::Duration::seconds(completed_after_secs),
            },
            vec![ItemOutcome {
                item_id: ItemId::new(1),
                outcome,
            }],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn persist_is_idempotent_for_identical_summary() {
        let repo = InMemoryRepository::new();
        let s = summary(10, Outcome::Correct);

        let first = repo.persist(&s).await.unwrap();
        let second = repo.persist(&s).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn persist_rejects_different_summary_for_same_session() {
        let repo = InMemoryRepository::new();
        let s = summary(10, Outcome::Correct);
        repo.persist(&s).await.unwrap();

        let other = ResultSummary::from_outcomes(
            *s.header(),
            vec![ItemOutcome {
                item_id: ItemId::new(1),
                outcome: Outcome::Incorrect,
            }],
        )
        .unwrap();
        let err = repo.persist(&other).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_filters() {
        let repo = InMemoryRepository::new();
        let old = summary(10, Outcome::Correct);
        let new = summary(100, Outcome::Incorrect);
        repo.persist(&old).await.unwrap();
        repo.persist(&new).await.unwrap();

        let rows = repo.list_results(None, None, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].summary.session_id(), new.session_id());

        let from = fixed_now() + chrono::Duration::seconds(50);
        let rows = repo.list_results(Some(from), None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);

        let rows = repo.list_results(None, None, 1).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn get_missing_result_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.get_result(SessionId::generate()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
