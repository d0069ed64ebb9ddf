use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ItemOutcome, Outcome, SessionId, SessionMode};
use crate::scoring::{self, Score};
use crate::time::elapsed_secs;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SummaryError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("too many items for a single session: {len}")]
    TooManyItems { len: usize },

    #[error("item count ({total}) does not match outcome counts ({sum})")]
    CountMismatch { total: u32, sum: u32 },

    #[error("stored score does not match per-item outcomes")]
    ScoreMismatch,

    #[error("pass threshold must be between 0 and 100, got {0}")]
    InvalidPassThreshold(u8),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    InProgress,
    /// Terminal. Reached exactly once.
    Completed,
    /// Terminal. Only via an explicit host signal.
    Abandoned,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }
}

/// Why a session was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    Manual,
    TimeExpired,
}

impl CompletionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionReason::Manual => "manual",
            CompletionReason::TimeExpired => "time_expired",
        }
    }

    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "manual" => Some(Self::Manual),
            "time_expired" => Some(Self::TimeExpired),
            _ => None,
        }
    }
}

//
// ─── RESULT SUMMARY ────────────────────────────────────────────────────────────
//

/// Identity and timing of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryHeader {
    pub session_id: SessionId,
    pub mode: SessionMode,
    pub completion_reason: CompletionReason,
    pub pass_threshold: u8,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Terminal, immutable aggregate handed to the result recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    header: SummaryHeader,
    score: Score,
    time_spent_secs: u64,
    per_item: Vec<ItemOutcome>,
}

impl ResultSummary {
    /// Build a summary from final per-item outcomes, in session order.
    ///
    /// Outcomes must already reflect the mode rule for unanswered items.
    ///
    /// # Errors
    ///
    /// Returns `SummaryError::InvalidTimeRange` if `completed_at` is before `started_at`.
    /// Returns `SummaryError::TooManyItems` if the item count cannot fit in `u32`.
    pub fn from_outcomes(
        header: SummaryHeader,
        per_item: Vec<ItemOutcome>,
    ) -> Result<Self, SummaryError> {
        validate_header(&header)?;
        u32::try_from(per_item.len())
            .map_err(|_| SummaryError::TooManyItems { len: per_item.len() })?;

        let score = scoring::aggregate(
            per_item.iter().map(|o| o.outcome),
            header.mode,
            header.pass_threshold,
        );

        Ok(Self {
            header,
            score,
            time_spent_secs: elapsed_secs(header.started_at, header.completed_at),
            per_item,
        })
    }

    /// Rehydrate a summary from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SummaryError::CountMismatch` if counters do not add up to the item count,
    /// `SummaryError::ScoreMismatch` if they disagree with the per-item outcomes.
    pub fn from_persisted(
        header: SummaryHeader,
        score: Score,
        per_item: Vec<ItemOutcome>,
    ) -> Result<Self, SummaryError> {
        let total = u32::try_from(per_item.len())
            .map_err(|_| SummaryError::TooManyItems { len: per_item.len() })?;
        let sum = score.total();
        if sum != total {
            return Err(SummaryError::CountMismatch { total, sum });
        }

        let rebuilt = Self::from_outcomes(header, per_item)?;
        if rebuilt.score != score {
            return Err(SummaryError::ScoreMismatch);
        }
        Ok(rebuilt)
    }

    #[must_use]
    pub fn header(&self) -> &SummaryHeader {
        &self.header
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.header.session_id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.header.mode
    }

    #[must_use]
    pub fn completion_reason(&self) -> CompletionReason {
        self.header.completion_reason
    }

    #[must_use]
    pub fn pass_threshold(&self) -> u8 {
        self.header.pass_threshold
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.header.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.header.completed_at
    }

    #[must_use]
    pub fn score(&self) -> &Score {
        &self.score
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.score.total()
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.score.correct
    }

    #[must_use]
    pub fn incorrect_count(&self) -> u32 {
        self.score.incorrect
    }

    #[must_use]
    pub fn skipped_count(&self) -> u32 {
        self.score.skipped
    }

    #[must_use]
    pub fn unanswered_count(&self) -> u32 {
        self.score.unanswered
    }

    #[must_use]
    pub fn percentage(&self) -> u8 {
        self.score.percentage
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.score.passed
    }

    #[must_use]
    pub fn time_spent_secs(&self) -> u64 {
        self.time_spent_secs
    }

    #[must_use]
    pub fn per_item_outcomes(&self) -> &[ItemOutcome] {
        &self.per_item
    }

    /// Outcome recorded for a given item, if it belongs to this session.
    #[must_use]
    pub fn outcome_of(&self, item_id: crate::model::ItemId) -> Option<Outcome> {
        self.per_item
            .iter()
            .find(|o| o.item_id == item_id)
            .map(|o| o.outcome)
    }
}

fn validate_header(header: &SummaryHeader) -> Result<(), SummaryError> {
    if header.completed_at < header.started_at {
        return Err(SummaryError::InvalidTimeRange);
    }
    if header.pass_threshold > 100 {
        return Err(SummaryError::InvalidPassThreshold(header.pass_threshold));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemId;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn header(mode: SessionMode) -> SummaryHeader {
        SummaryHeader {
            session_id: SessionId::generate(),
            mode,
            completion_reason: CompletionReason::Manual,
            pass_threshold: 60,
            started_at: fixed_now(),
            completed_at: fixed_now() + Duration::seconds(95),
        }
    }

    fn outcomes(list: &[Outcome]) -> Vec<ItemOutcome> {
        list.iter()
            .enumerate()
            .map(|(i, outcome)| ItemOutcome {
                item_id: ItemId::new(i as u64 + 1),
                outcome: *outcome,
            })
            .collect()
    }

    #[test]
    fn summary_counts_outcomes() {
        let summary = ResultSummary::from_outcomes(
            header(SessionMode::GradedTimed),
            outcomes(&[
                Outcome::Correct,
                Outcome::Correct,
                Outcome::Incorrect,
                Outcome::Incorrect,
            ]),
        )
        .unwrap();

        assert_eq!(summary.item_count(), 4);
        assert_eq!(summary.correct_count(), 2);
        assert_eq!(summary.incorrect_count(), 2);
        assert_eq!(summary.percentage(), 50);
        assert!(!summary.passed());
        assert_eq!(summary.time_spent_secs(), 95);
        assert_eq!(summary.outcome_of(ItemId::new(3)), Some(Outcome::Incorrect));
    }

    #[test]
    fn inverted_time_range_is_rejected() {
        let mut h = header(SessionMode::GradedTimed);
        h.completed_at = h.started_at - Duration::seconds(1);
        let err = ResultSummary::from_outcomes(h, outcomes(&[Outcome::Correct])).unwrap_err();
        assert_eq!(err, SummaryError::InvalidTimeRange);
    }

    #[test]
    fn persisted_counts_must_add_up() {
        let score = Score {
            correct: 1,
            incorrect: 0,
            skipped: 0,
            unanswered: 0,
            percentage: 100,
            passed: true,
        };
        let err = ResultSummary::from_persisted(
            header(SessionMode::GradedTimed),
            score,
            outcomes(&[Outcome::Correct, Outcome::Incorrect]),
        )
        .unwrap_err();
        assert_eq!(err, SummaryError::CountMismatch { total: 2, sum: 1 });
    }

    #[test]
    fn persisted_score_must_match_outcomes() {
        let h = header(SessionMode::SelfPacedPractice);
        let original = ResultSummary::from_outcomes(
            h,
            outcomes(&[Outcome::Correct, Outcome::Skipped, Outcome::Correct]),
        )
        .unwrap();

        let rehydrated =
            ResultSummary::from_persisted(h, *original.score(), original.per_item_outcomes().to_vec())
                .unwrap();
        assert_eq!(rehydrated, original);

        let mut tampered = *original.score();
        tampered.passed = !tampered.passed;
        let err =
            ResultSummary::from_persisted(h, tampered, original.per_item_outcomes().to_vec())
                .unwrap_err();
        assert_eq!(err, SummaryError::ScoreMismatch);
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert_eq!(
            CompletionReason::parse(CompletionReason::TimeExpired.as_str()),
            Some(CompletionReason::TimeExpired)
        );
    }
}
