use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::ItemId;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OutcomeError {
    #[error("invalid outcome code: {0}")]
    InvalidCode(String),
}

//
// ─── OUTCOME ──────────────────────────────────────────────────────────────────
//

/// Per-item classification. Exactly one holds for every item at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Not answered and not skipped.
    #[default]
    Unseen,
    Correct,
    Incorrect,
    /// Counts as attended but never as correct.
    Skipped,
}

impl Outcome {
    /// Stable storage code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Unseen => "unseen",
            Outcome::Correct => "correct",
            Outcome::Incorrect => "incorrect",
            Outcome::Skipped => "skipped",
        }
    }

    /// Parses a storage code produced by [`Outcome::as_str`].
    ///
    /// # Errors
    ///
    /// Returns `OutcomeError::InvalidCode` for unknown codes.
    pub fn parse(code: &str) -> Result<Self, OutcomeError> {
        match code {
            "unseen" => Ok(Self::Unseen),
            "correct" => Ok(Self::Correct),
            "incorrect" => Ok(Self::Incorrect),
            "skipped" => Ok(Self::Skipped),
            other => Err(OutcomeError::InvalidCode(other.to_owned())),
        }
    }

    /// Answered or skipped.
    #[must_use]
    pub fn is_attended(self) -> bool {
        !matches!(self, Outcome::Unseen)
    }
}

//
// ─── RESPONSE ─────────────────────────────────────────────────────────────────
//

/// What the learner submitted for an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseValue {
    /// Zero-based option index.
    Choice(usize),
    Boolean(bool),
    Text(String),
    /// Flashcard self-grade: `true` when the learner recalled the answer.
    SelfAssessed(bool),
}

/// A recorded response. `value` is `None` for skips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub item_id: ItemId,
    pub value: Option<ResponseValue>,
    pub recorded_at: DateTime<Utc>,
    pub outcome: Outcome,
}

impl Response {
    #[must_use]
    pub fn answered(
        item_id: ItemId,
        value: ResponseValue,
        outcome: Outcome,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            item_id,
            value: Some(value),
            recorded_at,
            outcome,
        }
    }

    #[must_use]
    pub fn skipped(item_id: ItemId, recorded_at: DateTime<Utc>) -> Self {
        Self {
            item_id,
            value: None,
            recorded_at,
            outcome: Outcome::Skipped,
        }
    }
}

/// Final outcome of one item, in session order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_id: ItemId,
    pub outcome: Outcome,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
