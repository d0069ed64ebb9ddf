//! Pure scoring rules: classify one response, aggregate many.
//!
//! Nothing here holds state. Counters are always recomputed from the outcome
//! list so they can never drift from it.

use serde::{Deserialize, Serialize};

use crate::model::{AnswerShape, Item, Outcome, ResponseValue, SessionMode};

/// Aggregate over a session's per-item outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub correct: u32,
    pub incorrect: u32,
    pub skipped: u32,
    pub unanswered: u32,
    /// 0..=100, rounded half-up.
    pub percentage: u8,
    pub passed: bool,
}

impl Score {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.correct + self.incorrect + self.skipped + self.unanswered
    }

    /// Answered or skipped.
    #[must_use]
    pub fn attended(&self) -> u32 {
        self.correct + self.incorrect + self.skipped
    }
}

/// Classify a response against an item.
///
/// Returns `Outcome::Correct` or `Outcome::Incorrect`, never anything else.
/// A response whose shape does not fit the item is incorrect. Free text is
/// compared trimmed and case-folded against the single expected answer, with
/// no fuzzy matching.
#[must_use]
pub fn evaluate(item: &Item, response: &ResponseValue) -> Outcome {
    let correct = match (item.answer(), response) {
        (_, ResponseValue::SelfAssessed(recalled)) => *recalled,
        (AnswerShape::SingleChoice { correct, .. }, ResponseValue::Choice(index)) => {
            index == correct
        }
        (AnswerShape::Boolean { correct }, ResponseValue::Boolean(value)) => value == correct,
        (AnswerShape::FreeText { expected }, ResponseValue::Text(text)) => {
            fold(text) == fold(expected)
        }
        (_, value) => {
            tracing::debug!(item = %item.id(), ?value, "response shape does not match item");
            false
        }
    };

    if correct {
        Outcome::Correct
    } else {
        Outcome::Incorrect
    }
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Aggregate outcomes into counters, percentage and pass flag.
///
/// The percentage denominator is every item in graded mode and only the
/// answered-or-skipped items in practice mode.
#[must_use]
pub fn aggregate<I>(outcomes: I, mode: SessionMode, pass_threshold: u8) -> Score
where
    I: IntoIterator<Item = Outcome>,
{
    let mut score = Score::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Correct => score.correct += 1,
            Outcome::Incorrect => score.incorrect += 1,
            Outcome::Skipped => score.skipped += 1,
            Outcome::Unseen => score.unanswered += 1,
        }
    }

    let denominator = match mode {
        SessionMode::GradedTimed => score.total(),
        SessionMode::SelfPacedPractice => score.attended(),
    };
    score.percentage = percent_half_up(score.correct, denominator);
    score.passed = score.percentage >= pass_threshold;
    score
}

/// `round(part / whole * 100)` with half-up rounding; 0 when `whole` is 0.
#[must_use]
pub fn percent_half_up(part: u32, whole: u32) -> u8 {
    if whole == 0 {
        return 0;
    }
    let part = u64::from(part.min(whole));
    let whole = u64::from(whole);
    let pct = (part * 200 + whole) / (whole * 2);
    u8::try_from(pct).unwrap_or(100)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
