//! Thin presentation adapters over one [`SessionHandle`].
//!
//! Both players drive the same state machine; they only differ in which
//! responses they submit and how they move between items.

use assess_core::model::{Item, ItemId, Outcome, ResponseValue, SessionMode};

use super::controller::Recorded;
use super::progress::ProgressTracker;
use super::workflow::{CompletionReport, SessionHandle};
use crate::error::SessionError;

fn require_mode(handle: &SessionHandle, expected: SessionMode) -> Result<(), SessionError> {
    let actual = handle.latest().mode;
    if actual == expected {
        Ok(())
    } else {
        Err(SessionError::ModeMismatch { expected, actual })
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// One entry of the jump-to-question grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionCell {
    pub index: usize,
    pub item_id: ItemId,
    pub status: Outcome,
    pub is_current: bool,
}

/// Graded, timed multi-question quiz.
#[derive(Clone)]
pub struct QuizPlayer {
    session: SessionHandle,
}

impl QuizPlayer {
    /// # Errors
    ///
    /// Returns `SessionError::ModeMismatch` unless the session is graded.
    pub fn new(session: SessionHandle) -> Result<Self, SessionError> {
        require_mode(&session, SessionMode::GradedTimed)?;
        Ok(Self { session })
    }

    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Item> {
        self.session.current_item()
    }

    fn current_id(&self) -> Result<ItemId, SessionError> {
        self.session
            .latest()
            .current_item
            .ok_or(SessionError::NoCurrentItem)
    }

    /// Pick option `index` for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` from the session runner.
    pub async fn choose(&self, index: usize) -> Result<Recorded, SessionError> {
        let id = self.current_id()?;
        self.session
            .record_response(id, ResponseValue::Choice(index))
            .await
    }

    /// # Errors
    ///
    /// Returns `SessionError` from the session runner.
    pub async fn answer_boolean(&self, value: bool) -> Result<Recorded, SessionError> {
        let id = self.current_id()?;
        self.session
            .record_response(id, ResponseValue::Boolean(value))
            .await
    }

    /// # Errors
    ///
    /// Returns `SessionError` from the session runner.
    pub async fn answer_text(&self, text: impl Into<String>) -> Result<Recorded, SessionError> {
        let id = self.current_id()?;
        self.session
            .record_response(id, ResponseValue::Text(text.into()))
            .await
    }

    /// # Errors
    ///
    /// Returns `SessionError` from the session runner.
    pub async fn skip_current(&self) -> Result<Recorded, SessionError> {
        let id = self.current_id()?;
        self.session.mark_skip(id).await
    }

    /// Status of every question for the navigation grid.
    #[must_use]
    pub fn question_grid(&self) -> Vec<QuestionCell> {
        let snapshot = self.session.latest();
        snapshot
            .item_ids
            .iter()
            .zip(&snapshot.per_item_status)
            .enumerate()
            .map(|(index, (&item_id, &status))| QuestionCell {
                index,
                item_id,
                status,
                is_current: index == snapshot.position,
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns `SessionError::Navigation` for an out-of-range index.
    pub async fn jump_to(&self, index: usize) -> Result<usize, SessionError> {
        self.session.go_to(index).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Navigation` on the last question.
    pub async fn next(&self) -> Result<usize, SessionError> {
        self.session.next().await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Navigation` on the first question.
    pub async fn previous(&self) -> Result<usize, SessionError> {
        self.session.previous().await
    }

    /// Hand in the quiz. Unanswered questions count as incorrect.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` from the session runner.
    pub async fn submit(&self) -> Result<CompletionReport, SessionError> {
        self.session.complete().await
    }
}

//
// ─── FLASHCARDS ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardPhase {
    #[default]
    Prompt,
    Answer,
}

/// Where the deck went after grading a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardStep {
    /// Moved to the next unseen card.
    Next { position: usize },
    /// Every card was attended; the session is complete.
    Finished(CompletionReport),
}

/// Self-paced flashcard review.
///
/// Cards are graded by the learner (`mark_known` / `mark_unknown`); after
/// each grade the player moves to the next unseen card and completes the
/// session once none are left.
pub struct FlashcardPlayer {
    session: SessionHandle,
    phase: CardPhase,
}

impl FlashcardPlayer {
    /// # Errors
    ///
    /// Returns `SessionError::ModeMismatch` unless the session is practice.
    pub fn new(session: SessionHandle) -> Result<Self, SessionError> {
        require_mode(&session, SessionMode::SelfPacedPractice)?;
        Ok(Self {
            session,
            phase: CardPhase::Prompt,
        })
    }

    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    #[must_use]
    pub fn phase(&self) -> CardPhase {
        self.phase
    }

    #[must_use]
    pub fn current_card(&self) -> Option<&Item> {
        self.session.current_item()
    }

    /// Flip the card to show the answer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoCurrentItem` when there is no card.
    pub fn reveal(&mut self) -> Result<(), SessionError> {
        if self.current_card().is_none() {
            return Err(SessionError::NoCurrentItem);
        }
        self.phase = CardPhase::Answer;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError` from the session runner.
    pub async fn mark_known(&mut self) -> Result<CardStep, SessionError> {
        self.grade(true).await
    }

    /// # Errors
    ///
    /// Returns `SessionError` from the session runner.
    pub async fn mark_unknown(&mut self) -> Result<CardStep, SessionError> {
        self.grade(false).await
    }

    /// # Errors
    ///
    /// Returns `SessionError` from the session runner.
    pub async fn skip(&mut self) -> Result<CardStep, SessionError> {
        let id = self.current_id()?;
        let recorded = self.session.mark_skip(id).await?;
        self.advance(recorded).await
    }

    /// End the review early. Unseen cards stay out of the score.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` from the session runner.
    pub async fn finish(&mut self) -> Result<CompletionReport, SessionError> {
        self.session.complete().await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Timer` when no countdown is running.
    pub async fn pause(&self) -> Result<(), SessionError> {
        self.session.pause_timer().await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Timer` when the countdown is not paused.
    pub async fn resume(&self) -> Result<(), SessionError> {
        self.session.resume_timer().await
    }

    fn current_id(&self) -> Result<ItemId, SessionError> {
        self.session
            .latest()
            .current_item
            .ok_or(SessionError::NoCurrentItem)
    }

    async fn grade(&mut self, recalled: bool) -> Result<CardStep, SessionError> {
        let id = self.current_id()?;
        let recorded = self
            .session
            .record_response(id, ResponseValue::SelfAssessed(recalled))
            .await?;
        self.advance(recorded).await
    }

    async fn advance(&mut self, recorded: Recorded) -> Result<CardStep, SessionError> {
        self.phase = CardPhase::Prompt;
        if recorded == Recorded::Ignored {
            return self.session.complete().await.map(CardStep::Finished);
        }

        let snapshot = self.session.latest();
        let tracker = ProgressTracker::derive(snapshot.per_item_status);
        match tracker.next_unseen(snapshot.position + 1) {
            Some(position) => {
                let position = self.session.go_to(position).await?;
                Ok(CardStep::Next { position })
            }
            None => {
                tracing::debug!(session = %snapshot.session_id, "all cards attended");
                self.session.complete().await.map(CardStep::Finished)
            }
        }
    }
}
