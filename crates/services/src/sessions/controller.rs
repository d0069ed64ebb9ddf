use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::watch;

use assess_core::bank::{QuestionBank, permute};
use assess_core::model::{
    CompletionReason, ConfigError, Item, ItemId, ItemOrdering, ItemOutcome, Outcome, Response,
    ResponseValue, ResultSummary, SessionConfig, SessionConfigDraft, SessionId, SessionMode,
    SessionStatus, SummaryHeader,
};
use assess_core::scoring::{self, Score};
use assess_core::timer::{Timer, TimerTicket};
use storage::repository::{ResultId, ResultRecorder};

use super::progress::{ProgressTracker, SessionProgress};
use super::view::{PersistenceState, SessionSnapshot};
use crate::error::{NavigationError, SessionError};

//
// ─── RESULTS ───────────────────────────────────────────────────────────────────
//

/// What happened to a submitted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Outcome(Outcome),
    /// The session is terminal; nothing changed.
    Ignored,
}

/// Result of a `complete` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub summary: ResultSummary,
    /// `false` when the session was already completed and the stored summary
    /// was returned as-is.
    pub newly_completed: bool,
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Session state machine shared by the graded quiz and flashcard practice.
///
/// Every mutation goes through `&mut self`, so a single owner serializes all
/// operations; timer expiry arrives through [`SessionController::on_timer_fired`]
/// like any other command. Per-item outcomes live only in the response map;
/// progress and counters are derived from it after each change.
pub struct SessionController {
    id: SessionId,
    bank: QuestionBank,
    config: SessionConfig,
    /// Selected items in bank order; every shuffle starts from here.
    selected: Vec<ItemId>,
    item_order: Vec<ItemId>,
    position: usize,
    responses: HashMap<ItemId, Response>,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    completion_reason: Option<CompletionReason>,
    summary: Option<ResultSummary>,
    persistence: PersistenceState,
    timer: Timer,
    progress: ProgressTracker,
    notifier: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    /// Create a session over `bank` and move it to `InProgress`.
    ///
    /// Selects `number_of_items` items (all when 0) in the configured order
    /// and arms the timer when the config has a time limit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfig` for an empty bank.
    pub fn start(
        bank: QuestionBank,
        config: SessionConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if bank.is_empty() {
            return Err(ConfigError::EmptyBank.into());
        }

        let selected = select_items(&bank, &config);
        let mut item_order = selected.clone();
        if let ItemOrdering::Shuffled { seed } = config.ordering() {
            permute(&mut item_order, seed);
        }
        let timer = Timer::new(!config.mode().is_graded());
        let placeholder = SessionSnapshot {
            session_id: SessionId::generate(),
            status: SessionStatus::Created,
            mode: config.mode(),
            position: 0,
            item_count: item_order.len(),
            item_ids: item_order.clone(),
            current_item: None,
            per_item_status: Vec::new(),
            remaining_secs: None,
            timer_paused: false,
            correct_count: 0,
            incorrect_count: 0,
            skipped_count: 0,
            unanswered_count: 0,
            completion_percentage: 0,
            completion_reason: None,
            persistence: PersistenceState::Pending,
        };
        let (notifier, _) = watch::channel(placeholder);

        let mut session = Self {
            id: SessionId::generate(),
            bank,
            config,
            selected,
            item_order,
            position: 0,
            responses: HashMap::new(),
            status: SessionStatus::Created,
            started_at: now,
            completed_at: None,
            completion_reason: None,
            summary: None,
            persistence: PersistenceState::Pending,
            timer,
            progress: ProgressTracker::default(),
            notifier,
        };
        session.begin(now);

        tracing::info!(
            session = %session.id,
            mode = session.config.mode().as_str(),
            items = session.item_order.len(),
            time_limit_secs = session.config.time_limit_secs(),
            "session started"
        );
        Ok(session)
    }

    /// Validate a raw config and start.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfig` for negative counts or limits or
    /// an out-of-range pass threshold, and anything [`SessionController::start`] returns.
    pub fn start_from_draft(
        bank: QuestionBank,
        draft: SessionConfigDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let config = draft.validate()?;
        Self::start(bank, config, now)
    }

    fn begin(&mut self, now: DateTime<Utc>) {
        self.started_at = now;
        if self.config.is_timed() {
            self.timer.arm(
                Duration::seconds(i64::from(self.config.time_limit_secs())),
                now,
            );
        }
        self.status = SessionStatus::InProgress;
        self.refresh(now);
    }

    //
    // ─── RESPONSES ─────────────────────────────────────────────────────────────
    //

    /// Classify and store a response for any item in the session.
    ///
    /// A later response to the same item replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownItem` for items outside this session and
    /// `SessionError::SelfAssessmentNotAllowed` for self-grades in graded mode.
    pub fn record_response(
        &mut self,
        item_id: ItemId,
        value: ResponseValue,
        now: DateTime<Utc>,
    ) -> Result<Recorded, SessionError> {
        if self.status.is_terminal() {
            tracing::debug!(session = %self.id, item = %item_id, "ignoring response on terminal session");
            return Ok(Recorded::Ignored);
        }
        let item = self.session_item(item_id)?;
        if matches!(value, ResponseValue::SelfAssessed(_)) && self.config.mode().is_graded() {
            return Err(SessionError::SelfAssessmentNotAllowed);
        }

        let outcome = scoring::evaluate(item, &value);
        self.responses
            .insert(item_id, Response::answered(item_id, value, outcome, now));
        self.refresh(now);
        Ok(Recorded::Outcome(outcome))
    }

    /// Mark an item as skipped. Counts as attended, never as correct.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownItem` for items outside this session.
    pub fn mark_skip(
        &mut self,
        item_id: ItemId,
        now: DateTime<Utc>,
    ) -> Result<Recorded, SessionError> {
        if self.status.is_terminal() {
            tracing::debug!(session = %self.id, item = %item_id, "ignoring skip on terminal session");
            return Ok(Recorded::Ignored);
        }
        self.session_item(item_id)?;

        self.responses
            .insert(item_id, Response::skipped(item_id, now));
        self.refresh(now);
        Ok(Recorded::Outcome(Outcome::Skipped))
    }

    fn session_item(&self, item_id: ItemId) -> Result<&Item, SessionError> {
        if !self.item_order.contains(&item_id) {
            return Err(SessionError::UnknownItem(item_id));
        }
        self.bank
            .item(item_id)
            .ok_or(SessionError::UnknownItem(item_id))
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Move to `index` in the session order.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::OutOfRange` and leaves the position unchanged.
    pub fn go_to(&mut self, index: usize, now: DateTime<Utc>) -> Result<usize, NavigationError> {
        let len = self.item_order.len();
        if index >= len {
            tracing::debug!(session = %self.id, requested = index, len, "rejected navigation");
            return Err(NavigationError::OutOfRange {
                requested: index,
                len,
            });
        }
        if index != self.position {
            self.position = index;
            self.publish(now);
        }
        Ok(self.position)
    }

    /// # Errors
    ///
    /// Returns `NavigationError::PastEnd` on the last item.
    pub fn next(&mut self, now: DateTime<Utc>) -> Result<usize, NavigationError> {
        if self.position + 1 >= self.item_order.len() {
            return Err(NavigationError::PastEnd);
        }
        self.go_to(self.position + 1, now)
    }

    /// # Errors
    ///
    /// Returns `NavigationError::BeforeStart` on the first item.
    pub fn previous(&mut self, now: DateTime<Utc>) -> Result<usize, NavigationError> {
        if self.position == 0 {
            return Err(NavigationError::BeforeStart);
        }
        self.go_to(self.position - 1, now)
    }

    /// Re-order the session's items.
    ///
    /// The new order depends only on the selected items and `seed`, never on
    /// earlier shuffles. Clears every response and returns to the first item
    /// so that positions and responses cannot fall out of step. Returns
    /// `false` on terminal sessions, which are left untouched.
    pub fn shuffle(&mut self, seed: Option<u64>, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            tracing::debug!(session = %self.id, "ignoring shuffle on terminal session");
            return false;
        }
        self.item_order.clone_from(&self.selected);
        permute(&mut self.item_order, seed);
        self.responses.clear();
        self.position = 0;
        self.refresh(now);
        true
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Freeze the session and compute its summary.
    ///
    /// Idempotent: on an already completed session the stored summary is
    /// returned unchanged with `newly_completed = false`. Unseen items become
    /// `Incorrect` in graded mode and stay `Unseen` in practice mode.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Abandoned` for abandoned sessions.
    pub fn complete(
        &mut self,
        reason: CompletionReason,
        now: DateTime<Utc>,
    ) -> Result<Completion, SessionError> {
        if let Some(summary) = &self.summary {
            tracing::debug!(session = %self.id, ?reason, "session already completed");
            return Ok(Completion {
                summary: summary.clone(),
                newly_completed: false,
            });
        }
        if self.status == SessionStatus::Abandoned {
            return Err(SessionError::Abandoned);
        }

        let completed_at = now.max(self.started_at);
        let graded = self.config.mode().is_graded();
        let per_item: Vec<ItemOutcome> = self
            .item_order
            .iter()
            .map(|&item_id| {
                let outcome = match self.outcome_of(item_id) {
                    Outcome::Unseen if graded => Outcome::Incorrect,
                    other => other,
                };
                ItemOutcome { item_id, outcome }
            })
            .collect();

        let summary = ResultSummary::from_outcomes(
            SummaryHeader {
                session_id: self.id,
                mode: self.config.mode(),
                completion_reason: reason,
                pass_threshold: self.config.pass_threshold(),
                started_at: self.started_at,
                completed_at,
            },
            per_item,
        )?;

        self.timer.cancel();
        self.status = SessionStatus::Completed;
        self.completed_at = Some(completed_at);
        self.completion_reason = Some(reason);
        self.summary = Some(summary.clone());
        self.publish(now);

        tracing::info!(
            session = %self.id,
            reason = reason.as_str(),
            percentage = summary.percentage(),
            passed = summary.passed(),
            "session completed"
        );
        Ok(Completion {
            summary,
            newly_completed: true,
        })
    }

    /// Start over with the same bank and config.
    ///
    /// Cancels the timer, clears all responses, assigns a new session id and
    /// re-enters `InProgress` with the full time limit. Allowed in any state.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        let previous = self.id;
        self.timer.cancel();

        self.id = SessionId::generate();
        self.responses.clear();
        self.position = 0;
        self.completed_at = None;
        self.completion_reason = None;
        self.summary = None;
        self.persistence = PersistenceState::Pending;
        self.begin(now);

        tracing::info!(session = %self.id, previous = %previous, "session reset");
    }

    /// Host signal that the learner left. Returns `false` on terminal sessions.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.timer.cancel();
        self.status = SessionStatus::Abandoned;
        self.publish(now);
        tracing::info!(session = %self.id, "session abandoned");
        true
    }

    //
    // ─── TIMER ─────────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `SessionError::Timer` in graded mode or when nothing is running.
    pub fn pause_timer(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.timer.pause(now)?;
        self.publish(now);
        Ok(())
    }

    /// Resume from the frozen remainder. The returned ticket replaces any
    /// earlier one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Timer` in graded mode or when not paused.
    pub fn resume_timer(&mut self, now: DateTime<Utc>) -> Result<TimerTicket, SessionError> {
        let ticket = self.timer.resume(now)?;
        self.publish(now);
        Ok(ticket)
    }

    /// Handle a scheduled expiry check.
    ///
    /// Completes the session with `TimeExpired` when `epoch` is current and
    /// the deadline has passed. Stale or early checks return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`SessionController::complete`].
    pub fn on_timer_fired(
        &mut self,
        epoch: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Completion>, SessionError> {
        if self.status != SessionStatus::InProgress {
            return Ok(None);
        }
        let Some(deadline) = self.timer.ticket().map(|t| t.deadline) else {
            return Ok(None);
        };
        if !self.timer.fire(epoch, now) {
            return Ok(None);
        }
        tracing::info!(session = %self.id, "time limit reached");
        self.complete(CompletionReason::TimeExpired, deadline.min(now))
            .map(Some)
    }

    /// Fire the active ticket if its deadline has passed.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`SessionController::complete`].
    pub fn check_deadline(&mut self, now: DateTime<Utc>) -> Result<Option<Completion>, SessionError> {
        match self.timer.ticket() {
            Some(ticket) => self.on_timer_fired(ticket.epoch, now),
            None => Ok(None),
        }
    }

    /// Schedule for the host's timer task, if the countdown is running.
    #[must_use]
    pub fn timer_ticket(&self) -> Option<TimerTicket> {
        self.timer.ticket()
    }

    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.timer.remaining(now)
    }

    //
    // ─── PERSISTENCE ───────────────────────────────────────────────────────────
    //

    /// Hand the summary to `recorder`.
    ///
    /// Returns the stored id without calling the recorder again once a
    /// previous attempt succeeded. A failure is kept as
    /// `PersistenceState::Failed`; the summary stays available for a retry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` before completion and
    /// `SessionError::Storage` when the recorder fails.
    pub async fn persist_summary(
        &mut self,
        recorder: &dyn ResultRecorder,
        now: DateTime<Utc>,
    ) -> Result<ResultId, SessionError> {
        if let PersistenceState::Stored { id } = self.persistence {
            return Ok(id);
        }
        let summary = self.summary.as_ref().ok_or(SessionError::NotCompleted)?;

        match recorder.persist(summary).await {
            Ok(id) => {
                self.persistence = PersistenceState::Stored { id };
                self.publish(now);
                tracing::info!(session = %self.id, id, "result stored");
                Ok(id)
            }
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "failed to store result; summary kept for retry");
                self.persistence = PersistenceState::Failed {
                    message: err.to_string(),
                };
                self.publish(now);
                Err(err.into())
            }
        }
    }

    //
    // ─── VIEW ──────────────────────────────────────────────────────────────────
    //

    /// Current read-only state.
    ///
    /// Counters follow the summary once completed, so unseen items show as
    /// incorrect in graded mode after the fact.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let (per_item_status, score) = match &self.summary {
            Some(summary) => (
                summary
                    .per_item_outcomes()
                    .iter()
                    .map(|o| o.outcome)
                    .collect(),
                *summary.score(),
            ),
            None => (self.progress.statuses().to_vec(), self.live_score()),
        };

        SessionSnapshot {
            session_id: self.id,
            status: self.status,
            mode: self.config.mode(),
            position: self.position,
            item_count: self.item_order.len(),
            item_ids: self.item_order.clone(),
            current_item: self.item_order.get(self.position).copied(),
            per_item_status,
            remaining_secs: self.timer.remaining(now).map(ceil_secs),
            timer_paused: self.timer.is_paused(),
            correct_count: score.correct,
            incorrect_count: score.incorrect,
            skipped_count: score.skipped,
            unanswered_count: score.unanswered,
            completion_percentage: self.progress.completion_percentage(),
            completion_reason: self.completion_reason,
            persistence: self.persistence.clone(),
        }
    }

    /// Change notifications; a new snapshot is sent after every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.notifier.subscribe()
    }

    fn live_score(&self) -> Score {
        scoring::aggregate(
            self.progress.statuses().iter().copied(),
            self.config.mode(),
            self.config.pass_threshold(),
        )
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        let statuses = self
            .item_order
            .iter()
            .map(|&id| self.outcome_of(id))
            .collect();
        self.progress = ProgressTracker::derive(statuses);
        self.publish(now);
    }

    fn publish(&self, now: DateTime<Utc>) {
        self.notifier.send_replace(self.snapshot(now));
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.config.mode()
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn item_order(&self) -> &[ItemId] {
        &self.item_order
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_order.len()
    }

    #[must_use]
    pub fn current_item(&self) -> Option<&Item> {
        self.item_order
            .get(self.position)
            .and_then(|&id| self.bank.item(id))
    }

    #[must_use]
    pub fn response(&self, item_id: ItemId) -> Option<&Response> {
        self.responses.get(&item_id)
    }

    /// Outcome recorded so far; `Unseen` when nothing was recorded.
    #[must_use]
    pub fn outcome_of(&self, item_id: ItemId) -> Outcome {
        self.responses
            .get(&item_id)
            .map_or(Outcome::Unseen, |r| r.outcome)
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        self.progress.progress()
    }

    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.progress
    }

    #[must_use]
    pub fn summary(&self) -> Option<&ResultSummary> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn persistence(&self) -> &PersistenceState {
        &self.persistence
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn completion_reason(&self) -> Option<CompletionReason> {
        self.completion_reason
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("id", &self.id)
            .field("mode", &self.config.mode())
            .field("status", &self.status)
            .field("items", &self.item_order.len())
            .field("position", &self.position)
            .field("responses", &self.responses.len())
            .field("timer", &self.timer)
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

/// Session items in bank order, truncated to the item count.
///
/// With shuffled ordering the subset is drawn at random (reproducibly for a
/// seed) and then put back into bank order.
fn select_items(bank: &QuestionBank, config: &SessionConfig) -> Vec<ItemId> {
    let order: Vec<ItemId> = bank.ordered().map(Item::id).collect();
    let count = config.effective_item_count(order.len());
    let mut picked: Vec<usize> = (0..order.len()).collect();
    if let ItemOrdering::Shuffled { seed } = config.ordering() {
        if count < order.len() {
            permute(&mut picked, seed);
            picked.truncate(count);
            picked.sort_unstable();
        }
    }
    picked.truncate(count);
    picked.into_iter().map(|i| order[i]).collect()
}

fn ceil_secs(remaining: Duration) -> u64 {
    let millis = remaining.num_milliseconds().max(0);
    u64::try_from((millis + 999) / 1000).unwrap_or(0)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
