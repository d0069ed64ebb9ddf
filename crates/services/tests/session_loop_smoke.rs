use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assess_core::model::{
    AnswerShape, CompletionReason, Difficulty, ItemDraft, ItemId, Locale, Outcome, ResponseValue,
    ResultSummary, SessionConfig, SessionStatus,
};
use assess_core::time::{ManualClock, fixed_now};
use assess_core::QuestionBank;
use services::{
    CardStep, Clock, FlashcardPlayer, PersistenceState, QuizPlayer, ResultHistoryService,
    SessionError, SessionLoopService,
};
use storage::repository::{
    InMemoryRepository, ResultId, ResultRecorder, ResultRepository, StorageError,
};

fn choice(id: u64) -> ItemDraft {
    ItemDraft {
        id: ItemId::new(id),
        locale: Locale::En,
        prompt: format!("Which option is right for case {id}?"),
        answer: AnswerShape::SingleChoice {
            options: vec!["first".into(), "second".into(), "third".into()],
            correct: 0,
        },
        difficulty: Difficulty::Medium,
        explanation: String::new(),
    }
}

fn card(id: u64) -> ItemDraft {
    ItemDraft {
        id: ItemId::new(id),
        locale: Locale::Ar,
        prompt: format!("Term {id}"),
        answer: AnswerShape::FreeText {
            expected: format!("Definition {id}"),
        },
        difficulty: Difficulty::Easy,
        explanation: String::new(),
    }
}

fn bank(drafts: impl IntoIterator<Item = ItemDraft>) -> QuestionBank {
    QuestionBank::from_drafts(drafts).unwrap()
}

/// Fails the first `failures` calls, then delegates.
struct FlakyRecorder {
    inner: InMemoryRepository,
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyRecorder {
    fn new(inner: InMemoryRepository, failures: usize) -> Self {
        Self {
            inner,
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ResultRecorder for FlakyRecorder {
    async fn persist(&self, summary: &ResultSummary) -> Result<ResultId, StorageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(StorageError::Connection("database is locked".into()));
        }
        self.inner.persist(summary).await
    }
}

#[tokio::test]
async fn flashcard_session_persists_summary() {
    let repo = InMemoryRepository::new();
    let loop_svc = SessionLoopService::new(Clock::fixed(fixed_now()), Arc::new(repo.clone()));

    let handle = loop_svc
        .start(bank((1..=3).map(card)), SessionConfig::practice(60))
        .await
        .unwrap();
    let mut player = FlashcardPlayer::new(handle).unwrap();

    player.reveal().unwrap();
    assert_eq!(player.mark_known().await.unwrap(), CardStep::Next { position: 1 });
    assert_eq!(player.skip().await.unwrap(), CardStep::Next { position: 2 });
    let CardStep::Finished(report) = player.mark_known().await.unwrap() else {
        panic!("expected the deck to finish");
    };

    assert_eq!(report.summary.percentage(), 67);
    assert_eq!(report.summary.skipped_count(), 1);
    assert_eq!(report.summary.unanswered_count(), 0);
    assert!(matches!(report.persistence, PersistenceState::Stored { .. }));

    let history = ResultHistoryService::new(Arc::new(repo));
    let items = history.list_recent(5).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].session_id, report.summary.session_id());
}

#[tokio::test]
async fn players_check_session_mode() {
    let loop_svc = SessionLoopService::new(
        Clock::fixed(fixed_now()),
        Arc::new(InMemoryRepository::new()),
    );
    let handle = loop_svc
        .start(bank((1..=2).map(card)), SessionConfig::practice(60))
        .await
        .unwrap();
    assert!(matches!(
        QuizPlayer::new(handle),
        Err(SessionError::ModeMismatch { .. })
    ));
}

#[tokio::test]
async fn quiz_grid_tracks_answers_and_navigation() {
    let loop_svc = SessionLoopService::new(
        Clock::fixed(fixed_now()),
        Arc::new(InMemoryRepository::new()),
    );
    let handle = loop_svc
        .start(bank((1..=5).map(choice)), SessionConfig::graded(600, 60))
        .await
        .unwrap();
    let quiz = QuizPlayer::new(handle).unwrap();

    quiz.choose(0).await.unwrap();
    quiz.jump_to(3).await.unwrap();
    quiz.skip_current().await.unwrap();

    let err = quiz.jump_to(99).await.unwrap_err();
    assert!(matches!(err, SessionError::Navigation(_)));

    let grid = quiz.question_grid();
    assert_eq!(grid.len(), 5);
    assert!(grid[3].is_current);
    assert_eq!(grid[0].status, Outcome::Correct);
    assert_eq!(grid[3].status, Outcome::Skipped);

    let report = quiz.submit().await.unwrap();
    assert_eq!(report.summary.correct_count(), 1);
    assert_eq!(report.summary.incorrect_count(), 3);
    assert_eq!(report.summary.percentage(), 20);
}

#[tokio::test(start_paused = true)]
async fn quiz_completes_when_time_runs_out() {
    let repo = InMemoryRepository::new();
    let clock = ManualClock::new(fixed_now());
    let loop_svc = SessionLoopService::new(Clock::manual(clock.clone()), Arc::new(repo.clone()));

    let handle = loop_svc
        .start(bank((1..=3).map(choice)), SessionConfig::graded(60, 50))
        .await
        .unwrap();
    let quiz = QuizPlayer::new(handle.clone()).unwrap();
    quiz.choose(0).await.unwrap();

    clock.advance(chrono::Duration::seconds(60));
    tokio::time::advance(std::time::Duration::from_secs(60)).await;

    let mut updates = handle.subscribe();
    let snapshot = updates
        .wait_for(|s| matches!(s.persistence, PersistenceState::Stored { .. }))
        .await
        .unwrap()
        .clone();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.completion_reason, Some(CompletionReason::TimeExpired));
    assert_eq!(snapshot.incorrect_count, 2);
    assert_eq!(snapshot.unanswered_count, 0);

    let stored = repo.get_result(snapshot.session_id).await.unwrap();
    assert_eq!(stored.summary.time_spent_secs(), 60);

    let report = quiz.submit().await.unwrap();
    assert_eq!(report.summary.completion_reason(), CompletionReason::TimeExpired);
    assert_eq!(repo.len().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn practice_expiry_leaves_unattended_cards_unseen() {
    let repo = InMemoryRepository::new();
    let clock = ManualClock::new(fixed_now());
    let loop_svc = SessionLoopService::new(Clock::manual(clock.clone()), Arc::new(repo.clone()));

    let config = SessionConfig::practice(60).with_time_limit_secs(30);
    let handle = loop_svc.start(bank((1..=3).map(card)), config).await.unwrap();
    handle
        .record_response(ItemId::new(1), ResponseValue::SelfAssessed(true))
        .await
        .unwrap();

    clock.advance(chrono::Duration::seconds(30));
    tokio::time::advance(std::time::Duration::from_secs(30)).await;

    let mut updates = handle.subscribe();
    let snapshot = updates
        .wait_for(|s| matches!(s.persistence, PersistenceState::Stored { .. }))
        .await
        .unwrap()
        .clone();
    assert_eq!(snapshot.completion_reason, Some(CompletionReason::TimeExpired));
    assert_eq!(
        snapshot.per_item_status,
        vec![Outcome::Correct, Outcome::Unseen, Outcome::Unseen]
    );
    assert_eq!(snapshot.unanswered_count, 2);
    assert_eq!(snapshot.incorrect_count, 0);

    let stored = repo.get_result(snapshot.session_id).await.unwrap();
    assert_eq!(stored.summary.percentage(), 100);
    assert_eq!(stored.summary.unanswered_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn paused_practice_timer_stops_counting_down() {
    let clock = ManualClock::new(fixed_now());
    let loop_svc = SessionLoopService::new(
        Clock::manual(clock.clone()),
        Arc::new(InMemoryRepository::new()),
    );
    let config = SessionConfig::practice(60).with_time_limit_secs(60);
    let handle = loop_svc.start(bank((1..=2).map(card)), config).await.unwrap();

    clock.advance(chrono::Duration::seconds(10));
    handle.pause_timer().await.unwrap();
    assert!(matches!(
        handle.pause_timer().await,
        Err(SessionError::Timer(_))
    ));

    clock.advance(chrono::Duration::seconds(100));
    tokio::time::advance(std::time::Duration::from_secs(100)).await;
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::InProgress);
    assert!(snapshot.timer_paused);
    assert_eq!(snapshot.remaining_secs, Some(50));

    handle.resume_timer().await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.timer_paused);
    assert_eq!(snapshot.remaining_secs, Some(50));

    clock.advance(chrono::Duration::seconds(50));
    tokio::time::advance(std::time::Duration::from_secs(50)).await;
    let mut updates = handle.subscribe();
    let snapshot = updates
        .wait_for(|s| s.is_terminal())
        .await
        .unwrap()
        .clone();
    assert_eq!(snapshot.completion_reason, Some(CompletionReason::TimeExpired));
}

#[tokio::test(start_paused = true)]
async fn graded_timer_cannot_be_paused_through_handle() {
    let loop_svc = SessionLoopService::new(
        Clock::manual(ManualClock::new(fixed_now())),
        Arc::new(InMemoryRepository::new()),
    );
    let handle = loop_svc
        .start(bank((1..=2).map(choice)), SessionConfig::graded(60, 50))
        .await
        .unwrap();
    assert!(matches!(
        handle.pause_timer().await,
        Err(SessionError::Timer(_))
    ));
    assert!(!handle.snapshot().await.unwrap().timer_paused);
}

#[tokio::test(start_paused = true)]
async fn command_after_deadline_sees_expired_session() {
    let repo = InMemoryRepository::new();
    let clock = ManualClock::new(fixed_now());
    let loop_svc = SessionLoopService::new(Clock::manual(clock.clone()), Arc::new(repo.clone()));
    let handle = loop_svc
        .start(bank((1..=2).map(choice)), SessionConfig::graded(30, 50))
        .await
        .unwrap();

    clock.advance(chrono::Duration::seconds(45));
    let recorded = handle
        .record_response(ItemId::new(1), ResponseValue::Choice(0))
        .await
        .unwrap();
    assert_eq!(recorded, services::Recorded::Ignored);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.completion_reason, Some(CompletionReason::TimeExpired));
    let stored = repo.get_result(snapshot.session_id).await.unwrap();
    assert_eq!(stored.summary.time_spent_secs(), 30);
}

#[tokio::test(start_paused = true)]
async fn manual_submit_racing_expiry_completes_once() {
    let repo = InMemoryRepository::new();
    let recorder = Arc::new(FlakyRecorder::new(repo.clone(), 0));
    let clock = ManualClock::new(fixed_now());
    let loop_svc = SessionLoopService::new(Clock::manual(clock.clone()), recorder.clone());

    let handle = loop_svc
        .start(bank((1..=2).map(choice)), SessionConfig::graded(30, 50))
        .await
        .unwrap();

    clock.advance(chrono::Duration::seconds(30));
    tokio::time::advance(std::time::Duration::from_secs(30)).await;
    let first = handle.complete().await.unwrap();
    let second = handle.complete().await.unwrap();

    assert_eq!(first.summary, second.summary);
    assert_eq!(recorder.calls(), 1);
    assert_eq!(repo.len().unwrap(), 1);
}

#[tokio::test]
async fn failed_persist_keeps_summary_for_retry() {
    let repo = InMemoryRepository::new();
    let recorder = Arc::new(FlakyRecorder::new(repo.clone(), 1));
    let loop_svc = SessionLoopService::new(Clock::fixed(fixed_now()), recorder.clone());

    let handle = loop_svc
        .start(bank((1..=2).map(choice)), SessionConfig::graded(0, 50))
        .await
        .unwrap();
    handle
        .record_response(ItemId::new(1), ResponseValue::Choice(0))
        .await
        .unwrap();

    let report = handle.complete().await.unwrap();
    assert!(report.needs_retry());
    assert_eq!(repo.len().unwrap(), 0);
    assert_eq!(handle.latest().status, SessionStatus::Completed);

    let again = handle.complete().await.unwrap();
    assert_eq!(again.summary, report.summary);
    assert_eq!(recorder.calls(), 1);

    let id = handle.retry_persist().await.unwrap();
    assert_eq!(handle.retry_persist().await.unwrap(), id);
    assert_eq!(recorder.calls(), 2);
    assert_eq!(repo.len().unwrap(), 1);
    assert_eq!(handle.latest().persistence, PersistenceState::Stored { id });
}

#[tokio::test]
async fn reset_gives_a_new_attempt_after_completion() {
    let repo = InMemoryRepository::new();
    let loop_svc = SessionLoopService::new(Clock::fixed(fixed_now()), Arc::new(repo.clone()));
    let handle = loop_svc
        .start(bank((1..=2).map(choice)), SessionConfig::graded(0, 50))
        .await
        .unwrap();

    let first = handle.complete().await.unwrap();
    handle.reset().await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::InProgress);
    assert_ne!(snapshot.session_id, first.summary.session_id());

    handle.complete().await.unwrap();
    assert_eq!(repo.len().unwrap(), 2);
}
