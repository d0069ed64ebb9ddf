use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use assess_core::bank::QuestionBank;
use assess_core::model::{
    CompletionReason, Item, ItemId, ResponseValue, ResultSummary, SessionConfig,
    SessionConfigDraft,
};
use storage::repository::{ResultId, ResultRecorder};

use super::controller::{Completion, Recorded, SessionController};
use super::view::{PersistenceState, SessionSnapshot};
use crate::Clock;
use crate::error::SessionError;

const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Summary plus where it stands with the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub summary: ResultSummary,
    pub persistence: PersistenceState,
}

impl CompletionReport {
    /// True when the summary still needs to be (re)submitted.
    #[must_use]
    pub fn needs_retry(&self) -> bool {
        matches!(self.persistence, PersistenceState::Failed { .. })
    }
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Record {
        item_id: ItemId,
        value: ResponseValue,
        reply: Reply<Result<Recorded, SessionError>>,
    },
    Skip {
        item_id: ItemId,
        reply: Reply<Result<Recorded, SessionError>>,
    },
    GoTo {
        index: usize,
        reply: Reply<Result<usize, SessionError>>,
    },
    Next {
        reply: Reply<Result<usize, SessionError>>,
    },
    Previous {
        reply: Reply<Result<usize, SessionError>>,
    },
    Shuffle {
        seed: Option<u64>,
        reply: Reply<bool>,
    },
    Complete {
        reply: Reply<Result<CompletionReport, SessionError>>,
    },
    Reset {
        reply: Reply<()>,
    },
    Abandon {
        reply: Reply<bool>,
    },
    PauseTimer {
        reply: Reply<Result<(), SessionError>>,
    },
    ResumeTimer {
        reply: Reply<Result<(), SessionError>>,
    },
    RetryPersist {
        reply: Reply<Result<ResultId, SessionError>>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    TimerFired {
        epoch: u64,
    },
}

/// Starts sessions on the tokio runtime and wires them to a result recorder.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    recorder: Arc<dyn ResultRecorder>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(clock: Clock, recorder: Arc<dyn ResultRecorder>) -> Self {
        Self { clock, recorder }
    }

    /// Start a session and spawn the task that owns it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfig` for an empty bank.
    pub async fn start(
        &self,
        bank: QuestionBank,
        config: SessionConfig,
    ) -> Result<SessionHandle, SessionError> {
        let controller = SessionController::start(bank.clone(), config, self.clock.now())?;
        let snapshots = controller.subscribe();
        let (commands, inbox) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

        let mut actor = SessionActor {
            controller,
            clock: self.clock.clone(),
            recorder: Arc::clone(&self.recorder),
            commands: commands.downgrade(),
            scheduled: None,
        };
        actor.sync_timer();
        tokio::spawn(actor.run(inbox));

        Ok(SessionHandle {
            commands,
            snapshots,
            bank,
        })
    }

    /// Validate a raw config, then [`SessionLoopService::start`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfig` for invalid settings.
    pub async fn start_from_draft(
        &self,
        bank: QuestionBank,
        draft: SessionConfigDraft,
    ) -> Result<SessionHandle, SessionError> {
        let config = draft.validate()?;
        self.start(bank, config).await
    }
}

//
// ─── ACTOR ─────────────────────────────────────────────────────────────────────
//

struct ScheduledCheck {
    epoch: u64,
    task: JoinHandle<()>,
}

/// Owns the controller. Commands and timer expiries share one queue, so a
/// manual submit and an expiry arriving together still complete once.
struct SessionActor {
    controller: SessionController,
    clock: Clock,
    recorder: Arc<dyn ResultRecorder>,
    commands: mpsc::WeakSender<Command>,
    scheduled: Option<ScheduledCheck>,
}

impl SessionActor {
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>) {
        while let Some(command) = inbox.recv().await {
            self.handle(command).await;
            self.sync_timer();
        }
        if let Some(check) = self.scheduled.take() {
            check.task.abort();
        }
        tracing::debug!(session = %self.controller.id(), "session runner stopped");
    }

    async fn handle(&mut self, command: Command) {
        let now = self.clock.now();
        if !matches!(command, Command::TimerFired { .. }) {
            // The sleeping check may not have been delivered yet.
            let expired = self.controller.check_deadline(now);
            self.finish_expired(expired).await;
        }
        match command {
            Command::Record {
                item_id,
                value,
                reply,
            } => {
                let _ = reply.send(self.controller.record_response(item_id, value, now));
            }
            Command::Skip { item_id, reply } => {
                let _ = reply.send(self.controller.mark_skip(item_id, now));
            }
            Command::GoTo { index, reply } => {
                let _ = reply.send(self.controller.go_to(index, now).map_err(Into::into));
            }
            Command::Next { reply } => {
                let _ = reply.send(self.controller.next(now).map_err(Into::into));
            }
            Command::Previous { reply } => {
                let _ = reply.send(self.controller.previous(now).map_err(Into::into));
            }
            Command::Shuffle { seed, reply } => {
                let _ = reply.send(self.controller.shuffle(seed, now));
            }
            Command::Complete { reply } => {
                let result = match self.controller.complete(CompletionReason::Manual, now) {
                    Ok(completion) => Ok(self.finish(completion).await),
                    Err(err) => Err(err),
                };
                let _ = reply.send(result);
            }
            Command::Reset { reply } => {
                self.controller.reset(now);
                let _ = reply.send(());
            }
            Command::Abandon { reply } => {
                let _ = reply.send(self.controller.abandon(now));
            }
            Command::PauseTimer { reply } => {
                let _ = reply.send(self.controller.pause_timer(now));
            }
            Command::ResumeTimer { reply } => {
                let _ = reply.send(self.controller.resume_timer(now).map(|_| ()));
            }
            Command::RetryPersist { reply } => {
                let result = self
                    .controller
                    .persist_summary(self.recorder.as_ref(), now)
                    .await;
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.controller.snapshot(now));
            }
            Command::TimerFired { epoch } => {
                if self.scheduled.as_ref().is_some_and(|s| s.epoch == epoch) {
                    self.scheduled = None;
                }
                let expired = self.controller.on_timer_fired(epoch, now);
                self.finish_expired(expired).await;
            }
        }
    }

    async fn finish_expired(&mut self, expired: Result<Option<Completion>, SessionError>) {
        match expired {
            Ok(Some(completion)) => {
                self.finish(completion).await;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(session = %self.controller.id(), error = %err, "timed completion failed");
            }
        }
    }

    /// Persist on the first completion only; later calls report the state.
    async fn finish(&mut self, completion: Completion) -> CompletionReport {
        if completion.newly_completed {
            let now = self.clock.now();
            let _ = self
                .controller
                .persist_summary(self.recorder.as_ref(), now)
                .await;
        }
        CompletionReport {
            summary: completion.summary,
            persistence: self.controller.persistence().clone(),
        }
    }

    /// Keep exactly one sleeping task per live timer epoch.
    fn sync_timer(&mut self) {
        let ticket = self.controller.timer_ticket();
        let current = self.scheduled.as_ref().map(|s| s.epoch);
        if ticket.map(|t| t.epoch) == current {
            return;
        }

        if let Some(check) = self.scheduled.take() {
            check.task.abort();
        }
        let Some(ticket) = ticket else {
            return;
        };

        let commands = self.commands.clone();
        let clock = self.clock.clone();
        let task = tokio::spawn(async move {
            let wait = (ticket.deadline - clock.now())
                .to_std()
                .unwrap_or_default();
            tokio::time::sleep(wait).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands
                    .send(Command::TimerFired {
                        epoch: ticket.epoch,
                    })
                    .await;
            }
        });
        self.scheduled = Some(ScheduledCheck {
            epoch: ticket.epoch,
            task,
        });
    }
}

//
// ─── HANDLE ────────────────────────────────────────────────────────────────────
//

/// Cloneable host-side handle to a running session.
///
/// Dropping every handle stops the runner without abandoning the session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    bank: QuestionBank,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// # Errors
    ///
    /// See [`SessionController::record_response`]; `SessionError::Closed`
    /// when the runner has stopped.
    pub async fn record_response(
        &self,
        item_id: ItemId,
        value: ResponseValue,
    ) -> Result<Recorded, SessionError> {
        self.request(|reply| Command::Record {
            item_id,
            value,
            reply,
        })
        .await?
    }

    /// # Errors
    ///
    /// See [`SessionController::mark_skip`].
    pub async fn mark_skip(&self, item_id: ItemId) -> Result<Recorded, SessionError> {
        self.request(|reply| Command::Skip { item_id, reply })
            .await?
    }

    /// # Errors
    ///
    /// Returns `SessionError::Navigation` for rejected moves.
    pub async fn go_to(&self, index: usize) -> Result<usize, SessionError> {
        self.request(|reply| Command::GoTo { index, reply }).await?
    }

    /// # Errors
    ///
    /// Returns `SessionError::Navigation` on the last item.
    pub async fn next(&self) -> Result<usize, SessionError> {
        self.request(|reply| Command::Next { reply }).await?
    }

    /// # Errors
    ///
    /// Returns `SessionError::Navigation` on the first item.
    pub async fn previous(&self) -> Result<usize, SessionError> {
        self.request(|reply| Command::Previous { reply }).await?
    }

    /// # Errors
    ///
    /// Returns `SessionError::Closed` when the runner has stopped.
    pub async fn shuffle(&self, seed: Option<u64>) -> Result<bool, SessionError> {
        self.request(|reply| Command::Shuffle { seed, reply }).await
    }

    /// Submit the session. The first call persists the summary.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Abandoned` for abandoned sessions.
    pub async fn complete(&self) -> Result<CompletionReport, SessionError> {
        self.request(|reply| Command::Complete { reply }).await?
    }

    /// # Errors
    ///
    /// Returns `SessionError::Closed` when the runner has stopped.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Closed` when the runner has stopped.
    pub async fn abandon(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::Abandon { reply }).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Timer` in graded mode or when nothing is running.
    pub async fn pause_timer(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::PauseTimer { reply }).await?
    }

    /// # Errors
    ///
    /// Returns `SessionError::Timer` in graded mode or when not paused.
    pub async fn resume_timer(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::ResumeTimer { reply }).await?
    }

    /// Re-submit a summary whose first persist failed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` before completion and
    /// `SessionError::Storage` if the recorder fails again.
    pub async fn retry_persist(&self) -> Result<ResultId, SessionError> {
        self.request(|reply| Command::RetryPersist { reply }).await?
    }

    /// Fresh snapshot with the remaining time computed now.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` when the runner has stopped.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Last published snapshot, without a round trip.
    #[must_use]
    pub fn latest(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Change notifications.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    #[must_use]
    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.bank.item(id)
    }

    /// Item at the current position according to the last snapshot.
    #[must_use]
    pub fn current_item(&self) -> Option<&Item> {
        let id = self.snapshots.borrow().current_item?;
        self.bank.item(id)
    }
}
