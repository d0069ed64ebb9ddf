#![forbid(unsafe_code)]

pub mod error;
pub mod sessions;

pub use assess_core::Clock;
pub use sessions as session;

pub use error::{NavigationError, SessionError};

pub use sessions::{
    CardPhase, CardStep, Completion, CompletionReport, FlashcardPlayer, PersistenceState,
    ProgressTracker, QuestionCell, QuizPlayer, Recorded, ResultHistoryService, ResultListItem,
    SessionController, SessionHandle, SessionLoopService, SessionProgress, SessionSnapshot,
};
