mod adapters;
mod controller;
mod progress;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::{NavigationError, SessionError};
pub use adapters::{CardPhase, CardStep, FlashcardPlayer, QuestionCell, QuizPlayer};
pub use controller::{Completion, Recorded, SessionController};
pub use progress::{ProgressTracker, SessionProgress};
pub use view::{PersistenceState, ResultHistoryService, ResultListItem, SessionSnapshot};
pub use workflow::{CompletionReport, SessionHandle, SessionLoopService};
