mod config;
mod ids;
mod item;
mod response;
mod session;

pub use ids::{ItemId, ParseIdError, SessionId};

pub use config::{ConfigError, ItemOrdering, SessionConfig, SessionConfigDraft, SessionMode};
pub use item::{AnswerShape, Difficulty, Item, ItemDraft, ItemError, Locale};
pub use response::{ItemOutcome, Outcome, OutcomeError, Response, ResponseValue};
pub use session::{
    CompletionReason, ResultSummary, SessionStatus, SummaryError, SummaryHeader,
};
