#![forbid(unsafe_code)]

pub mod bank;
pub mod error;
pub mod model;
pub mod scoring;
pub mod time;
pub mod timer;

pub use bank::QuestionBank;
pub use error::Error;
pub use time::{Clock, ManualClock};
pub use timer::{Timer, TimerError, TimerTicket};
