use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("number of items cannot be negative, got {0}")]
    NegativeItemCount(i64),

    #[error("time limit cannot be negative, got {0}s")]
    NegativeTimeLimit(i64),

    #[error("pass threshold must be between 0 and 100, got {0}")]
    PassThresholdOutOfRange(i64),

    #[error("question bank has no items")]
    EmptyBank,
}

//
// ─── MODE ──────────────────────────────────────────────────────────────────────
//

/// Which flavour of session is running.
///
/// The mode decides how unanswered items are scored at completion and whether
/// the timer may be paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Exam-style quiz. Unanswered items count as incorrect; timer never pauses.
    #[default]
    GradedTimed,
    /// Flashcard review. Unanswered items stay unseen and leave the denominator.
    SelfPacedPractice,
}

impl SessionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::GradedTimed => "graded_timed",
            SessionMode::SelfPacedPractice => "self_paced_practice",
        }
    }

    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "graded_timed" | "graded" | "quiz" => Some(Self::GradedTimed),
            "self_paced_practice" | "practice" | "flashcards" => Some(Self::SelfPacedPractice),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_graded(self) -> bool {
        matches!(self, SessionMode::GradedTimed)
    }
}

/// Initial ordering of the selected items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemOrdering {
    #[default]
    Original,
    Shuffled {
        #[serde(default)]
        seed: Option<u64>,
    },
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Host-supplied session settings before validation.
///
/// Signed fields so that malformed input from a config file or request can be
/// reported instead of silently wrapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfigDraft {
    /// 0 means the whole bank.
    pub number_of_items: i64,
    /// 0 means untimed.
    pub time_limit_secs: i64,
    pub pass_threshold: i64,
    pub mode: SessionMode,
    pub ordering: ItemOrdering,
}

impl Default for SessionConfigDraft {
    fn default() -> Self {
        Self {
            number_of_items: 0,
            time_limit_secs: 0,
            pass_threshold: 60,
            mode: SessionMode::GradedTimed,
            ordering: ItemOrdering::Original,
        }
    }
}

impl SessionConfigDraft {
    /// # Errors
    ///
    /// Returns `ConfigError` for negative counts or limits and for a pass
    /// threshold outside 0..=100.
    pub fn validate(self) -> Result<SessionConfig, ConfigError> {
        let number_of_items = u32::try_from(self.number_of_items)
            .map_err(|_| ConfigError::NegativeItemCount(self.number_of_items))?;
        let time_limit_secs = u32::try_from(self.time_limit_secs)
            .map_err(|_| ConfigError::NegativeTimeLimit(self.time_limit_secs))?;
        let pass_threshold = u8::try_from(self.pass_threshold)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or(ConfigError::PassThresholdOutOfRange(self.pass_threshold))?;

        Ok(SessionConfig {
            number_of_items,
            time_limit_secs,
            pass_threshold,
            mode: self.mode,
            ordering: self.ordering,
        })
    }
}

/// Validated session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    number_of_items: u32,
    time_limit_secs: u32,
    pass_threshold: u8,
    mode: SessionMode,
    ordering: ItemOrdering,
}

impl SessionConfig {
    /// Timed exam over the whole bank.
    #[must_use]
    pub fn graded(time_limit_secs: u32, pass_threshold: u8) -> Self {
        Self {
            number_of_items: 0,
            time_limit_secs,
            pass_threshold: pass_threshold.min(100),
            mode: SessionMode::GradedTimed,
            ordering: ItemOrdering::Original,
        }
    }

    /// Untimed flashcard review over the whole bank.
    #[must_use]
    pub fn practice(pass_threshold: u8) -> Self {
        Self {
            number_of_items: 0,
            time_limit_secs: 0,
            pass_threshold: pass_threshold.min(100),
            mode: SessionMode::SelfPacedPractice,
            ordering: ItemOrdering::Original,
        }
    }

    #[must_use]
    pub fn with_ordering(mut self, ordering: ItemOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    #[must_use]
    pub fn with_number_of_items(mut self, number_of_items: u32) -> Self {
        self.number_of_items = number_of_items;
        self
    }

    #[must_use]
    pub fn with_time_limit_secs(mut self, time_limit_secs: u32) -> Self {
        self.time_limit_secs = time_limit_secs;
        self
    }

    #[must_use]
    pub fn number_of_items(&self) -> u32 {
        self.number_of_items
    }

    /// Items actually drawn from a bank of `bank_len` items.
    #[must_use]
    pub fn effective_item_count(&self, bank_len: usize) -> usize {
        match usize::try_from(self.number_of_items) {
            Ok(0) | Err(_) => bank_len,
            Ok(n) => n.min(bank_len),
        }
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_secs
    }

    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.time_limit_secs > 0
    }

    #[must_use]
    pub fn pass_threshold(&self) -> u8 {
        self.pass_threshold
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn ordering(&self) -> ItemOrdering {
        self.ordering
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_draft_is_valid() {
        let config = SessionConfigDraft::default().validate().unwrap();
        assert_eq!(config.pass_threshold(), 60);
        assert!(!config.is_timed());
        assert_eq!(config.effective_item_count(12), 12);
    }

    #[test]
    fn negative_values_are_rejected() {
        let draft = SessionConfigDraft {
            number_of_items: -1,
            ..SessionConfigDraft::default()
        };
        assert_eq!(draft.validate().unwrap_err(), ConfigError::NegativeItemCount(-1));

        let draft = SessionConfigDraft {
            time_limit_secs: -30,
            ..SessionConfigDraft::default()
        };
        assert_eq!(draft.validate().unwrap_err(), ConfigError::NegativeTimeLimit(-30));

        let draft = SessionConfigDraft {
            pass_threshold: -5,
            ..SessionConfigDraft::default()
        };
        assert_eq!(
            draft.validate().unwrap_err(),
            ConfigError::PassThresholdOutOfRange(-5)
        );
    }

    #[test]
    fn threshold_above_hundred_is_rejected() {
        let draft = SessionConfigDraft {
            pass_threshold: 101,
            ..SessionConfigDraft::default()
        };
        assert!(matches!(
            draft.validate(),
            Err(ConfigError::PassThresholdOutOfRange(101))
        ));
    }

    #[test]
    fn item_count_is_clamped_to_bank() {
        let config = SessionConfig::graded(60, 50).with_number_of_items(10);
        assert_eq!(config.effective_item_count(4), 4);
        assert_eq!(config.effective_item_count(25), 10);
    }

    #[test]
    fn draft_reads_partial_json() {
        let draft: SessionConfigDraft = serde_json::from_str(
            r#"{ "mode": "self_paced_practice", "ordering": { "kind": "shuffled", "seed": 9 } }"#,
        )
        .unwrap();
        let config = draft.validate().unwrap();
        assert_eq!(config.mode(), SessionMode::SelfPacedPractice);
        assert_eq!(config.ordering(), ItemOrdering::Shuffled { seed: Some(9) });
    }

    #[test]
    fn mode_codes_parse() {
        assert_eq!(SessionMode::parse("quiz"), Some(SessionMode::GradedTimed));
        assert_eq!(
            SessionMode::parse(SessionMode::SelfPacedPractice.as_str()),
            Some(SessionMode::SelfPacedPractice)
        );
        assert_eq!(SessionMode::parse("exam"), None);
    }
}
