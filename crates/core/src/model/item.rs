use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::ItemId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ItemError {
    #[error("item {0}: prompt cannot be empty")]
    EmptyPrompt(ItemId),

    #[error("item {0}: single-choice item needs at least one option")]
    NoOptions(ItemId),

    #[error("item {id}: option {index} cannot be empty")]
    EmptyOption { id: ItemId, index: usize },

    #[error("item {id}: correct option {index} is out of range for {len} options")]
    CorrectOptionOutOfRange { id: ItemId, index: usize, len: usize },

    #[error("item {0}: expected free-text answer cannot be empty")]
    EmptyExpectedAnswer(ItemId),
}

//
// ─── TAGS ──────────────────────────────────────────────────────────────────────
//

/// Language an item's text was resolved to by the content supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ar,
}

impl Locale {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ar => "ar",
        }
    }

    /// Arabic content is laid out right-to-left.
    #[must_use]
    pub fn is_rtl(self) -> bool {
        matches!(self, Locale::Ar)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

//
// ─── ANSWER SHAPE ──────────────────────────────────────────────────────────────
//

/// How a response to an item is judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerShape {
    /// Pick exactly one of `options`; `correct` is a zero-based index.
    SingleChoice { options: Vec<String>, correct: usize },
    /// True/false statement.
    Boolean { correct: bool },
    /// Typed answer compared trimmed and case-folded against `expected`.
    FreeText { expected: String },
}

//
// ─── ITEM ──────────────────────────────────────────────────────────────────────
//

/// Unvalidated item as delivered by a content supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub id: ItemId,
    #[serde(default)]
    pub locale: Locale,
    pub prompt: String,
    pub answer: AnswerShape,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub explanation: String,
}

impl ItemDraft {
    /// Validate the draft into an immutable `Item`.
    ///
    /// # Errors
    ///
    /// Returns `ItemError` when the prompt is blank or the answer shape is
    /// unusable (no options, blank option, correct index out of range, blank
    /// expected text).
    pub fn validate(self) -> Result<Item, ItemError> {
        let id = self.id;
        if self.prompt.trim().is_empty() {
            return Err(ItemError::EmptyPrompt(id));
        }

        match &self.answer {
            AnswerShape::SingleChoice { options, correct } => {
                if options.is_empty() {
                    return Err(ItemError::NoOptions(id));
                }
                if let Some(index) = options.iter().position(|o| o.trim().is_empty()) {
                    return Err(ItemError::EmptyOption { id, index });
                }
                if *correct >= options.len() {
                    return Err(ItemError::CorrectOptionOutOfRange {
                        id,
                        index: *correct,
                        len: options.len(),
                    });
                }
            }
            AnswerShape::FreeText { expected } if expected.trim().is_empty() => {
                return Err(ItemError::EmptyExpectedAnswer(id));
            }
            AnswerShape::Boolean { .. } | AnswerShape::FreeText { .. } => {}
        }

        Ok(Item {
            id,
            locale: self.locale,
            prompt: self.prompt,
            answer: self.answer,
            difficulty: self.difficulty,
            explanation: self.explanation,
        })
    }
}

/// A single question or prompt/answer pair. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    id: ItemId,
    locale: Locale,
    prompt: String,
    answer: AnswerShape,
    difficulty: Difficulty,
    explanation: String,
}

impl Item {
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    #[must_use]
    pub fn locale(&self) -> Locale {
        self.locale
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn answer(&self) -> &AnswerShape {
        &self.answer
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    /// Options for single-choice items, empty otherwise.
    #[must_use]
    pub fn options(&self) -> &[String] {
        match &self.answer {
            AnswerShape::SingleChoice { options, .. } => options,
            _ => &[],
        }
    }

    /// Human-readable correct answer, shown on the back of a flashcard.
    #[must_use]
    pub fn correct_answer_text(&self) -> String {
        match &self.answer {
            AnswerShape::SingleChoice { options, correct } => {
                options.get(*correct).cloned().unwrap_or_default()
            }
            AnswerShape::Boolean { correct } => correct.to_string(),
            AnswerShape::FreeText { expected } => expected.clone(),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
