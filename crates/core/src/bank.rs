//! Immutable, shareable question bank with a per-handle item order.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{SeedableRng, rng};
use thiserror::Error;

use crate::model::{Item, ItemDraft, ItemError, ItemId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BankError {
    #[error("question bank cannot be empty")]
    Empty,

    #[error("duplicate item id in question bank: {0}")]
    DuplicateItem(ItemId),

    #[error(transparent)]
    Item(#[from] ItemError),
}

#[derive(Debug)]
struct BankItems {
    items: Vec<Item>,
    index: HashMap<ItemId, usize>,
}

/// Ordered collection of items.
///
/// The items live behind an `Arc` and are never mutated, so clones are cheap
/// and can be handed to many concurrent sessions. Each clone carries its own
/// view order; [`QuestionBank::shuffle`] and
/// [`QuestionBank::reset_to_original_order`] only touch that view.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    shared: Arc<BankItems>,
    order: Vec<usize>,
}

impl QuestionBank {
    /// # Errors
    ///
    /// Returns `BankError::Empty` for no items and `BankError::DuplicateItem`
    /// when two items share an id.
    pub fn new(items: Vec<Item>) -> Result<Self, BankError> {
        if items.is_empty() {
            return Err(BankError::Empty);
        }

        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if index.insert(item.id(), i).is_some() {
                return Err(BankError::DuplicateItem(item.id()));
            }
        }

        let order = (0..items.len()).collect();
        Ok(Self {
            shared: Arc::new(BankItems { items, index }),
            order,
        })
    }

    /// Validate supplier drafts and build a bank from them.
    ///
    /// # Errors
    ///
    /// Returns the first `ItemError` encountered, or any `BankError` from [`QuestionBank::new`].
    pub fn from_drafts(drafts: impl IntoIterator<Item = ItemDraft>) -> Result<Self, BankError> {
        let items = drafts
            .into_iter()
            .map(ItemDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(items)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.items.is_empty()
    }

    /// Item at a position of the original (supplier) order.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Item> {
        self.shared.items.get(index)
    }

    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.index_of(id).and_then(|i| self.get(i))
    }

    #[must_use]
    pub fn index_of(&self, id: ItemId) -> Option<usize> {
        self.shared.index.get(&id).copied()
    }

    /// Items in the original supplier order.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.shared.items
    }

    /// Current view order as indices into [`QuestionBank::items`].
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Items in the current view order.
    pub fn ordered(&self) -> impl Iterator<Item = &Item> + '_ {
        self.order.iter().filter_map(|&i| self.get(i))
    }

    /// Permute the view order. Deterministic for a given seed.
    pub fn shuffle(&mut self, seed: Option<u64>) {
        self.order = (0..self.len()).collect();
        permute(&mut self.order, seed);
    }

    pub fn reset_to_original_order(&mut self) {
        self.order = (0..self.len()).collect();
    }

    /// True when both handles share the same underlying items.
    #[must_use]
    pub fn shares_items_with(&self, other: &QuestionBank) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// Shuffle in place.
///
/// A seed gives the same permutation for the same slice length on every run;
/// without one the thread RNG is used.
pub fn permute<T>(slice: &mut [T], seed: Option<u64>) {
    match seed {
        Some(seed) => slice.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => slice.shuffle(&mut rng()),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
