//! Card (flashcard) domain model.
//!
//! # Responsibility
//! - Define the persisted card record and its memory state.
//! - Derive stable card ids from deck identity and front text.
//!
//! # Invariants
//! - `id` never changes while the card stays in the same deck.
//! - `state == New` implies `reps == 0` and no `last_reviewed_at`.
//! - `interval_minutes` is zero only for new cards.

use crate::model::deck::DeckId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Stable identifier for one card.
pub type CardId = Uuid;

const CARD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5c0f_6e2a_91d4_4b7e_8a3f_0d27_c1b9_e640);

/// Which markdown construct produced a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardShape {
    /// Heading as front, following section as back.
    HeaderParagraph,
    /// Two-column table row.
    Table,
}

impl CardShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeaderParagraph => "header_paragraph",
            Self::Table => "table",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "header_paragraph" => Some(Self::HeaderParagraph),
            "table" => Some(Self::Table),
            _ => None,
        }
    }
}

/// Memory state of a card in the review state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Review => "review",
            Self::Relearning => "relearning",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "learning" => Some(Self::Learning),
            "review" => Some(Self::Review),
            "relearning" => Some(Self::Relearning),
            _ => None,
        }
    }
}

/// Persisted flashcard with its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub deck_id: DeckId,
    pub front: String,
    pub back: String,
    pub shape: CardShape,
    pub state: CardState,
    /// Index into the learning or relearning steps while in those states.
    pub step: u32,
    /// Days until recall probability decays to ~90%.
    pub stability: f64,
    /// Bounded to `[1, 10]` once the card has been rated.
    pub difficulty: f64,
    pub interval_minutes: i64,
    /// Epoch milliseconds.
    pub due_at: i64,
    pub lapses: u32,
    pub reps: u32,
    pub last_reviewed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Card {
    /// Creates an unreviewed card due immediately.
    pub fn new(
        id: CardId,
        deck_id: DeckId,
        front: impl Into<String>,
        back: impl Into<String>,
        shape: CardShape,
        now: i64,
    ) -> Self {
        Self {
            id,
            deck_id,
            front: front.into(),
            back: back.into(),
            shape,
            state: CardState::New,
            step: 0,
            stability: 0.0,
            difficulty: 0.0,
            interval_minutes: 0,
            due_at: now,
            lapses: 0,
            reps: 0,
            last_reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Normalized front used for diffing and duplicate detection.
    pub fn normalized_front(&self) -> String {
        normalize_front(&self.front)
    }

    /// True when both cards carry identical scheduling state.
    pub fn same_memory_state(&self, other: &Card) -> bool {
        self.state == other.state
            && self.step == other.step
            && self.stability == other.stability
            && self.difficulty == other.difficulty
            && self.interval_minutes == other.interval_minutes
            && self.due_at == other.due_at
            && self.lapses == other.lapses
            && self.reps == other.reps
            && self.last_reviewed_at == other.last_reviewed_at
    }
}

/// Trims, case-folds and collapses internal whitespace.
pub fn normalize_front(front: &str) -> String {
    front
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Derives the id for the `occurrence`-th card with this exact front text.
pub fn card_id_for(deck_id: DeckId, front: &str, occurrence: u32) -> CardId {
    let mut name = format!("{deck_id}\u{1f}{}", front.trim());
    if occurrence > 0 {
        name.push_str(&format!("\u{1f}{occurrence}"));
    }
    Uuid::new_v5(&CARD_ID_NAMESPACE, name.as_bytes())
}

/// Picks the first derived id for `front` that is not already taken.
///
/// The chosen id is inserted into `taken`, so repeated calls for the same
/// front yield distinct ids in a stable order.
pub fn allocate_card_id(deck_id: DeckId, front: &str, taken: &mut HashSet<CardId>) -> CardId {
    let mut occurrence = 0;
    loop {
        let candidate = card_id_for(deck_id, front, occurrence);
        if taken.insert(candidate) {
            return candidate;
        }
        occurrence += 1;
    }
}
