//! Flashcard store: the persistence contract used by sync and review.
//!
//! # Responsibility
//! - Define CRUD, bulk and transactional operations over decks, cards and
//!   review logs as one object-safe trait.
//! - Provide two implementations selected at construction: `DirectStore`
//!   (in-process SQLite) and `WorkerStore` (SQLite owned by a worker thread
//!   reached only through request/response messages).
//!
//! # Invariants
//! - Every bulk operation commits atomically or not at all.
//! - Values crossing the store boundary are owned copies.

use crate::config::{StoreMode, StoreSettings};
use crate::db::DbError;
use crate::model::card::{Card, CardId};
use crate::model::deck::{DailyCounters, Deck, DeckId, DeckStats};
use crate::model::review::ReviewLog;
use crate::repo::card_repo::RepoError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod direct;
mod worker;

pub use direct::DirectStore;
pub use worker::WorkerStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a store implementation.
#[derive(Debug)]
pub enum StoreError {
    Repo(RepoError),
    /// Snapshot bytes could not be produced or decoded.
    Snapshot(String),
    /// The worker thread is gone or answered out of protocol.
    WorkerUnavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Snapshot(message) => write!(f, "snapshot failed: {message}"),
            Self::WorkerUnavailable(message) => write!(f, "store worker unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Snapshot(_) | Self::WorkerUnavailable(_) => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

impl StoreError {
    /// True when the error names a missing deck or card.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Repo(RepoError::DeckNotFound(_) | RepoError::CardNotFound(_))
        )
    }
}

/// Card mutations for one deck, applied in a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardChangeSet {
    pub create: Vec<Card>,
    pub update: Vec<Card>,
    pub delete: Vec<CardId>,
    /// Deck record written after the card changes, inside the same transaction.
    pub deck: Option<Deck>,
}

impl CardChangeSet {
    /// Number of card create/update/delete operations.
    pub fn operation_count(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0 && self.deck.is_none()
    }
}

/// Deck mutations produced by discovery, applied in a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckChangeSet {
    pub create: Vec<Deck>,
    pub update: Vec<Deck>,
    pub delete: Vec<DeckId>,
}

impl DeckChangeSet {
    pub fn operation_count(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0
    }
}

/// One deck moving to a new identity, with its cards' id changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckRekey {
    pub old_id: DeckId,
    /// Deck record under its new id.
    pub deck: Deck,
    /// `(old, new)` card id pairs.
    pub card_ids: Vec<(CardId, CardId)>,
}

/// Full store contents, the payload behind `export_snapshot`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub format_version: u32,
    pub decks: Vec<Deck>,
    pub cards: Vec<Card>,
    pub logs: Vec<ReviewLog>,
}

pub(crate) const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Persistence contract for decks, cards and review logs.
pub trait FlashcardStore: Send {
    fn get_deck(&self, id: DeckId) -> StoreResult<Option<Deck>>;
    fn get_decks_by_path(&self, path: &str) -> StoreResult<Vec<Deck>>;
    fn list_decks(&self) -> StoreResult<Vec<Deck>>;
    fn create_deck(&mut self, deck: &Deck) -> StoreResult<()>;
    fn update_deck(&mut self, deck: &Deck) -> StoreResult<()>;
    /// Deletes one deck with its cards and logs.
    fn delete_deck(&mut self, id: DeckId) -> StoreResult<()>;
    fn delete_decks_by_path(&mut self, path: &str) -> StoreResult<usize>;
    fn apply_deck_changes(&mut self, changes: &DeckChangeSet) -> StoreResult<()>;
    /// Applies every deck move, with its card re-keys, in one transaction.
    fn rekey_decks(&mut self, moves: &[DeckRekey]) -> StoreResult<()>;

    fn get_card(&self, id: CardId) -> StoreResult<Option<Card>>;
    fn list_cards(&self, deck_id: DeckId) -> StoreResult<Vec<Card>>;
    fn list_due_cards(&self, deck_id: DeckId, now: i64, limit: u32) -> StoreResult<Vec<Card>>;
    fn list_new_cards(&self, deck_id: DeckId, limit: u32) -> StoreResult<Vec<Card>>;
    fn apply_card_changes(&mut self, changes: &CardChangeSet) -> StoreResult<()>;
    /// Writes the rated card and appends its log atomically.
    fn record_review(&mut self, card: &Card, log: &ReviewLog) -> StoreResult<()>;
    fn list_review_logs(&self, card_id: CardId) -> StoreResult<Vec<ReviewLog>>;

    fn daily_counters(&self, deck_id: DeckId, from: i64, to: i64) -> StoreResult<DailyCounters>;
    fn card_counts(&self, deck_id: DeckId, now: i64) -> StoreResult<DeckStats>;
    fn count_all_cards(&self) -> StoreResult<u32>;

    /// Flushes pending state to durable storage.
    fn save(&mut self) -> StoreResult<()>;
    fn export_snapshot(&self) -> StoreResult<Vec<u8>>;
    /// Replaces all store contents with the snapshot.
    fn import_snapshot(&mut self, bytes: &[u8]) -> StoreResult<()>;
}

/// Opens the store implementation named by `settings.mode`.
pub fn open_store(settings: &StoreSettings) -> StoreResult<Box<dyn FlashcardStore>> {
    let direct = match settings.path.as_ref() {
        Some(path) => DirectStore::open(path)?,
        None => DirectStore::open_in_memory()?,
    };
    match settings.mode {
        StoreMode::Direct => Ok(Box::new(direct)),
        StoreMode::Worker => Ok(Box::new(WorkerStore::spawn(direct)?)),
    }
}
