//! Corpus-to-store synchronization.
//!
//! # Responsibility
//! - `registry`: discover deck-defining tags and reconcile deck records.
//! - `deck_sync`: reconcile one deck's cards against its document.
//! - `coordinator`: run full passes single-flight and route document
//!   events and reviews.
//!
//! # Invariants
//! - Re-running a pass over unchanged documents writes nothing.
//! - Review history survives content edits, renames and tag changes.

pub mod coordinator;
pub mod deck_sync;
pub mod registry;

use crate::corpus::CorpusError;
use crate::model::card::CardId;
use crate::model::deck::{Deck, DeckId};
use crate::model::validation::ValidationError;
use crate::repo::card_repo::RepoError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error surfaced by sync and review entry points.
#[derive(Debug)]
pub enum SyncError {
    Validation(ValidationError),
    DeckNotFound(DeckId),
    CardNotFound(CardId),
    /// Another pass holds the coordinator, or the card's deck is being
    /// reconciled right now.
    AlreadyInProgress,
    /// Store failure; `context` names the deck and path when known.
    Persistence { context: String, source: StoreError },
    Corpus { context: String, source: CorpusError },
}

impl SyncError {
    /// Attaches deck name and path to persistence and corpus failures.
    pub fn in_deck(self, deck: &Deck) -> Self {
        let context = format!("deck `{}` ({})", deck.name, deck.path);
        match self {
            Self::Persistence { source, .. } => Self::Persistence { context, source },
            Self::Corpus { source, .. } => Self::Corpus { context, source },
            other => other,
        }
    }

    pub fn persistence(context: impl Into<String>, source: StoreError) -> Self {
        Self::Persistence {
            context: context.into(),
            source,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::DeckNotFound(id) => write!(f, "deck not found: {id}"),
            Self::CardNotFound(id) => write!(f, "card not found: {id}"),
            Self::AlreadyInProgress => write!(f, "a sync pass is already in progress"),
            Self::Persistence { context, source } if context.is_empty() => {
                write!(f, "store failure: {source}")
            }
            Self::Persistence { context, source } => {
                write!(f, "store failure in {context}: {source}")
            }
            Self::Corpus { context, source } if context.is_empty() => {
                write!(f, "corpus failure: {source}")
            }
            Self::Corpus { context, source } => write!(f, "corpus failure in {context}: {source}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Persistence { source, .. } => Some(source),
            Self::Corpus { source, .. } => Some(source),
            Self::DeckNotFound(_) | Self::CardNotFound(_) | Self::AlreadyInProgress => None,
        }
    }
}

impl From<ValidationError> for SyncError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Repo(RepoError::DeckNotFound(id)) => Self::DeckNotFound(id),
            StoreError::Repo(RepoError::CardNotFound(id)) => Self::CardNotFound(id),
            other => Self::persistence(String::new(), other),
        }
    }
}

impl From<CorpusError> for SyncError {
    fn from(value: CorpusError) -> Self {
        Self::Corpus {
            context: String::new(),
            source: value,
        }
    }
}

/// Non-blocking finding reported by a deck sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncWarning {
    /// Several cards in one deck share a normalized front.
    DuplicateFront {
        deck_id: DeckId,
        deck_name: String,
        path: String,
        front: String,
        card_ids: Vec<CardId>,
    },
    /// The document yields more cards than the per-deck cap.
    CardCapExceeded {
        deck_id: DeckId,
        deck_name: String,
        path: String,
        limit: usize,
        excess: usize,
    },
    /// A document or directory could not be read; its decks were left as
    /// they were.
    DocumentSkipped { path: String, error: String },
}

impl Display for SyncWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateFront {
                deck_name,
                path,
                front,
                card_ids,
                ..
            } => write!(
                f,
                "deck `{deck_name}` ({path}) has {} cards with front `{front}`",
                card_ids.len()
            ),
            Self::CardCapExceeded {
                deck_name,
                path,
                limit,
                excess,
                ..
            } => write!(
                f,
                "deck `{deck_name}` ({path}) exceeds {limit} cards; {excess} dropped"
            ),
            Self::DocumentSkipped { path, error } => {
                write!(f, "`{path}` skipped, its decks are unchanged: {error}")
            }
        }
    }
}
