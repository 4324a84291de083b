//! Deck domain model and per-deck configuration profile.
//!
//! # Invariants
//! - A deck is backed by exactly one `(path, tag)` pair.
//! - `last_synced_at` mirrors the document modification time observed by
//!   the last successful content sync, never wall-clock time.

use crate::model::validation::{validate_header_level, validate_retention, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Stable identifier for one deck.
pub type DeckId = Uuid;

const DECK_ID_NAMESPACE: Uuid = Uuid::from_u128(0x2b8e_41c7_0f5a_4d93_b6e1_7a4c_93d0_18f5);

/// Name of the profile used when a deck does not name one.
pub const DEFAULT_PROFILE_NAME: &str = "default";

/// Persisted deck record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    /// Corpus-relative document path, `/`-separated.
    pub path: String,
    /// Defining tag without the leading `#`.
    pub tag: String,
    pub profile: String,
    /// Document mtime (epoch ms) at the last successful sync.
    pub last_synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Deck {
    /// Creates a never-synced deck for one `(path, tag)` pair.
    pub fn new(path: &str, tag: &str, name: impl Into<String>, now: i64) -> Self {
        Self {
            id: deck_id_for(path, tag),
            name: name.into(),
            path: path.to_string(),
            tag: tag.to_string(),
            profile: DEFAULT_PROFILE_NAME.to_string(),
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a copy moved to another `(path, tag)` identity.
    ///
    /// Sync bookkeeping and profile carry over; only identity fields change.
    pub fn rekeyed(&self, path: &str, tag: &str, name: impl Into<String>, now: i64) -> Self {
        Self {
            id: deck_id_for(path, tag),
            name: name.into(),
            path: path.to_string(),
            tag: tag.to_string(),
            profile: self.profile.clone(),
            last_synced_at: self.last_synced_at,
            created_at: self.created_at,
            updated_at: now,
        }
    }

    /// True when `group_tag` equals this deck's tag or is an ancestor of it.
    pub fn belongs_to_group(&self, group_tag: &str) -> bool {
        let group = group_tag.trim().trim_start_matches('#').trim_end_matches('/');
        self.tag == group
            || self
                .tag
                .strip_prefix(group)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Derives a deck id from its backing document and tag.
pub fn deck_id_for(path: &str, tag: &str) -> DeckId {
    Uuid::new_v5(&DECK_ID_NAMESPACE, format!("{path}\u{1f}{tag}").as_bytes())
}

/// Human-facing deck name: the document stem, qualified by tag when one
/// document defines several decks.
pub fn deck_name_for(path: &str, tag: &str, decks_in_document: usize) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(path)
        .to_string();
    if decks_in_document > 1 {
        format!("{stem} ({tag})")
    } else {
        stem
    }
}

/// Per-deck review configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckProfile {
    pub name: String,
    /// Markdown heading level whose headings become card fronts.
    pub header_level: u8,
    pub new_cards_per_day: u32,
    pub new_cards_limit_enabled: bool,
    pub review_cards_per_day: u32,
    pub review_cards_limit_enabled: bool,
    /// Target retrievability used to derive review intervals.
    pub request_retention: f64,
}

impl Default for DeckProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROFILE_NAME.to_string(),
            header_level: 2,
            new_cards_per_day: 20,
            new_cards_limit_enabled: true,
            review_cards_per_day: 100,
            review_cards_limit_enabled: true,
            request_retention: 0.9,
        }
    }
}

impl DeckProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidSetting {
                field: "profile.name",
                message: "profile name cannot be empty".to_string(),
            });
        }
        validate_header_level(self.header_level)?;
        validate_retention(self.request_retention)?;
        Ok(())
    }
}

/// Derived deck counts; never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckStats {
    pub new_count: u32,
    pub due_count: u32,
    pub mature_count: u32,
    pub total_count: u32,
}

impl DeckStats {
    pub fn add(&mut self, other: &DeckStats) {
        self.new_count += other.new_count;
        self.due_count += other.due_count;
        self.mature_count += other.mature_count;
        self.total_count += other.total_count;
    }
}

/// Reviews performed in one deck during one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounters {
    /// Cards rated for the first time.
    pub new_reviewed: u32,
    /// Review-state cards rated.
    pub review_reviewed: u32,
}
