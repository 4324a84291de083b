//! Per-deck content reconciliation.
//!
//! # Responsibility
//! - Decide whether a deck's document needs re-reading.
//! - Diff parsed candidates against persisted cards and apply the minimal
//!   change set in one transaction.
//! - Re-key decks and cards when their document is renamed.
//!
//! # Invariants
//! - Matching cards keep id and memory state; only text fields change.
//! - `last_synced_at` moves only together with a successful card write.
//! - Duplicate fronts are reported, never merged.

use super::registry::plan_rekey;
use super::{SyncError, SyncWarning};
use crate::config::Settings;
use crate::corpus::DocumentCorpus;
use crate::model::card::{allocate_card_id, normalize_front, Card, CardId};
use crate::model::deck::{deck_name_for, Deck, DeckId};
use crate::parser::{parse, CandidateCard};
use crate::store::{CardChangeSet, FlashcardStore};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Result of reconciling one deck.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckSyncOutcome {
    pub deck_id: DeckId,
    /// Candidates kept after the per-deck cap.
    pub parsed_count: usize,
    pub operations_count: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// True when the document was not re-read.
    pub skipped: bool,
    pub warnings: Vec<SyncWarning>,
}

/// Reconciles the cards of `deck_id` with its document.
///
/// Reads the document only when `force` is set, the deck was never
/// synced, or the document changed after `last_synced_at`.
pub fn sync_deck(
    store: &mut dyn FlashcardStore,
    corpus: &dyn DocumentCorpus,
    settings: &Settings,
    deck_id: DeckId,
    force: bool,
    now: i64,
) -> Result<DeckSyncOutcome, SyncError> {
    let deck = store
        .get_deck(deck_id)?
        .ok_or(SyncError::DeckNotFound(deck_id))?;
    sync_loaded_deck(store, corpus, settings, &deck, force, now).map_err(|err| err.in_deck(&deck))
}

fn sync_loaded_deck(
    store: &mut dyn FlashcardStore,
    corpus: &dyn DocumentCorpus,
    settings: &Settings,
    deck: &Deck,
    force: bool,
    now: i64,
) -> Result<DeckSyncOutcome, SyncError> {
    let profile = settings.profile(&deck.profile);
    let modified_at = corpus.modified_at(&deck.path)?;
    let unchanged = deck
        .last_synced_at
        .is_some_and(|synced_at| modified_at <= synced_at);
    if unchanged && !force {
        debug!(
            "event=deck_sync_skipped module=sync status=ok deck_id={} reason=unchanged",
            deck.id
        );
        return Ok(DeckSyncOutcome {
            deck_id: deck.id,
            skipped: true,
            ..DeckSyncOutcome::default()
        });
    }

    let text = corpus.read_document(&deck.path)?;
    let mut candidates = parse(&text, profile.header_level);
    let mut warnings = Vec::new();

    let limit = settings.sync.max_cards_per_deck;
    if candidates.len() > limit {
        let excess = candidates.len() - limit;
        candidates.truncate(limit);
        warn!(
            "event=deck_card_cap module=sync status=warn deck_id={} limit={} excess={}",
            deck.id, limit, excess
        );
        warnings.push(SyncWarning::CardCapExceeded {
            deck_id: deck.id,
            deck_name: deck.name.clone(),
            path: deck.path.clone(),
            limit,
            excess,
        });
    }

    let existing = store.list_cards(deck.id)?;
    let mut changes = diff_cards(deck, &existing, &candidates, now);
    if deck.last_synced_at != Some(modified_at) {
        let mut synced = deck.clone();
        synced.last_synced_at = Some(modified_at);
        synced.updated_at = now;
        changes.deck = Some(synced);
    }
    store.apply_card_changes(&changes)?;

    let cards = merged_cards(existing, &changes);
    warnings.extend(duplicate_warnings(deck, &cards));

    let outcome = DeckSyncOutcome {
        deck_id: deck.id,
        parsed_count: candidates.len(),
        operations_count: changes.operation_count(),
        created: changes.create.len(),
        updated: changes.update.len(),
        deleted: changes.delete.len(),
        skipped: false,
        warnings,
    };
    if outcome.operations_count > 0 {
        info!(
            "event=deck_synced module=sync status=ok deck_id={} parsed={} created={} updated={} deleted={}",
            deck.id, outcome.parsed_count, outcome.created, outcome.updated, outcome.deleted
        );
    }
    Ok(outcome)
}

/// Minimal card changes turning `existing` into `candidates`.
///
/// Candidates pair with persisted cards by normalized front: exact front
/// matches first, then the remaining cards of the same key in order.
pub fn diff_cards(
    deck: &Deck,
    existing: &[Card],
    candidates: &[CandidateCard],
    now: i64,
) -> CardChangeSet {
    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, card) in existing.iter().enumerate() {
        by_key.entry(card.normalized_front()).or_default().push(index);
    }

    let keys: Vec<String> = candidates
        .iter()
        .map(|candidate| normalize_front(&candidate.front))
        .collect();
    let mut matched = vec![false; existing.len()];
    let mut pairing: Vec<Option<usize>> = vec![None; candidates.len()];

    for exact in [true, false] {
        for (slot, candidate) in candidates.iter().enumerate() {
            if pairing[slot].is_some() {
                continue;
            }
            let Some(indices) = by_key.get(&keys[slot]) else {
                continue;
            };
            let found = indices.iter().copied().find(|&index| {
                !matched[index] && (!exact || existing[index].front.trim() == candidate.front.trim())
            });
            if let Some(index) = found {
                matched[index] = true;
                pairing[slot] = Some(index);
            }
        }
    }

    let mut taken: HashSet<CardId> = existing.iter().map(|card| card.id).collect();
    let mut changes = CardChangeSet::default();
    for (candidate, paired) in candidates.iter().zip(&pairing) {
        let front = candidate.front.trim();
        match paired {
            Some(index) => {
                let card = &existing[*index];
                if card.front != front || card.back != candidate.back || card.shape != candidate.shape {
                    let mut updated = card.clone();
                    updated.front = front.to_string();
                    updated.back = candidate.back.clone();
                    updated.shape = candidate.shape;
                    updated.updated_at = now;
                    changes.update.push(updated);
                }
            }
            None => changes.create.push(Card::new(
                allocate_card_id(deck.id, front, &mut taken),
                deck.id,
                front,
                candidate.back.clone(),
                candidate.shape,
                now,
            )),
        }
    }
    changes.delete = existing
        .iter()
        .zip(&matched)
        .filter(|(_, matched)| !**matched)
        .map(|(card, _)| card.id)
        .collect();
    changes
}

/// One warning per group of cards sharing a normalized front.
pub fn duplicate_warnings(deck: &Deck, cards: &[Card]) -> Vec<SyncWarning> {
    let mut groups: Vec<(String, Vec<&Card>)> = Vec::new();
    for card in cards {
        let key = card.normalized_front();
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, members)) => members.push(card),
            None => groups.push((key, vec![card])),
        }
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(_, members)| {
            warn!(
                "event=duplicate_front module=sync status=warn deck_id={} cards={}",
                deck.id,
                members.len()
            );
            SyncWarning::DuplicateFront {
                deck_id: deck.id,
                deck_name: deck.name.clone(),
                path: deck.path.clone(),
                front: members[0].front.clone(),
                card_ids: members.iter().map(|card| card.id).collect(),
            }
        })
        .collect()
}

/// Cards as persisted after `changes`: survivors in order, then creations.
fn merged_cards(existing: Vec<Card>, changes: &CardChangeSet) -> Vec<Card> {
    let deleted: HashSet<CardId> = changes.delete.iter().copied().collect();
    let updated: HashMap<CardId, &Card> = changes.update.iter().map(|card| (card.id, card)).collect();
    existing
        .into_iter()
        .filter(|card| !deleted.contains(&card.id))
        .map(|card| match updated.get(&card.id) {
            Some(update) => (*update).clone(),
            None => card,
        })
        .chain(changes.create.iter().cloned())
        .collect()
}

/// Moves every deck of `old_path` to `new_path`, re-keying decks and cards
/// in one transaction. Returns the `(old, new)` deck ids.
pub fn rename_document(
    store: &mut dyn FlashcardStore,
    old_path: &str,
    new_path: &str,
    now: i64,
) -> Result<Vec<(DeckId, DeckId)>, SyncError> {
    if old_path == new_path {
        return Ok(Vec::new());
    }
    let decks = store.get_decks_by_path(old_path)?;
    let count = decks.len();
    let mut moves = Vec::with_capacity(count);
    for deck in &decks {
        let target = deck.rekeyed(new_path, &deck.tag, deck_name_for(new_path, &deck.tag, count), now);
        moves.push(plan_rekey(&*store, deck, target)?);
    }
    store.rekey_decks(&moves)?;

    let moved: Vec<(DeckId, DeckId)> = moves.iter().map(|m| (m.old_id, m.deck.id)).collect();
    info!(
        "event=document_renamed module=sync status=ok decks={} cards={}",
        moved.len(),
        moves.iter().map(|m| m.card_ids.len()).sum::<usize>()
    );
    Ok(moved)
}
