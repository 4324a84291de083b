//! Deck discovery and deck-record reconciliation.
//!
//! # Responsibility
//! - Find `(document, tag)` pairs whose tag is the deck prefix or nested
//!   below it.
//! - Create, rename, re-key and retire deck records to match.
//!
//! # Invariants
//! - One deck per `(path, tag)`; deck ids derive from that pair.
//! - A document that lost exactly one deck tag and gained exactly one is a
//!   tag change: the deck and its cards are re-keyed, history kept.
//! - Reconciling an unchanged corpus applies no writes.
//! - Decks of a document that could not be read are left untouched.

use crate::corpus::{CorpusError, CorpusResult, DocumentCorpus};
use crate::model::card::allocate_card_id;
use crate::model::deck::{deck_id_for, deck_name_for, Deck, DeckId};
use crate::store::{DeckChangeSet, DeckRekey, FlashcardStore, StoreResult};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};

/// One deck-defining `(document, tag)` pair found in the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckDescriptor {
    pub path: String,
    /// Lowercased tag without `#`.
    pub tag: String,
    pub name: String,
}

impl DeckDescriptor {
    pub fn deck_id(&self) -> DeckId {
        deck_id_for(&self.path, &self.tag)
    }
}

/// A document or directory whose decks could not be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub path: String,
    pub error: String,
}

/// Deck descriptors found in the corpus plus the paths discovery had to
/// skip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub descriptors: Vec<DeckDescriptor>,
    pub skipped: Vec<SkippedDocument>,
}

impl Discovery {
    /// True when `path` was skipped itself or lies below a skipped directory.
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skipped.iter().any(|skipped| {
            path == skipped.path
                || path
                    .strip_prefix(skipped.path.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Deck-record changes applied by one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryOutcome {
    pub created: Vec<DeckId>,
    pub updated: Vec<DeckId>,
    pub deleted: Vec<DeckId>,
    /// `(old, new)` deck ids moved by tag changes.
    pub rekeyed: Vec<(DeckId, DeckId)>,
}

impl RegistryOutcome {
    pub fn operation_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len() + self.rekeyed.len()
    }
}

/// True for `prefix` itself and any tag nested below it.
pub fn is_deck_tag(tag: &str, prefix: &str) -> bool {
    let tag = tag.to_lowercase();
    let prefix = prefix.trim().trim_start_matches('#').to_lowercase();
    tag == prefix
        || tag
            .strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Deck descriptors of one document, in tag order of appearance. A missing
/// document has none.
pub fn discover_document(
    corpus: &dyn DocumentCorpus,
    path: &str,
    prefix: &str,
) -> CorpusResult<Vec<DeckDescriptor>> {
    let tags = match corpus.document_tags(path) {
        Ok(tags) => tags,
        Err(CorpusError::NotFound(_)) => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut deck_tags: Vec<String> = Vec::new();
    for tag in tags {
        if !is_deck_tag(&tag, prefix) {
            continue;
        }
        let tag = tag.to_lowercase();
        if !deck_tags.contains(&tag) {
            deck_tags.push(tag);
        }
    }

    let count = deck_tags.len();
    Ok(deck_tags
        .into_iter()
        .map(|tag| DeckDescriptor {
            path: path.to_string(),
            name: deck_name_for(path, &tag, count),
            tag,
        })
        .collect())
}

/// Every deck descriptor in the corpus, in document order.
///
/// Only a corpus that cannot be listed fails. Unreadable documents and
/// directories are collected in `Discovery::skipped`.
pub fn discover_decks(corpus: &dyn DocumentCorpus, prefix: &str) -> CorpusResult<Discovery> {
    let listing = corpus.scan_documents()?;
    let mut discovery = Discovery::default();
    for (path, err) in listing.unreadable {
        discovery.skipped.push(SkippedDocument {
            path,
            error: err.to_string(),
        });
    }
    for path in listing.documents {
        match discover_document(corpus, &path, prefix) {
            Ok(found) => discovery.descriptors.extend(found),
            Err(err) => {
                warn!(
                    "event=deck_discovery module=sync status=warn path={} error={}",
                    path, err
                );
                discovery.skipped.push(SkippedDocument {
                    path,
                    error: err.to_string(),
                });
            }
        }
    }
    debug!(
        "event=deck_discovery module=sync status=ok decks={} skipped={}",
        discovery.descriptors.len(),
        discovery.skipped.len()
    );
    Ok(discovery)
}

/// Reconciles persisted decks against a full discovery result. Decks whose
/// path was skipped are neither updated nor deleted.
pub fn reconcile_decks(
    store: &mut dyn FlashcardStore,
    discovery: &Discovery,
    now: i64,
) -> StoreResult<RegistryOutcome> {
    let persisted = store
        .list_decks()?
        .into_iter()
        .filter(|deck| !discovery.is_skipped(&deck.path))
        .collect();
    reconcile(store, persisted, &discovery.descriptors, now)
}

/// Reconciles the decks of one document against its descriptors.
pub fn reconcile_document(
    store: &mut dyn FlashcardStore,
    path: &str,
    discovered: &[DeckDescriptor],
    now: i64,
) -> StoreResult<RegistryOutcome> {
    let persisted = store.get_decks_by_path(path)?;
    reconcile(store, persisted, discovered, now)
}

fn reconcile(
    store: &mut dyn FlashcardStore,
    persisted: Vec<Deck>,
    discovered: &[DeckDescriptor],
    now: i64,
) -> StoreResult<RegistryOutcome> {
    let mut wanted: BTreeMap<&str, Vec<&DeckDescriptor>> = BTreeMap::new();
    for descriptor in discovered {
        wanted.entry(descriptor.path.as_str()).or_default().push(descriptor);
    }
    let mut existing: BTreeMap<String, Vec<Deck>> = BTreeMap::new();
    for deck in persisted {
        existing.entry(deck.path.clone()).or_default().push(deck);
    }

    let mut changes = DeckChangeSet::default();
    let mut rekeys = Vec::new();
    let mut handled: HashSet<DeckId> = HashSet::new();

    for (path, decks) in &existing {
        let descriptors = wanted.get(path.as_str()).cloned().unwrap_or_default();
        let lost: Vec<&Deck> = decks
            .iter()
            .filter(|deck| !descriptors.iter().any(|d| d.tag == deck.tag))
            .collect();
        let gained: Vec<&DeckDescriptor> = descriptors
            .iter()
            .copied()
            .filter(|d| !decks.iter().any(|deck| deck.tag == d.tag))
            .collect();

        if let ([old], [target]) = (lost.as_slice(), gained.as_slice()) {
            let moved = old.rekeyed(&target.path, &target.tag, target.name.clone(), now);
            info!(
                "event=deck_tag_changed module=sync status=ok path={} old_tag={} new_tag={}",
                path, old.tag, target.tag
            );
            handled.insert(moved.id);
            rekeys.push(plan_rekey(&*store, old, moved)?);
        } else {
            changes.delete.extend(lost.iter().map(|deck| deck.id));
        }

        for deck in decks {
            handled.insert(deck.id);
            let Some(descriptor) = descriptors.iter().find(|d| d.tag == deck.tag) else {
                continue;
            };
            if deck.name != descriptor.name {
                let mut renamed = deck.clone();
                renamed.name = descriptor.name.clone();
                renamed.updated_at = now;
                changes.update.push(renamed);
            }
        }
    }

    for descriptor in discovered {
        let id = descriptor.deck_id();
        if handled.insert(id) {
            changes.create.push(Deck::new(
                &descriptor.path,
                &descriptor.tag,
                descriptor.name.clone(),
                now,
            ));
        }
    }

    let outcome = RegistryOutcome {
        created: changes.create.iter().map(|deck| deck.id).collect(),
        updated: changes.update.iter().map(|deck| deck.id).collect(),
        deleted: changes.delete.clone(),
        rekeyed: rekeys
            .iter()
            .map(|rekey| (rekey.old_id, rekey.deck.id))
            .collect(),
    };
    store.apply_deck_changes(&changes)?;
    store.rekey_decks(&rekeys)?;

    if outcome.operation_count() > 0 {
        info!(
            "event=deck_registry_reconciled module=sync status=ok created={} updated={} deleted={} rekeyed={}",
            outcome.created.len(),
            outcome.updated.len(),
            outcome.deleted.len(),
            outcome.rekeyed.len()
        );
    }
    Ok(outcome)
}

/// Builds the re-key of `old` to `target`, deriving new card ids in the
/// deck's card order.
pub(crate) fn plan_rekey(
    store: &dyn FlashcardStore,
    old: &Deck,
    target: Deck,
) -> StoreResult<DeckRekey> {
    let mut taken = HashSet::new();
    let card_ids = store
        .list_cards(old.id)?
        .into_iter()
        .map(|card| (card.id, allocate_card_id(target.id, &card.front, &mut taken)))
        .collect();
    Ok(DeckRekey {
        old_id: old.id,
        deck: target,
        card_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::{discover_decks, is_deck_tag, reconcile_decks, Discovery, SkippedDocument};
    use crate::corpus::MemoryCorpus;
    use crate::model::deck::deck_id_for;
    use crate::store::{DirectStore, FlashcardStore};

    #[test]
    fn deck_tags_are_prefix_or_nested() {
        assert!(is_deck_tag("flashcards", "flashcards"));
        assert!(is_deck_tag("Flashcards/Spanish", "#flashcards"));
        assert!(!is_deck_tag("flashcardsx", "flashcards"));
        assert!(!is_deck_tag("notes", "flashcards"));
    }

    #[test]
    fn discovery_yields_one_deck_per_tag_in_document_order() {
        let corpus = MemoryCorpus::new();
        corpus.write("b.md", "#flashcards/verbs #flashcards/nouns #misc", 1);
        corpus.write("a.md", "#flashcards", 1);
        corpus.write("c.md", "nothing", 1);

        let decks = discover_decks(&corpus, "flashcards").unwrap();
        assert!(decks.skipped.is_empty());
        let pairs: Vec<(&str, &str, &str)> = decks
            .descriptors
            .iter()
            .map(|d| (d.path.as_str(), d.tag.as_str(), d.name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a.md", "flashcards", "a"),
                ("b.md", "flashcards/verbs", "b (flashcards/verbs)"),
                ("b.md", "flashcards/nouns", "b (flashcards/nouns)"),
            ]
        );
    }

    #[test]
    fn reconcile_is_idempotent_and_retires_untagged_documents() {
        let corpus = MemoryCorpus::new();
        corpus.write("a.md", "#flashcards", 1);
        corpus.write("b.md", "#flashcards", 1);
        let mut store = DirectStore::open_in_memory().unwrap();

        let found = discover_decks(&corpus, "flashcards").unwrap();
        let first = reconcile_decks(&mut store, &found, 10).unwrap();
        assert_eq!(first.created.len(), 2);
        let second = reconcile_decks(&mut store, &found, 20).unwrap();
        assert_eq!(second.operation_count(), 0);

        corpus.write("b.md", "no longer a deck", 2);
        let found = discover_decks(&corpus, "flashcards").unwrap();
        let third = reconcile_decks(&mut store, &found, 30).unwrap();
        assert_eq!(third.deleted, vec![deck_id_for("b.md", "flashcards")]);
        assert_eq!(store.list_decks().unwrap().len(), 1);
    }

    #[test]
    fn single_tag_swap_rekeys_the_deck() {
        let corpus = MemoryCorpus::new();
        corpus.write("a.md", "#flashcards/old", 1);
        let mut store = DirectStore::open_in_memory().unwrap();
        let found = discover_decks(&corpus, "flashcards").unwrap();
        reconcile_decks(&mut store, &found, 10).unwrap();

        corpus.write("a.md", "#flashcards/new", 2);
        let found = discover_decks(&corpus, "flashcards").unwrap();
        let outcome = reconcile_decks(&mut store, &found, 20).unwrap();
        let old_id = deck_id_for("a.md", "flashcards/old");
        let new_id = deck_id_for("a.md", "flashcards/new");
        assert_eq!(outcome.rekeyed, vec![(old_id, new_id)]);
        assert!(outcome.created.is_empty() && outcome.deleted.is_empty());

        let deck = store.get_deck(new_id).unwrap().unwrap();
        assert_eq!(deck.tag, "flashcards/new");
        assert_eq!(deck.created_at, 10);
        assert!(store.get_deck(old_id).unwrap().is_none());
    }

    #[test]
    fn skipped_paths_protect_their_decks() {
        let corpus = MemoryCorpus::new();
        corpus.write("a.md", "#flashcards", 1);
        corpus.write("sub/b.md", "#flashcards", 1);
        let mut store = DirectStore::open_in_memory().unwrap();
        let found = discover_decks(&corpus, "flashcards").unwrap();
        reconcile_decks(&mut store, &found, 10).unwrap();

        let partial = Discovery {
            descriptors: Vec::new(),
            skipped: vec![SkippedDocument {
                path: "sub".to_string(),
                error: "permission denied".to_string(),
            }],
        };
        assert!(partial.is_skipped("sub/b.md"));
        assert!(!partial.is_skipped("subway.md"));

        let outcome = reconcile_decks(&mut store, &partial, 20).unwrap();
        assert_eq!(outcome.deleted, vec![deck_id_for("a.md", "flashcards")]);
        assert!(store
            .get_deck(deck_id_for("sub/b.md", "flashcards"))
            .unwrap()
            .is_some());
    }
}
