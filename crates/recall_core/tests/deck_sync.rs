use recall_core::model::deck::deck_id_for;
use recall_core::sync::deck_sync::{rename_document, sync_deck, DeckSyncOutcome};
use recall_core::sync::registry::{discover_decks, reconcile_decks};
use recall_core::{
    Card, DeckProfile, DirectStore, FlashcardStore, MemoryCorpus, Rating, Scheduler, Settings,
    SyncWarning,
};

const T0: i64 = 1_700_000_000_000;

struct Harness {
    store: DirectStore,
    corpus: MemoryCorpus,
    settings: Settings,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: DirectStore::open_in_memory().unwrap(),
            corpus: MemoryCorpus::new(),
            settings: Settings::default(),
        }
    }

    fn write(&self, path: &str, tags: &str, body: &str, modified_at: i64) {
        self.corpus
            .write(path, format!("---\ntags: [{tags}]\n---\n{body}"), modified_at);
    }

    fn sync(&mut self, force: bool, now: i64) -> Vec<DeckSyncOutcome> {
        let prefix = self.settings.sync.deck_tag_prefix.clone();
        let found = discover_decks(&self.corpus, &prefix).unwrap();
        reconcile_decks(&mut self.store, &found, now).unwrap();
        found
            .descriptors
            .iter()
            .map(|descriptor| {
                sync_deck(
                    &mut self.store,
                    &self.corpus,
                    &self.settings,
                    descriptor.deck_id(),
                    force,
                    now,
                )
                .unwrap()
            })
            .collect()
    }

    fn cards(&self, path: &str, tag: &str) -> Vec<Card> {
        self.store.list_cards(deck_id_for(path, tag)).unwrap()
    }

    fn card(&self, path: &str, tag: &str, front: &str) -> Card {
        self.cards(path, tag)
            .into_iter()
            .find(|card| card.front == front)
            .unwrap()
    }

    fn review(&mut self, card: &Card, rating: Rating, now: i64) -> Card {
        let scheduler = Scheduler::new(self.settings.scheduler.clone());
        let (next, log) = scheduler
            .rate(card, rating, now, None, &DeckProfile::default())
            .unwrap();
        self.store.record_review(&next, &log).unwrap();
        next
    }
}

#[test]
fn unchanged_document_is_skipped_and_force_writes_nothing() {
    let mut h = Harness::new();
    h.write("a.md", "flashcards", "## Q1\nA1\n## Q2\nA2", T0);

    let first = h.sync(false, T0 + 1);
    assert_eq!(first[0].created, 2);
    assert_eq!(first[0].operations_count, 2);

    let second = h.sync(false, T0 + 2);
    assert!(second[0].skipped);
    assert_eq!(second[0].operations_count, 0);

    let forced = h.sync(true, T0 + 3);
    assert!(!forced[0].skipped);
    assert_eq!(forced[0].parsed_count, 2);
    assert_eq!(forced[0].operations_count, 0);
}

#[test]
fn back_edit_updates_in_place_and_keeps_memory_state() {
    let mut h = Harness::new();
    h.write("a.md", "flashcards", "## Q1\nA1\n## Q2\nA2", T0);
    h.sync(false, T0);
    let card = h.card("a.md", "flashcards", "Q1");
    let reviewed = h.review(&card, Rating::Good, T0 + 1_000);

    h.write("a.md", "flashcards", "## Q1\nA1 revised\n## Q2\nA2", T0 + 5_000);
    let outcome = &h.sync(false, T0 + 6_000)[0];
    assert_eq!(
        (outcome.created, outcome.updated, outcome.deleted),
        (0, 1, 0)
    );

    let after = h.store.get_card(card.id).unwrap().unwrap();
    assert_eq!(after.back, "A1 revised");
    assert!(after.same_memory_state(&reviewed));
    assert_eq!(h.store.list_review_logs(card.id).unwrap().len(), 1);
}

#[test]
fn duplicate_fronts_are_reported_and_kept() {
    let mut h = Harness::new();
    h.write("a.md", "flashcards", "## Capital?\nParis\n## capital? \nRome", T0);

    let outcome = &h.sync(false, T0)[0];
    assert_eq!(outcome.created, 2);
    assert_eq!(outcome.warnings.len(), 1);
    let cards = h.cards("a.md", "flashcards");
    match &outcome.warnings[0] {
        SyncWarning::DuplicateFront { card_ids, front, .. } => {
            assert_eq!(card_ids.len(), 2);
            assert!(cards.iter().all(|card| card_ids.contains(&card.id)));
            assert_eq!(front, "Capital?");
        }
        other => panic!("unexpected warning {other:?}"),
    }

    let forced = &h.sync(true, T0 + 1)[0];
    assert_eq!(forced.operations_count, 0);
    assert_eq!(h.cards("a.md", "flashcards").len(), 2);
}

#[test]
fn removed_sections_delete_cards_with_their_history() {
    let mut h = Harness::new();
    h.write("a.md", "flashcards", "## Q1\nA1\n## Q2\nA2", T0);
    h.sync(false, T0);
    let doomed = h.card("a.md", "flashcards", "Q1");
    h.review(&doomed, Rating::Again, T0 + 1);

    h.write("a.md", "flashcards", "## Q2\nA2", T0 + 10);
    let outcome = &h.sync(false, T0 + 10)[0];
    assert_eq!(outcome.deleted, 1);
    assert!(h.store.get_card(doomed.id).unwrap().is_none());
    assert!(h.store.list_review_logs(doomed.id).unwrap().is_empty());
}

#[test]
fn cards_past_the_cap_are_dropped_with_a_warning() {
    let mut h = Harness::new();
    h.settings.sync.max_cards_per_deck = 2;
    h.write("a.md", "flashcards", "## Q1\nA1\n## Q2\nA2\n## Q3\nA3", T0);

    let outcome = &h.sync(false, T0)[0];
    assert_eq!(outcome.parsed_count, 2);
    assert_eq!(outcome.created, 2);
    assert!(outcome.warnings.iter().any(|warning| matches!(
        warning,
        SyncWarning::CardCapExceeded { limit: 2, excess: 1, .. }
    )));
    let mut fronts: Vec<String> = h
        .cards("a.md", "flashcards")
        .into_iter()
        .map(|card| card.front)
        .collect();
    fronts.sort();
    assert_eq!(fronts, vec!["Q1", "Q2"]);
}

#[test]
fn tag_change_moves_history_to_the_new_deck() {
    let mut h = Harness::new();
    h.write("a.md", "flashcards/es", "## Hola\nHello", T0);
    h.sync(false, T0);
    let card = h.cards("a.md", "flashcards/es")[0].clone();
    h.review(&card, Rating::Good, T0 + 1);

    h.write("a.md", "flashcards/spanish", "## Hola\nHello", T0 + 10);
    let outcome = &h.sync(false, T0 + 20)[0];
    assert_eq!(outcome.operations_count, 0);

    assert!(h.cards("a.md", "flashcards/es").is_empty());
    let moved = h.cards("a.md", "flashcards/spanish");
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].reps, 1);
    let logs = h.store.list_review_logs(moved[0].id).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].deck_id, deck_id_for("a.md", "flashcards/spanish"));
}

#[test]
fn one_document_can_back_several_decks() {
    let mut h = Harness::new();
    h.write("vocab.md", "flashcards/nouns, flashcards/verbs", "| a | b |\n|---|---|\n| x | y |", T0);

    let outcomes = h.sync(false, T0);
    assert_eq!(outcomes.len(), 2);
    let decks = h.store.list_decks().unwrap();
    let names: Vec<&str> = decks.iter().map(|deck| deck.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["vocab (flashcards/nouns)", "vocab (flashcards/verbs)"]
    );
    let nouns = h.cards("vocab.md", "flashcards/nouns");
    let verbs = h.cards("vocab.md", "flashcards/verbs");
    assert_eq!(nouns.len(), 1);
    assert_eq!(verbs.len(), 1);
    assert_ne!(nouns[0].id, verbs[0].id);
}

#[test]
fn rename_keeps_cards_and_skips_the_reread() {
    let mut h = Harness::new();
    h.write("old.md", "flashcards", "## Q1\nA1", T0);
    h.sync(false, T0);
    let card = h.cards("old.md", "flashcards")[0].clone();
    let reviewed = h.review(&card, Rating::Easy, T0 + 1);

    h.corpus.rename("old.md", "new.md").unwrap();
    let moved = rename_document(&mut h.store, "old.md", "new.md", T0 + 2).unwrap();
    assert_eq!(
        moved,
        vec![(deck_id_for("old.md", "flashcards"), deck_id_for("new.md", "flashcards"))]
    );

    let outcome = &h.sync(false, T0 + 3)[0];
    assert!(outcome.skipped);
    let cards = h.cards("new.md", "flashcards");
    assert_eq!(cards.len(), 1);
    assert_ne!(cards[0].id, card.id);
    assert!(cards[0].same_memory_state(&reviewed));
    assert_eq!(h.store.list_review_logs(cards[0].id).unwrap().len(), 1);
    assert_eq!(h.store.get_deck(deck_id_for("new.md", "flashcards")).unwrap().unwrap().name, "new");
}
