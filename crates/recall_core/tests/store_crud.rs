use recall_core::model::card::card_id_for;
use recall_core::model::review::{Rating, ReviewLog};
use recall_core::store::{CardChangeSet, DeckChangeSet, DeckRekey};
use recall_core::{
    open_store, Card, CardShape, CardState, Deck, DirectStore, FlashcardStore, StoreError,
    StoreMode, StoreSettings, WorkerStore,
};

const NOW: i64 = 1_700_000_000_000;
const DAY_MS: i64 = 86_400_000;

fn stores() -> Vec<(&'static str, Box<dyn FlashcardStore>)> {
    vec![
        ("direct", Box::new(DirectStore::open_in_memory().unwrap())),
        (
            "worker",
            Box::new(WorkerStore::spawn(DirectStore::open_in_memory().unwrap()).unwrap()),
        ),
    ]
}

fn deck(path: &str) -> Deck {
    Deck::new(path, "flashcards", "deck", NOW)
}

fn card(deck: &Deck, front: &str) -> Card {
    Card::new(
        card_id_for(deck.id, front, 0),
        deck.id,
        front,
        "back",
        CardShape::HeaderParagraph,
        NOW,
    )
}

fn seed(store: &mut dyn FlashcardStore, deck: &Deck, fronts: &[&str]) -> Vec<Card> {
    store.create_deck(deck).unwrap();
    let cards: Vec<Card> = fronts.iter().map(|front| card(deck, front)).collect();
    store
        .apply_card_changes(&CardChangeSet {
            create: cards.clone(),
            ..CardChangeSet::default()
        })
        .unwrap();
    cards
}

fn log_for(card: &Card, rating: Rating, state: CardState, at: i64) -> ReviewLog {
    ReviewLog {
        card_id: card.id,
        deck_id: card.deck_id,
        rating,
        state,
        reviewed_at: at,
        interval_minutes: 10,
        elapsed_minutes: 0,
    }
}

#[test]
fn deck_and_card_roundtrip() {
    for (name, mut store) in stores() {
        let deck = deck("notes/a.md");
        let cards = seed(&mut *store, &deck, &["Q1", "Q2"]);

        assert_eq!(store.get_deck(deck.id).unwrap(), Some(deck.clone()), "{name}");
        assert_eq!(store.get_decks_by_path("notes/a.md").unwrap().len(), 1, "{name}");
        let loaded = store.get_card(cards[0].id).unwrap().unwrap();
        assert_eq!(loaded, cards[0], "{name}");
        assert_eq!(store.list_cards(deck.id).unwrap().len(), 2, "{name}");
        assert_eq!(store.count_all_cards().unwrap(), 2, "{name}");
    }
}

#[test]
fn missing_rows_report_not_found() {
    for (name, mut store) in stores() {
        let deck = deck("a.md");
        assert!(store.get_deck(deck.id).unwrap().is_none(), "{name}");
        let err = store.update_deck(&deck).unwrap_err();
        assert!(err.is_not_found(), "{name}: {err}");
        let err = store.delete_deck(deck.id).unwrap_err();
        assert!(err.is_not_found(), "{name}: {err}");
    }
}

#[test]
fn failed_card_batch_leaves_nothing_behind() {
    for (name, mut store) in stores() {
        let deck = deck("a.md");
        let cards = seed(&mut *store, &deck, &["Q1"]);

        let fresh = card(&deck, "Q2");
        let duplicate = cards[0].clone();
        let result = store.apply_card_changes(&CardChangeSet {
            create: vec![fresh.clone(), duplicate],
            ..CardChangeSet::default()
        });
        assert!(result.is_err(), "{name}");
        assert!(store.get_card(fresh.id).unwrap().is_none(), "{name}");
        assert_eq!(store.count_all_cards().unwrap(), 1, "{name}");
    }
}

#[test]
fn deck_changes_apply_together() {
    for (name, mut store) in stores() {
        let old = deck("old.md");
        store.create_deck(&old).unwrap();
        let mut renamed = old.clone();
        renamed.name = "renamed".to_string();
        let created = deck("new.md");

        store
            .apply_deck_changes(&DeckChangeSet {
                create: vec![created.clone()],
                update: vec![renamed.clone()],
                delete: Vec::new(),
            })
            .unwrap();
        let decks = store.list_decks().unwrap();
        assert_eq!(decks.len(), 2, "{name}");
        assert_eq!(store.get_deck(old.id).unwrap().unwrap().name, "renamed", "{name}");

        store
            .apply_deck_changes(&DeckChangeSet {
                delete: vec![old.id, created.id],
                ..DeckChangeSet::default()
            })
            .unwrap();
        assert!(store.list_decks().unwrap().is_empty(), "{name}");
    }
}

#[test]
fn deleting_a_deck_cascades_to_cards_and_logs() {
    for (name, mut store) in stores() {
        let deck = deck("a.md");
        let cards = seed(&mut *store, &deck, &["Q1"]);
        store
            .record_review(&cards[0], &log_for(&cards[0], Rating::Good, CardState::New, NOW))
            .unwrap();

        assert_eq!(store.delete_decks_by_path("a.md").unwrap(), 1, "{name}");
        assert!(store.get_card(cards[0].id).unwrap().is_none(), "{name}");
        assert!(store.list_review_logs(cards[0].id).unwrap().is_empty(), "{name}");
    }
}

#[test]
fn rekey_moves_deck_cards_and_history() {
    for (name, mut store) in stores() {
        let old = deck("old.md");
        let cards = seed(&mut *store, &old, &["Q1"]);
        store
            .record_review(&cards[0], &log_for(&cards[0], Rating::Good, CardState::New, NOW))
            .unwrap();

        let moved = old.rekeyed("new.md", "flashcards", "new", NOW + 1);
        let new_card = card_id_for(moved.id, "Q1", 0);
        store
            .rekey_decks(&[DeckRekey {
                old_id: old.id,
                deck: moved.clone(),
                card_ids: vec![(cards[0].id, new_card)],
            }])
            .unwrap();

        assert!(store.get_deck(old.id).unwrap().is_none(), "{name}");
        let loaded = store.get_card(new_card).unwrap().unwrap();
        assert_eq!(loaded.deck_id, moved.id, "{name}");
        let logs = store.list_review_logs(new_card).unwrap();
        assert_eq!(logs.len(), 1, "{name}");
        assert_eq!(logs[0].deck_id, moved.id, "{name}");
    }
}

#[test]
fn due_and_new_queues_are_ordered_and_limited() {
    for (name, mut store) in stores() {
        let deck = deck("a.md");
        let mut cards = seed(&mut *store, &deck, &["Q1", "Q2", "Q3"]);
        for (offset, card) in cards.iter_mut().take(2).enumerate() {
            card.state = CardState::Review;
            card.reps = 1;
            card.interval_minutes = 1_440;
            card.due_at = NOW - (offset as i64 + 1) * DAY_MS;
        }
        store
            .apply_card_changes(&CardChangeSet {
                update: cards[..2].to_vec(),
                ..CardChangeSet::default()
            })
            .unwrap();

        let due = store.list_due_cards(deck.id, NOW, 10).unwrap();
        let due_ids: Vec<_> = due.iter().map(|card| card.id).collect();
        assert_eq!(due_ids, vec![cards[1].id, cards[0].id], "{name}");
        assert_eq!(store.list_due_cards(deck.id, NOW, 1).unwrap().len(), 1, "{name}");

        let fresh = store.list_new_cards(deck.id, 10).unwrap();
        assert_eq!(fresh.len(), 1, "{name}");
        assert_eq!(fresh[0].id, cards[2].id, "{name}");

        let counts = store.card_counts(deck.id, NOW).unwrap();
        assert_eq!(counts.new_count, 1, "{name}");
        assert_eq!(counts.due_count, 2, "{name}");
        assert_eq!(counts.mature_count, 0, "{name}");
        assert_eq!(counts.total_count, 3, "{name}");
    }
}

#[test]
fn daily_counters_split_new_and_review_ratings() {
    for (name, mut store) in stores() {
        let deck = deck("a.md");
        let cards = seed(&mut *store, &deck, &["Q1", "Q2"]);
        store
            .record_review(&cards[0], &log_for(&cards[0], Rating::Good, CardState::New, NOW))
            .unwrap();
        store
            .record_review(&cards[1], &log_for(&cards[1], Rating::Hard, CardState::Review, NOW))
            .unwrap();
        store
            .record_review(
                &cards[1],
                &log_for(&cards[1], Rating::Good, CardState::Review, NOW - DAY_MS),
            )
            .unwrap();

        let counters = store.daily_counters(deck.id, NOW - 1_000, NOW + 1_000).unwrap();
        assert_eq!(counters.new_reviewed, 1, "{name}");
        assert_eq!(counters.review_reviewed, 1, "{name}");
    }
}

#[test]
fn snapshot_roundtrip_between_implementations() {
    let mut source = DirectStore::open_in_memory().unwrap();
    let deck = deck("a.md");
    let cards = seed(&mut source, &deck, &["Q1", "Q2"]);
    source
        .record_review(&cards[0], &log_for(&cards[0], Rating::Easy, CardState::New, NOW))
        .unwrap();
    let bytes = source.export_snapshot().unwrap();

    let mut target = WorkerStore::spawn(DirectStore::open_in_memory().unwrap()).unwrap();
    target.create_deck(&Deck::new("stale.md", "flashcards", "stale", NOW)).unwrap();
    target.import_snapshot(&bytes).unwrap();

    assert_eq!(target.list_decks().unwrap(), vec![deck]);
    assert_eq!(target.count_all_cards().unwrap(), 2);
    assert_eq!(target.list_review_logs(cards[0].id).unwrap().len(), 1);
}

#[test]
fn corrupt_snapshot_is_rejected() {
    let mut store = DirectStore::open_in_memory().unwrap();
    let err = store.import_snapshot(b"not json").unwrap_err();
    assert!(matches!(err, StoreError::Snapshot(_)));
}

#[test]
fn open_store_honors_mode_and_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recall.db");
    let deck = deck("a.md");

    {
        let mut store = open_store(&StoreSettings {
            mode: StoreMode::Worker,
            path: Some(path.clone()),
        })
        .unwrap();
        store.create_deck(&deck).unwrap();
        store.save().unwrap();
    }

    let store = open_store(&StoreSettings {
        mode: StoreMode::Direct,
        path: Some(path),
    })
    .unwrap();
    assert_eq!(store.get_deck(deck.id).unwrap(), Some(deck));
}
