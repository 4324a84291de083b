use recall_core::config::SchedulerSettings;
use recall_core::model::MINUTES_PER_DAY;
use recall_core::scheduler::fuzz::fuzz_range;
use recall_core::{Card, CardShape, CardState, DeckProfile, Rating, Scheduler, ValidationError};
use uuid::Uuid;

const NOW: i64 = 1_700_000_000_000;

fn new_card(seed: u128) -> Card {
    Card::new(
        Uuid::from_u128(seed),
        Uuid::from_u128(1),
        "Q",
        "A",
        CardShape::Table,
        NOW,
    )
}

fn unfuzzed() -> Scheduler {
    Scheduler::new(SchedulerSettings {
        enable_fuzz: false,
        ..SchedulerSettings::default()
    })
}

/// Rates `card` with `rating` each time it falls due.
fn review_on_due(scheduler: &Scheduler, mut card: Card, rating: Rating, times: usize) -> Vec<Card> {
    let profile = DeckProfile::default();
    let mut history = Vec::with_capacity(times);
    for _ in 0..times {
        let now = card.due_at;
        let (next, _) = scheduler.rate(&card, rating, now, None, &profile).unwrap();
        card = next;
        history.push(card.clone());
    }
    history
}

#[test]
fn successful_reviews_grow_the_interval() {
    let scheduler = unfuzzed();
    let history = review_on_due(&scheduler, new_card(7), Rating::Good, 8);

    assert_eq!(history[0].state, CardState::Learning);
    assert!(history[2..].iter().all(|card| card.state == CardState::Review));
    for pair in history[2..].windows(2) {
        assert!(
            pair[1].interval_minutes > pair[0].interval_minutes,
            "{} <= {}",
            pair[1].interval_minutes,
            pair[0].interval_minutes
        );
        assert!(pair[1].stability > pair[0].stability);
    }
    assert_eq!(history.last().unwrap().reps, 8);
}

#[test]
fn intervals_never_exceed_the_maximum() {
    let scheduler = Scheduler::new(SchedulerSettings {
        maximum_interval_days: 30,
        ..SchedulerSettings::default()
    });
    for card in review_on_due(&scheduler, new_card(8), Rating::Easy, 12) {
        assert!(card.interval_minutes <= 30 * MINUTES_PER_DAY);
        assert!(card.interval_minutes >= 1);
    }
}

#[test]
fn fuzz_stays_inside_its_window() {
    let plain = unfuzzed();
    let fuzzed = Scheduler::default();
    let profile = DeckProfile::default();

    for seed in 0..20u128 {
        let card = review_on_due(&plain, new_card(100 + seed), Rating::Good, 4)
            .pop()
            .unwrap();
        let now = card.due_at;
        let (base, _) = plain.rate(&card, Rating::Good, now, None, &profile).unwrap();
        let (jittered, _) = fuzzed.rate(&card, Rating::Good, now, None, &profile).unwrap();

        let base_days = (base.interval_minutes / MINUTES_PER_DAY) as u32;
        let (low, high) = fuzz_range(base_days, 36_500);
        let days = (jittered.interval_minutes / MINUTES_PER_DAY) as u32;
        assert!(
            (low..=high).contains(&days),
            "{days} outside [{low}, {high}] for base {base_days}"
        );
    }
}

#[test]
fn fuzz_is_deterministic_per_card() {
    let scheduler = Scheduler::default();
    let first = review_on_due(&scheduler, new_card(42), Rating::Good, 6);
    let second = review_on_due(&scheduler, new_card(42), Rating::Good, 6);
    assert_eq!(first, second);
}

#[test]
fn lapse_then_recovery_returns_to_review() {
    let scheduler = unfuzzed();
    let profile = DeckProfile::default();
    let mature = review_on_due(&scheduler, new_card(9), Rating::Good, 5)
        .pop()
        .unwrap();

    let (lapsed, _) = scheduler
        .rate(&mature, Rating::Again, mature.due_at, None, &profile)
        .unwrap();
    assert_eq!(lapsed.state, CardState::Relearning);
    assert_eq!(lapsed.lapses, 1);
    assert!(lapsed.stability < mature.stability);

    let (recovered, log) = scheduler
        .rate(&lapsed, Rating::Good, lapsed.due_at, None, &profile)
        .unwrap();
    assert_eq!(recovered.state, CardState::Review);
    assert_eq!(log.state, CardState::Relearning);
    assert!(recovered.interval_minutes >= MINUTES_PER_DAY);
    assert!(recovered.interval_minutes < mature.interval_minutes);
}

#[test]
fn difficulty_stays_bounded_under_repeated_failure() {
    let scheduler = unfuzzed();
    for card in review_on_due(&scheduler, new_card(10), Rating::Again, 15) {
        assert!((1.0..=10.0).contains(&card.difficulty));
        assert!(card.stability > 0.0);
        assert_eq!(card.state, CardState::Learning);
    }
}

#[test]
fn elapsed_override_changes_retrievability() {
    let scheduler = unfuzzed();
    let profile = DeckProfile::default();
    let card = review_on_due(&scheduler, new_card(11), Rating::Good, 4)
        .pop()
        .unwrap();
    let now = card.due_at;

    let (on_time, _) = scheduler.rate(&card, Rating::Good, now, None, &profile).unwrap();
    let late_ms = Some(card.interval_minutes * 60_000 * 3);
    let (late, log) = scheduler
        .rate(&card, Rating::Good, now, late_ms, &profile)
        .unwrap();
    assert_eq!(log.elapsed_minutes, card.interval_minutes * 3);
    assert!(late.stability > on_time.stability);
}

#[test]
fn retention_bounds_are_exclusive() {
    let scheduler = Scheduler::default();
    for retention in [0.5, 0.995, f64::NAN] {
        let profile = DeckProfile {
            request_retention: retention,
            ..DeckProfile::default()
        };
        let err = scheduler.preview(&new_card(1), NOW, &profile).unwrap_err();
        assert!(matches!(err, ValidationError::RetentionOutOfRange(_)));
    }
}
