//! Review scheduler over one card's memory state.
//!
//! # Responsibility
//! - Turn a rating into the card's next memory state, interval and due
//!   time, plus the review log for that event.
//! - Preview all four outcomes without touching the card.
//!
//! # Invariants
//! - `preview(card, now)` and `rate(card, r, now, None)` agree on every
//!   interval and due time.
//! - After any rating: stability > 0, difficulty in `[1, 10]`,
//!   interval >= 1 minute, due >= now. Violations panic.

pub mod fsrs;
pub mod fuzz;

use crate::config::SchedulerSettings;
use crate::model::card::{Card, CardState};
use crate::model::deck::DeckProfile;
use crate::model::review::{Rating, ReviewLog};
use crate::model::validation::{validate_retention, ValidationError};
use crate::model::MINUTES_PER_DAY;
use serde::{Deserialize, Serialize};

const MS_PER_MINUTE: i64 = 60_000;
const HARD_FIRST_STEP_FACTOR: f64 = 1.5;

/// Interval and due time one rating would produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledOutcome {
    pub state: CardState,
    pub interval_minutes: i64,
    pub due_at: i64,
}

/// Outcomes of all four ratings for one card at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingPreview {
    pub again: ScheduledOutcome,
    pub hard: ScheduledOutcome,
    pub good: ScheduledOutcome,
    pub easy: ScheduledOutcome,
}

impl SchedulingPreview {
    pub fn get(&self, rating: Rating) -> ScheduledOutcome {
        match rating {
            Rating::Again => self.again,
            Rating::Hard => self.hard,
            Rating::Good => self.good,
            Rating::Easy => self.easy,
        }
    }
}

/// FSRS scheduler configured once from `SchedulerSettings`.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Computes every rating's outcome without mutating `card`.
    pub fn preview(
        &self,
        card: &Card,
        now: i64,
        profile: &DeckProfile,
    ) -> Result<SchedulingPreview, ValidationError> {
        let retention = validate_retention(profile.request_retention)?;
        let elapsed = elapsed_minutes(card, now, None);
        let [again, hard, good, easy] = self.outcomes(card, now, elapsed, retention);
        let outcome = |next: &Card| ScheduledOutcome {
            state: next.state,
            interval_minutes: next.interval_minutes,
            due_at: next.due_at,
        };
        Ok(SchedulingPreview {
            again: outcome(&again),
            hard: outcome(&hard),
            good: outcome(&good),
            easy: outcome(&easy),
        })
    }

    /// Applies `rating` and returns the updated card with its review log.
    ///
    /// `elapsed_override_ms` replaces the time since the last review, for
    /// callers replaying history.
    pub fn rate(
        &self,
        card: &Card,
        rating: Rating,
        now: i64,
        elapsed_override_ms: Option<i64>,
        profile: &DeckProfile,
    ) -> Result<(Card, ReviewLog), ValidationError> {
        let retention = validate_retention(profile.request_retention)?;
        let elapsed = elapsed_minutes(card, now, elapsed_override_ms);
        let [again, hard, good, easy] = self.outcomes(card, now, elapsed, retention);
        let next = match rating {
            Rating::Again => again,
            Rating::Hard => hard,
            Rating::Good => good,
            Rating::Easy => easy,
        };

        let log = ReviewLog {
            card_id: card.id,
            deck_id: card.deck_id,
            rating,
            state: card.state,
            reviewed_at: now,
            interval_minutes: next.interval_minutes,
            elapsed_minutes: elapsed,
        };
        Ok((next, log))
    }

    fn outcomes(&self, card: &Card, now: i64, elapsed_minutes: i64, retention: f64) -> [Card; 4] {
        let mut outcomes =
            Rating::ALL.map(|rating| self.next_card(card, rating, elapsed_minutes, retention));
        if self.settings.enable_fuzz {
            for (rating, next) in Rating::ALL.into_iter().zip(outcomes.iter_mut()) {
                if next.state != CardState::Review {
                    continue;
                }
                let days = (next.interval_minutes / MINUTES_PER_DAY) as u32;
                let fuzzed = fuzz::fuzz_interval(
                    days,
                    self.settings.maximum_interval_days,
                    card.id,
                    card.reps,
                    rating,
                );
                next.interval_minutes = i64::from(fuzzed) * MINUTES_PER_DAY;
            }
        }
        self.order_review_intervals(card, &mut outcomes);
        for next in outcomes.iter_mut() {
            next.due_at = now + next.interval_minutes * MS_PER_MINUTE;
            next.last_reviewed_at = Some(now);
            next.updated_at = now;
            assert_memory_invariants(next, now);
        }
        outcomes
    }

    /// Memory state and interval for one rating, before fuzz and ordering.
    fn next_card(&self, card: &Card, rating: Rating, elapsed_minutes: i64, retention: f64) -> Card {
        let w = &self.settings.weights;
        let elapsed_days = elapsed_minutes as f64 / MINUTES_PER_DAY as f64;
        let mut next = card.clone();
        next.reps = card.reps.saturating_add(1);

        match card.state {
            CardState::New => {
                next.stability = fsrs::initial_stability(w, rating);
                next.difficulty = fsrs::initial_difficulty(w, rating);
                self.apply_step(&mut next, rating, 0, retention);
            }
            CardState::Learning | CardState::Relearning => {
                let stability = self.known_stability(card, rating);
                let difficulty = self.known_difficulty(card, rating);
                next.difficulty = fsrs::next_difficulty(w, difficulty, rating);
                next.stability = if elapsed_days >= 1.0 {
                    let r = fsrs::retrievability(elapsed_days, stability);
                    if rating.is_passing() {
                        fsrs::next_recall_stability(w, difficulty, stability, r, rating)
                    } else {
                        fsrs::next_forget_stability(w, difficulty, stability, r)
                    }
                } else {
                    stability
                };
                self.apply_step(&mut next, rating, card.step, retention);
            }
            CardState::Review => {
                let stability = self.known_stability(card, rating);
                let difficulty = self.known_difficulty(card, rating);
                let r = fsrs::retrievability(elapsed_days, stability);
                next.difficulty = fsrs::next_difficulty(w, difficulty, rating);
                if rating.is_passing() {
                    next.stability = fsrs::next_recall_stability(w, difficulty, stability, r, rating);
                    self.graduate(&mut next, retention);
                } else {
                    next.stability = fsrs::next_forget_stability(w, difficulty, stability, r);
                    next.lapses = card.lapses.saturating_add(1);
                    match self.settings.relearning_steps_minutes.first() {
                        Some(first) => {
                            next.state = CardState::Relearning;
                            next.step = 0;
                            next.interval_minutes = i64::from(*first);
                        }
                        None => self.graduate(&mut next, retention),
                    }
                }
            }
        }
        next
    }

    /// Moves a new/learning/relearning card through its step list. New
    /// cards count as sitting on step 0.
    fn apply_step(&self, next: &mut Card, rating: Rating, step: u32, retention: f64) {
        let relearning = next.state == CardState::Relearning;
        let (steps, learning_state) = if relearning {
            (&self.settings.relearning_steps_minutes, CardState::Relearning)
        } else {
            (&self.settings.learning_steps_minutes, CardState::Learning)
        };
        let Some(first) = steps.first().copied() else {
            self.graduate(next, retention);
            return;
        };
        let step = (step as usize).min(steps.len() - 1);

        match rating {
            Rating::Again => {
                next.state = learning_state;
                next.step = 0;
                next.interval_minutes = i64::from(first);
            }
            Rating::Hard => {
                next.state = learning_state;
                next.step = step as u32;
                next.interval_minutes = if step == 0 {
                    (f64::from(first) * HARD_FIRST_STEP_FACTOR).round() as i64
                } else {
                    i64::from(steps[step])
                };
            }
            Rating::Good => match steps.get(step + 1) {
                Some(minutes) => {
                    next.state = learning_state;
                    next.step = (step + 1) as u32;
                    next.interval_minutes = i64::from(*minutes);
                }
                None => self.graduate(next, retention),
            },
            Rating::Easy => self.graduate(next, retention),
        }
    }

    fn graduate(&self, next: &mut Card, retention: f64) {
        let days = fsrs::interval_days(next.stability, retention)
            .round()
            .clamp(1.0, f64::from(self.settings.maximum_interval_days));
        next.state = CardState::Review;
        next.step = 0;
        next.interval_minutes = days as i64 * MINUTES_PER_DAY;
    }

    /// Hard < Good < Easy among outcomes that land in review.
    fn order_review_intervals(&self, card: &Card, outcomes: &mut [Card; 4]) {
        let maximum = i64::from(self.settings.maximum_interval_days) * MINUTES_PER_DAY;
        if card.state == CardState::Review {
            let good = outcomes[2].interval_minutes;
            let hard = &mut outcomes[1];
            hard.interval_minutes = hard.interval_minutes.min(good);
        }
        for index in 2..4 {
            let previous = &outcomes[index - 1];
            if previous.state != CardState::Review || outcomes[index].state != CardState::Review {
                continue;
            }
            let floor = (previous.interval_minutes + MINUTES_PER_DAY).min(maximum);
            let current = &mut outcomes[index];
            current.interval_minutes = current.interval_minutes.max(floor);
        }
    }

    fn known_stability(&self, card: &Card, rating: Rating) -> f64 {
        if card.stability > 0.0 {
            card.stability
        } else {
            fsrs::initial_stability(&self.settings.weights, rating)
        }
    }

    fn known_difficulty(&self, card: &Card, rating: Rating) -> f64 {
        if (1.0..=10.0).contains(&card.difficulty) {
            card.difficulty
        } else {
            fsrs::initial_difficulty(&self.settings.weights, rating)
        }
    }
}

fn elapsed_minutes(card: &Card, now: i64, override_ms: Option<i64>) -> i64 {
    let elapsed_ms = match override_ms {
        Some(ms) => ms,
        None => card
            .last_reviewed_at
            .map(|reviewed_at| now - reviewed_at)
            .unwrap_or(0),
    };
    (elapsed_ms / MS_PER_MINUTE).max(0)
}

fn assert_memory_invariants(card: &Card, now: i64) {
    assert!(
        card.stability > 0.0 && card.stability.is_finite(),
        "stability must stay positive, got {}",
        card.stability
    );
    assert!(
        (1.0..=10.0).contains(&card.difficulty),
        "difficulty must stay within [1, 10], got {}",
        card.difficulty
    );
    assert!(
        card.interval_minutes >= 1,
        "interval must be at least one minute, got {}",
        card.interval_minutes
    );
    assert!(card.due_at >= now, "due time must not precede review time");
}

#[cfg(test)]
mod tests {
    use super::{Scheduler, SchedulingPreview};
    use crate::config::SchedulerSettings;
    use crate::model::card::{Card, CardShape, CardState};
    use crate::model::deck::DeckProfile;
    use crate::model::review::Rating;
    use crate::model::MINUTES_PER_DAY;
    use uuid::Uuid;

    const NOW: i64 = 1_700_000_000_000;

    fn new_card() -> Card {
        Card::new(
            Uuid::from_u128(11),
            Uuid::from_u128(1),
            "Q",
            "A",
            CardShape::HeaderParagraph,
            NOW,
        )
    }

    fn preview(scheduler: &Scheduler, card: &Card, now: i64) -> SchedulingPreview {
        scheduler
            .preview(card, now, &DeckProfile::default())
            .unwrap()
    }

    #[test]
    fn new_card_follows_learning_steps() {
        let scheduler = Scheduler::default();
        let outcomes = preview(&scheduler, &new_card(), NOW);
        assert_eq!(outcomes.again.state, CardState::Learning);
        assert_eq!(outcomes.again.interval_minutes, 1);
        assert_eq!(outcomes.hard.interval_minutes, 2);
        assert_eq!(outcomes.good.state, CardState::Learning);
        assert_eq!(outcomes.good.interval_minutes, 10);
        assert_eq!(outcomes.easy.state, CardState::Review);
        assert!(outcomes.easy.interval_minutes >= MINUTES_PER_DAY);
    }

    #[test]
    fn exhausting_steps_on_first_rating_graduates() {
        let scheduler = Scheduler::new(SchedulerSettings {
            learning_steps_minutes: vec![10],
            ..SchedulerSettings::default()
        });
        let outcomes = preview(&scheduler, &new_card(), NOW);
        assert_eq!(outcomes.good.state, CardState::Review);

        let no_steps = Scheduler::new(SchedulerSettings {
            learning_steps_minutes: Vec::new(),
            ..SchedulerSettings::default()
        });
        let outcomes = preview(&no_steps, &new_card(), NOW);
        assert_eq!(outcomes.again.state, CardState::Review);
    }

    #[test]
    fn good_walks_through_steps_then_graduates() {
        let scheduler = Scheduler::default();
        let profile = DeckProfile::default();
        let (card, log) = scheduler
            .rate(&new_card(), Rating::Good, NOW, None, &profile)
            .unwrap();
        assert_eq!(
            (card.state, card.step, card.interval_minutes),
            (CardState::Learning, 1, 10)
        );
        assert_eq!(log.state, CardState::New);
        assert_eq!(log.elapsed_minutes, 0);

        let later = NOW + 10 * 60_000;
        let (again, _) = scheduler
            .rate(&card, Rating::Again, later, None, &profile)
            .unwrap();
        assert_eq!((again.state, again.step), (CardState::Learning, 0));

        let (card, log) = scheduler
            .rate(&card, Rating::Good, later, None, &profile)
            .unwrap();
        assert_eq!(card.state, CardState::Review);
        assert_eq!(log.state, CardState::Learning);
        assert_eq!(log.elapsed_minutes, 10);
        assert_eq!(card.reps, 2);
        assert_eq!(card.last_reviewed_at, Some(later));
    }

    #[test]
    fn review_lapse_moves_to_relearning() {
        let scheduler = Scheduler::default();
        let profile = DeckProfile::default();
        let (card, _) = scheduler
            .rate(&new_card(), Rating::Easy, NOW, None, &profile)
            .unwrap();
        let later = card.due_at;
        let (lapsed, log) = scheduler
            .rate(&card, Rating::Again, later, None, &profile)
            .unwrap();
        assert_eq!(lapsed.state, CardState::Relearning);
        assert_eq!(lapsed.lapses, 1);
        assert_eq!(lapsed.interval_minutes, 10);
        assert!(lapsed.stability <= card.stability);
        assert_eq!(log.state, CardState::Review);
    }

    #[test]
    fn review_intervals_are_ordered_and_due_not_before_now() {
        let scheduler = Scheduler::default();
        let profile = DeckProfile::default();
        let (card, _) = scheduler
            .rate(&new_card(), Rating::Good, NOW, Some(0), &profile)
            .unwrap();
        let (card, _) = scheduler
            .rate(&card, Rating::Easy, NOW + 60_000, None, &profile)
            .unwrap();
        let now = card.due_at;
        let outcomes = preview(&scheduler, &card, now);
        assert!(outcomes.again.interval_minutes < outcomes.good.interval_minutes);
        assert!(outcomes.again.interval_minutes < outcomes.easy.interval_minutes);
        assert!(outcomes.hard.interval_minutes < outcomes.good.interval_minutes);
        assert!(outcomes.good.interval_minutes < outcomes.easy.interval_minutes);
        for rating in Rating::ALL {
            assert!(outcomes.get(rating).due_at >= now);
        }
    }

    #[test]
    fn preview_matches_rate() {
        let scheduler = Scheduler::default();
        let profile = DeckProfile::default();
        let (card, _) = scheduler
            .rate(&new_card(), Rating::Easy, NOW, None, &profile)
            .unwrap();
        let now = card.due_at + 3 * MINUTES_PER_DAY * 60_000;
        let first = preview(&scheduler, &card, now);
        assert_eq!(first, preview(&scheduler, &card, now));
        for rating in Rating::ALL {
            let (rated, log) = scheduler.rate(&card, rating, now, None, &profile).unwrap();
            assert_eq!(rated.due_at, first.get(rating).due_at);
            assert_eq!(log.interval_minutes, first.get(rating).interval_minutes);
        }
    }

    #[test]
    fn invalid_retention_is_rejected_before_rating() {
        let scheduler = Scheduler::default();
        let profile = DeckProfile {
            request_retention: 0.3,
            ..DeckProfile::default()
        };
        assert!(scheduler
            .rate(&new_card(), Rating::Good, NOW, None, &profile)
            .is_err());
        assert!(scheduler.preview(&new_card(), NOW, &profile).is_err());
    }
}
