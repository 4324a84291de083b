//! Deck statistics with per-day limits.
//!
//! # Responsibility
//! - Derive new/due/mature/total counts from persisted card state.
//! - Cap new and due counts by today's remaining daily allowance.
//!
//! # Invariants
//! - Counts are never persisted.
//! - "Today" is the UTC calendar day containing `now`.

use crate::config::Settings;
use crate::model::deck::{DailyCounters, Deck, DeckProfile, DeckStats};
use crate::store::{FlashcardStore, StoreResult};
use chrono::{DateTime, Utc};

const MS_PER_DAY: i64 = 86_400_000;

/// Remaining reviews for today; `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyAllowance {
    pub new_remaining: Option<u32>,
    pub review_remaining: Option<u32>,
}

impl DailyAllowance {
    pub fn from_counters(counters: DailyCounters, profile: &DeckProfile) -> Self {
        let remaining = |enabled: bool, cap: u32, used: u32| enabled.then(|| cap.saturating_sub(used));
        Self {
            new_remaining: remaining(
                profile.new_cards_limit_enabled,
                profile.new_cards_per_day,
                counters.new_reviewed,
            ),
            review_remaining: remaining(
                profile.review_cards_limit_enabled,
                profile.review_cards_per_day,
                counters.review_reviewed,
            ),
        }
    }

    /// Caps `base` new/due counts; mature and total are untouched.
    pub fn apply(&self, base: DeckStats) -> DeckStats {
        DeckStats {
            new_count: self
                .new_remaining
                .map_or(base.new_count, |left| base.new_count.min(left)),
            due_count: self
                .review_remaining
                .map_or(base.due_count, |left| base.due_count.min(left)),
            ..base
        }
    }
}

/// `[start, end)` of the UTC day containing `now`, in epoch ms.
pub fn day_bounds(now: i64) -> (i64, i64) {
    let start = DateTime::<Utc>::from_timestamp_millis(now)
        .and_then(|moment| moment.date_naive().and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp_millis())
        .unwrap_or_else(|| now.div_euclid(MS_PER_DAY) * MS_PER_DAY);
    (start, start + MS_PER_DAY)
}

/// Read-only statistics over a store.
pub struct StatsService<'a> {
    store: &'a dyn FlashcardStore,
}

impl<'a> StatsService<'a> {
    pub fn new(store: &'a dyn FlashcardStore) -> Self {
        Self { store }
    }

    pub fn daily_allowance(
        &self,
        deck: &Deck,
        profile: &DeckProfile,
        now: i64,
    ) -> StoreResult<DailyAllowance> {
        let (from, to) = day_bounds(now);
        let counters = self.store.daily_counters(deck.id, from, to)?;
        Ok(DailyAllowance::from_counters(counters, profile))
    }

    /// Counts for one deck, optionally capped by today's limits.
    pub fn deck_stats(
        &self,
        deck: &Deck,
        profile: &DeckProfile,
        respect_daily_limits: bool,
        now: i64,
    ) -> StoreResult<DeckStats> {
        let base = self.store.card_counts(deck.id, now)?;
        if !respect_daily_limits {
            return Ok(base);
        }
        Ok(self.daily_allowance(deck, profile, now)?.apply(base))
    }

    /// Sum over decks whose tag equals `tag` or is nested below it.
    pub fn group_stats(
        &self,
        tag: &str,
        settings: &Settings,
        respect_daily_limits: bool,
        now: i64,
    ) -> StoreResult<DeckStats> {
        let mut total = DeckStats::default();
        for deck in self.store.list_decks()? {
            if !deck.belongs_to_group(tag) {
                continue;
            }
            let profile = settings.profile(&deck.profile);
            total.add(&self.deck_stats(&deck, profile, respect_daily_limits, now)?);
        }
        Ok(total)
    }
}
