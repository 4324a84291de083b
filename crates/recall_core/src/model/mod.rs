//! Domain model for decks, cards and review history.
//!
//! # Responsibility
//! - Define canonical records shared by parser, scheduler, store and sync.
//! - Own deterministic identity derivation for decks and cards.
//!
//! # Invariants
//! - Deck ids derive from `(path, tag)`; card ids derive from
//!   `(deck id, front text, occurrence)`. Re-parsing the same content
//!   yields the same ids.
//! - Timestamps are epoch milliseconds; scheduling intervals are minutes.

pub mod card;
pub mod deck;
pub mod review;
pub mod validation;

/// Minutes in one day, the scheduler's conversion factor.
pub const MINUTES_PER_DAY: i64 = 1_440;

/// Review interval above which a card counts as mature (21 days).
pub const MATURE_INTERVAL_MINUTES: i64 = 21 * MINUTES_PER_DAY;

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
