//! Deterministic interval fuzz.
//!
//! The RNG is seeded from card identity, repetition count and rating, so a
//! preview and the matching rating land on the same day.

use crate::model::card::CardId;
use crate::model::review::Rating;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Intervals below this many days are never fuzzed.
pub const MIN_FUZZ_DAYS: f64 = 2.5;

const FUZZ_BANDS: [(f64, f64, f64); 3] = [
    (2.5, 7.0, 0.15),
    (7.0, 20.0, 0.10),
    (20.0, f64::INFINITY, 0.05),
];

/// Inclusive day window a fuzzed `interval_days` may land in.
pub fn fuzz_range(interval_days: u32, maximum_days: u32) -> (u32, u32) {
    let interval = f64::from(interval_days);
    let mut delta = 1.0;
    for (start, end, factor) in FUZZ_BANDS {
        delta += factor * (interval.min(end) - start).max(0.0);
    }
    let low = ((interval - delta).round() as u32).max(2);
    let high = ((interval + delta).round() as u32).min(maximum_days);
    (low.min(high), high)
}

/// Picks a day inside `fuzz_range`; identity for short intervals.
pub fn fuzz_interval(
    interval_days: u32,
    maximum_days: u32,
    card_id: CardId,
    reps: u32,
    rating: Rating,
) -> u32 {
    if f64::from(interval_days) < MIN_FUZZ_DAYS {
        return interval_days;
    }
    let (low, high) = fuzz_range(interval_days, maximum_days);
    let mut rng = ChaCha8Rng::seed_from_u64(fuzz_seed(card_id, reps, rating));
    rng.gen_range(low..=high)
}

fn fuzz_seed(card_id: CardId, reps: u32, rating: Rating) -> u64 {
    let (high, low) = card_id.as_u64_pair();
    high ^ low.rotate_left(17) ^ (u64::from(reps) << 8) ^ u64::from(rating.value())
}
