//! FSRS-4.5 memory-model formulas.
//!
//! All functions are pure; stability and intervals here are in days.

use crate::model::review::Rating;

const DECAY: f64 = -0.5;
const FACTOR: f64 = 19.0 / 81.0;
const MIN_STABILITY: f64 = 0.1;

/// Weight vector alias, indexed `w[0]..w[16]`.
pub type Weights = [f64; 17];

fn grade(rating: Rating) -> f64 {
    f64::from(rating.value())
}

/// Probability of recall after `elapsed_days` at `stability`.
pub fn retrievability(elapsed_days: f64, stability: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    (1.0 + FACTOR * elapsed_days.max(0.0) / stability).powf(DECAY)
}

/// Days until retrievability decays to `retention`.
pub fn interval_days(stability: f64, retention: f64) -> f64 {
    stability / FACTOR * (retention.powf(1.0 / DECAY) - 1.0)
}

pub fn initial_stability(w: &Weights, rating: Rating) -> f64 {
    w[usize::from(rating.value() - 1)].max(MIN_STABILITY)
}

pub fn initial_difficulty(w: &Weights, rating: Rating) -> f64 {
    clamp_difficulty(w[4] - (grade(rating) - 3.0) * w[5])
}

/// Mean-reverting difficulty update toward `D0(Good)`.
pub fn next_difficulty(w: &Weights, difficulty: f64, rating: Rating) -> f64 {
    let updated = difficulty - w[6] * (grade(rating) - 3.0);
    let reverted = w[7] * initial_difficulty(w, Rating::Good) + (1.0 - w[7]) * updated;
    clamp_difficulty(reverted)
}

/// Stability after a successful recall.
pub fn next_recall_stability(
    w: &Weights,
    difficulty: f64,
    stability: f64,
    retrievability: f64,
    rating: Rating,
) -> f64 {
    let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
    let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };
    let next = stability
        * (1.0
            + w[8].exp()
                * (11.0 - difficulty)
                * stability.powf(-w[9])
                * ((1.0 - retrievability) * w[10]).exp_m1()
                * hard_penalty
                * easy_bonus);
    next.max(MIN_STABILITY)
}

/// Stability after a lapse; never above the previous stability.
pub fn next_forget_stability(
    w: &Weights,
    difficulty: f64,
    stability: f64,
    retrievability: f64,
) -> f64 {
    let next = w[11]
        * difficulty.powf(-w[12])
        * ((stability + 1.0).powf(w[13]) - 1.0)
        * ((1.0 - retrievability) * w[14]).exp();
    next.min(stability).max(MIN_STABILITY)
}

fn clamp_difficulty(value: f64) -> f64 {
    value.clamp(1.0, 10.0)
}
