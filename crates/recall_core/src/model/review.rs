//! Ratings and the append-only review log.

use crate::model::card::{CardId, CardState};
use crate::model::deck::DeckId;
use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};

/// Recall rating given by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Hard and above count as successful recall.
    pub fn is_passing(self) -> bool {
        self != Rating::Again
    }

    pub fn value(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Rating {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Again),
            2 => Ok(Self::Hard),
            3 => Ok(Self::Good),
            4 => Ok(Self::Easy),
            other => Err(ValidationError::InvalidRating(other)),
        }
    }
}

/// One rating event. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewLog {
    pub card_id: CardId,
    pub deck_id: DeckId,
    pub rating: Rating,
    /// Card state before the rating was applied.
    pub state: CardState,
    pub reviewed_at: i64,
    /// Interval scheduled by this review.
    pub interval_minutes: i64,
    /// Minutes since the previous review, zero for the first one.
    pub elapsed_minutes: i64,
}
