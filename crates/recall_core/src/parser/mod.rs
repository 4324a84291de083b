//! Content parser: document text to ordered candidate cards.
//!
//! # Responsibility
//! - Recognize the two card shapes: heading + section, and two-column
//!   table rows.
//! - Stay pure: no I/O, no failure path, same output for the same input.
//!
//! # Invariants
//! - Candidates are returned in source order across both shapes.
//! - Every candidate has a non-empty front and back.

mod markdown;

pub use markdown::parse;
pub(crate) use markdown::front_matter_end;

use crate::model::card::CardShape;
use serde::{Deserialize, Serialize};

/// One front/back pair found in a document, before it has an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCard {
    pub front: String,
    pub back: String,
    pub shape: CardShape,
    /// 1-based source line of the heading or table row.
    pub line: usize,
}
