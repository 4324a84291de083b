//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define table-oriented data access contracts for decks, cards and logs.
//! - Isolate SQL details from store and sync orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`DeckNotFound`, `CardNotFound`)
//!   in addition to DB transport errors.
//! - Repositories never open transactions themselves; the store layer owns
//!   transaction boundaries and hands repositories a transaction handle.

pub mod card_repo;
pub mod deck_repo;
pub mod review_log_repo;
