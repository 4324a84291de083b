//! Core domain logic for Recall, a spaced-repetition engine over markdown notes.
//! This crate is the single source of truth for deck, card and scheduling invariants.

pub mod config;
pub mod corpus;
pub mod db;
pub mod logging;
pub mod model;
pub mod parser;
pub mod repo;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod sync;

pub use config::{load_settings, Settings, SettingsError, StoreMode, StoreSettings};
pub use corpus::{CorpusError, DocumentCorpus, FsCorpus, MemoryCorpus};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::card::{Card, CardId, CardShape, CardState};
pub use model::deck::{Deck, DeckId, DeckProfile, DeckStats};
pub use model::review::{Rating, ReviewLog};
pub use model::validation::ValidationError;
pub use parser::{parse, CandidateCard};
pub use scheduler::{ScheduledOutcome, Scheduler, SchedulingPreview};
pub use store::{open_store, DirectStore, FlashcardStore, StoreError, StoreResult, WorkerStore};
pub use sync::coordinator::{DeckFailure, SyncCoordinator, SyncProgress, SyncReport};
pub use sync::{SyncError, SyncWarning};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
