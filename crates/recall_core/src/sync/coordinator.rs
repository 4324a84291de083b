//! Sync coordinator: single-flight passes over the corpus.
//!
//! # Responsibility
//! - Run full passes: discovery, per-deck reconciliation, flush.
//! - Route document events (modified, deleted, renamed) and review calls
//!   through the same state token.
//!
//! # Invariants
//! - At most one pass runs per coordinator; a second caller gets
//!   `SyncError::AlreadyInProgress` immediately.
//! - Decks are processed sequentially; cancellation lands between decks.
//! - Lock order is state token, then store.

use super::deck_sync::{rename_document, sync_deck};
use super::registry::{
    discover_decks, discover_document, reconcile_decks, reconcile_document, Discovery,
};
use super::{SyncError, SyncWarning};
use crate::config::Settings;
use crate::corpus::DocumentCorpus;
use crate::model::card::{Card, CardId};
use crate::model::deck::{Deck, DeckId, DeckStats};
use crate::model::validation::ValidationError;
use crate::model::now_epoch_ms;
use crate::scheduler::{Scheduler, SchedulingPreview};
use crate::service::review_service::{ReviewError, ReviewService};
use crate::service::stats_service::StatsService;
use crate::store::FlashcardStore;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// One deck that failed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckFailure {
    pub deck_id: DeckId,
    pub path: String,
    pub tag: String,
    pub error: String,
}

/// Summary of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub total_decks: usize,
    pub total_flashcards: u32,
    pub sync_time_ms: u64,
    /// False when discovery or flush failed, or the pass was cancelled.
    pub success: bool,
    pub error: Option<String>,
    /// Deck and card writes applied.
    pub operations: usize,
    pub warnings: Vec<SyncWarning>,
    pub deck_failures: Vec<DeckFailure>,
    pub cancelled: bool,
}

/// Progress reported to the observer after each deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub completed: usize,
    pub total: usize,
    pub current_path: String,
}

type ProgressObserver = Box<dyn Fn(&SyncProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Idle,
    Running { current_deck: Option<DeckId> },
}

enum PassScope<'p> {
    Corpus,
    Document(&'p str),
}

/// Returns the state token to `Idle` when the pass ends, on every path.
struct PassGuard<'c> {
    state: &'c Mutex<SyncState>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SyncState::Idle;
    }
}

/// Owns the store, the corpus and the single-flight state token.
pub struct SyncCoordinator {
    store: Mutex<Box<dyn FlashcardStore>>,
    corpus: Box<dyn DocumentCorpus>,
    settings: Settings,
    scheduler: Scheduler,
    state: Mutex<SyncState>,
    cancel_requested: AtomicBool,
    observer: Mutex<Option<ProgressObserver>>,
}

impl SyncCoordinator {
    pub fn new(
        store: Box<dyn FlashcardStore>,
        corpus: Box<dyn DocumentCorpus>,
        settings: Settings,
    ) -> Self {
        let scheduler = Scheduler::new(settings.scheduler.clone());
        Self {
            store: Mutex::new(store),
            corpus,
            settings,
            scheduler,
            state: Mutex::new(SyncState::Idle),
            cancel_requested: AtomicBool::new(false),
            observer: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// True while a pass or document event holds the state token.
    pub fn is_syncing(&self) -> bool {
        matches!(*self.lock_state(), SyncState::Running { .. })
    }

    /// Registers the callback invoked after each deck of a pass.
    pub fn set_progress_observer(&self, observer: impl Fn(&SyncProgress) + Send + Sync + 'static) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(observer));
    }

    /// Asks the running pass to stop before its next deck.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// Full pass over the corpus. `force` re-reads unchanged documents.
    ///
    /// Per-deck failures are collected in the report; discovery and flush
    /// failures end the pass with `success == false`.
    pub fn perform_sync(&self, force: bool) -> Result<SyncReport, SyncError> {
        let guard = self.begin_pass()?;
        let report = self.run_pass(PassScope::Corpus, force);
        drop(guard);
        Ok(report)
    }

    /// Re-discovers and re-syncs the decks of one changed document.
    pub fn on_document_modified(&self, path: &str) -> Result<SyncReport, SyncError> {
        let guard = self.begin_pass()?;
        let report = self.run_pass(PassScope::Document(path), false);
        drop(guard);
        Ok(report)
    }

    /// Deletes the decks of a removed document with their cards and logs.
    pub fn on_document_deleted(&self, path: &str) -> Result<usize, SyncError> {
        let _guard = self.begin_pass()?;
        let mut store = self.lock_store();
        let deleted = store.delete_decks_by_path(path)?;
        store.save()?;
        info!(
            "event=document_deleted module=sync status=ok decks={}",
            deleted
        );
        Ok(deleted)
    }

    /// Re-keys the decks of a renamed document, keeping review history.
    pub fn on_document_renamed(
        &self,
        old_path: &str,
        new_path: &str,
    ) -> Result<Vec<(DeckId, DeckId)>, SyncError> {
        let _guard = self.begin_pass()?;
        let mut store = self.lock_store();
        let moved = rename_document(&mut **store, old_path, new_path, now_epoch_ms())?;
        store.save()?;
        Ok(moved)
    }

    /// Assigns a configured profile to a deck. The deck's document is
    /// re-read on the next pass so the profile's header level applies.
    pub fn set_deck_profile(&self, deck_id: DeckId, profile: &str) -> Result<Deck, SyncError> {
        if !self.settings.has_profile(profile) {
            return Err(ValidationError::UnknownProfile(profile.to_string()).into());
        }
        let _guard = self.begin_pass()?;
        let mut store = self.lock_store();
        let mut deck = store
            .get_deck(deck_id)?
            .ok_or(SyncError::DeckNotFound(deck_id))?;
        if deck.profile == profile {
            return Ok(deck);
        }
        deck.profile = profile.to_string();
        deck.last_synced_at = None;
        deck.updated_at = now_epoch_ms();
        store.update_deck(&deck)?;
        store.save()?;
        info!(
            "event=deck_profile_set module=sync status=ok deck_id={} profile={}",
            deck_id, profile
        );
        Ok(deck)
    }

    pub fn preview_card(&self, card_id: CardId, now: i64) -> Result<SchedulingPreview, SyncError> {
        let mut store = self.lock_store();
        let service = ReviewService::new(&mut **store, &self.scheduler, &self.settings);
        Ok(service.preview_card(card_id, now)?)
    }

    /// Rates a card. Rejected while a pass is reconciling the card's deck.
    pub fn rate_card(
        &self,
        card_id: CardId,
        rating: u8,
        now: i64,
        elapsed_override_ms: Option<i64>,
    ) -> Result<Card, SyncError> {
        let rating = crate::model::review::Rating::try_from(rating)?;
        let state = self.lock_state();
        let mut store = self.lock_store();
        let mut service = ReviewService::new(&mut **store, &self.scheduler, &self.settings);
        let card = service.load_card(card_id)?;
        if *state
            == (SyncState::Running {
                current_deck: Some(card.deck_id),
            })
        {
            warn!(
                "event=rate_rejected module=sync status=error card_id={} reason=deck_syncing",
                card_id
            );
            return Err(SyncError::AlreadyInProgress);
        }
        Ok(service.rate(&card, rating, now, elapsed_override_ms)?)
    }

    pub fn review_queue(
        &self,
        deck_id: DeckId,
        now: i64,
        respect_daily_limits: bool,
    ) -> Result<Vec<Card>, SyncError> {
        let mut store = self.lock_store();
        let service = ReviewService::new(&mut **store, &self.scheduler, &self.settings);
        Ok(service.review_queue(deck_id, now, respect_daily_limits)?)
    }

    pub fn deck_stats(
        &self,
        deck_id: DeckId,
        respect_daily_limits: bool,
        now: i64,
    ) -> Result<DeckStats, SyncError> {
        let store = self.lock_store();
        let deck = store
            .get_deck(deck_id)?
            .ok_or(SyncError::DeckNotFound(deck_id))?;
        let profile = self.settings.profile(&deck.profile);
        Ok(StatsService::new(&**store).deck_stats(&deck, profile, respect_daily_limits, now)?)
    }

    pub fn group_stats(
        &self,
        tag: &str,
        respect_daily_limits: bool,
        now: i64,
    ) -> Result<DeckStats, SyncError> {
        let store = self.lock_store();
        Ok(StatsService::new(&**store).group_stats(tag, &self.settings, respect_daily_limits, now)?)
    }

    /// Runs `read` against the store under its lock.
    pub fn with_store<T>(&self, read: impl FnOnce(&mut dyn FlashcardStore) -> T) -> T {
        let mut store = self.lock_store();
        read(&mut **store)
    }

    fn begin_pass(&self) -> Result<PassGuard<'_>, SyncError> {
        let mut state = self.lock_state();
        if let SyncState::Running { .. } = *state {
            warn!("event=sync_rejected module=sync status=error reason=already_in_progress");
            return Err(SyncError::AlreadyInProgress);
        }
        *state = SyncState::Running { current_deck: None };
        self.cancel_requested.store(false, Ordering::SeqCst);
        Ok(PassGuard { state: &self.state })
    }

    fn set_current_deck(&self, deck_id: Option<DeckId>) {
        *self.lock_state() = SyncState::Running {
            current_deck: deck_id,
        };
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_store(&self) -> MutexGuard<'_, Box<dyn FlashcardStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, progress: &SyncProgress) {
        if let Some(observer) = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            observer(progress);
        }
    }

    fn run_pass(&self, scope: PassScope<'_>, force: bool) -> SyncReport {
        let started = Instant::now();
        let now = now_epoch_ms();
        let prefix = self.settings.sync.deck_tag_prefix.as_str();
        let mut report = SyncReport::default();
        info!(
            "event=sync_start module=sync status=start force={} scope={}",
            force,
            match scope {
                PassScope::Corpus => "corpus",
                PassScope::Document(_) => "document",
            }
        );

        let discovered = match self.discover(&scope, prefix, now) {
            Ok((Discovery { descriptors, skipped }, operations)) => {
                report.operations += operations;
                report.warnings.extend(skipped.into_iter().map(|skipped| {
                    SyncWarning::DocumentSkipped {
                        path: skipped.path,
                        error: skipped.error,
                    }
                }));
                descriptors
            }
            Err(err) => return finish_failed(report, started, err),
        };
        report.total_decks = discovered.len();

        for (index, descriptor) in discovered.iter().enumerate() {
            if self.cancel_requested.swap(false, Ordering::SeqCst) {
                info!(
                    "event=sync_cancelled module=sync status=ok completed={} total={}",
                    index,
                    discovered.len()
                );
                report.cancelled = true;
                break;
            }

            let deck_id = descriptor.deck_id();
            self.set_current_deck(Some(deck_id));
            let result = {
                let mut store = self.lock_store();
                sync_deck(&mut **store, &*self.corpus, &self.settings, deck_id, force, now)
            };
            self.set_current_deck(None);

            match result {
                Ok(outcome) => {
                    report.operations += outcome.operations_count;
                    report.warnings.extend(outcome.warnings);
                }
                Err(err) => {
                    error!(
                        "event=deck_sync_failed module=sync status=error deck_id={} error={}",
                        deck_id, err
                    );
                    report.deck_failures.push(DeckFailure {
                        deck_id,
                        path: descriptor.path.clone(),
                        tag: descriptor.tag.clone(),
                        error: err.to_string(),
                    });
                }
            }

            self.notify(&SyncProgress {
                completed: index + 1,
                total: discovered.len(),
                current_path: descriptor.path.clone(),
            });
        }

        let flushed = {
            let mut store = self.lock_store();
            store
                .save()
                .and_then(|()| store.count_all_cards())
                .map_err(|err| SyncError::persistence("flush", err))
        };
        match flushed {
            Ok(total) => report.total_flashcards = total,
            Err(err) => return finish_failed(report, started, err),
        }

        report.success = !report.cancelled;
        if report.cancelled {
            report.error = Some("sync cancelled".to_string());
        }
        report.sync_time_ms = elapsed_ms(started);
        info!(
            "event=sync_finish module=sync status=ok decks={} cards={} operations={} warnings={} failures={} duration_ms={}",
            report.total_decks,
            report.total_flashcards,
            report.operations,
            report.warnings.len(),
            report.deck_failures.len(),
            report.sync_time_ms
        );
        report
    }

    /// Discovery plus deck-record reconciliation for the pass scope.
    fn discover(
        &self,
        scope: &PassScope<'_>,
        prefix: &str,
        now: i64,
    ) -> Result<(Discovery, usize), SyncError> {
        let corpus = &*self.corpus;
        let discovery = match scope {
            PassScope::Corpus => discover_decks(corpus, prefix)?,
            PassScope::Document(path) => Discovery {
                descriptors: discover_document(corpus, path, prefix)?,
                skipped: Vec::new(),
            },
        };
        let mut store = self.lock_store();
        let outcome = match scope {
            PassScope::Corpus => reconcile_decks(&mut **store, &discovery, now),
            PassScope::Document(path) => {
                reconcile_document(&mut **store, path, &discovery.descriptors, now)
            }
        }
        .map_err(|err| SyncError::persistence("deck discovery", err))?;
        Ok((discovery, outcome.operation_count()))
    }
}

impl From<ReviewError> for SyncError {
    fn from(value: ReviewError) -> Self {
        match value {
            ReviewError::Validation(err) => Self::Validation(err),
            ReviewError::DeckNotFound(id) => Self::DeckNotFound(id),
            ReviewError::CardNotFound(id) => Self::CardNotFound(id),
            ReviewError::Store(err) => Self::from(err),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn finish_failed(mut report: SyncReport, started: Instant, err: SyncError) -> SyncReport {
    error!("event=sync_finish module=sync status=error error={}", err);
    report.success = false;
    report.error = Some(err.to_string());
    report.sync_time_ms = elapsed_ms(started);
    report
}

#[cfg(test)]
mod tests {
    use super::{SyncCoordinator, SyncError};
    use crate::config::Settings;
    use crate::corpus::MemoryCorpus;
    use crate::model::review::Rating;
    use crate::store::DirectStore;
    use uuid::Uuid;

    const NOW: i64 = 1_700_000_000_000;

    fn coordinator(corpus: &MemoryCorpus) -> SyncCoordinator {
        let store = DirectStore::open_in_memory().unwrap();
        SyncCoordinator::new(Box::new(store), Box::new(corpus.clone()), Settings::default())
    }

    fn corpus() -> MemoryCorpus {
        let corpus = MemoryCorpus::new();
        corpus.write("a.md", "---\ntags: [flashcards]\n---\n## Q1\nA1\n", NOW);
        corpus.write("b.md", "---\ntags: [flashcards]\n---\n## Q2\nA2\n", NOW);
        corpus
    }

    #[test]
    fn second_pass_is_rejected_while_one_runs() {
        let coordinator = coordinator(&corpus());
        let guard = coordinator.begin_pass().unwrap();
        assert!(coordinator.is_syncing());
        assert!(matches!(
            coordinator.perform_sync(false),
            Err(SyncError::AlreadyInProgress)
        ));
        drop(guard);

        assert!(!coordinator.is_syncing());
        let report = coordinator.perform_sync(false).unwrap();
        assert!(report.success);
        assert_eq!(report.total_decks, 2);
        assert_eq!(report.total_flashcards, 2);
    }

    #[test]
    fn rating_is_rejected_only_for_the_deck_being_synced() {
        let coordinator = coordinator(&corpus());
        coordinator.perform_sync(false).unwrap();
        let decks = coordinator.with_store(|store| store.list_decks().unwrap());
        let cards: Vec<_> = decks
            .iter()
            .map(|deck| coordinator.with_store(|store| store.list_cards(deck.id).unwrap())[0].clone())
            .collect();

        let guard = coordinator.begin_pass().unwrap();
        coordinator.set_current_deck(Some(cards[0].deck_id));
        let good = Rating::Good.value();
        assert!(matches!(
            coordinator.rate_card(cards[0].id, good, NOW, None),
            Err(SyncError::AlreadyInProgress)
        ));
        assert!(coordinator.rate_card(cards[1].id, good, NOW, None).is_ok());
        drop(guard);

        assert!(coordinator.rate_card(cards[0].id, good, NOW, None).is_ok());
    }

    #[test]
    fn invalid_rating_and_unknown_card_are_reported() {
        let coordinator = coordinator(&corpus());
        assert!(matches!(
            coordinator.rate_card(Uuid::nil(), 5, NOW, None),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            coordinator.rate_card(Uuid::nil(), 3, NOW, None),
            Err(SyncError::CardNotFound(_))
        ));
    }

    #[test]
    fn unknown_deck_stats_is_not_found() {
        let coordinator = coordinator(&corpus());
        assert!(matches!(
            coordinator.deck_stats(Uuid::nil(), true, NOW),
            Err(SyncError::DeckNotFound(_))
        ));
    }
}
