//! Review use-cases: preview, rate and build today's queue.
//!
//! # Invariants
//! - Ratings are validated before any lookup or write.
//! - A rated card and its log are persisted atomically.

use crate::config::Settings;
use crate::model::card::{Card, CardId};
use crate::model::deck::{Deck, DeckId};
use crate::model::review::Rating;
use crate::model::validation::ValidationError;
use crate::scheduler::{Scheduler, SchedulingPreview};
use crate::service::stats_service::StatsService;
use crate::store::{FlashcardStore, StoreError};
use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for review use-cases.
#[derive(Debug)]
pub enum ReviewError {
    Validation(ValidationError),
    DeckNotFound(DeckId),
    CardNotFound(CardId),
    Store(StoreError),
}

impl Display for ReviewError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::DeckNotFound(id) => write!(f, "deck not found: {id}"),
            Self::CardNotFound(id) => write!(f, "card not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReviewError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::DeckNotFound(_) | Self::CardNotFound(_) => None,
        }
    }
}

impl From<ValidationError> for ReviewError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for ReviewError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Review facade over a store and a configured scheduler.
pub struct ReviewService<'a> {
    store: &'a mut dyn FlashcardStore,
    scheduler: &'a Scheduler,
    settings: &'a Settings,
}

impl<'a> ReviewService<'a> {
    pub fn new(
        store: &'a mut dyn FlashcardStore,
        scheduler: &'a Scheduler,
        settings: &'a Settings,
    ) -> Self {
        Self {
            store,
            scheduler,
            settings,
        }
    }

    pub fn load_card(&self, card_id: CardId) -> Result<Card, ReviewError> {
        self.store
            .get_card(card_id)?
            .ok_or(ReviewError::CardNotFound(card_id))
    }

    fn load_deck(&self, deck_id: DeckId) -> Result<Deck, ReviewError> {
        self.store
            .get_deck(deck_id)?
            .ok_or(ReviewError::DeckNotFound(deck_id))
    }

    pub fn preview_card(&self, card_id: CardId, now: i64) -> Result<SchedulingPreview, ReviewError> {
        let card = self.load_card(card_id)?;
        let deck = self.load_deck(card.deck_id)?;
        let profile = self.settings.profile(&deck.profile);
        Ok(self.scheduler.preview(&card, now, profile)?)
    }

    /// Validates `rating`, then rates the stored card.
    pub fn rate_card(
        &mut self,
        card_id: CardId,
        rating: u8,
        now: i64,
        elapsed_override_ms: Option<i64>,
    ) -> Result<Card, ReviewError> {
        let rating = Rating::try_from(rating)?;
        let card = self.load_card(card_id)?;
        self.rate(&card, rating, now, elapsed_override_ms)
    }

    /// Rates an already loaded card and persists the result with its log.
    pub fn rate(
        &mut self,
        card: &Card,
        rating: Rating,
        now: i64,
        elapsed_override_ms: Option<i64>,
    ) -> Result<Card, ReviewError> {
        let deck = self.load_deck(card.deck_id)?;
        let profile = self.settings.profile(&deck.profile);
        let (next, log) = self
            .scheduler
            .rate(card, rating, now, elapsed_override_ms, profile)?;
        self.store.record_review(&next, &log)?;
        debug!(
            "event=card_rated module=review status=ok card_id={} rating={} state={} interval_minutes={}",
            next.id,
            rating.value(),
            next.state.as_str(),
            next.interval_minutes
        );
        Ok(next)
    }

    /// Due cards (oldest due first) followed by new cards, each bounded by
    /// today's remaining allowance when `respect_daily_limits` is set.
    pub fn review_queue(
        &self,
        deck_id: DeckId,
        now: i64,
        respect_daily_limits: bool,
    ) -> Result<Vec<Card>, ReviewError> {
        let deck = self.load_deck(deck_id)?;
        let profile = self.settings.profile(&deck.profile);
        let (due_limit, new_limit) = if respect_daily_limits {
            let allowance = StatsService::new(&*self.store).daily_allowance(&deck, profile, now)?;
            (
                allowance.review_remaining.unwrap_or(u32::MAX),
                allowance.new_remaining.unwrap_or(u32::MAX),
            )
        } else {
            (u32::MAX, u32::MAX)
        };

        let mut queue = if due_limit > 0 {
            self.store.list_due_cards(deck.id, now, due_limit)?
        } else {
            Vec::new()
        };
        if new_limit > 0 {
            queue.extend(self.store.list_new_cards(deck.id, new_limit)?);
        }
        Ok(queue)
    }
}
