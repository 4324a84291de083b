//! Store delegated to a dedicated worker thread.
//!
//! # Responsibility
//! - Own the SQLite connection on a worker thread.
//! - Expose the `FlashcardStore` contract through request/response messages.
//!
//! # Invariants
//! - No memory is shared with the worker: every request and response carries
//!   owned copies, snapshot buffers included.
//! - Requests are served one at a time in arrival order.
//! - Dropping the handle closes the channel and joins the worker.

use super::{
    CardChangeSet, DeckChangeSet, DeckRekey, DirectStore, FlashcardStore, StoreError,
    StoreResult,
};
use crate::model::card::{Card, CardId};
use crate::model::deck::{DailyCounters, Deck, DeckId, DeckStats};
use crate::model::review::ReviewLog;
use log::{error, info};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

/// Request messages understood by the worker.
#[derive(Debug)]
enum StoreRequest {
    GetDeck(DeckId),
    GetDecksByPath(String),
    ListDecks,
    CreateDeck(Deck),
    UpdateDeck(Deck),
    DeleteDeck(DeckId),
    DeleteDecksByPath(String),
    ApplyDeckChanges(DeckChangeSet),
    RekeyDecks(Vec<DeckRekey>),
    GetCard(CardId),
    ListCards(DeckId),
    ListDueCards {
        deck_id: DeckId,
        now: i64,
        limit: u32,
    },
    ListNewCards {
        deck_id: DeckId,
        limit: u32,
    },
    ApplyCardChanges(CardChangeSet),
    RecordReview {
        card: Card,
        log: ReviewLog,
    },
    ListReviewLogs(CardId),
    DailyCounters {
        deck_id: DeckId,
        from: i64,
        to: i64,
    },
    CardCounts {
        deck_id: DeckId,
        now: i64,
    },
    CountAllCards,
    Save,
    ExportSnapshot,
    ImportSnapshot(Vec<u8>),
}

/// Response messages produced by the worker.
#[derive(Debug)]
enum StoreResponse {
    Unit,
    Count(usize),
    Deck(Option<Deck>),
    Decks(Vec<Deck>),
    Card(Option<Card>),
    Cards(Vec<Card>),
    Logs(Vec<ReviewLog>),
    Counters(DailyCounters),
    Stats(DeckStats),
    Bytes(Vec<u8>),
}

struct Envelope {
    request: StoreRequest,
    reply: Sender<StoreResult<StoreResponse>>,
}

/// `FlashcardStore` whose SQLite connection lives on a worker thread.
pub struct WorkerStore {
    sender: Option<Sender<Envelope>>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerStore {
    /// Moves `store` onto a new worker thread.
    pub fn spawn(store: DirectStore) -> StoreResult<Self> {
        let (sender, receiver) = mpsc::channel::<Envelope>();
        let handle = std::thread::Builder::new()
            .name("recall-store".to_string())
            .spawn(move || serve(store, receiver))
            .map_err(|err| StoreError::WorkerUnavailable(err.to_string()))?;
        info!("event=store_worker_start module=store status=ok");
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn call(&self, request: StoreRequest) -> StoreResult<StoreResponse> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| StoreError::WorkerUnavailable("worker already stopped".to_string()))?;
        let (reply, response) = mpsc::channel();
        sender
            .send(Envelope { request, reply })
            .map_err(|_| StoreError::WorkerUnavailable("request channel closed".to_string()))?;
        response
            .recv()
            .map_err(|_| StoreError::WorkerUnavailable("worker dropped the request".to_string()))?
    }
}

impl Drop for WorkerStore {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("event=store_worker_stop module=store status=error error=worker_panicked");
            }
        }
    }
}

fn serve(mut store: DirectStore, receiver: Receiver<Envelope>) {
    for Envelope { request, reply } in receiver {
        let result = handle_request(&mut store, request);
        // The caller may have given up waiting; nothing to do then.
        let _ = reply.send(result);
    }
    info!("event=store_worker_stop module=store status=ok");
}

fn handle_request(store: &mut DirectStore, request: StoreRequest) -> StoreResult<StoreResponse> {
    use StoreResponse as R;
    Ok(match request {
        StoreRequest::GetDeck(id) => R::Deck(store.get_deck(id)?),
        StoreRequest::GetDecksByPath(path) => R::Decks(store.get_decks_by_path(&path)?),
        StoreRequest::ListDecks => R::Decks(store.list_decks()?),
        StoreRequest::CreateDeck(deck) => {
            store.create_deck(&deck)?;
            R::Unit
        }
        StoreRequest::UpdateDeck(deck) => {
            store.update_deck(&deck)?;
            R::Unit
        }
        StoreRequest::DeleteDeck(id) => {
            store.delete_deck(id)?;
            R::Unit
        }
        StoreRequest::DeleteDecksByPath(path) => R::Count(store.delete_decks_by_path(&path)?),
        StoreRequest::ApplyDeckChanges(changes) => {
            store.apply_deck_changes(&changes)?;
            R::Unit
        }
        StoreRequest::RekeyDecks(moves) => {
            store.rekey_decks(&moves)?;
            R::Unit
        }
        StoreRequest::GetCard(id) => R::Card(store.get_card(id)?),
        StoreRequest::ListCards(deck_id) => R::Cards(store.list_cards(deck_id)?),
        StoreRequest::ListDueCards {
            deck_id,
            now,
            limit,
        } => R::Cards(store.list_due_cards(deck_id, now, limit)?),
        StoreRequest::ListNewCards { deck_id, limit } => {
            R::Cards(store.list_new_cards(deck_id, limit)?)
        }
        StoreRequest::ApplyCardChanges(changes) => {
            store.apply_card_changes(&changes)?;
            R::Unit
        }
        StoreRequest::RecordReview { card, log } => {
            store.record_review(&card, &log)?;
            R::Unit
        }
        StoreRequest::ListReviewLogs(card_id) => R::Logs(store.list_review_logs(card_id)?),
        StoreRequest::DailyCounters { deck_id, from, to } => {
            R::Counters(store.daily_counters(deck_id, from, to)?)
        }
        StoreRequest::CardCounts { deck_id, now } => R::Stats(store.card_counts(deck_id, now)?),
        StoreRequest::CountAllCards => R::Count(store.count_all_cards()? as usize),
        StoreRequest::Save => {
            store.save()?;
            R::Unit
        }
        StoreRequest::ExportSnapshot => R::Bytes(store.export_snapshot()?),
        StoreRequest::ImportSnapshot(bytes) => {
            store.import_snapshot(&bytes)?;
            R::Unit
        }
    })
}

fn unexpected(response: StoreResponse) -> StoreError {
    StoreError::WorkerUnavailable(format!("unexpected worker response {response:?}"))
}

impl FlashcardStore for WorkerStore {
    fn get_deck(&self, id: DeckId) -> StoreResult<Option<Deck>> {
        match self.call(StoreRequest::GetDeck(id))? {
            StoreResponse::Deck(deck) => Ok(deck),
            other => Err(unexpected(other)),
        }
    }

    fn get_decks_by_path(&self, path: &str) -> StoreResult<Vec<Deck>> {
        match self.call(StoreRequest::GetDecksByPath(path.to_string()))? {
            StoreResponse::Decks(decks) => Ok(decks),
            other => Err(unexpected(other)),
        }
    }

    fn list_decks(&self) -> StoreResult<Vec<Deck>> {
        match self.call(StoreRequest::ListDecks)? {
            StoreResponse::Decks(decks) => Ok(decks),
            other => Err(unexpected(other)),
        }
    }

    fn create_deck(&mut self, deck: &Deck) -> StoreResult<()> {
        expect_unit(self.call(StoreRequest::CreateDeck(deck.clone()))?)
    }

    fn update_deck(&mut self, deck: &Deck) -> StoreResult<()> {
        expect_unit(self.call(StoreRequest::UpdateDeck(deck.clone()))?)
    }

    fn delete_deck(&mut self, id: DeckId) -> StoreResult<()> {
        expect_unit(self.call(StoreRequest::DeleteDeck(id))?)
    }

    fn delete_decks_by_path(&mut self, path: &str) -> StoreResult<usize> {
        match self.call(StoreRequest::DeleteDecksByPath(path.to_string()))? {
            StoreResponse::Count(count) => Ok(count),
            other => Err(unexpected(other)),
        }
    }

    fn apply_deck_changes(&mut self, changes: &DeckChangeSet) -> StoreResult<()> {
        expect_unit(self.call(StoreRequest::ApplyDeckChanges(changes.clone()))?)
    }

    fn rekey_decks(&mut self, moves: &[DeckRekey]) -> StoreResult<()> {
        expect_unit(self.call(StoreRequest::RekeyDecks(moves.to_vec()))?)
    }

    fn get_card(&self, id: CardId) -> StoreResult<Option<Card>> {
        match self.call(StoreRequest::GetCard(id))? {
            StoreResponse::Card(card) => Ok(card),
            other => Err(unexpected(other)),
        }
    }

    fn list_cards(&self, deck_id: DeckId) -> StoreResult<Vec<Card>> {
        expect_cards(self.call(StoreRequest::ListCards(deck_id))?)
    }

    fn list_due_cards(&self, deck_id: DeckId, now: i64, limit: u32) -> StoreResult<Vec<Card>> {
        expect_cards(self.call(StoreRequest::ListDueCards {
            deck_id,
            now,
            limit,
        })?)
    }

    fn list_new_cards(&self, deck_id: DeckId, limit: u32) -> StoreResult<Vec<Card>> {
        expect_cards(self.call(StoreRequest::ListNewCards { deck_id, limit })?)
    }

    fn apply_card_changes(&mut self, changes: &CardChangeSet) -> StoreResult<()> {
        expect_unit(self.call(StoreRequest::ApplyCardChanges(changes.clone()))?)
    }

    fn record_review(&mut self, card: &Card, log: &ReviewLog) -> StoreResult<()> {
        expect_unit(self.call(StoreRequest::RecordReview {
            card: card.clone(),
            log: log.clone(),
        })?)
    }

    fn list_review_logs(&self, card_id: CardId) -> StoreResult<Vec<ReviewLog>> {
        match self.call(StoreRequest::ListReviewLogs(card_id))? {
            StoreResponse::Logs(logs) => Ok(logs),
            other => Err(unexpected(other)),
        }
    }

    fn daily_counters(&self, deck_id: DeckId, from: i64, to: i64) -> StoreResult<DailyCounters> {
        match self.call(StoreRequest::DailyCounters { deck_id, from, to })? {
            StoreResponse::Counters(counters) => Ok(counters),
            other => Err(unexpected(other)),
        }
    }

    fn card_counts(&self, deck_id: DeckId, now: i64) -> StoreResult<DeckStats> {
        match self.call(StoreRequest::CardCounts { deck_id, now })? {
            StoreResponse::Stats(stats) => Ok(stats),
            other => Err(unexpected(other)),
        }
    }

    fn count_all_cards(&self) -> StoreResult<u32> {
        match self.call(StoreRequest::CountAllCards)? {
            StoreResponse::Count(count) => Ok(count as u32),
            other => Err(unexpected(other)),
        }
    }

    fn save(&mut self) -> StoreResult<()> {
        expect_unit(self.call(StoreRequest::Save)?)
    }

    fn export_snapshot(&self) -> StoreResult<Vec<u8>> {
        match self.call(StoreRequest::ExportSnapshot)? {
            StoreResponse::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected(other)),
        }
    }

    fn import_snapshot(&mut self, bytes: &[u8]) -> StoreResult<()> {
        expect_unit(self.call(StoreRequest::ImportSnapshot(bytes.to_vec()))?)
    }
}

fn expect_unit(response: StoreResponse) -> StoreResult<()> {
    match response {
        StoreResponse::Unit => Ok(()),
        other => Err(unexpected(other)),
    }
}

fn expect_cards(response: StoreResponse) -> StoreResult<Vec<Card>> {
    match response {
        StoreResponse::Cards(cards) => Ok(cards),
        other => Err(unexpected(other)),
    }
}
