//! In-process SQLite store.
//!
//! Owns one migrated connection and builds short-lived repositories over
//! it (or over a transaction) per call.

use super::{
    CardChangeSet, DeckChangeSet, DeckRekey, FlashcardStore, StoreError, StoreResult,
    StoreSnapshot, SNAPSHOT_FORMAT_VERSION,
};
use crate::db::{open_db, open_db_in_memory};
use crate::model::card::{Card, CardId};
use crate::model::deck::{DailyCounters, Deck, DeckId, DeckStats};
use crate::model::review::ReviewLog;
use crate::repo::card_repo::{list_all_cards, CardRepository, SqliteCardRepository};
use crate::repo::deck_repo::{DeckRepository, SqliteDeckRepository};
use crate::repo::review_log_repo::{
    list_all_logs, ReviewLogRepository, SqliteReviewLogRepository,
};
use log::{debug, info};
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;

/// Store that runs every operation on the caller's thread.
pub struct DirectStore {
    conn: Connection,
}

impl DirectStore {
    /// Opens (and migrates) a file-backed store.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self {
            conn: open_db(path)?,
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
        })
    }

    fn decks(&self) -> SqliteDeckRepository<'_> {
        SqliteDeckRepository::new(&self.conn)
    }

    fn cards(&self) -> SqliteCardRepository<'_> {
        SqliteCardRepository::new(&self.conn)
    }

    fn logs(&self) -> SqliteReviewLogRepository<'_> {
        SqliteReviewLogRepository::new(&self.conn)
    }
}

impl FlashcardStore for DirectStore {
    fn get_deck(&self, id: DeckId) -> StoreResult<Option<Deck>> {
        Ok(self.decks().get_deck(id)?)
    }

    fn get_decks_by_path(&self, path: &str) -> StoreResult<Vec<Deck>> {
        Ok(self.decks().get_decks_by_path(path)?)
    }

    fn list_decks(&self) -> StoreResult<Vec<Deck>> {
        Ok(self.decks().list_decks()?)
    }

    fn create_deck(&mut self, deck: &Deck) -> StoreResult<()> {
        Ok(self.decks().insert_deck(deck)?)
    }

    fn update_deck(&mut self, deck: &Deck) -> StoreResult<()> {
        Ok(self.decks().update_deck(deck)?)
    }

    fn delete_deck(&mut self, id: DeckId) -> StoreResult<()> {
        Ok(self.decks().delete_deck(id)?)
    }

    fn delete_decks_by_path(&mut self, path: &str) -> StoreResult<usize> {
        Ok(self.decks().delete_decks_by_path(path)?)
    }

    fn apply_deck_changes(&mut self, changes: &DeckChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let repo = SqliteDeckRepository::new(&tx);
            for id in &changes.delete {
                repo.delete_deck(*id)?;
            }
            for deck in &changes.update {
                repo.update_deck(deck)?;
            }
            for deck in &changes.create {
                repo.insert_deck(deck)?;
            }
        }
        tx.commit()?;
        debug!(
            "event=deck_changes_applied module=store status=ok created={} updated={} deleted={}",
            changes.create.len(),
            changes.update.len(),
            changes.delete.len()
        );
        Ok(())
    }

    fn rekey_decks(&mut self, moves: &[DeckRekey]) -> StoreResult<()> {
        if moves.is_empty() {
            return Ok(());
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let decks = SqliteDeckRepository::new(&tx);
            let cards = SqliteCardRepository::new(&tx);
            for rekey in moves {
                decks.rekey_deck(rekey.old_id, &rekey.deck)?;
                for (old_card, new_card) in &rekey.card_ids {
                    cards.rekey_card(*old_card, *new_card)?;
                }
            }
        }
        tx.commit()?;
        debug!(
            "event=decks_rekeyed module=store status=ok decks={}",
            moves.len()
        );
        Ok(())
    }

    fn get_card(&self, id: CardId) -> StoreResult<Option<Card>> {
        Ok(self.cards().get_card(id)?)
    }

    fn list_cards(&self, deck_id: DeckId) -> StoreResult<Vec<Card>> {
        Ok(self.cards().list_cards(deck_id)?)
    }

    fn list_due_cards(&self, deck_id: DeckId, now: i64, limit: u32) -> StoreResult<Vec<Card>> {
        Ok(self.cards().list_due_cards(deck_id, now, limit)?)
    }

    fn list_new_cards(&self, deck_id: DeckId, limit: u32) -> StoreResult<Vec<Card>> {
        Ok(self.cards().list_new_cards(deck_id, limit)?)
    }

    fn apply_card_changes(&mut self, changes: &CardChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let cards = SqliteCardRepository::new(&tx);
            for id in &changes.delete {
                cards.delete_card(*id)?;
            }
            for card in &changes.update {
                cards.update_card(card)?;
            }
            for card in &changes.create {
                cards.insert_card(card)?;
            }
            if let Some(deck) = &changes.deck {
                SqliteDeckRepository::new(&tx).update_deck(deck)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn record_review(&mut self, card: &Card, log: &ReviewLog) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        SqliteCardRepository::new(&tx).update_card(card)?;
        SqliteReviewLogRepository::new(&tx).append_log(log)?;
        tx.commit()?;
        Ok(())
    }

    fn list_review_logs(&self, card_id: CardId) -> StoreResult<Vec<ReviewLog>> {
        Ok(self.logs().list_logs_for_card(card_id)?)
    }

    fn daily_counters(&self, deck_id: DeckId, from: i64, to: i64) -> StoreResult<DailyCounters> {
        Ok(self.logs().daily_counters(deck_id, from, to)?)
    }

    fn card_counts(&self, deck_id: DeckId, now: i64) -> StoreResult<DeckStats> {
        Ok(self.cards().card_counts(deck_id, now)?)
    }

    fn count_all_cards(&self) -> StoreResult<u32> {
        Ok(self.cards().count_all_cards()?)
    }

    fn save(&mut self) -> StoreResult<()> {
        // Checkpoint returns one status row in every journal mode.
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
        debug!("event=store_save module=store status=ok");
        Ok(())
    }

    fn export_snapshot(&self) -> StoreResult<Vec<u8>> {
        let snapshot = StoreSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            decks: self.decks().list_decks()?,
            cards: list_all_cards(&self.conn)?,
            logs: list_all_logs(&self.conn)?,
        };
        let bytes =
            serde_json::to_vec(&snapshot).map_err(|err| StoreError::Snapshot(err.to_string()))?;
        info!(
            "event=snapshot_export module=store status=ok decks={} cards={} logs={} bytes={}",
            snapshot.decks.len(),
            snapshot.cards.len(),
            snapshot.logs.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    fn import_snapshot(&mut self, bytes: &[u8]) -> StoreResult<()> {
        let snapshot: StoreSnapshot =
            serde_json::from_slice(bytes).map_err(|err| StoreError::Snapshot(err.to_string()))?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::Snapshot(format!(
                "unsupported snapshot format {}; expected {}",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            tx.execute("DELETE FROM decks;", [])?;
            let decks = SqliteDeckRepository::new(&tx);
            for deck in &snapshot.decks {
                decks.insert_deck(deck)?;
            }
            let cards = SqliteCardRepository::new(&tx);
            for card in &snapshot.cards {
                cards.insert_card(card)?;
            }
            let logs = SqliteReviewLogRepository::new(&tx);
            for log in &snapshot.logs {
                logs.append_log(log)?;
            }
        }
        tx.commit()?;
        info!(
            "event=snapshot_import module=store status=ok decks={} cards={} logs={}",
            snapshot.decks.len(),
            snapshot.cards.len(),
            snapshot.logs.len()
        );
        Ok(())
    }
}
