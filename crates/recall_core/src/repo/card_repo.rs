//! Card repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and aggregate queries over the `cards` table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - Card listing is deterministic: `created_at ASC, id ASC`.

use crate::db::DbError;
use crate::model::card::{Card, CardId, CardShape, CardState};
use crate::model::deck::{DeckId, DeckStats};
use crate::model::MATURE_INTERVAL_MINUTES;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const CARD_SELECT_SQL: &str = "SELECT
    id,
    deck_id,
    front,
    back,
    shape,
    state,
    step,
    stability,
    difficulty,
    interval_minutes,
    due_at,
    lapses,
    reps,
    last_reviewed_at,
    created_at,
    updated_at
FROM cards";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by deck, card and review-log persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    DeckNotFound(DeckId),
    CardNotFound(CardId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::DeckNotFound(id) => write!(f, "deck not found: {id}"),
            Self::CardNotFound(id) => write!(f, "card not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::DeckNotFound(_) | Self::CardNotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for card persistence.
pub trait CardRepository {
    fn insert_card(&self, card: &Card) -> RepoResult<()>;
    fn update_card(&self, card: &Card) -> RepoResult<()>;
    /// Deletes one card; its review logs go with it.
    fn delete_card(&self, id: CardId) -> RepoResult<()>;
    fn get_card(&self, id: CardId) -> RepoResult<Option<Card>>;
    fn list_cards(&self, deck_id: DeckId) -> RepoResult<Vec<Card>>;
    /// Non-new cards due at `now`, earliest first.
    fn list_due_cards(&self, deck_id: DeckId, now: i64, limit: u32) -> RepoResult<Vec<Card>>;
    /// New cards in creation order.
    fn list_new_cards(&self, deck_id: DeckId, limit: u32) -> RepoResult<Vec<Card>>;
    /// Changes a card id; review logs follow through `ON UPDATE CASCADE`.
    fn rekey_card(&self, old_id: CardId, new_id: CardId) -> RepoResult<()>;
    fn card_counts(&self, deck_id: DeckId, now: i64) -> RepoResult<DeckStats>;
    fn count_all_cards(&self) -> RepoResult<u32>;
}

/// SQLite-backed card repository.
pub struct SqliteCardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCardRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CardRepository for SqliteCardRepository<'_> {
    fn insert_card(&self, card: &Card) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO cards (
                id, deck_id, front, back, shape, state, step, stability, difficulty,
                interval_minutes, due_at, lapses, reps, last_reviewed_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16);",
            params![
                card.id.to_string(),
                card.deck_id.to_string(),
                card.front.as_str(),
                card.back.as_str(),
                card.shape.as_str(),
                card.state.as_str(),
                card.step,
                card.stability,
                card.difficulty,
                card.interval_minutes,
                card.due_at,
                card.lapses,
                card.reps,
                card.last_reviewed_at,
                card.created_at,
                card.updated_at,
            ],
        )?;
        Ok(())
    }

    fn update_card(&self, card: &Card) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET
                front = ?2,
                back = ?3,
                shape = ?4,
                state = ?5,
                step = ?6,
                stability = ?7,
                difficulty = ?8,
                interval_minutes = ?9,
                due_at = ?10,
                lapses = ?11,
                reps = ?12,
                last_reviewed_at = ?13,
                updated_at = ?14
             WHERE id = ?1;",
            params![
                card.id.to_string(),
                card.front.as_str(),
                card.back.as_str(),
                card.shape.as_str(),
                card.state.as_str(),
                card.step,
                card.stability,
                card.difficulty,
                card.interval_minutes,
                card.due_at,
                card.lapses,
                card.reps,
                card.last_reviewed_at,
                card.updated_at,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::CardNotFound(card.id));
        }
        Ok(())
    }

    fn delete_card(&self, id: CardId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM cards WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::CardNotFound(id));
        }
        Ok(())
    }

    fn get_card(&self, id: CardId) -> RepoResult<Option<Card>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CARD_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_card_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_cards(&self, deck_id: DeckId) -> RepoResult<Vec<Card>> {
        self.query_cards(
            &format!("{CARD_SELECT_SQL} WHERE deck_id = ?1 ORDER BY created_at ASC, id ASC;"),
            params![deck_id.to_string()],
        )
    }

    fn list_due_cards(&self, deck_id: DeckId, now: i64, limit: u32) -> RepoResult<Vec<Card>> {
        self.query_cards(
            &format!(
                "{CARD_SELECT_SQL}
                 WHERE deck_id = ?1 AND state != 'new' AND due_at <= ?2
                 ORDER BY due_at ASC, id ASC
                 LIMIT ?3;"
            ),
            params![deck_id.to_string(), now, limit],
        )
    }

    fn list_new_cards(&self, deck_id: DeckId, limit: u32) -> RepoResult<Vec<Card>> {
        self.query_cards(
            &format!(
                "{CARD_SELECT_SQL}
                 WHERE deck_id = ?1 AND state = 'new'
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2;"
            ),
            params![deck_id.to_string(), limit],
        )
    }

    fn rekey_card(&self, old_id: CardId, new_id: CardId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards SET id = ?2 WHERE id = ?1;",
            params![old_id.to_string(), new_id.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::CardNotFound(old_id));
        }
        Ok(())
    }

    fn card_counts(&self, deck_id: DeckId, now: i64) -> RepoResult<DeckStats> {
        let counts = self
            .conn
            .query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN state = 'new' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state != 'new' AND due_at <= ?2 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state = 'review' AND interval_minutes > ?3 THEN 1 ELSE 0 END), 0)
                 FROM cards
                 WHERE deck_id = ?1;",
                params![deck_id.to_string(), now, MATURE_INTERVAL_MINUTES],
                |row| {
                    Ok(DeckStats {
                        total_count: row.get(0)?,
                        new_count: row.get(1)?,
                        due_count: row.get(2)?,
                        mature_count: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(counts.unwrap_or_default())
    }

    fn count_all_cards(&self) -> RepoResult<u32> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM cards;", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl SqliteCardRepository<'_> {
    fn query_cards(&self, sql: &str, params: impl rusqlite::Params) -> RepoResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut cards = Vec::new();
        while let Some(row) = rows.next()? {
            cards.push(parse_card_row(row)?);
        }
        Ok(cards)
    }
}

/// Lists every card regardless of deck, for snapshots.
pub(crate) fn list_all_cards(conn: &Connection) -> RepoResult<Vec<Card>> {
    SqliteCardRepository::new(conn).query_cards(
        &format!("{CARD_SELECT_SQL} ORDER BY deck_id ASC, created_at ASC, id ASC;"),
        [],
    )
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_state(value: &str, column: &str) -> RepoResult<CardState> {
    CardState::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid card state `{value}` in {column}")))
}

fn parse_card_row(row: &Row<'_>) -> RepoResult<Card> {
    let id_text: String = row.get("id")?;
    let deck_text: String = row.get("deck_id")?;
    let shape_text: String = row.get("shape")?;
    let state_text: String = row.get("state")?;

    let shape = CardShape::parse(&shape_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid card shape `{shape_text}` in cards.shape"))
    })?;

    let card = Card {
        id: parse_uuid(&id_text, "cards.id")?,
        deck_id: parse_uuid(&deck_text, "cards.deck_id")?,
        front: row.get("front")?,
        back: row.get("back")?,
        shape,
        state: parse_state(&state_text, "cards.state")?,
        step: row.get("step")?,
        stability: row.get("stability")?,
        difficulty: row.get("difficulty")?,
        interval_minutes: row.get("interval_minutes")?,
        due_at: row.get("due_at")?,
        lapses: row.get("lapses")?,
        reps: row.get("reps")?,
        last_reviewed_at: row.get("last_reviewed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };

    if card.stability < 0.0 || !card.stability.is_finite() {
        return Err(RepoError::InvalidData(format!(
            "negative or non-finite stability {} for card {}",
            card.stability, card.id
        )));
    }
    Ok(card)
}
