//! Append-only review-log repository.
//!
//! # Invariants
//! - Logs are never updated; deletion happens only through card/deck cascade.
//! - Daily counters are derived from logs, not stored separately.

use crate::model::card::CardId;
use crate::model::deck::{DailyCounters, DeckId};
use crate::model::review::{Rating, ReviewLog};
use crate::repo::card_repo::{parse_state, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const LOG_SELECT_SQL: &str = "SELECT
    card_id,
    deck_id,
    rating,
    state,
    reviewed_at,
    interval_minutes,
    elapsed_minutes
FROM review_logs";

/// Repository interface for review history.
pub trait ReviewLogRepository {
    fn append_log(&self, log: &ReviewLog) -> RepoResult<()>;
    /// Logs of one card, oldest first.
    fn list_logs_for_card(&self, card_id: CardId) -> RepoResult<Vec<ReviewLog>>;
    /// Counters for reviews with `from <= reviewed_at < to`.
    fn daily_counters(&self, deck_id: DeckId, from: i64, to: i64) -> RepoResult<DailyCounters>;
}

/// SQLite-backed review-log repository.
pub struct SqliteReviewLogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReviewLogRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_logs(&self, sql: &str, params: impl rusqlite::Params) -> RepoResult<Vec<ReviewLog>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next()? {
            logs.push(parse_log_row(row)?);
        }
        Ok(logs)
    }
}

impl ReviewLogRepository for SqliteReviewLogRepository<'_> {
    fn append_log(&self, log: &ReviewLog) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO review_logs (
                card_id, deck_id, rating, state, reviewed_at, interval_minutes, elapsed_minutes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                log.card_id.to_string(),
                log.deck_id.to_string(),
                log.rating.value(),
                log.state.as_str(),
                log.reviewed_at,
                log.interval_minutes,
                log.elapsed_minutes,
            ],
        )?;
        Ok(())
    }

    fn list_logs_for_card(&self, card_id: CardId) -> RepoResult<Vec<ReviewLog>> {
        self.query_logs(
            &format!("{LOG_SELECT_SQL} WHERE card_id = ?1 ORDER BY reviewed_at ASC, id ASC;"),
            [card_id.to_string()],
        )
    }

    fn daily_counters(&self, deck_id: DeckId, from: i64, to: i64) -> RepoResult<DailyCounters> {
        let counters = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN state = 'new' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 'review' THEN 1 ELSE 0 END), 0)
             FROM review_logs
             WHERE deck_id = ?1 AND reviewed_at >= ?2 AND reviewed_at < ?3;",
            params![deck_id.to_string(), from, to],
            |row| {
                Ok(DailyCounters {
                    new_reviewed: row.get(0)?,
                    review_reviewed: row.get(1)?,
                })
            },
        )?;
        Ok(counters)
    }
}

/// Lists every log, for snapshots.
pub(crate) fn list_all_logs(conn: &Connection) -> RepoResult<Vec<ReviewLog>> {
    SqliteReviewLogRepository::new(conn)
        .query_logs(&format!("{LOG_SELECT_SQL} ORDER BY id ASC;"), [])
}

fn parse_log_row(row: &Row<'_>) -> RepoResult<ReviewLog> {
    let card_text: String = row.get("card_id")?;
    let deck_text: String = row.get("deck_id")?;
    let state_text: String = row.get("state")?;
    let rating_value: u8 = row.get("rating")?;
    let rating = Rating::try_from(rating_value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid rating `{rating_value}` in review_logs.rating"
        ))
    })?;

    Ok(ReviewLog {
        card_id: parse_uuid(&card_text, "review_logs.card_id")?,
        deck_id: parse_uuid(&deck_text, "review_logs.deck_id")?,
        rating,
        state: parse_state(&state_text, "review_logs.state")?,
        reviewed_at: row.get("reviewed_at")?,
        interval_minutes: row.get("interval_minutes")?,
        elapsed_minutes: row.get("elapsed_minutes")?,
    })
}
