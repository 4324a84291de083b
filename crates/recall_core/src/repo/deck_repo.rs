//! Deck repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `(path, tag)` is unique across decks.
//! - Deleting a deck removes its cards and review logs by cascade.
//! - Re-keying a deck moves cards and logs by `ON UPDATE CASCADE`; callers
//!   run it inside a transaction together with card re-keying.

use crate::model::deck::{Deck, DeckId};
use crate::repo::card_repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const DECK_SELECT_SQL: &str = "SELECT
    id,
    name,
    path,
    tag,
    profile,
    last_synced_at,
    created_at,
    updated_at
FROM decks";

/// Repository interface for deck persistence.
pub trait DeckRepository {
    fn insert_deck(&self, deck: &Deck) -> RepoResult<()>;
    fn update_deck(&self, deck: &Deck) -> RepoResult<()>;
    fn get_deck(&self, id: DeckId) -> RepoResult<Option<Deck>>;
    fn get_decks_by_path(&self, path: &str) -> RepoResult<Vec<Deck>>;
    /// All decks ordered by `path, tag`.
    fn list_decks(&self) -> RepoResult<Vec<Deck>>;
    fn delete_deck(&self, id: DeckId) -> RepoResult<()>;
    /// Returns the number of decks removed.
    fn delete_decks_by_path(&self, path: &str) -> RepoResult<usize>;
    /// Moves deck `old_id` to the identity and fields of `deck`.
    fn rekey_deck(&self, old_id: DeckId, deck: &Deck) -> RepoResult<()>;
}

/// SQLite-backed deck repository.
pub struct SqliteDeckRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDeckRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_decks(&self, sql: &str, params: impl rusqlite::Params) -> RepoResult<Vec<Deck>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut decks = Vec::new();
        while let Some(row) = rows.next()? {
            decks.push(parse_deck_row(row)?);
        }
        Ok(decks)
    }
}

impl DeckRepository for SqliteDeckRepository<'_> {
    fn insert_deck(&self, deck: &Deck) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO decks (
                id, name, path, tag, profile, last_synced_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                deck.id.to_string(),
                deck.name.as_str(),
                deck.path.as_str(),
                deck.tag.as_str(),
                deck.profile.as_str(),
                deck.last_synced_at,
                deck.created_at,
                deck.updated_at,
            ],
        )?;
        Ok(())
    }

    fn update_deck(&self, deck: &Deck) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE decks
             SET
                name = ?2,
                path = ?3,
                tag = ?4,
                profile = ?5,
                last_synced_at = ?6,
                updated_at = ?7
             WHERE id = ?1;",
            params![
                deck.id.to_string(),
                deck.name.as_str(),
                deck.path.as_str(),
                deck.tag.as_str(),
                deck.profile.as_str(),
                deck.last_synced_at,
                deck.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::DeckNotFound(deck.id));
        }
        Ok(())
    }

    fn get_deck(&self, id: DeckId) -> RepoResult<Option<Deck>> {
        let mut decks = self.query_decks(
            &format!("{DECK_SELECT_SQL} WHERE id = ?1;"),
            [id.to_string()],
        )?;
        Ok(decks.pop())
    }

    fn get_decks_by_path(&self, path: &str) -> RepoResult<Vec<Deck>> {
        self.query_decks(
            &format!("{DECK_SELECT_SQL} WHERE path = ?1 ORDER BY tag ASC;"),
            [path],
        )
    }

    fn list_decks(&self) -> RepoResult<Vec<Deck>> {
        self.query_decks(&format!("{DECK_SELECT_SQL} ORDER BY path ASC, tag ASC;"), [])
    }

    fn delete_deck(&self, id: DeckId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM decks WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::DeckNotFound(id));
        }
        Ok(())
    }

    fn delete_decks_by_path(&self, path: &str) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM decks WHERE path = ?1;", [path])?;
        Ok(changed)
    }

    fn rekey_deck(&self, old_id: DeckId, deck: &Deck) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE decks
             SET
                id = ?2,
                name = ?3,
                path = ?4,
                tag = ?5,
                updated_at = ?6
             WHERE id = ?1;",
            params![
                old_id.to_string(),
                deck.id.to_string(),
                deck.name.as_str(),
                deck.path.as_str(),
                deck.tag.as_str(),
                deck.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::DeckNotFound(old_id));
        }
        Ok(())
    }
}

fn parse_deck_row(row: &Row<'_>) -> RepoResult<Deck> {
    let id_text: String = row.get("id")?;
    Ok(Deck {
        id: parse_uuid(&id_text, "decks.id")?,
        name: row.get("name")?,
        path: row.get("path")?,
        tag: row.get("tag")?,
        profile: row.get("profile")?,
        last_synced_at: row.get("last_synced_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
