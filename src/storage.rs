//! SQLite-backed card store.
//!
//! Owns the single connection to the database and serializes every mutation
//! through it: mutating methods take `&mut self`, so a store shared across
//! threads goes behind a `Mutex` at the call site. Read-only queries take
//! `&self`.
//!
//! Three relations: `decks`, `cards`, `review_logs`. The review log is
//! append-only and intentionally carries no foreign key — history survives
//! card deletion. The due-card cache is a derived, disposable view; it is
//! refreshed explicitly after every mutation and is never the source of
//! truth.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use uuid::Uuid;

use crate::algorithm::{retrievability, Scheduler};
use crate::models::{
    CardState, Flashcard, FlashcardDeck, Rating, ReviewLog, ReviewStats, SchedulingPreview,
};
use crate::params::FsrsParameters;

/// Hard cap on rows returned by the due query, applied before any
/// client-requested limit.
const DUE_QUERY_CAP: usize = 100;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("deck not found: {0}")]
    DeckNotFound(Uuid),

    #[error("card not found: {0}")]
    CardNotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS decks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    subject TEXT NOT NULL,
    owner TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_reviewed INTEGER
);

CREATE TABLE IF NOT EXISTS cards (
    id TEXT PRIMARY KEY,
    deck_id TEXT NOT NULL REFERENCES decks(id) ON DELETE CASCADE,
    front TEXT NOT NULL,
    back TEXT NOT NULL,
    subject TEXT NOT NULL,
    owner TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    state INTEGER NOT NULL DEFAULT 0,
    stability REAL NOT NULL DEFAULT 0,
    difficulty REAL NOT NULL DEFAULT 0,
    elapsed_days REAL NOT NULL DEFAULT 0,
    scheduled_days INTEGER NOT NULL DEFAULT 0,
    reps INTEGER NOT NULL DEFAULT 0,
    lapses INTEGER NOT NULL DEFAULT 0,
    due INTEGER NOT NULL,
    last_review INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Append-only review history. No foreign key: logs outlive their card.
CREATE TABLE IF NOT EXISTS review_logs (
    id TEXT PRIMARY KEY,
    card_id TEXT NOT NULL,
    rating INTEGER NOT NULL,
    state INTEGER NOT NULL,
    due INTEGER NOT NULL,
    stability REAL NOT NULL,
    difficulty REAL NOT NULL,
    elapsed_days REAL NOT NULL,
    scheduled_days INTEGER NOT NULL,
    reviewed_at INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cards_due ON cards(due);
CREATE INDEX IF NOT EXISTS idx_cards_deck_id ON cards(deck_id);
CREATE INDEX IF NOT EXISTS idx_review_logs_card_id ON review_logs(card_id);
"#;

/// Durable store for decks, cards, and review history.
#[derive(Debug)]
pub struct CardStore {
    conn: Connection,
    scheduler: Scheduler,
    due_cache: Vec<Flashcard>,
}

impl CardStore {
    /// Open (or create) the store at the given path.
    ///
    /// Any failure to open or prepare the database is a hard error — the
    /// store never degrades into a non-persistent mode.
    pub fn open(path: &Path, params: FsrsParameters) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Unavailable {
            path: path.to_path_buf(),
            source,
        })?;
        conn.execute_batch(SCHEMA)
            .map_err(|source| StoreError::Unavailable {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            conn,
            scheduler: Scheduler::new(params),
            due_cache: Vec::new(),
        })
    }

    /// In-memory store, mainly for tests.
    pub fn open_in_memory(params: FsrsParameters) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            scheduler: Scheduler::new(params),
            due_cache: Vec::new(),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    // ==================== Deck operations ====================

    pub fn create_deck(
        &mut self,
        name: String,
        subject: String,
        owner: Option<String>,
    ) -> Result<FlashcardDeck> {
        let deck = FlashcardDeck::new(name, subject, owner);
        self.conn.execute(
            "INSERT INTO decks (id, name, subject, owner, created_at, updated_at, last_reviewed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            params![
                deck.id.to_string(),
                deck.name,
                deck.subject,
                deck.owner,
                deck.created_at.timestamp(),
                deck.updated_at.timestamp(),
            ],
        )?;
        Ok(deck)
    }

    pub fn get_deck(&self, deck_id: Uuid) -> Result<FlashcardDeck> {
        self.conn
            .query_row(
                "SELECT id, name, subject, owner, created_at, updated_at, last_reviewed
                 FROM decks WHERE id = ?1",
                params![deck_id.to_string()],
                read_deck,
            )
            .optional()?
            .ok_or(StoreError::DeckNotFound(deck_id))
    }

    pub fn list_decks(&self) -> Result<Vec<FlashcardDeck>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, subject, owner, created_at, updated_at, last_reviewed
             FROM decks ORDER BY created_at ASC, rowid ASC",
        )?;
        let decks = stmt
            .query_map([], read_deck)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(decks)
    }

    /// Delete a deck and, by cascade, all of its cards. Review logs are
    /// retained.
    pub fn delete_deck(&mut self, deck_id: Uuid) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM decks WHERE id = ?1",
            params![deck_id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::DeckNotFound(deck_id));
        }
        self.refresh_due_cache(Utc::now())?;
        Ok(())
    }

    // ==================== Card operations ====================

    /// Add a new card to a deck. The card starts in the New state, due
    /// immediately, and inherits the deck's subject and owner.
    pub fn add_card(
        &mut self,
        deck_id: Uuid,
        front: String,
        back: String,
        tags: Vec<String>,
    ) -> Result<Flashcard> {
        let deck = self.get_deck(deck_id)?;

        let mut card = Flashcard::new(deck_id, front, back);
        card.subject = deck.subject;
        card.owner = deck.owner;
        card.tags = tags;

        self.conn.execute(
            "INSERT INTO cards (id, deck_id, front, back, subject, owner, tags, state,
                                stability, difficulty, elapsed_days, scheduled_days, reps,
                                lapses, due, last_review, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                card.id.to_string(),
                card.deck_id.to_string(),
                card.front,
                card.back,
                card.subject,
                card.owner,
                serde_json::to_string(&card.tags)?,
                card.state.ordinal(),
                card.stability,
                card.difficulty,
                card.elapsed_days,
                card.scheduled_days,
                card.reps,
                card.lapses,
                card.due.timestamp(),
                card.last_review.map(|t| t.timestamp()),
                card.created_at.timestamp(),
                card.updated_at.timestamp(),
            ],
        )?;

        self.refresh_due_cache(Utc::now())?;
        Ok(card)
    }

    pub fn get_card(&self, card_id: Uuid) -> Result<Flashcard> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLS),
                params![card_id.to_string()],
                read_card,
            )
            .optional()?
            .ok_or(StoreError::CardNotFound(card_id))
    }

    pub fn list_cards(&self, deck_id: Uuid) -> Result<Vec<Flashcard>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cards WHERE deck_id = ?1 ORDER BY created_at ASC, rowid ASC",
            CARD_COLS
        ))?;
        let cards = stmt
            .query_map(params![deck_id.to_string()], read_card)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    /// Update a card's content fields. Scheduling state is untouched.
    pub fn update_card_content(
        &mut self,
        card_id: Uuid,
        front: String,
        back: String,
        tags: Vec<String>,
    ) -> Result<Flashcard> {
        let changed = self.conn.execute(
            "UPDATE cards SET front = ?2, back = ?3, tags = ?4, updated_at = ?5 WHERE id = ?1",
            params![
                card_id.to_string(),
                front,
                back,
                serde_json::to_string(&tags)?,
                Utc::now().timestamp(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::CardNotFound(card_id));
        }
        self.get_card(card_id)
    }

    pub fn delete_card(&mut self, card_id: Uuid) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM cards WHERE id = ?1",
            params![card_id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::CardNotFound(card_id));
        }
        self.refresh_due_cache(Utc::now())?;
        Ok(())
    }

    // ==================== Review operations ====================

    /// Read-only scheduling preview for a card. Delegates to the algorithm;
    /// nothing is persisted.
    pub fn scheduling_preview(&self, card: &Flashcard, now: DateTime<Utc>) -> SchedulingPreview {
        self.scheduler.schedule(card, now)
    }

    /// Apply a rating to a card: compute the next state, overwrite the card
    /// row, append a review log entry, stamp the deck, and refresh the
    /// due-card cache. The card row and log are written in one transaction.
    pub fn review_card(
        &mut self,
        card: &Flashcard,
        rating: Rating,
        now: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<Flashcard> {
        let (next, log) = self.scheduler.review(card, rating, now, duration_ms);

        let tx = self.conn.transaction()?;

        let changed = tx.execute(
            "UPDATE cards SET front = ?2, back = ?3, subject = ?4, owner = ?5, tags = ?6,
                              state = ?7, stability = ?8, difficulty = ?9, elapsed_days = ?10,
                              scheduled_days = ?11, reps = ?12, lapses = ?13, due = ?14,
                              last_review = ?15, updated_at = ?16
             WHERE id = ?1",
            params![
                next.id.to_string(),
                next.front,
                next.back,
                next.subject,
                next.owner,
                serde_json::to_string(&next.tags)?,
                next.state.ordinal(),
                next.stability,
                next.difficulty,
                next.elapsed_days,
                next.scheduled_days,
                next.reps,
                next.lapses,
                next.due.timestamp(),
                next.last_review.map(|t| t.timestamp()),
                next.updated_at.timestamp(),
            ],
        )?;
        if changed == 0 {
            // Dropping the transaction rolls back; nothing was written.
            return Err(StoreError::CardNotFound(card.id));
        }

        tx.execute(
            "INSERT INTO review_logs (id, card_id, rating, state, due, stability, difficulty,
                                      elapsed_days, scheduled_days, reviewed_at, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                log.id.to_string(),
                log.card_id.to_string(),
                log.rating.value(),
                log.state.ordinal(),
                log.due.timestamp(),
                log.stability,
                log.difficulty,
                log.elapsed_days,
                log.scheduled_days,
                log.reviewed_at.timestamp(),
                log.duration_ms,
            ],
        )?;

        tx.execute(
            "UPDATE decks SET last_reviewed = ?2, updated_at = ?2 WHERE id = ?1",
            params![next.deck_id.to_string(), now.timestamp()],
        )?;

        tx.commit()?;

        self.refresh_due_cache(now)?;
        Ok(next)
    }

    /// Cards with `due <= now`, earliest first, ties broken by insertion
    /// order. The server-side cap applies before the client limit.
    pub fn due_cards(
        &self,
        deck_id: Option<Uuid>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Flashcard>> {
        let cap = limit.min(DUE_QUERY_CAP);
        let cards = match deck_id {
            Some(deck_id) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM cards WHERE deck_id = ?1 AND due <= ?2
                     ORDER BY due ASC, rowid ASC LIMIT ?3",
                    CARD_COLS
                ))?;
                let rows = stmt
                    .query_map(
                        params![deck_id.to_string(), now.timestamp(), cap as i64],
                        read_card,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM cards WHERE due <= ?1
                     ORDER BY due ASC, rowid ASC LIMIT ?2",
                    CARD_COLS
                ))?;
                let rows = stmt
                    .query_map(params![now.timestamp(), cap as i64], read_card)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(cards)
    }

    /// Review history for a card, oldest first.
    pub fn logs_for_card(&self, card_id: Uuid) -> Result<Vec<ReviewLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, card_id, rating, state, due, stability, difficulty, elapsed_days,
                    scheduled_days, reviewed_at, duration_ms
             FROM review_logs WHERE card_id = ?1 ORDER BY reviewed_at ASC, rowid ASC",
        )?;
        let logs = stmt
            .query_map(params![card_id.to_string()], read_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    // ==================== Due cache ====================

    /// The last due-card snapshot. A point-in-time view: stale until the
    /// next explicit refresh, never authoritative.
    pub fn due_cache(&self) -> &[Flashcard] {
        &self.due_cache
    }

    /// Rebuild the due-card cache from the store. Returns the new size.
    pub fn refresh_due_cache(&mut self, now: DateTime<Utc>) -> Result<usize> {
        self.due_cache = self.due_cards(None, DUE_QUERY_CAP, now)?;
        log::debug!("due cache refreshed: {} cards", self.due_cache.len());
        Ok(self.due_cache.len())
    }

    // ==================== Stats ====================

    /// Aggregate counts and averages, for one deck or the whole store.
    pub fn deck_stats(&self, deck_id: Option<Uuid>, now: DateTime<Utc>) -> Result<ReviewStats> {
        let sql = format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN due <= ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state IN (1, 3) THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN state = 2 THEN 1 ELSE 0 END), 0),
                    AVG(stability),
                    AVG(difficulty),
                    MAX(last_review)
             FROM cards{}",
            if deck_id.is_some() {
                " WHERE deck_id = ?2"
            } else {
                ""
            }
        );

        let map_row = |row: &Row| -> rusqlite::Result<ReviewStats> {
            Ok(ReviewStats {
                total_cards: row.get::<_, i64>(0)? as usize,
                due_cards: row.get::<_, i64>(1)? as usize,
                new_cards: row.get::<_, i64>(2)? as usize,
                learning_cards: row.get::<_, i64>(3)? as usize,
                review_cards: row.get::<_, i64>(4)? as usize,
                avg_stability: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                avg_difficulty: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                last_study: row.get::<_, Option<i64>>(7)?.map(from_ts),
            })
        };

        let stats = match deck_id {
            Some(deck_id) => self.conn.query_row(
                &sql,
                params![now.timestamp(), deck_id.to_string()],
                map_row,
            )?,
            None => self.conn.query_row(&sql, params![now.timestamp()], map_row)?,
        };
        Ok(stats)
    }

    /// Mean predicted recall probability across cards, at `now`. Cards that
    /// were never reviewed count as certain recall. Returns 0 for an empty
    /// selection.
    pub fn predicted_retention(&self, deck_id: Option<Uuid>, now: DateTime<Utc>) -> Result<f64> {
        let sql = format!(
            "SELECT stability, last_review FROM cards{}",
            if deck_id.is_some() {
                " WHERE deck_id = ?1"
            } else {
                ""
            }
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let map_row = |row: &Row| -> rusqlite::Result<(f64, Option<i64>)> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let rows: Vec<(f64, Option<i64>)> = match deck_id {
            Some(deck_id) => stmt
                .query_map(params![deck_id.to_string()], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };

        if rows.is_empty() {
            return Ok(0.0);
        }

        let total: f64 = rows
            .iter()
            .map(|(stability, last_review)| {
                let elapsed = last_review
                    .map(|last| (now.timestamp() - last) as f64 / 86_400.0)
                    .unwrap_or(0.0);
                retrievability(elapsed, *stability)
            })
            .sum();
        Ok(total / rows.len() as f64)
    }
}

const CARD_COLS: &str = "id, deck_id, front, back, subject, owner, tags, state, stability, \
     difficulty, elapsed_days, scheduled_days, reps, lapses, due, last_review, created_at, \
     updated_at";

fn from_ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn read_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn read_deck(row: &Row) -> rusqlite::Result<FlashcardDeck> {
    Ok(FlashcardDeck {
        id: read_uuid(row, 0)?,
        name: row.get(1)?,
        subject: row.get(2)?,
        owner: row.get(3)?,
        created_at: from_ts(row.get(4)?),
        updated_at: from_ts(row.get(5)?),
        last_reviewed: row.get::<_, Option<i64>>(6)?.map(from_ts),
    })
}

fn read_card(row: &Row) -> rusqlite::Result<Flashcard> {
    let id = read_uuid(row, 0)?;

    let tags_json: String = row.get(6)?;
    let tags = serde_json::from_str(&tags_json).unwrap_or_else(|e| {
        log::warn!("card {}: unreadable tags column ({}), using empty", id, e);
        Vec::new()
    });

    let state_ord: i64 = row.get(7)?;
    let state = CardState::from_i64(state_ord).unwrap_or_else(|| {
        log::warn!(
            "card {}: state ordinal {} out of range, normalizing to New",
            id,
            state_ord
        );
        CardState::New
    });

    Ok(Flashcard {
        id,
        deck_id: read_uuid(row, 1)?,
        front: row.get(2)?,
        back: row.get(3)?,
        subject: row.get(4)?,
        owner: row.get(5)?,
        tags,
        state,
        stability: row.get(8)?,
        difficulty: row.get(9)?,
        elapsed_days: row.get(10)?,
        scheduled_days: row.get(11)?,
        reps: row.get(12)?,
        lapses: row.get(13)?,
        due: from_ts(row.get(14)?),
        last_review: row.get::<_, Option<i64>>(15)?.map(from_ts),
        created_at: from_ts(row.get(16)?),
        updated_at: from_ts(row.get(17)?),
    })
}

fn read_log(row: &Row) -> rusqlite::Result<ReviewLog> {
    let rating_val: i64 = row.get(2)?;
    let state_ord: i64 = row.get(3)?;
    Ok(ReviewLog {
        id: read_uuid(row, 0)?,
        card_id: read_uuid(row, 1)?,
        rating: Rating::from_i64(rating_val).unwrap_or(Rating::Good),
        state: CardState::from_i64(state_ord).unwrap_or(CardState::New),
        due: from_ts(row.get(4)?),
        stability: row.get(5)?,
        difficulty: row.get(6)?,
        elapsed_days: row.get(7)?,
        scheduled_days: row.get(8)?,
        reviewed_at: from_ts(row.get(9)?),
        duration_ms: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn store() -> CardStore {
        CardStore::open_in_memory(FsrsParameters::default()).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
    }

    /// Wall clock truncated to whole seconds, matching column precision.
    /// Newly added cards are due relative to this as long as it is taken
    /// after the insert.
    fn wall_now() -> DateTime<Utc> {
        from_ts(Utc::now().timestamp())
    }

    fn seed_deck(store: &mut CardStore) -> FlashcardDeck {
        store
            .create_deck("Chemistry".into(), "science".into(), Some("anna".into()))
            .unwrap()
    }

    #[test]
    fn test_open_on_disk_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cards.db");

        let deck_id = {
            let mut store = CardStore::open(&path, FsrsParameters::default()).unwrap();
            let deck = seed_deck(&mut store);
            store
                .add_card(deck.id, "H2O?".into(), "water".into(), vec![])
                .unwrap();
            deck.id
        };

        // Reopen: schema is idempotent, data survives.
        let store = CardStore::open(&path, FsrsParameters::default()).unwrap();
        let deck = store.get_deck(deck_id).unwrap();
        assert_eq!(deck.name, "Chemistry");
        assert_eq!(store.list_cards(deck_id).unwrap().len(), 1);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        // A directory at the database path: SQLite cannot open it.
        let err = CardStore::open(dir.path(), FsrsParameters::default()).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn test_add_card_inherits_deck_fields() {
        let mut store = store();
        let deck = seed_deck(&mut store);
        let card = store
            .add_card(
                deck.id,
                "H2O?".into(),
                "water".into(),
                vec!["liquids".into()],
            )
            .unwrap();

        assert_eq!(card.subject, "science");
        assert_eq!(card.owner.as_deref(), Some("anna"));
        assert_eq!(card.state, CardState::New);

        let loaded = store.get_card(card.id).unwrap();
        assert_eq!(loaded.tags, vec!["liquids".to_string()]);
    }

    #[test]
    fn test_add_card_to_missing_deck() {
        let mut store = store();
        let err = store
            .add_card(Uuid::new_v4(), "f".into(), "b".into(), vec![])
            .unwrap_err();
        assert!(matches!(err, StoreError::DeckNotFound(_)));
    }

    #[test]
    fn test_review_round_trip() {
        let mut store = store();
        let deck = seed_deck(&mut store);
        let card = store
            .add_card(deck.id, "H2O?".into(), "water".into(), vec!["a".into()])
            .unwrap();

        let now = fixed_now();
        let reviewed = store.review_card(&card, Rating::Easy, now, 2500).unwrap();
        assert_eq!(reviewed.state, CardState::Review);

        // Reload by id: field-for-field equal to the in-memory result,
        // except created_at, whose sub-second part is truncated by the
        // seconds-precision column.
        let loaded = store.get_card(card.id).unwrap();
        assert_eq!(loaded.id, reviewed.id);
        assert_eq!(loaded.state, reviewed.state);
        assert!((loaded.stability - reviewed.stability).abs() < 1e-9);
        assert!((loaded.difficulty - reviewed.difficulty).abs() < 1e-9);
        assert!((loaded.elapsed_days - reviewed.elapsed_days).abs() < 1e-9);
        assert_eq!(loaded.scheduled_days, reviewed.scheduled_days);
        assert_eq!(loaded.reps, reviewed.reps);
        assert_eq!(loaded.lapses, reviewed.lapses);
        assert_eq!(loaded.due, reviewed.due);
        assert_eq!(loaded.last_review, reviewed.last_review);
        assert_eq!(loaded.tags, reviewed.tags);

        // Deck got stamped.
        let deck = store.get_deck(deck.id).unwrap();
        assert_eq!(deck.last_reviewed, Some(now));
    }

    #[test]
    fn test_review_missing_card_rolls_back() {
        let mut store = store();
        let deck = seed_deck(&mut store);
        let ghost = Flashcard::new(deck.id, "f".into(), "b".into());

        let err = store
            .review_card(&ghost, Rating::Good, fixed_now(), 1000)
            .unwrap_err();
        assert!(matches!(err, StoreError::CardNotFound(id) if id == ghost.id));

        // The rolled-back transaction left no log behind.
        assert!(store.logs_for_card(ghost.id).unwrap().is_empty());
    }

    #[test]
    fn test_review_log_appended_per_review() {
        let mut store = store();
        let deck = seed_deck(&mut store);
        let card = store
            .add_card(deck.id, "f".into(), "b".into(), vec![])
            .unwrap();

        let now = fixed_now();
        let card = store.review_card(&card, Rating::Good, now, 1500).unwrap();
        let later = now + Duration::minutes(10);
        store.review_card(&card, Rating::Good, later, 900).unwrap();

        let logs = store.logs_for_card(card.id).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].state, CardState::New);
        assert_eq!(logs[0].duration_ms, 1500);
        assert_eq!(logs[1].state, CardState::Learning);
        assert_eq!(logs[1].reviewed_at, later);
    }

    #[test]
    fn test_due_query_ordering_and_bound() {
        // Cards due at T-1h, T+1h, T: querying at T returns exactly the
        // first and third, in (T-1h, T) order.
        let mut store = store();
        let deck = seed_deck(&mut store);
        let now = fixed_now();

        let offsets = [
            ("past", now - Duration::hours(1)),
            ("future", now + Duration::hours(1)),
            ("exact", now),
        ];
        for (front, due) in offsets {
            let card = store
                .add_card(deck.id, front.into(), "b".into(), vec![])
                .unwrap();
            store
                .conn
                .execute(
                    "UPDATE cards SET due = ?2 WHERE id = ?1",
                    params![card.id.to_string(), due.timestamp()],
                )
                .unwrap();
        }

        let due = store.due_cards(None, 10, now).unwrap();
        let fronts: Vec<&str> = due.iter().map(|c| c.front.as_str()).collect();
        assert_eq!(fronts, vec!["past", "exact"]);
    }

    #[test]
    fn test_due_query_tie_break_is_insertion_order() {
        let mut store = store();
        let deck = seed_deck(&mut store);
        let now = fixed_now();
        let due = (now - Duration::hours(2)).timestamp();

        for front in ["first", "second", "third"] {
            let card = store
                .add_card(deck.id, front.into(), "b".into(), vec![])
                .unwrap();
            store
                .conn
                .execute(
                    "UPDATE cards SET due = ?2 WHERE id = ?1",
                    params![card.id.to_string(), due],
                )
                .unwrap();
        }

        let fronts: Vec<String> = store
            .due_cards(None, 10, now)
            .unwrap()
            .into_iter()
            .map(|c| c.front)
            .collect();
        assert_eq!(fronts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_due_query_limit_and_deck_filter() {
        let mut store = store();
        let deck_a = seed_deck(&mut store);
        let deck_b = store
            .create_deck("History".into(), "history".into(), None)
            .unwrap();

        for i in 0..5 {
            store
                .add_card(deck_a.id, format!("a{}", i), "b".into(), vec![])
                .unwrap();
        }
        store
            .add_card(deck_b.id, "b0".into(), "b".into(), vec![])
            .unwrap();
        let now = wall_now();

        assert_eq!(store.due_cards(None, 3, now).unwrap().len(), 3);
        assert_eq!(store.due_cards(Some(deck_b.id), 10, now).unwrap().len(), 1);
        assert_eq!(store.due_cards(Some(deck_a.id), 10, now).unwrap().len(), 5);
    }

    #[test]
    fn test_due_cache_refreshes_on_mutation() {
        let mut store = store();
        let deck = seed_deck(&mut store);

        assert!(store.due_cache().is_empty());

        let card = store
            .add_card(deck.id, "f".into(), "b".into(), vec![])
            .unwrap();
        let now = wall_now();
        store.refresh_due_cache(now).unwrap();
        assert_eq!(store.due_cache().len(), 1);

        // An Easy review schedules the card days out; it leaves the cache.
        store.review_card(&card, Rating::Easy, now, 1000).unwrap();
        assert!(store.due_cache().is_empty());
    }

    #[test]
    fn test_scheduling_preview_persists_nothing() {
        let mut store = store();
        let deck = seed_deck(&mut store);
        let card = store
            .add_card(deck.id, "f".into(), "b".into(), vec![])
            .unwrap();

        let preview = store.scheduling_preview(&card, fixed_now());
        assert_eq!(preview.easy.state, CardState::Review);

        let loaded = store.get_card(card.id).unwrap();
        assert_eq!(loaded.state, CardState::New);
        assert_eq!(loaded.reps, 0);
        assert!(store.logs_for_card(card.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_deck_cascades_cards_keeps_logs() {
        let mut store = store();
        let deck = seed_deck(&mut store);
        let card = store
            .add_card(deck.id, "f".into(), "b".into(), vec![])
            .unwrap();
        store
            .review_card(&card, Rating::Good, fixed_now(), 1000)
            .unwrap();

        store.delete_deck(deck.id).unwrap();
        assert!(matches!(
            store.get_card(card.id).unwrap_err(),
            StoreError::CardNotFound(_)
        ));
        // Audit history survives the cascade.
        assert_eq!(store.logs_for_card(card.id).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let mut store = store();
        assert!(matches!(
            store.delete_card(Uuid::new_v4()).unwrap_err(),
            StoreError::CardNotFound(_)
        ));
        assert!(matches!(
            store.delete_deck(Uuid::new_v4()).unwrap_err(),
            StoreError::DeckNotFound(_)
        ));
    }

    #[test]
    fn test_invalid_state_ordinal_normalizes_to_new() {
        let mut store = store();
        let deck = seed_deck(&mut store);
        let card = store
            .add_card(deck.id, "f".into(), "b".into(), vec![])
            .unwrap();

        store
            .conn
            .execute(
                "UPDATE cards SET state = 9, tags = 'not-json' WHERE id = ?1",
                params![card.id.to_string()],
            )
            .unwrap();

        let loaded = store.get_card(card.id).unwrap();
        assert_eq!(loaded.state, CardState::New);
        assert!(loaded.tags.is_empty());
    }

    #[test]
    fn test_deck_stats() {
        let mut store = store();
        let deck = seed_deck(&mut store);

        let a = store
            .add_card(deck.id, "a".into(), "b".into(), vec![])
            .unwrap();
        store
            .add_card(deck.id, "c".into(), "d".into(), vec![])
            .unwrap();
        let now = wall_now();
        store.review_card(&a, Rating::Easy, now, 1000).unwrap();

        let stats = store.deck_stats(Some(deck.id), now).unwrap();
        assert_eq!(stats.total_cards, 2);
        assert_eq!(stats.new_cards, 1);
        assert_eq!(stats.review_cards, 1);
        assert_eq!(stats.due_cards, 1);
        assert_eq!(stats.last_study, Some(now));
        assert!(stats.avg_stability > 0.0);

        // Empty selection stays at zero instead of erroring.
        let empty = store.deck_stats(Some(Uuid::new_v4()), now).unwrap();
        assert_eq!(empty.total_cards, 0);
        assert_eq!(empty.avg_stability, 0.0);
    }

    #[test]
    fn test_predicted_retention() {
        let mut store = store();
        let deck = seed_deck(&mut store);
        let now = fixed_now();

        assert_eq!(store.predicted_retention(None, now).unwrap(), 0.0);

        let card = store
            .add_card(deck.id, "a".into(), "b".into(), vec![])
            .unwrap();
        // Never reviewed: certain recall.
        assert!((store.predicted_retention(None, now).unwrap() - 1.0).abs() < 1e-9);

        // Reviewed card at exactly its stability horizon sits at the
        // retention target.
        let reviewed = store.review_card(&card, Rating::Easy, now, 1000).unwrap();
        let later = now + Duration::days(reviewed.stability.round() as i64);
        let r = store.predicted_retention(None, later).unwrap();
        assert!(r < 1.0 && r > 0.8);
    }
}
