//! SQLite-backed store.
//!
//! Single connection per process, WAL journal, foreign keys enforced, and
//! IF-NOT-EXISTS migrations applied on every open. All writes serialize
//! through the connection mutex; the review commit wraps the card update and
//! the history append in one transaction.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{ShellcardError, ShellcardResult};
use crate::scheduler::FsrsCard;
use crate::storage::migrations::CREATE_TABLES_SQL;
use crate::storage::models::{Card, Deck, DeckAsset, DeckVersion, PrerequisiteMode, Review};
use crate::storage::Store;
use crate::types::{CardState, Rating};

const DECK_COLUMNS: &str = "id, name, description, version, author, created_at, updated_at, \
     default_image, default_timeout, default_network_enabled, default_capabilities, fsrs_parameters";

const CARD_COLUMNS: &str = "id, deck_id, card_key, title, description, command, working_dir, \
     environment_vars, image, timeout, network_enabled, capabilities, difficulty_level, tags, \
     prerequisites, prerequisite_mode, fsrs_due, fsrs_stability, fsrs_difficulty, \
     fsrs_elapsed_days, fsrs_scheduled_days, fsrs_reps, fsrs_lapses, fsrs_state, \
     fsrs_last_review, created_at, updated_at";

const REVIEW_COLUMNS: &str = "id, card_id, reviewed_at, rating, execution_success, exit_code, \
     stdout, stderr, thinking_time_ms, execution_time_ms, total_time_ms, attempts, help_accessed, \
     fsrs_due_before, fsrs_due_after, fsrs_stability_before, fsrs_stability_after, \
     fsrs_difficulty_before, fsrs_difficulty_after";

/// SQLite implementation of [`Store`].
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> ShellcardResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (used by tests and dry runs).
    pub fn in_memory() -> ShellcardResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> ShellcardResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // journal_mode returns the resulting mode as a row.
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch(CREATE_TABLES_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> ShellcardResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ShellcardError::database(format!("connection poisoned: {e}")))
    }

    fn update_card_fsrs_with(conn: &Connection, card: &Card) -> ShellcardResult<()> {
        let updated = conn.execute(
            "UPDATE cards SET
                fsrs_due = ?1, fsrs_stability = ?2, fsrs_difficulty = ?3,
                fsrs_elapsed_days = ?4, fsrs_scheduled_days = ?5, fsrs_reps = ?6,
                fsrs_lapses = ?7, fsrs_state = ?8, fsrs_last_review = ?9,
                updated_at = ?10
             WHERE id = ?11",
            params![
                ts(card.fsrs.due),
                card.fsrs.stability,
                card.fsrs.difficulty,
                card.fsrs.elapsed_days,
                card.fsrs.scheduled_days,
                card.fsrs.reps,
                card.fsrs.lapses,
                card.fsrs.state.value(),
                card.fsrs.last_review.map(ts),
                ts(Utc::now()),
                card.id,
            ],
        )?;
        if updated == 0 {
            return Err(ShellcardError::not_found(
                "card",
                format!("card {} does not exist", card.id),
            ));
        }
        Ok(())
    }

    fn insert_review_with(conn: &Connection, review: &Review) -> ShellcardResult<i64> {
        conn.execute(
            "INSERT INTO reviews (card_id, reviewed_at, rating, execution_success, exit_code,
                stdout, stderr, thinking_time_ms, execution_time_ms, total_time_ms, attempts,
                help_accessed, fsrs_due_before, fsrs_due_after, fsrs_stability_before,
                fsrs_stability_after, fsrs_difficulty_before, fsrs_difficulty_after)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                review.card_id,
                ts(review.reviewed_at),
                review.rating.value(),
                review.execution_success,
                review.exit_code,
                review.stdout,
                review.stderr,
                review.thinking_time_ms,
                review.execution_time_ms,
                review.total_time_ms,
                review.attempts,
                review.help_accessed,
                ts(review.fsrs_due_before),
                ts(review.fsrs_due_after),
                review.fsrs_stability_before,
                review.fsrs_stability_after,
                review.fsrs_difficulty_before,
                review.fsrs_difficulty_after,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn cards_query(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> ShellcardResult<Vec<Card>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let cards = stmt
            .query_map(args, card_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cards)
    }
}

impl Store for SqliteStore {
    fn create_deck(&self, deck: &Deck) -> ShellcardResult<Deck> {
        let conn = self.lock()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO decks (name, description, version, author, created_at, updated_at,
                default_image, default_timeout, default_network_enabled, default_capabilities,
                fsrs_parameters)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                deck.name,
                deck.description,
                deck.version,
                deck.author,
                ts(now),
                ts(now),
                deck.default_image,
                deck.default_timeout,
                deck.default_network_enabled,
                to_json(&deck.default_capabilities)?,
                deck.fsrs_parameters,
            ],
        )?;
        let mut stored = deck.clone();
        stored.id = conn.last_insert_rowid();
        stored.created_at = now;
        stored.updated_at = now;
        Ok(stored)
    }

    fn get_deck(&self, id: i64) -> ShellcardResult<Deck> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {DECK_COLUMNS} FROM decks WHERE id = ?1"),
            params![id],
            deck_from_row,
        )
        .optional()?
        .ok_or_else(|| ShellcardError::not_found("deck", format!("deck {id} does not exist")))
    }

    fn get_deck_by_name(&self, name: &str) -> ShellcardResult<Option<Deck>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {DECK_COLUMNS} FROM decks WHERE name = ?1"),
                params![name],
                deck_from_row,
            )
            .optional()?)
    }

    fn list_decks(&self) -> ShellcardResult<Vec<Deck>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {DECK_COLUMNS} FROM decks ORDER BY name"))?;
        let decks = stmt
            .query_map([], deck_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(decks)
    }

    fn update_deck(&self, deck: &Deck) -> ShellcardResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE decks SET description = ?1, version = ?2, author = ?3,
                default_image = ?4, default_timeout = ?5, default_network_enabled = ?6,
                default_capabilities = ?7, fsrs_parameters = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                deck.description,
                deck.version,
                deck.author,
                deck.default_image,
                deck.default_timeout,
                deck.default_network_enabled,
                to_json(&deck.default_capabilities)?,
                deck.fsrs_parameters,
                ts(Utc::now()),
                deck.id,
            ],
        )?;
        if updated == 0 {
            return Err(ShellcardError::not_found(
                "deck",
                format!("deck {} does not exist", deck.id),
            ));
        }
        Ok(())
    }

    fn delete_deck(&self, id: i64) -> ShellcardResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM decks WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(ShellcardError::not_found(
                "deck",
                format!("deck {id} does not exist"),
            ));
        }
        Ok(())
    }

    fn create_card(&self, card: &Card) -> ShellcardResult<Card> {
        let conn = self.lock()?;
        let now = Utc::now();
        // FSRS state always starts from a fresh new-card vector, regardless
        // of what the caller passed in.
        let fsrs = FsrsCard::new(now);
        conn.execute(
            "INSERT INTO cards (deck_id, card_key, title, description, command, working_dir,
                environment_vars, image, timeout, network_enabled, capabilities,
                difficulty_level, tags, prerequisites, prerequisite_mode,
                fsrs_due, fsrs_stability, fsrs_difficulty, fsrs_elapsed_days,
                fsrs_scheduled_days, fsrs_reps, fsrs_lapses, fsrs_state, fsrs_last_review,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
            params![
                card.deck_id,
                card.card_key,
                card.title,
                card.description,
                card.command,
                card.working_dir,
                to_json(&card.environment)?,
                card.image,
                card.timeout,
                card.network_enabled,
                card.capabilities.as_ref().map(to_json).transpose()?,
                card.difficulty_level,
                to_json(&card.tags)?,
                to_json(&card.prerequisites)?,
                card.prerequisite_mode.as_str(),
                ts(fsrs.due),
                fsrs.stability,
                fsrs.difficulty,
                fsrs.elapsed_days,
                fsrs.scheduled_days,
                fsrs.reps,
                fsrs.lapses,
                fsrs.state.value(),
                fsrs.last_review.map(ts),
                ts(now),
                ts(now),
            ],
        )?;
        let mut stored = card.clone();
        stored.id = conn.last_insert_rowid();
        stored.fsrs = fsrs;
        stored.created_at = now;
        stored.updated_at = now;
        Ok(stored)
    }

    fn get_card(&self, id: i64) -> ShellcardResult<Card> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
            params![id],
            card_from_row,
        )
        .optional()?
        .ok_or_else(|| ShellcardError::not_found("card", format!("card {id} does not exist")))
    }

    fn get_cards_by_deck(&self, deck_id: i64) -> ShellcardResult<Vec<Card>> {
        self.cards_query(
            &format!("SELECT {CARD_COLUMNS} FROM cards WHERE deck_id = ?1 ORDER BY card_key"),
            &[&deck_id],
        )
    }

    fn get_all_cards(&self) -> ShellcardResult<Vec<Card>> {
        self.cards_query(
            &format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY deck_id, card_key"),
            &[],
        )
    }

    fn get_due_cards(&self, now: DateTime<Utc>) -> ShellcardResult<Vec<Card>> {
        self.cards_query(
            &format!(
                "SELECT {CARD_COLUMNS} FROM cards
                 WHERE fsrs_state = 0 OR fsrs_due <= ?1
                 ORDER BY fsrs_due ASC"
            ),
            &[&ts(now)],
        )
    }

    fn update_card(&self, card: &Card) -> ShellcardResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE cards SET
                title = ?1, description = ?2, command = ?3, working_dir = ?4,
                environment_vars = ?5, image = ?6, timeout = ?7, network_enabled = ?8,
                capabilities = ?9, difficulty_level = ?10, tags = ?11, prerequisites = ?12,
                prerequisite_mode = ?13, fsrs_due = ?14, fsrs_stability = ?15,
                fsrs_difficulty = ?16, fsrs_elapsed_days = ?17, fsrs_scheduled_days = ?18,
                fsrs_reps = ?19, fsrs_lapses = ?20, fsrs_state = ?21, fsrs_last_review = ?22,
                updated_at = ?23
             WHERE id = ?24",
            params![
                card.title,
                card.description,
                card.command,
                card.working_dir,
                to_json(&card.environment)?,
                card.image,
                card.timeout,
                card.network_enabled,
                card.capabilities.as_ref().map(to_json).transpose()?,
                card.difficulty_level,
                to_json(&card.tags)?,
                to_json(&card.prerequisites)?,
                card.prerequisite_mode.as_str(),
                ts(card.fsrs.due),
                card.fsrs.stability,
                card.fsrs.difficulty,
                card.fsrs.elapsed_days,
                card.fsrs.scheduled_days,
                card.fsrs.reps,
                card.fsrs.lapses,
                card.fsrs.state.value(),
                card.fsrs.last_review.map(ts),
                ts(Utc::now()),
                card.id,
            ],
        )?;
        if updated == 0 {
            return Err(ShellcardError::not_found(
                "card",
                format!("card {} does not exist", card.id),
            ));
        }
        Ok(())
    }

    fn update_card_fsrs(&self, card: &Card) -> ShellcardResult<()> {
        let conn = self.lock()?;
        Self::update_card_fsrs_with(&conn, card)
    }

    fn delete_card(&self, id: i64) -> ShellcardResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(ShellcardError::not_found(
                "card",
                format!("card {id} does not exist"),
            ));
        }
        Ok(())
    }

    fn create_review(&self, review: &Review) -> ShellcardResult<i64> {
        let conn = self.lock()?;
        Self::insert_review_with(&conn, review)
    }

    fn commit_review(&self, card: &Card, review: &Review) -> ShellcardResult<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::update_card_fsrs_with(&tx, card)?;
        let review_id = Self::insert_review_with(&tx, review)?;
        tx.commit()?;
        Ok(review_id)
    }

    fn get_reviews_by_card(&self, card_id: i64) -> ShellcardResult<Vec<Review>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE card_id = ?1 ORDER BY id"
        ))?;
        let reviews = stmt
            .query_map(params![card_id], review_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    fn store_asset(&self, asset: &DeckAsset) -> ShellcardResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO card_assets (deck_id, filename, content, content_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                asset.deck_id,
                asset.filename,
                asset.content,
                asset.content_type,
                ts(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_asset(&self, deck_id: i64, filename: &str) -> ShellcardResult<DeckAsset> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, deck_id, filename, content, content_type, created_at
             FROM card_assets WHERE deck_id = ?1 AND filename = ?2",
            params![deck_id, filename],
            asset_from_row,
        )
        .optional()?
        .ok_or_else(|| {
            ShellcardError::not_found("asset", format!("asset {filename:?} in deck {deck_id}"))
        })
    }

    fn list_deck_assets(&self, deck_id: i64) -> ShellcardResult<Vec<DeckAsset>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, deck_id, filename, content, content_type, created_at
             FROM card_assets WHERE deck_id = ?1 ORDER BY filename",
        )?;
        let assets = stmt
            .query_map(params![deck_id], asset_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    fn record_deck_version(&self, deck_id: i64, version: &str, changes: &str) -> ShellcardResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO deck_versions (deck_id, version, changes, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![deck_id, version, changes, ts(Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_deck_versions(&self, deck_id: i64) -> ShellcardResult<Vec<DeckVersion>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, deck_id, version, changes, updated_at
             FROM deck_versions WHERE deck_id = ?1 ORDER BY id DESC",
        )?;
        let versions = stmt
            .query_map(params![deck_id], version_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    fn close(&self) -> ShellcardResult<()> {
        // The connection itself is released on drop; flush the WAL so other
        // readers of the file see a clean database.
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
        Ok(())
    }
}

/// Fixed-precision RFC 3339 so stored timestamps compare lexicographically.
fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return parsed.with_timezone(&Utc);
    }
    // CURRENT_TIMESTAMP default from the schema.
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return parsed.and_utc();
    }
    tracing::warn!(value, "unparseable timestamp in database, substituting now");
    Utc::now()
}

fn parse_opt_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value.map(|v| parse_ts(&v))
}

fn to_json<T: serde::Serialize>(value: &T) -> ShellcardResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Parse a JSON-array column; malformed content degrades to empty with a warning.
fn parse_json_list(raw: Option<String>, field: &str) -> Vec<String> {
    match raw {
        None => Vec::new(),
        Some(text) if text.is_empty() => Vec::new(),
        Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(field, error = %e, "malformed JSON column, treating as empty");
            Vec::new()
        }),
    }
}

/// Parse a JSON-object column; malformed content degrades to empty with a warning.
fn parse_json_map(raw: Option<String>, field: &str) -> BTreeMap<String, String> {
    match raw {
        None => BTreeMap::new(),
        Some(text) if text.is_empty() => BTreeMap::new(),
        Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(field, error = %e, "malformed JSON column, treating as empty");
            BTreeMap::new()
        }),
    }
}

fn deck_from_row(row: &Row<'_>) -> rusqlite::Result<Deck> {
    Ok(Deck {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        version: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        author: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        created_at: parse_ts(&row.get::<_, String>(5)?),
        updated_at: parse_ts(&row.get::<_, String>(6)?),
        default_image: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        default_timeout: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
        default_network_enabled: row.get(9)?,
        default_capabilities: parse_json_list(row.get(10)?, "default_capabilities"),
        fsrs_parameters: row.get(11)?,
    })
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    let state_value: i64 = row.get(23)?;
    let state = CardState::from_value(state_value).unwrap_or_else(|| {
        tracing::warn!(state = state_value, "unknown card state in database, treating as New");
        CardState::New
    });

    Ok(Card {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        card_key: row.get(2)?,
        title: row.get(3)?,
        description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        command: row.get(5)?,
        working_dir: row.get::<_, Option<String>>(6)?.unwrap_or_else(|| "/tmp".to_string()),
        environment: parse_json_map(row.get(7)?, "environment_vars"),
        image: row.get(8)?,
        timeout: row.get(9)?,
        network_enabled: row.get(10)?,
        capabilities: row
            .get::<_, Option<String>>(11)?
            .map(|text| parse_json_list(Some(text), "capabilities")),
        difficulty_level: row.get(12)?,
        tags: parse_json_list(row.get(13)?, "tags"),
        prerequisites: parse_json_list(row.get(14)?, "prerequisites"),
        prerequisite_mode: PrerequisiteMode::parse_lossy(
            &row.get::<_, Option<String>>(15)?.unwrap_or_default(),
        ),
        fsrs: FsrsCard {
            due: parse_ts(&row.get::<_, String>(16)?),
            stability: row.get(17)?,
            difficulty: row.get(18)?,
            elapsed_days: row.get(19)?,
            scheduled_days: row.get(20)?,
            reps: row.get(21)?,
            lapses: row.get(22)?,
            state,
            last_review: parse_opt_ts(row.get(24)?),
        },
        created_at: parse_ts(&row.get::<_, String>(25)?),
        updated_at: parse_ts(&row.get::<_, String>(26)?),
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let rating_value: u8 = row.get(3)?;
    let rating = Rating::from_value(rating_value).unwrap_or_else(|| {
        tracing::warn!(rating = rating_value, "unknown rating in database, treating as Again");
        Rating::Again
    });

    Ok(Review {
        id: row.get(0)?,
        card_id: row.get(1)?,
        reviewed_at: parse_ts(&row.get::<_, String>(2)?),
        rating,
        execution_success: row.get(4)?,
        exit_code: row.get(5)?,
        stdout: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        stderr: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        thinking_time_ms: row.get(8)?,
        execution_time_ms: row.get(9)?,
        total_time_ms: row.get(10)?,
        attempts: row.get(11)?,
        help_accessed: row.get(12)?,
        fsrs_due_before: parse_ts(&row.get::<_, String>(13)?),
        fsrs_due_after: parse_ts(&row.get::<_, String>(14)?),
        fsrs_stability_before: row.get(15)?,
        fsrs_stability_after: row.get(16)?,
        fsrs_difficulty_before: row.get(17)?,
        fsrs_difficulty_after: row.get(18)?,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<DeckVersion> {
    Ok(DeckVersion {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        version: row.get(2)?,
        changes: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        updated_at: parse_ts(&row.get::<_, String>(4)?),
    })
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<DeckAsset> {
    Ok(DeckAsset {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        filename: row.get(2)?,
        content: row.get(3)?,
        content_type: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        created_at: parse_ts(&row.get::<_, String>(5)?),
    })
}
