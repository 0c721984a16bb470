//! Database schema.
//!
//! Applied on every open; safe to run repeatedly because every statement
//! carries IF NOT EXISTS.

pub(crate) const CREATE_TABLES_SQL: &str = "
-- Deck metadata and configuration
CREATE TABLE IF NOT EXISTS decks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    version TEXT,
    author TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    -- Deck-level sandbox defaults; empty image / 0 timeout inherit the
    -- application-wide defaults
    default_image TEXT DEFAULT '',
    default_timeout INTEGER DEFAULT 0, -- seconds
    default_network_enabled BOOLEAN DEFAULT FALSE,
    default_capabilities TEXT, -- JSON array
    -- FSRS parameter overrides (opaque JSON blob, tunable per deck)
    fsrs_parameters TEXT
);

-- Individual cards within decks
CREATE TABLE IF NOT EXISTS cards (
    id INTEGER PRIMARY KEY,
    deck_id INTEGER NOT NULL,
    -- Card identification
    card_key TEXT NOT NULL, -- unique within deck, from cards.csv
    title TEXT NOT NULL,
    description TEXT,
    -- Command execution
    command TEXT NOT NULL,
    working_dir TEXT DEFAULT '/tmp',
    environment_vars TEXT, -- JSON object
    -- Sandbox overrides (NULL = use deck defaults)
    image TEXT,
    timeout INTEGER,
    network_enabled BOOLEAN,
    capabilities TEXT, -- JSON array
    -- Learning metadata
    difficulty_level INTEGER DEFAULT 1, -- 1-6 scale
    tags TEXT, -- JSON array
    -- Prerequisites (symbolic linking approach)
    prerequisites TEXT, -- JSON array of card keys
    prerequisite_mode TEXT DEFAULT 'link', -- 'enforce' or 'link'
    -- FSRS state, embedded for the hot due query
    fsrs_due DATETIME NOT NULL,
    fsrs_stability REAL NOT NULL,
    fsrs_difficulty REAL NOT NULL,
    fsrs_elapsed_days INTEGER NOT NULL DEFAULT 0,
    fsrs_scheduled_days INTEGER NOT NULL DEFAULT 0,
    fsrs_reps INTEGER NOT NULL DEFAULT 0,
    fsrs_lapses INTEGER NOT NULL DEFAULT 0,
    fsrs_state INTEGER NOT NULL DEFAULT 0, -- 0=New, 1=Learning, 2=Review, 3=Relearning
    fsrs_last_review DATETIME,
    -- Timestamps
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE,
    UNIQUE(deck_id, card_key)
);

-- Review history for analytics and offline FSRS optimization
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY,
    card_id INTEGER NOT NULL,
    reviewed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    rating INTEGER NOT NULL, -- 1=Again, 2=Hard, 3=Good, 4=Easy
    -- Execution results
    execution_success BOOLEAN NOT NULL,
    exit_code INTEGER,
    stdout TEXT,
    stderr TEXT,
    -- Timing metrics
    thinking_time_ms INTEGER, -- card shown to command started
    execution_time_ms INTEGER, -- actual command execution time
    total_time_ms INTEGER,
    -- Interaction metrics
    attempts INTEGER DEFAULT 1,
    help_accessed BOOLEAN DEFAULT FALSE,
    -- FSRS state transition
    fsrs_due_before DATETIME NOT NULL,
    fsrs_due_after DATETIME NOT NULL,
    fsrs_stability_before REAL NOT NULL,
    fsrs_stability_after REAL NOT NULL,
    fsrs_difficulty_before REAL NOT NULL,
    fsrs_difficulty_after REAL NOT NULL,
    FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
);

-- Supporting files that cards within a deck can reference
CREATE TABLE IF NOT EXISTS card_assets (
    id INTEGER PRIMARY KEY,
    deck_id INTEGER NOT NULL,
    filename TEXT NOT NULL,
    content BLOB NOT NULL,
    content_type TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE,
    UNIQUE(deck_id, filename)
);

-- Deck version tracking for in-place updates
CREATE TABLE IF NOT EXISTS deck_versions (
    id INTEGER PRIMARY KEY,
    deck_id INTEGER NOT NULL,
    version TEXT NOT NULL,
    changes TEXT, -- JSON description of what changed
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
);

-- Performance indexes
CREATE INDEX IF NOT EXISTS idx_cards_due ON cards(fsrs_due);
CREATE INDEX IF NOT EXISTS idx_cards_deck ON cards(deck_id);
CREATE INDEX IF NOT EXISTS idx_reviews_card ON reviews(card_id);
CREATE INDEX IF NOT EXISTS idx_reviews_date ON reviews(reviewed_at);
CREATE INDEX IF NOT EXISTS idx_assets_deck ON card_assets(deck_id);
";
