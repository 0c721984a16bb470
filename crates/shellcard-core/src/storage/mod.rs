//! Durable persistence for decks, cards, reviews, and assets.
//!
//! The [`Store`] trait is the seam between the review coordinator and the
//! backing engine; [`SqliteStore`] is the production implementation. Every
//! operation either fully applies or cleanly rejects, and the review commit
//! (card FSRS update + history append) is atomic.

mod migrations;
mod models;
mod sqlite;

pub use models::{Card, Deck, DeckAsset, DeckVersion, PrerequisiteMode, Review};
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::ShellcardResult;

/// Typed operations over the persistent entity set.
///
/// Failure taxonomy: `NotFound`, `Uniqueness` (deck name, (deck, card key),
/// (deck, filename)), `ForeignKey`, and `Database` when the backend is
/// unreachable. Nothing is retried inside the store; callers decide.
pub trait Store: Send + Sync {
    // Deck operations.
    /// Insert a deck; assigns its id and timestamps in the returned copy.
    fn create_deck(&self, deck: &Deck) -> ShellcardResult<Deck>;
    fn get_deck(&self, id: i64) -> ShellcardResult<Deck>;
    fn get_deck_by_name(&self, name: &str) -> ShellcardResult<Option<Deck>>;
    fn list_decks(&self) -> ShellcardResult<Vec<Deck>>;
    fn update_deck(&self, deck: &Deck) -> ShellcardResult<()>;
    /// Delete a deck; cascades to its cards, reviews, and assets.
    fn delete_deck(&self, id: i64) -> ShellcardResult<()>;

    // Card operations.
    /// Insert a card. FSRS state is initialized as a fresh new card
    /// regardless of the input's FSRS fields.
    fn create_card(&self, card: &Card) -> ShellcardResult<Card>;
    fn get_card(&self, id: i64) -> ShellcardResult<Card>;
    fn get_cards_by_deck(&self, deck_id: i64) -> ShellcardResult<Vec<Card>>;
    fn get_all_cards(&self) -> ShellcardResult<Vec<Card>>;
    /// Cards where state = New or due <= `now`, ordered by due ascending.
    fn get_due_cards(&self, now: DateTime<Utc>) -> ShellcardResult<Vec<Card>>;
    fn update_card(&self, card: &Card) -> ShellcardResult<()>;
    /// Update only the FSRS-state subset plus updated_at.
    fn update_card_fsrs(&self, card: &Card) -> ShellcardResult<()>;
    fn delete_card(&self, id: i64) -> ShellcardResult<()>;

    // Review operations.
    /// Append a history row; returns its id.
    fn create_review(&self, review: &Review) -> ShellcardResult<i64>;
    /// The review commit: card FSRS update and history append, observable
    /// atomically by any subsequent `get_card`.
    fn commit_review(&self, card: &Card, review: &Review) -> ShellcardResult<i64>;
    fn get_reviews_by_card(&self, card_id: i64) -> ShellcardResult<Vec<Review>>;

    // Asset operations (upsert semantics).
    fn store_asset(&self, asset: &DeckAsset) -> ShellcardResult<i64>;
    fn get_asset(&self, deck_id: i64, filename: &str) -> ShellcardResult<DeckAsset>;
    fn list_deck_assets(&self, deck_id: i64) -> ShellcardResult<Vec<DeckAsset>>;

    // Deck version tracking.
    fn record_deck_version(&self, deck_id: i64, version: &str, changes: &str)
        -> ShellcardResult<i64>;
    /// Install/update history for a deck, most recent first.
    fn get_deck_versions(&self, deck_id: i64) -> ShellcardResult<Vec<DeckVersion>>;

    /// Release underlying resources.
    fn close(&self) -> ShellcardResult<()>;
}
