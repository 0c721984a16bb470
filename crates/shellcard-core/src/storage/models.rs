//! Persistent entity models.
//!
//! The store exclusively owns these entities and hands out value copies.
//! JSON-backed columns (tags, environment, capabilities, prerequisites) are
//! parsed into typed values at the storage boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::scheduler::FsrsCard;
use crate::types::Rating;

/// How a card's prerequisites are treated during review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrerequisiteMode {
    /// Prerequisites gate card presentation.
    Enforce,
    /// Prerequisites are informational links only.
    #[default]
    Link,
}

impl PrerequisiteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PrerequisiteMode::Enforce => "enforce",
            PrerequisiteMode::Link => "link",
        }
    }

    /// Parse the stored representation; unknown values degrade to Link with
    /// a warning since the field is non-critical.
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "enforce" => PrerequisiteMode::Enforce,
            "link" | "" => PrerequisiteMode::Link,
            other => {
                tracing::warn!(mode = other, "unknown prerequisite mode, treating as link");
                PrerequisiteMode::Link
            }
        }
    }
}

/// A collection of flashcards with shared sandbox defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub version: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Sandbox defaults that cards inherit unless overridden.
    /// Empty inherits the application-wide default image.
    pub default_image: String,
    /// Per-command timeout in seconds; 0 inherits the application default.
    pub default_timeout: i64,
    pub default_network_enabled: bool,
    pub default_capabilities: Vec<String>,

    /// Opaque FSRS parameter override blob (JSON), if the deck tunes scheduling.
    pub fsrs_parameters: Option<String>,
}

impl Default for Deck {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            description: String::new(),
            version: String::new(),
            author: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            default_image: String::new(),
            default_timeout: 0,
            default_network_enabled: false,
            default_capabilities: Vec::new(),
            fsrs_parameters: None,
        }
    }
}

/// An individual flashcard with its command and embedded FSRS state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub deck_id: i64,

    /// Author-supplied key, unique within the deck.
    pub card_key: String,
    pub title: String,
    pub description: String,

    pub command: String,
    pub working_dir: String,
    pub environment: BTreeMap<String, String>,

    // Sandbox overrides; None inherits the deck default.
    pub image: Option<String>,
    pub timeout: Option<i64>,
    pub network_enabled: Option<bool>,
    pub capabilities: Option<Vec<String>>,

    /// Author-assigned difficulty, 1-6.
    pub difficulty_level: i64,
    pub tags: Vec<String>,

    /// Card keys this card depends on. The graph is validated to be a DAG at
    /// deck lint/install time.
    pub prerequisites: Vec<String>,
    pub prerequisite_mode: PrerequisiteMode,

    /// FSRS state, embedded in the card row for index-friendly due queries.
    pub fsrs: FsrsCard,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// A card skeleton for the given deck and key; FSRS state is initialized
    /// as a new card at `now`.
    pub fn new(deck_id: i64, card_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            deck_id,
            card_key: card_key.into(),
            title: String::new(),
            description: String::new(),
            command: String::new(),
            working_dir: "/tmp".to_string(),
            environment: BTreeMap::new(),
            image: None,
            timeout: None,
            network_enabled: None,
            capabilities: None,
            difficulty_level: 1,
            tags: Vec::new(),
            prerequisites: Vec::new(),
            prerequisite_mode: PrerequisiteMode::Link,
            fsrs: FsrsCard::new(now),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only review history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub card_id: i64,

    pub reviewed_at: DateTime<Utc>,
    pub rating: Rating,

    // Execution outcome.
    pub execution_success: bool,
    pub exit_code: Option<i64>,
    pub stdout: String,
    pub stderr: String,

    // Timing metrics.
    pub thinking_time_ms: Option<i64>,
    pub execution_time_ms: Option<i64>,
    pub total_time_ms: Option<i64>,

    // Interaction metrics.
    pub attempts: i64,
    pub help_accessed: bool,

    // FSRS vector before and after the scheduler transition.
    pub fsrs_due_before: DateTime<Utc>,
    pub fsrs_due_after: DateTime<Utc>,
    pub fsrs_stability_before: f32,
    pub fsrs_stability_after: f32,
    pub fsrs_difficulty_before: f32,
    pub fsrs_difficulty_after: f32,
}

/// A supporting file cards within a deck can reference.
///
/// The sandbox driver materializes assets into the container's writable
/// tmpfs before exec.
#[derive(Debug, Clone)]
pub struct DeckAsset {
    pub id: i64,
    pub deck_id: i64,
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// A record of a deck install or in-place update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckVersion {
    pub id: i64,
    pub deck_id: i64,
    pub version: String,
    /// JSON description of what changed.
    pub changes: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardState;

    #[test]
    fn test_new_card_state_coupling() {
        let card = Card::new(1, "intro-ls", Utc::now());
        assert_eq!(card.fsrs.state, CardState::New);
        assert_eq!(card.fsrs.reps, 0);
        assert!(card.fsrs.last_review.is_none());
        assert_eq!(card.working_dir, "/tmp");
        assert_eq!(card.prerequisite_mode, PrerequisiteMode::Link);
    }

    #[test]
    fn test_prerequisite_mode_parse_lossy() {
        assert_eq!(PrerequisiteMode::parse_lossy("enforce"), PrerequisiteMode::Enforce);
        assert_eq!(PrerequisiteMode::parse_lossy("link"), PrerequisiteMode::Link);
        assert_eq!(PrerequisiteMode::parse_lossy(""), PrerequisiteMode::Link);
        assert_eq!(PrerequisiteMode::parse_lossy("bogus"), PrerequisiteMode::Link);
    }
}
