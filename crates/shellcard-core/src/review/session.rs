//! Session-facing types: options, live session state, resolved cards, stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::scheduler::FsrsCard;
use crate::types::Rating;

/// Application-wide sandbox fallbacks, used when neither a card override nor
/// a deck default supplies a value.
#[derive(Debug, Clone)]
pub struct SandboxDefaults {
    pub image: String,
    pub timeout: Duration,
}

impl Default for SandboxDefaults {
    fn default() -> Self {
        Self::from(&crate::config::SandboxConfig::default())
    }
}

impl From<&crate::config::SandboxConfig> for SandboxDefaults {
    fn from(config: &crate::config::SandboxConfig) -> Self {
        Self {
            image: config.default_image.clone(),
            timeout: Duration::from_secs(config.default_timeout.max(1)),
        }
    }
}

/// Options for a review session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Restrict to one deck; None reviews across all decks.
    pub deck_id: Option<i64>,
    /// Cap on queue length after filtering and shuffling. 0 = unlimited.
    pub max_cards: usize,
    /// Keep only cards that have never been reviewed.
    pub new_only: bool,
    /// Keep only cards with reps > 0 that are due. May be combined with
    /// `new_only` (the intersection).
    pub due_only: bool,
    /// Randomize queue order.
    pub shuffle: bool,
    /// Session-wide network opt-in. A card's explicit override still wins.
    pub network_enabled: bool,
}

/// An active review session, as visible to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub deck_id: Option<i64>,
    pub cards_reviewed: usize,
    pub cards_remaining: usize,
    pub current_card_id: Option<i64>,
}

/// A card ready for review, with deck-merged sandbox configuration.
#[derive(Debug, Clone)]
pub struct ReviewCard {
    pub id: i64,
    pub deck_id: i64,
    pub card_key: String,
    pub title: String,
    pub description: String,

    pub command: String,
    pub working_dir: String,
    pub environment: BTreeMap<String, String>,

    // Resolved sandbox configuration: card override, else deck default,
    // else the application-wide fallback (network additionally honors the
    // session-wide opt-in).
    pub image: String,
    pub timeout: Duration,
    pub network_enabled: bool,
    pub capabilities: Vec<String>,

    pub difficulty_level: i64,
    pub tags: Vec<String>,

    pub fsrs: FsrsCard,
}

/// Aggregate statistics for a finished session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub duration: Duration,
    pub cards_reviewed: usize,
    /// Cards that had reps = 0 when reviewed.
    pub new_cards: usize,
    /// Cards that had been reviewed before.
    pub review_cards: usize,
    pub again_count: usize,
    pub hard_count: usize,
    pub good_count: usize,
    pub easy_count: usize,
    pub average_rating: f64,
}

/// In-memory per-rating tally maintained at submit time.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Tally {
    pub new_cards: usize,
    pub review_cards: usize,
    pub again: usize,
    pub hard: usize,
    pub good: usize,
    pub easy: usize,
    pub rating_sum: u64,
}

impl Tally {
    pub(crate) fn record(&mut self, rating: Rating, was_new: bool) {
        if was_new {
            self.new_cards += 1;
        } else {
            self.review_cards += 1;
        }
        match rating {
            Rating::Again => self.again += 1,
            Rating::Hard => self.hard += 1,
            Rating::Good => self.good += 1,
            Rating::Easy => self.easy += 1,
        }
        self.rating_sum += rating.value() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_defaults_mirror_config() {
        let defaults = SandboxDefaults::default();
        assert_eq!(defaults.image, "alpine:3.18");
        assert_eq!(defaults.timeout, Duration::from_secs(30));

        let config = crate::config::SandboxConfig {
            default_image: "ubuntu:24.04".to_string(),
            default_timeout: 45,
            ..Default::default()
        };
        let defaults = SandboxDefaults::from(&config);
        assert_eq!(defaults.image, "ubuntu:24.04");
        assert_eq!(defaults.timeout, Duration::from_secs(45));

        // A zero config timeout still yields a positive deadline.
        let config = crate::config::SandboxConfig {
            default_timeout: 0,
            ..Default::default()
        };
        assert_eq!(SandboxDefaults::from(&config).timeout, Duration::from_secs(1));
    }
}
