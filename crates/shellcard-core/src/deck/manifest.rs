//! Parsed forms of `deck.yaml` and `cards.csv`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ShellcardError, ShellcardResult};

/// The fixed column schema of `cards.csv`.
pub const CARDS_CSV_HEADER: [&str; 13] = [
    "key",
    "title",
    "command",
    "description",
    "setup",
    "cleanup",
    "prerequisites",
    "verify",
    "hint",
    "solution",
    "explanation",
    "difficulty",
    "tags",
];

/// The parsed `deck.yaml` structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckManifest {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub tags: Vec<String>,
    pub license: String,
    pub difficulty_range: Vec<i64>,

    pub container: ContainerSpec,
    pub cleanup: CleanupSpec,
    pub fsrs: FsrsSpec,
    pub settings: SettingsSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    pub image: String,
    /// Seconds; 0 means "use the application default".
    pub timeout: i64,
    pub network: bool,
    pub environment: BTreeMap<String, String>,
    pub working_dir: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSpec {
    pub mode: String,
    pub preserve_on_fail: bool,
    pub timeout: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FsrsSpec {
    pub request_retention: f64,
    pub maximum_interval: i64,
    pub initial_difficulty: f64,
}

impl FsrsSpec {
    /// Serialize the non-empty overrides into the deck's opaque parameter
    /// blob; None when the manifest tunes nothing.
    pub fn to_parameter_blob(&self) -> Option<String> {
        if self.request_retention <= 0.0 && self.maximum_interval <= 0 {
            return None;
        }
        let mut blob = serde_json::Map::new();
        if self.request_retention > 0.0 {
            blob.insert("desired_retention".to_string(), self.request_retention.into());
        }
        if self.maximum_interval > 0 {
            blob.insert("maximum_interval".to_string(), self.maximum_interval.into());
        }
        serde_json::to_string(&blob).ok()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsSpec {
    pub shuffle_cards: bool,
    pub prerequisite_mode: String,
    pub show_solutions: bool,
    pub show_explanations: bool,
    pub auto_cleanup: bool,
}

impl DeckManifest {
    /// Read and parse `deck.yaml` from a deck directory.
    pub fn load(deck_path: &Path) -> ShellcardResult<Self> {
        let file = deck_path.join("deck.yaml");
        let content = std::fs::read_to_string(&file)?;
        serde_yaml::from_str(&content).map_err(|e| {
            ShellcardError::Configuration(format!("invalid deck.yaml in {}: {e}", deck_path.display()))
        })
    }
}

/// One row of `cards.csv`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardRow {
    pub key: String,
    pub title: String,
    pub command: String,
    pub description: String,
    pub setup: String,
    pub cleanup: String,
    pub prerequisites: String,
    pub verify: String,
    pub hint: String,
    pub solution: String,
    pub explanation: String,
    pub difficulty: i64,
    pub tags: String,
}

impl CardRow {
    /// The comma-separated prerequisite keys as a trimmed list.
    pub fn prerequisite_keys(&self) -> Vec<String> {
        split_list(&self.prerequisites)
    }

    /// The comma-separated tags as a trimmed list.
    pub fn tag_list(&self) -> Vec<String> {
        split_list(&self.tags)
    }
}

/// Strictly load `cards.csv` from a deck directory. Authoring diagnostics
/// come from the validator; this loader is for installation after the deck
/// has passed validation.
pub fn load_cards(deck_path: &Path) -> ShellcardResult<Vec<CardRow>> {
    let file = deck_path.join("cards.csv");
    let mut reader = csv::Reader::from_path(&file).map_err(|e| {
        ShellcardError::Configuration(format!("cannot read {}: {e}", file.display()))
    })?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: CardRow = record.map_err(|e| {
            ShellcardError::Configuration(format!("invalid row in {}: {e}", file.display()))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
