//! Deck installation: ingest a validated deck directory into the store.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::deck::manifest::{load_cards, CardRow, DeckManifest};
use crate::deck::validator::validate_deck;
use crate::error::{ShellcardError, ShellcardResult};
use crate::storage::{Card, Deck, DeckAsset, PrerequisiteMode, Store};

/// What an install or update changed.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub deck_id: i64,
    pub deck_name: String,
    pub version: String,
    pub updated_existing: bool,
    pub cards_added: usize,
    pub cards_updated: usize,
    pub cards_removed: usize,
    pub assets_stored: usize,
}

/// Validate and ingest a deck directory.
///
/// A deck whose name already exists is only touched when `update` is set;
/// the update path preserves the FSRS state of cards that survive (matched
/// by card key), creates new ones, and removes cards no longer in the CSV.
pub fn install_deck(
    store: &dyn Store,
    deck_path: &Path,
    update: bool,
) -> ShellcardResult<InstallReport> {
    let validation = validate_deck(deck_path)?;
    if !validation.valid {
        let first = validation
            .errors
            .first()
            .map(|diag| diag.message.clone())
            .unwrap_or_default();
        return Err(ShellcardError::validation(format!(
            "deck failed validation with {} error(s), first: {first}",
            validation.errors.len()
        )));
    }

    let manifest = DeckManifest::load(deck_path)?;
    let rows = load_cards(deck_path)?;

    let mut report = InstallReport {
        deck_name: manifest.name.clone(),
        version: manifest.version.clone(),
        ..Default::default()
    };

    let existing = store.get_deck_by_name(&manifest.name)?;
    let deck = match existing {
        Some(existing) if !update => {
            return Err(ShellcardError::Uniqueness {
                message: format!(
                    "deck '{}' is already installed; pass --update to update it in place",
                    manifest.name
                ),
            });
        }
        Some(existing) => {
            let mut deck = deck_from_manifest(&manifest);
            deck.id = existing.id;
            deck.created_at = existing.created_at;
            store.update_deck(&deck)?;
            report.updated_existing = true;
            deck
        }
        None => store.create_deck(&deck_from_manifest(&manifest))?,
    };
    report.deck_id = deck.id;

    sync_cards(store, &deck, &manifest, &rows, &mut report)?;
    report.assets_stored = store_assets(store, deck.id, deck_path)?;

    let changes = json!({
        "cards_added": report.cards_added,
        "cards_updated": report.cards_updated,
        "cards_removed": report.cards_removed,
        "assets": report.assets_stored,
    });
    store.record_deck_version(deck.id, &manifest.version, &changes.to_string())?;

    info!(
        deck = %manifest.name,
        version = %manifest.version,
        added = report.cards_added,
        updated = report.cards_updated,
        removed = report.cards_removed,
        assets = report.assets_stored,
        "deck installed"
    );

    Ok(report)
}

fn deck_from_manifest(manifest: &DeckManifest) -> Deck {
    let mut deck = Deck {
        name: manifest.name.clone(),
        description: manifest.description.clone(),
        version: manifest.version.clone(),
        author: manifest.author.clone(),
        fsrs_parameters: manifest.fsrs.to_parameter_blob(),
        ..Deck::default()
    };
    if !manifest.container.image.is_empty() {
        deck.default_image = manifest.container.image.clone();
    }
    if manifest.container.timeout > 0 {
        deck.default_timeout = manifest.container.timeout;
    }
    deck.default_network_enabled = manifest.container.network;
    deck
}

fn card_from_row(deck: &Deck, manifest: &DeckManifest, row: &CardRow) -> Card {
    let mut card = Card::new(deck.id, row.key.clone(), Utc::now());
    card.title = row.title.clone();
    card.description = row.description.clone();
    card.command = row.command.clone();
    card.difficulty_level = row.difficulty;
    card.tags = row.tag_list();
    card.prerequisites = row.prerequisite_keys();
    card.prerequisite_mode = PrerequisiteMode::parse_lossy(&manifest.settings.prerequisite_mode);
    if !manifest.container.working_dir.is_empty() {
        card.working_dir = manifest.container.working_dir.clone();
    }
    card.environment = manifest.container.environment.clone();
    card
}

fn sync_cards(
    store: &dyn Store,
    deck: &Deck,
    manifest: &DeckManifest,
    rows: &[CardRow],
    report: &mut InstallReport,
) -> ShellcardResult<()> {
    let existing: BTreeMap<String, Card> = store
        .get_cards_by_deck(deck.id)?
        .into_iter()
        .map(|card| (card.card_key.clone(), card))
        .collect();

    let mut seen: Vec<&str> = Vec::with_capacity(rows.len());
    for row in rows {
        seen.push(row.key.as_str());
        match existing.get(&row.key) {
            Some(current) => {
                // Refresh the content, keep the learner's FSRS progress.
                let mut updated = card_from_row(deck, manifest, row);
                updated.id = current.id;
                updated.fsrs = current.fsrs.clone();
                store.update_card(&updated)?;
                report.cards_updated += 1;
            }
            None => {
                store.create_card(&card_from_row(deck, manifest, row))?;
                report.cards_added += 1;
            }
        }
    }

    for (key, card) in &existing {
        if !seen.contains(&key.as_str()) {
            store.delete_card(card.id)?;
            report.cards_removed += 1;
        }
    }

    Ok(())
}

fn store_assets(store: &dyn Store, deck_id: i64, deck_path: &Path) -> ShellcardResult<usize> {
    let assets_dir = deck_path.join("assets");
    if !assets_dir.is_dir() {
        return Ok(0);
    }

    let mut stored = 0;
    for entry in WalkDir::new(&assets_dir) {
        let entry = entry.map_err(|e| {
            ShellcardError::Configuration(format!("cannot walk assets directory: {e}"))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(&assets_dir)
            .map_err(|e| ShellcardError::Internal(e.to_string()))?;
        let filename = relative.to_string_lossy().replace('\\', "/");
        let content = std::fs::read(entry.path())?;
        if content.is_empty() {
            warn!(file = %filename, "skipping empty asset");
            continue;
        }

        store.store_asset(&DeckAsset {
            id: 0,
            deck_id,
            filename,
            content,
            content_type: content_type_for(entry.path()).to_string(),
            created_at: Utc::now(),
        })?;
        stored += 1;
    }
    Ok(stored)
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => "application/json",
        Some("txt" | "md" | "csv") => "text/plain",
        Some("sh") => "text/x-shellscript",
        Some("png") => "image/png",
        Some("tar" | "tgz" | "gz") => "application/gzip",
        _ => "application/octet-stream",
    }
}
