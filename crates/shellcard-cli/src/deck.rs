//! Deck management subcommands.

use anyhow::Context;
use clap::Subcommand;
use std::path::PathBuf;

use shellcard_core::{install_deck, validate_deck, Config, SqliteStore, Store};

#[derive(Subcommand)]
pub enum DeckCommands {
    /// Validate a deck directory's structure and content
    Lint {
        /// Deck directory (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Show detailed validation information
        #[arg(short, long)]
        verbose: bool,

        /// Output validation results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a deck directory and ingest it into the database
    Install {
        /// Deck directory
        path: PathBuf,

        /// Update an already-installed deck in place, preserving learning progress
        #[arg(long)]
        update: bool,
    },
    /// List installed decks
    List,
}

impl DeckCommands {
    pub fn run(self, config: Config) -> anyhow::Result<()> {
        match self {
            DeckCommands::Lint { path, verbose, json } => lint(&path, verbose, json),
            DeckCommands::Install { path, update } => install(&config, &path, update),
            DeckCommands::List => list(&config),
        }
    }
}

fn lint(path: &PathBuf, verbose: bool, json: bool) -> anyhow::Result<()> {
    let result = validate_deck(path).context("validating deck")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.render_human(verbose));
    }

    if !result.valid {
        anyhow::bail!("deck validation failed with {} error(s)", result.errors.len());
    }
    Ok(())
}

fn install(config: &Config, path: &PathBuf, update: bool) -> anyhow::Result<()> {
    let db_path = config.database_path()?;
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;

    let report = install_deck(&store, path, update)?;
    if report.updated_existing {
        println!(
            "Updated deck '{}' to version {} (id {}).",
            report.deck_name, report.version, report.deck_id
        );
    } else {
        println!(
            "Installed deck '{}' version {} (id {}).",
            report.deck_name, report.version, report.deck_id
        );
    }
    println!(
        "Cards: {} added, {} updated, {} removed. Assets stored: {}.",
        report.cards_added, report.cards_updated, report.cards_removed, report.assets_stored
    );

    store.close()?;
    Ok(())
}

fn list(config: &Config) -> anyhow::Result<()> {
    let db_path = config.database_path()?;
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;

    let decks = store.list_decks()?;
    if decks.is_empty() {
        println!("No decks installed. Install one with `shellcard deck install <dir>`.");
        return Ok(());
    }

    println!("{:<5} {:<30} {:<10} {:<20}", "ID", "NAME", "VERSION", "AUTHOR");
    for deck in &decks {
        println!(
            "{:<5} {:<30} {:<10} {:<20}",
            deck.id, deck.name, deck.version, deck.author
        );
        let cards = store.get_cards_by_deck(deck.id)?;
        let new = cards.iter().filter(|card| card.fsrs.reps == 0).count();
        let image = if deck.default_image.is_empty() {
            config.sandbox.default_image.as_str()
        } else {
            deck.default_image.as_str()
        };
        let timeout = if deck.default_timeout > 0 {
            deck.default_timeout as u64
        } else {
            config.sandbox.default_timeout
        };
        println!(
            "      {} card(s), {} new | image {} | timeout {}s",
            cards.len(),
            new,
            image,
            timeout
        );
        if let Some(latest) = store.get_deck_versions(deck.id)?.first() {
            println!(
                "      last installed as {} on {}",
                latest.version,
                latest.updated_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }

    store.close()?;
    Ok(())
}
