//! shellcard CLI library.

pub mod app;
pub mod deck;
pub mod review;

use std::path::PathBuf;

// Re-export CLI types for testing.
pub use clap::{Parser, Subcommand};

use shellcard_core::Config;

#[derive(Parser)]
#[command(name = "shellcard")]
#[command(about = "Learn real command-line skills with spaced repetition in rootless containers")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args)]
pub struct GlobalArgs {
    /// Config file (default: ~/.shellcard/shellcard.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log in JSON format
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Database file path
    #[arg(long, global = true)]
    pub database_path: Option<PathBuf>,

    /// Sandbox driver
    #[arg(long, global = true)]
    pub sandbox_driver: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive review session
    Review(review::ReviewArgs),
    /// Manage decks
    Deck {
        #[command(subcommand)]
        subcommand: deck::DeckCommands,
    },
}

impl GlobalArgs {
    /// Load configuration and overlay the explicit flags on top.
    pub fn load_config(&self) -> shellcard_core::ShellcardResult<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if self.log_json {
            config.log_json = true;
        }
        if let Some(path) = &self.database_path {
            config.database.path = path.clone();
        }
        if let Some(driver) = &self.sandbox_driver {
            config.sandbox.driver = driver.clone();
        }
        Ok(config)
    }
}
