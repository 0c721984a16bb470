//! shellcard-core - Core library for shellcard.
//!
//! shellcard is a spaced-repetition trainer for real command-line skills:
//! every flashcard is a shell command that runs inside a hardened rootless
//! OCI container, the learner self-grades (Again / Hard / Good / Easy), and
//! the FSRS scheduler reschedules the card.
//!
//! This crate provides the domain types, the FSRS scheduler, the SQLite
//! store, the review session coordinator, configuration, deck authoring
//! (manifest, validator, installer), and the `Sandbox` trait that container
//! backends implement.
//!
//! # Example
//!
//! ```ignore
//! use shellcard_core::{ReviewService, Scheduler, SessionOptions, SqliteStore};
//!
//! let store = Arc::new(SqliteStore::open(&db_path)?);
//! let mut service = ReviewService::new(store, Scheduler::new(), driver);
//!
//! let session = service.start_session(SessionOptions::default())?;
//! let card = service.get_next_card(&session.id)?;
//! let result = service.execute_card(&session.id, &card).await?;
//! service.submit_review(&session.id, card.id, rating, Some(&result.into()))?;
//! let stats = service.end_session(&session.id)?;
//! ```

pub mod config;
pub mod deck;
pub mod error;
pub mod review;
pub mod scheduler;
pub mod storage;
pub mod traits;
pub mod types;

// Re-export commonly used types.
pub use config::{Config, DatabaseConfig, ReviewConfig, SandboxConfig};
pub use deck::{install_deck, validate_deck, DeckManifest, InstallReport, ValidationResult};
pub use error::{SessionError, ShellcardError, ShellcardResult};
pub use review::{
    ReviewCard, ReviewService, SandboxDefaults, Session, SessionOptions, SessionStats,
};
pub use scheduler::{FsrsCard, Parameters, ReviewLog, Scheduler, SchedulingInfo, SchedulingOptions};
pub use storage::{Card, Deck, DeckAsset, PrerequisiteMode, Review, SqliteStore, Store};
pub use traits::{ContainerLifecycle, ExecutionConfig, ExecutionResult, Sandbox};
pub use types::{CardState, Rating};
