//! Error types for shellcard operations.
//!
//! A single error hierarchy shared by the scheduler, store, sandbox drivers,
//! and the review coordinator, with helper constructors and user-facing
//! suggestions for the failures a learner can act on.

use thiserror::Error;

/// Result type alias for shellcard operations.
pub type ShellcardResult<T> = Result<T, ShellcardError>;

/// Session-lifecycle failures raised by the review coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No cards matched the session options at start.
    #[error("no cards available for review with the given options")]
    NoCardsAvailable,

    /// The session queue has been fully consumed.
    #[error("no more cards remaining in session")]
    QueueExhausted,

    /// The caller referenced an unknown session or a card that is not current.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Main error type for all shellcard operations.
#[derive(Error, Debug)]
pub enum ShellcardError {
    /// Input validation failed (exec config, session options, deck manifest).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// User input does not map to a known rating. Recoverable; re-prompt.
    #[error("invalid rating: {input} (valid: 1-4, Again/Hard/Good/Easy, a/h/g/e)")]
    InvalidRating { input: String },

    /// Store lookup missed.
    #[error("{entity} not found: {message}")]
    NotFound { entity: &'static str, message: String },

    /// A unique constraint was violated (deck name, (deck, card key), (deck, filename)).
    #[error("uniqueness violation: {message}")]
    Uniqueness { message: String },

    /// A foreign-key constraint was violated.
    #[error("foreign key violation: {message}")]
    ForeignKey { message: String },

    /// Database operation failed or the backing store cannot be reached.
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Sandbox backend cannot be reached or a container could not be launched.
    #[error("sandbox error: {message}")]
    Sandbox {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Command execution exceeded its per-command deadline.
    #[error("command timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Review session lifecycle failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ShellcardError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create an invalid-rating error.
    pub fn invalid_rating(input: impl Into<String>) -> Self {
        Self::InvalidRating { input: input.into() }
    }

    /// Create a not-found error for a named entity kind.
    pub fn not_found(entity: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound { entity, message: message.into() }
    }

    /// Create a database error without a source.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into(), source: None }
    }

    /// Create a sandbox error without a source.
    pub fn sandbox(message: impl Into<String>) -> Self {
        Self::Sandbox { message: message.into(), source: None }
    }

    /// Create a sandbox error wrapping an underlying cause.
    pub fn sandbox_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Sandbox {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True when the caller may retry the same operation without changes.
    ///
    /// Only a failed review commit is retryable: the rating was not consumed
    /// and the card remains current.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database { .. })
    }

    /// Get a user-actionable suggestion for resolving this error, if any.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidRating { .. } => {
                Some("Enter 1-4, Again/Hard/Good/Easy, or a/h/g/e")
            }
            Self::Sandbox { .. } => {
                Some("Check that the sandbox backend (e.g. podman) is installed and on PATH")
            }
            Self::Database { .. } => {
                Some("Check the database path and that no other process holds the database")
            }
            Self::Timeout { .. } => {
                Some("The command can still be rated; consider raising the card timeout")
            }
            Self::Session(SessionError::NoCardsAvailable) => {
                Some("Install a deck with `shellcard deck install` or relax the session filters")
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ShellcardError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, ref message) = err {
            let text = message.clone().unwrap_or_else(|| failure.to_string());
            // SQLITE_CONSTRAINT_UNIQUE (2067) / _PRIMARYKEY (1555) vs _FOREIGNKEY (787).
            match failure.extended_code {
                2067 | 1555 => return Self::Uniqueness { message: text },
                787 => return Self::ForeignKey { message: text },
                _ => {}
            }
        }
        Self::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
