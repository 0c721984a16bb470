//! Sandbox trait and execution types.
//!
//! A sandbox driver executes a single command inside an isolated container
//! and owns whatever long-lived resources its lifecycle model requires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{ShellcardError, ShellcardResult};

/// How containers are managed across card executions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerLifecycle {
    /// A new container for each card: highest isolation, slowest.
    PerCard,
    /// One container reused across cards in a review session.
    #[default]
    SessionReuse,
    /// A container kept for the whole deck. Not supported by the reference driver.
    DeckPersistent,
}

impl ContainerLifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerLifecycle::PerCard => "per-card",
            ContainerLifecycle::SessionReuse => "session-reuse",
            ContainerLifecycle::DeckPersistent => "deck-persistent",
        }
    }
}

/// Parameters for one sandboxed command execution.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Container image reference. Set from the deck default or card override.
    pub image: String,
    /// Argv vector to execute.
    pub command: Vec<String>,
    pub working_dir: String,
    pub environment: BTreeMap<String, String>,

    // Security settings.
    pub network_enabled: bool,
    /// Capability list carried from the deck/card configuration. Empty means
    /// drop all; the reference driver drops all regardless.
    pub capabilities: Vec<String>,
    pub read_only_root_fs: bool,
    /// Tmpfs mount path -> mount options.
    pub tmpfs_mounts: BTreeMap<String, String>,

    /// Deck assets to materialize into the container's writable tmpfs before
    /// exec, keyed by filename.
    pub assets: BTreeMap<String, Vec<u8>>,

    // Resource limits.
    /// Per-command timeout, not container lifetime.
    pub timeout: Duration,
    /// e.g. "128m"
    pub memory_limit: Option<String>,
    /// e.g. "0.5"
    pub cpu_limit: Option<String>,

    /// Attached to log records only; no semantic meaning.
    pub correlation_id: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionConfig {
    /// Secure-by-default configuration. The image must still be supplied
    /// from deck or card configuration.
    pub fn new() -> Self {
        Self {
            image: String::new(),
            command: Vec::new(),
            working_dir: "/tmp".to_string(),
            environment: BTreeMap::new(),
            network_enabled: false,
            capabilities: Vec::new(),
            read_only_root_fs: true,
            tmpfs_mounts: BTreeMap::from([(
                "/tmp".to_string(),
                "rw,noexec,nosuid,size=100m".to_string(),
            )]),
            assets: BTreeMap::new(),
            timeout: Duration::from_secs(30),
            memory_limit: None,
            cpu_limit: None,
            correlation_id: String::new(),
        }
    }

    /// Set the container image (deck default or card override).
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Set the argv vector.
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_networking(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_assets(mut self, assets: BTreeMap<String, Vec<u8>>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    /// Check that the required fields are set.
    pub fn validate(&self) -> ShellcardResult<()> {
        if self.image.is_empty() {
            return Err(ShellcardError::validation("image is required"));
        }
        if self.command.is_empty() {
            return Err(ShellcardError::validation("command is required"));
        }
        if self.timeout.is_zero() {
            return Err(ShellcardError::validation("timeout must be positive"));
        }
        Ok(())
    }
}

/// Output and metadata from one command execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: i32,
    /// True iff the exit code is 0 and there was no launch error.
    pub success: bool,
    /// True when the per-command deadline terminated the command.
    pub timed_out: bool,

    pub stdout: String,
    pub stderr: String,

    pub started_at: DateTime<Utc>,
    pub duration: Duration,

    pub container_id: String,
    pub image_used: String,
    pub correlation_id: String,
}

/// A container execution backend.
///
/// Drivers serialize concurrent `run` calls internally; callers should
/// assume exec is exclusive. `cleanup` is idempotent and safe to call on a
/// driver that never ran anything.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Execute a command in the sandboxed environment.
    ///
    /// A non-zero exit and a per-command timeout are outcomes, not errors:
    /// both return `Ok` with `success = false` (exit code −1 and `timed_out`
    /// set for the latter). `Err` means the command could not be launched at
    /// all.
    async fn run(&self, config: ExecutionConfig) -> ShellcardResult<ExecutionResult>;

    /// Tear down any persistent resources owned by the driver.
    async fn cleanup(&self) -> ShellcardResult<()>;

    /// Short driver identifier for logging.
    fn name(&self) -> &str;
}
