//! Configuration system for shellcard.
//!
//! Sources in ascending precedence: built-in defaults, a config file
//! (YAML, TOML, or JSON), then `SHELLCARD_*` environment variables.
//! Explicit command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ShellcardError, ShellcardResult};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sandbox: SandboxConfig,
    pub review: ReviewConfig,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Emit structured JSON log records.
    pub log_json: bool,
}

/// Database-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Sandbox-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub driver: String,
    pub default_image: String,
    /// Per-command timeout in seconds.
    pub default_timeout: u64,
    pub network_enabled: bool,
}

/// Review session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub max_cards_per_session: usize,
    /// Advisory session length in seconds; not enforced by the coordinator.
    pub session_timeout: u64,
    pub auto_advance: bool,
}

fn shellcard_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".shellcard"))
        .unwrap_or_else(|| PathBuf::from(".shellcard"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            sandbox: SandboxConfig::default(),
            review: ReviewConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: shellcard_dir().join("shellcard.db"),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            driver: "podman".to_string(),
            default_image: "alpine:3.18".to_string(),
            default_timeout: 30,
            network_enabled: false,
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_cards_per_session: 20,
            session_timeout: 30 * 60,
            auto_advance: false,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the config file (the explicit path
    /// if given, otherwise the first of `~/.shellcard/shellcard.{yaml,toml,json}`
    /// or `./shellcard.yaml` that exists), then environment variables.
    pub fn load(explicit_file: Option<&Path>) -> ShellcardResult<Self> {
        let mut config = match explicit_file {
            Some(path) => Self::from_file(path)?,
            None => match Self::find_config_file() {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env();
        config.database.path = expand_path(&config.database.path);
        Ok(config)
    }

    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> ShellcardResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ShellcardError::Configuration(e.to_string()))
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ShellcardError::Configuration(e.to_string()))
            }
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| ShellcardError::Configuration(e.to_string()))
            }
            _ => Err(ShellcardError::Configuration(
                "unsupported config file format, use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    fn find_config_file() -> Option<PathBuf> {
        let home = shellcard_dir();
        for candidate in [
            home.join("shellcard.yaml"),
            home.join("shellcard.yml"),
            home.join("shellcard.toml"),
            home.join("shellcard.json"),
            PathBuf::from("shellcard.yaml"),
        ] {
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Overlay `SHELLCARD_*` environment variables.
    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("SHELLCARD_DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(driver) = std::env::var("SHELLCARD_SANDBOX_DRIVER") {
            self.sandbox.driver = driver;
        }
        if let Ok(image) = std::env::var("SHELLCARD_SANDBOX_DEFAULT_IMAGE") {
            self.sandbox.default_image = image;
        }
        if let Ok(timeout) = std::env::var("SHELLCARD_SANDBOX_DEFAULT_TIMEOUT") {
            if let Ok(seconds) = timeout.parse() {
                self.sandbox.default_timeout = seconds;
            }
        }
        if let Ok(enabled) = std::env::var("SHELLCARD_SANDBOX_NETWORK_ENABLED") {
            self.sandbox.network_enabled = parse_bool(&enabled);
        }
        if let Ok(max) = std::env::var("SHELLCARD_REVIEW_MAX_CARDS_PER_SESSION") {
            if let Ok(value) = max.parse() {
                self.review.max_cards_per_session = value;
            }
        }
        if let Ok(timeout) = std::env::var("SHELLCARD_REVIEW_SESSION_TIMEOUT") {
            if let Ok(seconds) = timeout.parse() {
                self.review.session_timeout = seconds;
            }
        }
        if let Ok(auto) = std::env::var("SHELLCARD_REVIEW_AUTO_ADVANCE") {
            self.review.auto_advance = parse_bool(&auto);
        }
        if let Ok(level) = std::env::var("SHELLCARD_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(json) = std::env::var("SHELLCARD_LOG_JSON") {
            self.log_json = parse_bool(&json);
        }
    }

    /// The database file path, with its parent directory created
    /// owner-only (0700) since it holds user data.
    pub fn database_path(&self) -> ShellcardResult<PathBuf> {
        let path = expand_path(&self.database.path);
        if let Some(dir) = path.parent() {
            create_private_dir(dir)?;
        }
        Ok(path)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Expand a leading `~` to the home directory.
fn expand_path(path: &Path) -> PathBuf {
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = text.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if text == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    path.to_path_buf()
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> ShellcardResult<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> ShellcardResult<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sandbox.driver, "podman");
        assert_eq!(config.sandbox.default_image, "alpine:3.18");
        assert_eq!(config.sandbox.default_timeout, 30);
        assert!(!config.sandbox.network_enabled);
        assert_eq!(config.review.max_cards_per_session, 20);
        assert_eq!(config.review.session_timeout, 1800);
        assert!(!config.review.auto_advance);
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert!(config.database.path.ends_with("shellcard.db"));
    }

    #[test]
    fn test_from_yaml_file_with_partial_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shellcard.yaml");
        std::fs::write(
            &path,
            "sandbox:\n  default_image: ubuntu:22.04\n  default_timeout: 10\nlog_level: debug\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.sandbox.default_image, "ubuntu:22.04");
        assert_eq!(config.sandbox.default_timeout, 10);
        assert_eq!(config.log_level, "debug");
        // Untouched keys keep their defaults.
        assert_eq!(config.sandbox.driver, "podman");
        assert_eq!(config.review.max_cards_per_session, 20);
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shellcard.toml");
        std::fs::write(&path, "log_json = true\n\n[database]\npath = \"/tmp/x.db\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.log_json);
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shellcard.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ShellcardError::Configuration(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("SHELLCARD_SANDBOX_DRIVER", "docker");
        std::env::set_var("SHELLCARD_SANDBOX_NETWORK_ENABLED", "true");
        std::env::set_var("SHELLCARD_REVIEW_MAX_CARDS_PER_SESSION", "5");

        let mut config = Config::default();
        config.apply_env();

        std::env::remove_var("SHELLCARD_SANDBOX_DRIVER");
        std::env::remove_var("SHELLCARD_SANDBOX_NETWORK_ENABLED");
        std::env::remove_var("SHELLCARD_REVIEW_MAX_CARDS_PER_SESSION");

        assert_eq!(config.sandbox.driver, "docker");
        assert!(config.sandbox.network_enabled);
        assert_eq!(config.review.max_cards_per_session, 5);
    }

    #[test]
    fn test_database_path_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: DatabaseConfig {
                path: dir.path().join("nested").join("data").join("shellcard.db"),
            },
            ..Default::default()
        };

        let path = config.database_path().unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn test_expand_path_home() {
        let expanded = expand_path(Path::new("~/x/y.db"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("x/y.db"));
        }
        assert_eq!(expand_path(Path::new("/abs/p.db")), PathBuf::from("/abs/p.db"));
    }
}
