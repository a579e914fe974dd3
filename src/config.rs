//! Configuration file parser for ~/.config/feedmill/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchOptions, DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_BYTES};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `feedmill.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Bound on one feed's request plus body read, in seconds.
    pub fetch_timeout_secs: u64,

    /// Largest feed body accepted, in bytes.
    pub max_feed_bytes: usize,

    /// Feeds refreshed at once by `refresh`. 1 = strictly sequential.
    pub refresh_concurrency: usize,

    /// `User-Agent` sent with every fetch.
    pub user_agent: String,

    /// Permit feed URLs on localhost or private address ranges.
    pub allow_private_hosts: bool,
}

impl Default for Config {
    fn default() -> Self {
        let fetch = FetchOptions::default();
        Self {
            database_path: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            max_feed_bytes: DEFAULT_MAX_FEED_BYTES,
            refresh_concurrency: fetch.concurrency,
            user_agent: fetch.user_agent,
            allow_private_hosts: fetch.allow_private_hosts,
        }
    }
}

/// Database file name used when none is configured.
pub const DEFAULT_DATABASE_FILE: &str = "feedmill.db";

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "database_path",
        "fetch_timeout_secs",
        "max_feed_bytes",
        "refresh_concurrency",
        "user_agent",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            timeout_secs = config.fetch_timeout_secs,
            concurrency = config.refresh_concurrency,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Database file for a config loaded from `config_path`: the configured
    /// `database_path`, else `feedmill.db` in the config file's directory.
    pub fn resolve_database_path(&self, config_path: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) => path.clone(),
            None => config_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(DEFAULT_DATABASE_FILE),
        }
    }

    /// Fetch settings derived from this configuration.
    ///
    /// Zero timeout or concurrency would stall every fetch, so both are
    /// raised to 1.
    pub fn fetch_options(&self) -> FetchOptions {
        if self.fetch_timeout_secs == 0 || self.refresh_concurrency == 0 {
            tracing::warn!(
                timeout_secs = self.fetch_timeout_secs,
                concurrency = self.refresh_concurrency,
                "Zero timeout or concurrency in config, using 1"
            );
        }
        FetchOptions {
            timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            max_body_bytes: self.max_feed_bytes,
            user_agent: self.user_agent.clone(),
            allow_private_hosts: self.allow_private_hosts,
            concurrency: self.refresh_concurrency.max(1),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("feedmill_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, None);
        assert_eq!(config.fetch_timeout_secs, 8);
        assert_eq!(config.max_feed_bytes, 10 * 1024 * 1024);
        assert_eq!(config.refresh_concurrency, 1);
        assert!(config.user_agent.starts_with("feedmill/"));
        assert!(!config.allow_private_hosts);
    }

    #[test]
    fn test_database_defaults_next_to_config_file() {
        let config = Config::default();
        assert_eq!(
            config.resolve_database_path(Path::new("/srv/feeds/custom.toml")),
            PathBuf::from("/srv/feeds/feedmill.db")
        );
        assert_eq!(
            config.resolve_database_path(Path::new("config.toml")),
            PathBuf::from("feedmill.db")
        );
    }

    #[test]
    fn test_configured_database_path_wins() {
        let config = Config {
            database_path: Some(PathBuf::from("/var/lib/feedmill/main.db")),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_database_path(Path::new("/srv/feeds/custom.toml")),
            PathBuf::from("/var/lib/feedmill/main.db")
        );
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/feedmill_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let (dir, path) = write_config("empty", "   \n  \n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "refresh_concurrency = 4\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.refresh_concurrency, 4);
        assert_eq!(config.fetch_timeout_secs, 8); // default
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
database_path = "/var/lib/feedmill/feeds.db"
fetch_timeout_secs = 20
max_feed_bytes = 2048
refresh_concurrency = 3
user_agent = "custom-agent/1.0"
allow_private_hosts = true
"#;
        let (dir, path) = write_config("full", content);
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/var/lib/feedmill/feeds.db"))
        );
        assert_eq!(config.fetch_timeout_secs, 20);
        assert_eq!(config.max_feed_bytes, 2048);
        assert_eq!(config.refresh_concurrency, 3);
        assert_eq!(config.user_agent, "custom-agent/1.0");
        assert!(config.allow_private_hosts);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config("unknown", "refresh_concurrency = 2\ntheme = \"dark\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.refresh_concurrency, 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "fetch_timeout_secs = \"soon\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_fetch_options_derived() {
        let config = Config {
            fetch_timeout_secs: 3,
            max_feed_bytes: 4096,
            refresh_concurrency: 5,
            user_agent: "ua".into(),
            allow_private_hosts: true,
            ..Config::default()
        };
        let opts = config.fetch_options();
        assert_eq!(opts.timeout, Duration::from_secs(3));
        assert_eq!(opts.max_body_bytes, 4096);
        assert_eq!(opts.concurrency, 5);
        assert_eq!(opts.user_agent, "ua");
        assert!(opts.allow_private_hosts);
    }

    #[test]
    fn test_fetch_options_clamps_zeroes() {
        let config = Config {
            fetch_timeout_secs: 0,
            refresh_concurrency: 0,
            ..Config::default()
        };
        let opts = config.fetch_options();
        assert_eq!(opts.timeout, Duration::from_secs(1));
        assert_eq!(opts.concurrency, 1);
    }
}
