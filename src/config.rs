//! Configuration file parser for ~/.config/bulletin/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings so typos show up
//! in the log.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::storage::CategorySeed;
use crate::util::validate_feed_url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Default Category Catalogue
// ============================================================================

/// Built-in categories seeded on first run, in display order.
const DEFAULT_CATEGORIES: &[(&str, &str, bool)] = &[
    ("Headlines", "https://feeds.bbci.co.uk/news/rss.xml", true),
    ("World", "https://feeds.bbci.co.uk/news/world/rss.xml", true),
    ("UK", "https://feeds.bbci.co.uk/news/uk/rss.xml", true),
    ("Business", "https://feeds.bbci.co.uk/news/business/rss.xml", false),
    ("Politics", "https://feeds.bbci.co.uk/news/politics/rss.xml", false),
    ("Health", "https://feeds.bbci.co.uk/news/health/rss.xml", false),
    ("Education", "https://feeds.bbci.co.uk/news/education/rss.xml", false),
    (
        "Science & Environment",
        "https://feeds.bbci.co.uk/news/science_and_environment/rss.xml",
        false,
    ),
    ("Technology", "https://feeds.bbci.co.uk/news/technology/rss.xml", false),
    (
        "Entertainment & Arts",
        "https://feeds.bbci.co.uk/news/entertainment_and_arts/rss.xml",
        false,
    ),
];

pub fn default_categories() -> Vec<CategorySeed> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, url, enabled)| CategorySeed {
            name: (*name).to_string(),
            url: (*url).to_string(),
            enabled: *enabled,
        })
        .collect()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Values here are defaults; user toggles made at runtime are stored in the
/// database and layered on top by `PreferenceManager`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Show raw error detail instead of friendly messages (diagnostic mode).
    pub display_full_error: bool,

    /// Items first seen more than this many days ago are cleared out after a
    /// successful full load.
    pub clear_out_age_days: u32,

    /// Keep loading after the UI disconnects from the loader.
    pub load_in_background: bool,

    /// Connecting triggers a load when the last one is older than this.
    pub stale_after_minutes: u64,

    /// Columns per displayed item; row capacity is terminal width / item_width.
    pub item_width: u16,

    /// Abandon a load session after this many seconds without loader messages.
    /// 0 disables the watchdog.
    pub watchdog_secs: u64,

    /// Thumbnail fetches in flight at once.
    pub max_concurrent_thumbnails: usize,

    /// Per-request HTTP timeout for the loader.
    pub request_timeout_secs: u64,

    /// Category catalogue used to seed a fresh database.
    pub categories: Vec<CategorySeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_full_error: false,
            clear_out_age_days: 4,
            load_in_background: true,
            stale_after_minutes: 30,
            item_width: 24,
            watchdog_secs: 120,
            max_concurrent_thumbnails: 4,
            request_timeout_secs: 30,
            categories: default_categories(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Narrowest item that can still show a truncated title.
    pub const MIN_ITEM_WIDTH: u16 = 8;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            categories = config.categories.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate TOML content.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "display_full_error",
                "clear_out_age_days",
                "load_in_background",
                "stale_after_minutes",
                "item_width",
                "watchdog_secs",
                "max_concurrent_thumbnails",
                "request_timeout_secs",
                "categories",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.item_width < Self::MIN_ITEM_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "item_width must be at least {}",
                Self::MIN_ITEM_WIDTH
            )));
        }
        if self.max_concurrent_thumbnails == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_thumbnails must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid(
                "categories must list at least one category".to_string(),
            ));
        }
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(ConfigError::Invalid("category name is empty".to_string()));
            }
            validate_feed_url(&category.url).map_err(|e| {
                ConfigError::Invalid(format!("category '{}': {}", category.name, e))
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
