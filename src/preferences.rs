//! Preference manager that merges config.toml defaults with DB overrides.
//!
//! Config values serve as defaults; DB values (user_preferences table) override them.
//! Writes always go to the DB, never to the config file.
use std::collections::HashMap;

use anyhow::Result;

use crate::config::Config;
use crate::storage::Database;

/// Diagnostic error mode toggle.
pub const DISPLAY_FULL_ERROR_KEY: &str = "errors.display_full";
/// Retention age for clear-out, in days.
pub const CLEAR_OUT_AGE_KEY: &str = "load.clear_out_age_days";
/// Whether the loader keeps going after the UI disconnects.
pub const LOAD_IN_BACKGROUND_KEY: &str = "load.in_background";

// ============================================================================
// PreferenceManager
// ============================================================================

/// Merged preference store: config.toml defaults + DB overrides.
///
/// Reads are in-memory. Writes persist to the DB and then update the map, so a
/// failed write leaves the old value in place.
#[derive(Debug, Clone)]
pub struct PreferenceManager {
    prefs: HashMap<String, String>,
}

impl PreferenceManager {
    /// Load preferences by merging config defaults with DB overrides.
    pub async fn load(config: &Config, db: &Database) -> Result<Self> {
        let mut prefs = Self::flatten_config(config);

        // DB wins over config
        let db_prefs = db.get_preferences_by_prefix("").await?;
        for (key, value) in db_prefs {
            prefs.insert(key, value);
        }

        Ok(Self { prefs })
    }

    /// Create from config only (no DB). Fallback for when DB load fails.
    pub fn from_config(config: &Config) -> Self {
        Self {
            prefs: Self::flatten_config(config),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.prefs.get(key).map(String::as_str)
    }

    /// Set a preference: writes to DB and updates in-memory map.
    pub async fn set(&mut self, db: &Database, key: &str, value: &str) -> Result<()> {
        db.set_preference(key, value).await?;
        self.prefs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    // ========================================================================
    // Type-safe Accessors
    // ========================================================================

    /// Show raw error detail for every error kind.
    pub fn display_full_error(&self) -> bool {
        self.get(DISPLAY_FULL_ERROR_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }

    /// Clear-out retention age in days.
    pub fn clear_out_age_days(&self) -> u32 {
        self.get(CLEAR_OUT_AGE_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(4)
    }

    pub fn load_in_background(&self) -> bool {
        self.get(LOAD_IN_BACKGROUND_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(true)
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn flatten_config(config: &Config) -> HashMap<String, String> {
        let mut map = HashMap::new();

        map.insert(
            DISPLAY_FULL_ERROR_KEY.to_string(),
            config.display_full_error.to_string(),
        );
        map.insert(
            CLEAR_OUT_AGE_KEY.to_string(),
            config.clear_out_age_days.to_string(),
        );
        map.insert(
            LOAD_IN_BACKGROUND_KEY.to_string(),
            config.load_in_background.to_string(),
        );

        map
    }
}

// ============================================================================
// Tests
// ============================================================================
