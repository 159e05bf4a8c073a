use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of bulletin appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("sqlite_busy")
        || lower.contains("sqlite_locked")
        || lower.contains("unable to open database file")
}

// ============================================================================
// Thumbnail Marker
// ============================================================================

/// Stored thumbnail bytes meaning "the feed reported no thumbnail for this item".
///
/// Distinct from a missing row, which means the thumbnail has not been
/// resolved yet.
pub const NO_THUMBNAIL_MARKER: &[u8] = &[127];

// ============================================================================
// Input Types
// ============================================================================

/// A category definition used to seed the store on first run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct CategorySeed {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Represents a parsed item from a category feed
#[derive(Debug, Clone)]
pub struct ParsedItem {
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published: Option<i64>,
}

// ============================================================================
// Data Structures
// ============================================================================

/// Category row. `sort_order` is the display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub sort_order: i64,
}

/// Internal row type for Item queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemDbRow {
    pub id: i64,
    pub category: String,
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published: Option<i64>,
    pub inserted_at: i64,
}

impl ItemDbRow {
    pub(crate) fn into_item(self) -> Item {
        Item {
            id: self.id,
            category: self.category,
            guid: self.guid,
            title: Arc::from(self.title),
            url: self.url.map(Arc::from),
            thumbnail_url: self.thumbnail_url,
            published: self.published,
            inserted_at: self.inserted_at,
        }
    }
}

/// Item data from database
///
/// `title` and `url` use `Arc<str>` so display slots can share them cheaply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub category: String,
    pub guid: String,
    pub title: Arc<str>,
    pub url: Option<Arc<str>>,
    pub thumbnail_url: Option<String>,
    pub published: Option<i64>,
    /// First time the loader stored this item (unix seconds). Drives clear-out.
    pub inserted_at: i64,
}

/// An item whose thumbnail has not been resolved yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingThumbnail {
    pub item_id: i64,
    pub thumbnail_url: Option<String>,
}
