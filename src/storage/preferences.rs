use anyhow::Result;

use super::schema::Database;

/// Preference key holding the unix time of the last successful full load.
pub const LAST_LOAD_KEY: &str = "load.last_load_time";

impl Database {
    // ========================================================================
    // User Preferences Operations
    // ========================================================================

    /// Get a single preference value by key.
    ///
    /// Keys use dotted convention: `load.last_load_time`, `errors.display_full`, etc.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT).
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get all preferences matching a key prefix, ordered by key.
    pub async fn get_preferences_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let pattern = format!("{}%", prefix);
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM user_preferences WHERE key LIKE ? ORDER BY key")
                .bind(&pattern)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows)
    }

    /// Last successful full load as unix seconds, `None` if never loaded.
    ///
    /// A corrupt value is treated as "never loaded" so the next connect
    /// triggers a fresh load.
    pub async fn last_load_time(&self) -> Result<Option<i64>> {
        let value = self.get_preference(LAST_LOAD_KEY).await?;
        Ok(value.and_then(|v| match v.parse::<i64>() {
            Ok(secs) if secs > 0 => Some(secs),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(value = %v, error = %e, "Ignoring unparseable last load time");
                None
            }
        }))
    }

    /// Persist the last successful full load time.
    pub async fn set_last_load_time(&self, secs: i64) -> Result<()> {
        self.set_preference(LAST_LOAD_KEY, &secs.to_string()).await
    }
}
