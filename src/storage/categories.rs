use anyhow::{bail, Result};

use super::schema::Database;
use super::types::{Category, CategorySeed};
use crate::util::strip_control_chars;

impl Database {
    // ========================================================================
    // Category Operations
    // ========================================================================

    /// True once categories have been seeded. A fresh database is the
    /// first-run signal.
    pub async fn is_initialized(&self) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 > 0)
    }

    /// Insert the category catalogue, preserving its order as display order.
    ///
    /// Existing categories (by name) are left untouched so the user's enabled
    /// choices survive a re-seed. Names are stripped of control characters;
    /// empty names are rejected.
    pub async fn seed_default_categories(&self, seeds: &[CategorySeed]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for (order, seed) in seeds.iter().enumerate() {
            let name = strip_control_chars(&seed.name);
            let name = name.trim();
            if name.is_empty() {
                bail!("Category name cannot be empty or whitespace-only");
            }

            sqlx::query(
                r#"
                INSERT INTO categories (name, url, enabled, sort_order)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(name) DO NOTHING
            "#,
            )
            .bind(name)
            .bind(&seed.url)
            .bind(seed.enabled)
            .bind(order as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(count = seeds.len(), "Seeded categories");
        Ok(())
    }

    /// Enabled categories as `(id, name)` in display order.
    pub async fn get_enabled_categories(&self) -> Result<Vec<(i64, String)>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, name FROM categories WHERE enabled = 1 ORDER BY sort_order, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every category in display order, enabled or not.
    pub async fn get_all_categories(&self) -> Result<Vec<Category>> {
        let rows: Vec<(i64, String, String, bool, i64)> = sqlx::query_as(
            "SELECT id, name, url, enabled, sort_order FROM categories ORDER BY sort_order, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, url, enabled, sort_order)| Category {
                id,
                name,
                url,
                enabled,
                sort_order,
            })
            .collect())
    }

    /// Enabled flags for every category, in display order.
    pub async fn get_category_flags(&self) -> Result<Vec<bool>> {
        Ok(self
            .get_all_categories()
            .await?
            .into_iter()
            .map(|c| c.enabled)
            .collect())
    }

    /// Set the enabled flag of every category from a slice in display order.
    ///
    /// The slice must cover every category; a length mismatch is rejected so a
    /// stale chooser cannot enable the wrong rows.
    pub async fn set_enabled_categories(&self, flags: &[bool]) -> Result<()> {
        let categories = self.get_all_categories().await?;
        if categories.len() != flags.len() {
            bail!(
                "Expected {} category flags, got {}",
                categories.len(),
                flags.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        for (category, enabled) in categories.iter().zip(flags) {
            sqlx::query("UPDATE categories SET enabled = ? WHERE id = ?")
                .bind(*enabled)
                .bind(category.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!(
            enabled = flags.iter().filter(|f| **f).count(),
            total = flags.len(),
            "Updated enabled categories"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{CategorySeed, Database};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn seed(name: &str, enabled: bool) -> CategorySeed {
        CategorySeed {
            name: name.to_string(),
            url: format!("https://example.com/{}/rss.xml", name.to_lowercase()),
            enabled,
        }
    }

    #[tokio::test]
    async fn test_fresh_database_not_initialized() {
        let db = test_db().await;
        assert!(!db.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_seed_marks_initialized_and_preserves_order() {
        let db = test_db().await;
        db.seed_default_categories(&[seed("World", true), seed("Business", false), seed("Health", true)])
            .await
            .unwrap();

        assert!(db.is_initialized().await.unwrap());
        let all = db.get_all_categories().await.unwrap();
        let names: Vec<&str> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["World", "Business", "Health"]);

        let enabled = db.get_enabled_categories().await.unwrap();
        let enabled_names: Vec<&str> = enabled.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(enabled_names, vec!["World", "Health"]);
    }

    #[tokio::test]
    async fn test_reseed_keeps_user_choice() {
        let db = test_db().await;
        db.seed_default_categories(&[seed("World", true)]).await.unwrap();
        db.set_enabled_categories(&[false]).await.unwrap();

        db.seed_default_categories(&[seed("World", true)]).await.unwrap();
        assert!(db.get_enabled_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seed_rejects_empty_name() {
        let db = test_db().await;
        let result = db.seed_default_categories(&[seed("  ", true)]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_enabled_categories() {
        let db = test_db().await;
        db.seed_default_categories(&[seed("World", true), seed("UK", false), seed("Health", false)])
            .await
            .unwrap();

        db.set_enabled_categories(&[false, true, true]).await.unwrap();

        assert_eq!(db.get_category_flags().await.unwrap(), vec![false, true, true]);
        let enabled = db.get_enabled_categories().await.unwrap();
        assert_eq!(enabled.len(), 2);
        assert_eq!(enabled[0].1, "UK");
    }

    #[tokio::test]
    async fn test_set_enabled_categories_length_mismatch() {
        let db = test_db().await;
        db.seed_default_categories(&[seed("World", true)]).await.unwrap();

        let result = db.set_enabled_categories(&[true, false]).await;
        assert!(result.is_err());
        assert_eq!(db.get_category_flags().await.unwrap(), vec![true]);
    }
}
