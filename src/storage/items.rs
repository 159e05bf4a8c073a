use anyhow::Result;

use super::schema::Database;
use super::types::{Item, ItemDbRow, ParsedItem, PendingThumbnail};

/// Maximum number of items to return from any single query (OOM protection)
const MAX_ITEMS: i64 = 500;

/// Seconds per retention day.
const SECS_PER_DAY: i64 = 86_400;

impl Database {
    // ========================================================================
    // Item Writes (loader side)
    // ========================================================================

    /// Upsert items for a category, returns the number of new items inserted.
    ///
    /// New items get `inserted_at = now`. Existing items (same category and
    /// guid) have their metadata refreshed but keep their first-seen time, so
    /// re-publishing an item does not reset its clear-out age.
    pub async fn upsert_items(&self, category: &str, items: &[ParsedItem]) -> Result<usize> {
        self.upsert_items_at(category, items, chrono::Utc::now().timestamp())
            .await
    }

    /// [`upsert_items`](Self::upsert_items) with an explicit insertion time.
    pub async fn upsert_items_at(
        &self,
        category: &str,
        items: &[ParsedItem],
        inserted_at: i64,
    ) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for item in items {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO items
                    (category, guid, title, url, thumbnail_url, published, inserted_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            )
            .bind(category)
            .bind(&item.guid)
            .bind(&item.title)
            .bind(&item.url)
            .bind(&item.thumbnail_url)
            .bind(item.published)
            .bind(inserted_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
                continue;
            }

            sqlx::query(
                r#"
                UPDATE items SET title = ?, url = ?, thumbnail_url = ?, published = ?
                WHERE category = ? AND guid = ?
            "#,
            )
            .bind(&item.title)
            .bind(&item.url)
            .bind(&item.thumbnail_url)
            .bind(item.published)
            .bind(category)
            .bind(&item.guid)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Store resolved thumbnail bytes (or the no-thumbnail marker) for an item.
    pub async fn set_thumbnail(&self, item_id: i64, data: &[u8]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO thumbnails (item_id, data, fetched_at)
            VALUES (?, ?, ?)
            ON CONFLICT(item_id) DO UPDATE SET data = excluded.data, fetched_at = excluded.fetched_at
        "#,
        )
        .bind(item_id)
        .bind(data)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Items in a category without a thumbnail row, newest first.
    ///
    /// `limit` bounds the work per category to what can be displayed.
    pub async fn items_needing_thumbnails(
        &self,
        category: &str,
        limit: i64,
    ) -> Result<Vec<PendingThumbnail>> {
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT i.id, i.thumbnail_url
            FROM items i
            LEFT JOIN thumbnails t ON t.item_id = i.id
            WHERE i.category = ? AND t.item_id IS NULL
            ORDER BY i.published DESC, i.inserted_at DESC, i.id DESC
            LIMIT ?
        "#,
        )
        .bind(category)
        .bind(limit.clamp(0, MAX_ITEMS))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(item_id, thumbnail_url)| PendingThumbnail {
                item_id,
                thumbnail_url,
            })
            .collect())
    }

    // ========================================================================
    // Item Reads (controller side)
    // ========================================================================

    /// Up to `limit` items of a category, most recent first.
    ///
    /// Items without a publish time sort after dated ones; ties fall back to
    /// first-seen time and then id so the order is stable across calls.
    pub async fn get_items(&self, category: &str, limit: usize) -> Result<Vec<Item>> {
        let limit = (limit as i64).min(MAX_ITEMS);
        let rows = sqlx::query_as::<_, ItemDbRow>(
            r#"
            SELECT id, category, guid, title, url, thumbnail_url, published, inserted_at
            FROM items
            WHERE category = ?
            ORDER BY published DESC, inserted_at DESC, id DESC
            LIMIT ?
        "#,
        )
        .bind(category)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ItemDbRow::into_item).collect())
    }

    /// Raw stored thumbnail bytes. `None` means not resolved yet; the
    /// no-thumbnail marker is returned as-is.
    pub async fn get_thumbnail(&self, item_id: i64) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT data FROM thumbnails WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(data,)| data))
    }

    // ========================================================================
    // Clear-out
    // ========================================================================

    /// Delete items first seen more than `age_days` days ago, with their
    /// thumbnails. Returns the number of items removed.
    pub async fn delete_items_older_than(&self, age_days: u32) -> Result<u64> {
        let cutoff = chrono::Utc::now().timestamp() - i64::from(age_days) * SECS_PER_DAY;
        self.delete_items_inserted_before(cutoff).await
    }

    /// Delete items with `inserted_at < cutoff`. Thumbnails go with them via
    /// the cascading foreign key.
    pub async fn delete_items_inserted_before(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM items WHERE inserted_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{CategorySeed, Database, ParsedItem, NO_THUMBNAIL_MARKER};

    async fn test_db() -> Database {
        let db = Database::open(":memory:").await.unwrap();
        db.seed_default_categories(&[
            CategorySeed {
                name: "World".into(),
                url: "https://example.com/world.xml".into(),
                enabled: true,
            },
            CategorySeed {
                name: "UK".into(),
                url: "https://example.com/uk.xml".into(),
                enabled: true,
            },
        ])
        .await
        .unwrap();
        db
    }

    fn test_item(guid: &str, published: Option<i64>) -> ParsedItem {
        ParsedItem {
            guid: guid.to_string(),
            title: format!("Title {}", guid),
            url: Some(format!("https://example.com/{}", guid)),
            thumbnail_url: Some(format!("https://example.com/{}.jpg", guid)),
            published,
        }
    }

    #[tokio::test]
    async fn test_upsert_items_insert() {
        let db = test_db().await;
        let count = db
            .upsert_items("World", &[test_item("a", Some(1)), test_item("b", Some(2))])
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_upsert_items_update_returns_zero_and_keeps_inserted_at() {
        let db = test_db().await;
        db.upsert_items_at("World", &[test_item("a", Some(1))], 1_000)
            .await
            .unwrap();

        let mut changed = test_item("a", Some(5));
        changed.title = "Changed".to_string();
        let count = db.upsert_items_at("World", &[changed], 9_000).await.unwrap();
        assert_eq!(count, 0);

        let items = db.get_items("World", 10).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(&*items[0].title, "Changed");
        assert_eq!(items[0].published, Some(5));
        assert_eq!(items[0].inserted_at, 1_000);
    }

    #[tokio::test]
    async fn test_get_items_most_recent_first_with_limit() {
        let db = test_db().await;
        db.upsert_items(
            "World",
            &[
                test_item("old", Some(100)),
                test_item("undated", None),
                test_item("new", Some(300)),
                test_item("mid", Some(200)),
            ],
        )
        .await
        .unwrap();

        let items = db.get_items("World", 3).await.unwrap();
        let guids: Vec<&str> = items.iter().map(|i| i.guid.as_str()).collect();
        assert_eq!(guids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_get_items_scoped_to_category() {
        let db = test_db().await;
        db.upsert_items("World", &[test_item("w", Some(1))]).await.unwrap();
        db.upsert_items("UK", &[test_item("u", Some(1))]).await.unwrap();

        let items = db.get_items("UK", 10).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, "UK");
    }

    #[tokio::test]
    async fn test_thumbnail_absent_then_stored() {
        let db = test_db().await;
        db.upsert_items("World", &[test_item("a", Some(1))]).await.unwrap();
        let id = db.get_items("World", 1).await.unwrap()[0].id;

        assert_eq!(db.get_thumbnail(id).await.unwrap(), None);

        db.set_thumbnail(id, NO_THUMBNAIL_MARKER).await.unwrap();
        assert_eq!(db.get_thumbnail(id).await.unwrap(), Some(vec![127]));

        db.set_thumbnail(id, &[1, 2, 3]).await.unwrap();
        assert_eq!(db.get_thumbnail(id).await.unwrap(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_items_needing_thumbnails() {
        let db = test_db().await;
        db.upsert_items("World", &[test_item("a", Some(1)), test_item("b", Some(2))])
            .await
            .unwrap();
        let items = db.get_items("World", 10).await.unwrap();
        db.set_thumbnail(items[0].id, &[9]).await.unwrap();

        let pending = db.items_needing_thumbnails("World", 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].item_id, items[1].id);
        assert_eq!(
            pending[0].thumbnail_url.as_deref(),
            Some("https://example.com/a.jpg")
        );
    }

    #[tokio::test]
    async fn test_delete_items_inserted_before_cascades_thumbnails() {
        let db = test_db().await;
        db.upsert_items_at("World", &[test_item("old", Some(1))], 1_000)
            .await
            .unwrap();
        db.upsert_items_at("World", &[test_item("new", Some(2))], 5_000)
            .await
            .unwrap();
        let old_id = db.get_items("World", 10).await.unwrap()[1].id;
        db.set_thumbnail(old_id, &[1]).await.unwrap();

        let removed = db.delete_items_inserted_before(2_000).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = db.get_items("World", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].guid, "new");
        assert_eq!(db.get_thumbnail(old_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_items_older_than_keeps_young_items() {
        let db = test_db().await;
        let now = chrono::Utc::now().timestamp();
        db.upsert_items_at("World", &[test_item("five-days", Some(1))], now - 5 * 86_400)
            .await
            .unwrap();
        db.upsert_items_at("World", &[test_item("three-days", Some(2))], now - 3 * 86_400)
            .await
            .unwrap();

        let removed = db.delete_items_older_than(4).await.unwrap();
        assert_eq!(removed, 1);
        let remaining = db.get_items("World", 10).await.unwrap();
        assert_eq!(remaining[0].guid, "three-days");
    }
}
