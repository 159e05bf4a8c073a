//! Cache coordinator: keeps the display model in step with the local store.
//!
//! Everything shown comes from the store, so cached content is visible before
//! any load starts. Loader messages only tell the coordinator *what* to
//! re-query; store read failures are logged and leave the view as it was.

mod model;
mod staleness;
mod thumbnail;

pub use model::{CategoryView, DisplayModel, ItemSlot};
pub use staleness::format_staleness;
pub use thumbnail::{resolve_thumbnail, Thumbnail};

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::storage::Database;

/// Items per row for a given terminal width. Never zero.
pub fn row_capacity(width: u16, item_width: u16) -> usize {
    usize::from(width / item_width.max(1)).max(1)
}

pub struct CacheCoordinator {
    db: Database,
    item_width: u16,
    model: DisplayModel,
}

impl CacheCoordinator {
    pub fn new(db: Database, item_width: u16) -> Self {
        Self {
            db,
            item_width,
            model: DisplayModel::default(),
        }
    }

    pub fn model(&self) -> &DisplayModel {
        &self.model
    }

    // ========================================================================
    // Rebuilds
    // ========================================================================

    /// Recompute row capacity for `width` and rebuild every view if it changed.
    pub async fn resize(&mut self, width: u16) {
        let capacity = row_capacity(width, self.item_width);
        if capacity == self.model.row_capacity && !self.model.categories.is_empty() {
            return;
        }
        self.rebuild_with(capacity).await;
    }

    /// Rebuild all views from scratch: enabled categories in display order,
    /// each rendered from the store.
    pub async fn rebuild(&mut self) {
        self.rebuild_with(self.model.row_capacity).await;
    }

    /// The model keeps its previous capacity and views if the store cannot be
    /// read.
    async fn rebuild_with(&mut self, capacity: usize) {
        let categories = match self.db.get_enabled_categories().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read enabled categories, keeping current view");
                return;
            }
        };

        self.model.row_capacity = capacity;
        self.model.categories = categories
            .into_iter()
            .map(|(_, name)| CategoryView::empty(name, capacity))
            .collect();

        let names: Vec<String> = self.model.categories.iter().map(|c| c.name.clone()).collect();
        for name in names {
            self.refresh_category(&name).await;
        }
        tracing::debug!(
            categories = self.model.categories.len(),
            row_capacity = capacity,
            "Rebuilt display model"
        );
    }

    // ========================================================================
    // Partial Updates
    // ========================================================================

    /// Re-render one category. Returns false if the category is not displayed
    /// or the store could not be read.
    pub async fn refresh_category(&mut self, name: &str) -> bool {
        let capacity = self.model.row_capacity;
        if self.model.category(name).is_none() {
            tracing::debug!(category = %name, "Ignoring refresh for undisplayed category");
            return false;
        }

        let slots = match self.load_slots(name, capacity).await {
            Ok(slots) => slots,
            Err(e) => {
                tracing::warn!(category = %name, error = %e, "Failed to read category, keeping current view");
                return false;
            }
        };

        if let Some(view) = self.model.category_mut(name) {
            view.slots = slots;
        }
        true
    }

    /// Re-resolve the thumbnail of every slot showing `item_id`. Returns the
    /// number of slots updated.
    pub async fn refresh_thumbnail(&mut self, item_id: i64) -> usize {
        if self.model.slots_for_item_mut(item_id).next().is_none() {
            return 0;
        }

        let stored = match self.db.get_thumbnail(item_id).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(item_id, error = %e, "Failed to read thumbnail");
                return 0;
            }
        };
        let resolved = resolve_thumbnail(stored.as_deref());

        let mut updated = 0;
        for slot in self.model.slots_for_item_mut(item_id) {
            slot.thumbnail = resolved.clone();
            updated += 1;
        }
        updated
    }

    async fn load_slots(&self, category: &str, capacity: usize) -> Result<Vec<Option<ItemSlot>>> {
        let items = self.db.get_items(category, capacity).await?;

        let mut slots = Vec::with_capacity(capacity);
        for item in items.into_iter().take(capacity) {
            let stored = self.db.get_thumbnail(item.id).await?;
            slots.push(Some(ItemSlot {
                item_id: item.id,
                title: item.title,
                url: item.url,
                thumbnail: resolve_thumbnail(stored.as_deref()),
            }));
        }
        slots.resize(capacity, None);
        Ok(slots)
    }

    // ========================================================================
    // Clear-out
    // ========================================================================

    /// Delete items older than `age_days` in the background. The display
    /// model is not touched.
    pub fn spawn_clear_out(&self, age_days: u32) -> JoinHandle<()> {
        let db = self.db.clone();
        tokio::spawn(async move {
            match db.delete_items_older_than(age_days).await {
                Ok(removed) => tracing::info!(removed, age_days, "Cleared out old items"),
                Err(e) => tracing::warn!(error = %e, age_days, "Clear-out failed"),
            }
        })
    }
}
