//! Display model: what the screen shows, independent of how it is drawn.

use std::sync::Arc;

use super::thumbnail::Thumbnail;

/// One displayed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSlot {
    pub item_id: i64,
    pub title: Arc<str>,
    pub url: Option<Arc<str>>,
    pub thumbnail: Thumbnail,
}

/// A category row. Always holds exactly `row_capacity` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryView {
    pub name: String,
    pub slots: Vec<Option<ItemSlot>>,
}

impl CategoryView {
    pub fn empty(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            slots: vec![None; capacity],
        }
    }

    /// Number of bound slots.
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayModel {
    pub row_capacity: usize,
    pub categories: Vec<CategoryView>,
}

impl Default for DisplayModel {
    fn default() -> Self {
        Self {
            row_capacity: 1,
            categories: Vec::new(),
        }
    }
}

impl DisplayModel {
    pub fn category(&self, name: &str) -> Option<&CategoryView> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub(crate) fn category_mut(&mut self, name: &str) -> Option<&mut CategoryView> {
        self.categories.iter_mut().find(|c| c.name == name)
    }

    pub fn slot(&self, row: usize, col: usize) -> Option<&ItemSlot> {
        self.categories.get(row)?.slots.get(col)?.as_ref()
    }

    /// Every slot bound to `item_id`. The same item can appear in more than
    /// one row when feeds overlap.
    pub(crate) fn slots_for_item_mut(&mut self, item_id: i64) -> impl Iterator<Item = &mut ItemSlot> {
        self.categories
            .iter_mut()
            .flat_map(|c| c.slots.iter_mut())
            .filter_map(|s| s.as_mut())
            .filter(move |s| s.item_id == item_id)
    }
}
