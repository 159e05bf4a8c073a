//! Local store: categories, items, thumbnails and preferences in SQLite.
//!
//! The loader writes through this module and the controller reads through it;
//! the two never share any other state.

mod categories;
mod items;
mod preferences;
mod schema;
mod types;

pub use preferences::LAST_LOAD_KEY;
pub use schema::Database;
pub use types::{
    Category, CategorySeed, DatabaseError, Item, ParsedItem, PendingThumbnail,
    NO_THUMBNAIL_MARKER,
};
