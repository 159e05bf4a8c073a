//! Thumbnail resolution from stored bytes.

use std::sync::Arc;

use image::imageops::FilterType;

use crate::storage::NO_THUMBNAIL_MARKER;

/// What a display slot shows in place of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    /// The server reported that the item has no thumbnail.
    NoThumbnailAvailable,
    /// Decoded image. `swatch` is the average colour, used by the terminal
    /// renderer.
    Loaded {
        bytes: Arc<[u8]>,
        width: u32,
        height: u32,
        swatch: [u8; 3],
    },
    /// Not fetched yet, or the stored bytes could not be decoded.
    PendingOrMissing,
}

/// Resolve stored thumbnail bytes. Pure: the same input always gives the same
/// outcome.
pub fn resolve_thumbnail(stored: Option<&[u8]>) -> Thumbnail {
    let bytes = match stored {
        None => return Thumbnail::PendingOrMissing,
        Some(b) if b == NO_THUMBNAIL_MARKER => return Thumbnail::NoThumbnailAvailable,
        Some([]) => return Thumbnail::PendingOrMissing,
        Some(b) => b,
    };

    match image::load_from_memory(bytes) {
        Ok(img) => {
            let pixel = img.resize_exact(1, 1, FilterType::Triangle).to_rgb8();
            let [r, g, b] = pixel.get_pixel(0, 0).0;
            Thumbnail::Loaded {
                bytes: Arc::from(bytes),
                width: img.width(),
                height: img.height(),
                swatch: [r, g, b],
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, len = bytes.len(), "Undecodable thumbnail");
            Thumbnail::PendingOrMissing
        }
    }
}
