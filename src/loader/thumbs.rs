use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use super::fetcher::{FetchError, Fetcher};
use crate::protocol::LoaderMessage;
use crate::storage::{Database, PendingThumbnail, NO_THUMBNAIL_MARKER};
use crate::util::validate_feed_url;

/// Outcome of resolving one item's thumbnail.
enum Resolved {
    /// Bytes to store: image data or the no-thumbnail marker.
    Store(Vec<u8>),
    /// Leave unresolved; a later load retries.
    Skip,
}

async fn resolve(fetcher: &Fetcher, pending: &PendingThumbnail) -> Resolved {
    let Some(url) = pending.thumbnail_url.as_deref() else {
        return Resolved::Store(NO_THUMBNAIL_MARKER.to_vec());
    };
    if let Err(e) = validate_feed_url(url) {
        tracing::debug!(item_id = pending.item_id, url = %url, error = %e, "Unusable thumbnail URL");
        return Resolved::Store(NO_THUMBNAIL_MARKER.to_vec());
    }

    match fetcher.fetch_thumbnail(url).await {
        Ok(bytes) if !bytes.is_empty() => Resolved::Store(bytes),
        Ok(_) => Resolved::Store(NO_THUMBNAIL_MARKER.to_vec()),
        // The server says the image does not exist
        Err(FetchError::HttpStatus(status)) if (400..500).contains(&status) => {
            Resolved::Store(NO_THUMBNAIL_MARKER.to_vec())
        }
        Err(e) => {
            tracing::debug!(item_id = pending.item_id, url = %url, error = %e, "Thumbnail fetch failed");
            Resolved::Skip
        }
    }
}

/// Fetch and store thumbnails with bounded concurrency.
///
/// Every stored thumbnail is announced with `ThumbLoaded` followed by an
/// `UpdateLoadProgress`. Stops early when `stop` is set. A store write
/// failure aborts with `FetchError::Database`.
pub(super) async fn load_thumbnails(
    fetcher: &Fetcher,
    db: &Database,
    pending: Vec<PendingThumbnail>,
    concurrency: usize,
    stop: &AtomicBool,
    events: &mpsc::Sender<LoaderMessage>,
) -> Result<(), FetchError> {
    let total = u32::try_from(pending.len()).unwrap_or(u32::MAX);
    let mut loaded: u32 = 0;
    send(
        events,
        LoaderMessage::UpdateLoadProgress {
            total_items: total,
            items_loaded: 0,
        },
    )
    .await;

    let mut results = stream::iter(pending)
        .map(|p| async move {
            let resolved = resolve(fetcher, &p).await;
            (p.item_id, resolved)
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((item_id, resolved)) = results.next().await {
        if stop.load(Ordering::Relaxed) {
            tracing::debug!(loaded, total, "Thumbnail loading stopped");
            break;
        }

        loaded = loaded.saturating_add(1);
        if let Resolved::Store(bytes) = resolved {
            db.set_thumbnail(item_id, &bytes)
                .await
                .map_err(|e| FetchError::Database(e.to_string()))?;
            send(events, LoaderMessage::ThumbLoaded { id: item_id }).await;
        }
        send(
            events,
            LoaderMessage::UpdateLoadProgress {
                total_items: total,
                items_loaded: loaded,
            },
        )
        .await;
    }

    Ok(())
}

async fn send(events: &mpsc::Sender<LoaderMessage>, message: LoaderMessage) {
    if events.send(message).await.is_err() {
        tracing::debug!("Loader event channel closed");
    }
}
