//! Messages exchanged between the controller and the loader.
//!
//! Control messages flow controller → loader; loader messages flow back on the
//! reply channel handed over in `RegisterClient`. Loader messages also
//! serialize as `{"type": "...", "fields": {...}}` JSON lines so a session can
//! be recorded and replayed offline.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Controller → loader.
#[derive(Debug)]
pub enum ControlMessage {
    /// Attach a client; the loader answers on `reply`.
    RegisterClient { reply: mpsc::Sender<LoaderMessage> },
    UnregisterClient,
    LoadData,
    StopDataLoad,
}

/// Classification of a loader-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    General,
    NetworkUnavailable,
    Fatal,
}

/// Loader → controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "fields")]
pub enum LoaderMessage {
    ClientRegistered,
    NowLoading,
    RssLoadComplete,
    CategoryLoaded {
        category: String,
    },
    UpdateLoadProgress {
        #[serde(rename = "totalItems")]
        total_items: u32,
        #[serde(rename = "itemsLoaded")]
        items_loaded: u32,
    },
    ThumbLoaded {
        id: i64,
    },
    FullLoadComplete,
    ErrorOccurred {
        kind: ErrorKind,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        detail: Option<String>,
    },
}

impl LoaderMessage {
    /// Convenience constructor for error reports.
    pub fn error(kind: ErrorKind, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ErrorOccurred {
            kind,
            message: Some(message.into()),
            detail: Some(detail.into()),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClientRegistered => "ClientRegistered",
            Self::NowLoading => "NowLoading",
            Self::RssLoadComplete => "RssLoadComplete",
            Self::CategoryLoaded { .. } => "CategoryLoaded",
            Self::UpdateLoadProgress { .. } => "UpdateLoadProgress",
            Self::ThumbLoaded { .. } => "ThumbLoaded",
            Self::FullLoadComplete => "FullLoadComplete",
            Self::ErrorOccurred { .. } => "ErrorOccurred",
        }
    }
}

/// Parse a JSON-lines transcript. Blank lines and `#` comments are skipped.
///
/// Errors carry the 1-based line number.
pub fn parse_transcript(content: &str) -> anyhow::Result<Vec<LoaderMessage>> {
    let mut messages = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let message: LoaderMessage = serde_json::from_str(line)
            .map_err(|e| anyhow::anyhow!("line {}: {}", idx + 1, e))?;
        messages.push(message);
    }
    Ok(messages)
}
