//! Load state machine.
//!
//! The controller's phase is derived only from the loader messages it has
//! received plus its own load/stop requests. Handling a message yields a list
//! of [`Effect`]s for the controller to carry out; the machine itself never
//! touches the store, the channel or the display.

use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::{ErrorKind, LoaderMessage};

/// Wording of the error reported when the watchdog abandons a session.
pub const WATCHDOG_MESSAGE: &str = "The loader stopped responding";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    LoadingFeeds,
    LoadingItems,
    ErrorReported,
}

/// One load attempt, from trigger to `FullLoadComplete` or watchdog expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSession {
    pub network_error_seen: bool,
    pub stop_requested: bool,
    pub total_items: u32,
    pub items_loaded: u32,
    /// Loader has announced `NowLoading`.
    announced: bool,
    /// Loader has reported `RssLoadComplete`.
    feeds_done: bool,
}

/// Work requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send `LoadData` to the loader.
    RequestLoad,
    /// Re-query and redraw one category.
    RenderCategory(String),
    /// Re-resolve every slot bound to this item.
    RefreshThumbnail(i64),
    /// A full load finished without a stop: persist the timestamp, run
    /// clear-out, recompute staleness.
    LoadSucceeded { at: i64 },
    /// A stopped load has gone quiet.
    LoadStopped,
    /// Hand an error to the reporter. `repeat` marks a network error already
    /// reported during this session.
    ReportError {
        kind: ErrorKind,
        message: Option<String>,
        detail: Option<String>,
        repeat: bool,
    },
}

#[derive(Debug)]
pub struct SessionMachine {
    connecting: bool,
    session: Option<LoadSession>,
    error_visible: bool,
    last_load: Option<i64>,
    stale_after: i64,
    watchdog: Option<Duration>,
    last_activity: Option<Instant>,
}

impl SessionMachine {
    /// `watchdog` of zero disables it.
    pub fn new(last_load: Option<i64>, stale_after_minutes: u64, watchdog: Duration) -> Self {
        Self {
            connecting: false,
            session: None,
            error_visible: false,
            last_load,
            stale_after: i64::try_from(stale_after_minutes.saturating_mul(60)).unwrap_or(i64::MAX),
            watchdog: (!watchdog.is_zero()).then_some(watchdog),
            last_activity: None,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn phase(&self) -> Phase {
        if self.error_visible {
            return Phase::ErrorReported;
        }
        self.underlying_phase()
    }

    /// Phase ignoring any visible error dialog.
    pub fn underlying_phase(&self) -> Phase {
        if self.connecting {
            return Phase::Connecting;
        }
        match &self.session {
            None => Phase::Idle,
            Some(s) if !s.announced => Phase::Connecting,
            Some(s) if !s.feeds_done => Phase::LoadingFeeds,
            Some(_) => Phase::LoadingItems,
        }
    }

    pub fn session(&self) -> Option<&LoadSession> {
        self.session.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_some()
    }

    pub fn last_load(&self) -> Option<i64> {
        self.last_load
    }

    /// Never loaded, or the last load is older than the staleness threshold.
    pub fn is_stale(&self, now: i64) -> bool {
        self.last_load
            .map_or(true, |last| now.saturating_sub(last) > self.stale_after)
    }

    /// Progress text while a session is running, `None` otherwise.
    pub fn status_text(&self) -> Option<String> {
        let session = self.session.as_ref()?;
        if !session.announced {
            return None;
        }
        if !session.feeds_done {
            return Some("Loading feeds...".to_string());
        }
        if session.total_items > 0 {
            return Some(format!(
                "Preloading {} of {} items",
                session.items_loaded, session.total_items
            ));
        }
        Some("Loading items...".to_string())
    }

    // ========================================================================
    // Controller Actions
    // ========================================================================

    /// The channel is connecting; phase stays Connecting until the first
    /// loader message arrives.
    pub fn begin_connect(&mut self) {
        self.connecting = true;
    }

    /// The loader could not be reached.
    pub fn cancel_connect(&mut self) {
        self.connecting = false;
    }

    /// Start a session. Returns false (and does nothing) if one is active.
    pub fn request_load(&mut self) -> bool {
        if self.session.is_some() {
            return false;
        }
        self.session = Some(LoadSession::default());
        self.touch();
        true
    }

    /// Ask the running session to stop. Returns true if `StopDataLoad` should
    /// be sent. The session stays active until the loader's
    /// `FullLoadComplete`.
    pub fn request_stop(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        session.stop_requested = true;
        session.network_error_seen = false;
        true
    }

    pub fn set_error_visible(&mut self, visible: bool) {
        self.error_visible = visible;
    }

    // ========================================================================
    // Loader Messages
    // ========================================================================

    /// Apply one loader message. `now` is unix seconds.
    pub fn handle(&mut self, message: LoaderMessage, now: i64) -> Vec<Effect> {
        // Any inbound message means the channel is up
        self.connecting = false;
        if self.session.is_some() {
            self.touch();
        }

        match message {
            LoaderMessage::ClientRegistered => {
                if self.session.is_none() && self.is_stale(now) && self.request_load() {
                    tracing::info!(last_load = ?self.last_load, "Cache is stale, requesting load");
                    return vec![Effect::RequestLoad];
                }
                Vec::new()
            }
            LoaderMessage::NowLoading => {
                let session = self.session.get_or_insert_with(LoadSession::default);
                session.announced = true;
                session.feeds_done = false;
                session.total_items = 0;
                session.items_loaded = 0;
                self.touch();
                Vec::new()
            }
            LoaderMessage::RssLoadComplete => {
                if let Some(session) = self.session.as_mut() {
                    session.announced = true;
                    session.feeds_done = true;
                }
                Vec::new()
            }
            LoaderMessage::CategoryLoaded { category } => vec![Effect::RenderCategory(category)],
            LoaderMessage::UpdateLoadProgress {
                total_items,
                items_loaded,
            } => {
                // Item progress only follows the feed stage
                if let Some(session) = self.session.as_mut() {
                    session.announced = true;
                    session.feeds_done = true;
                    session.total_items = total_items;
                    session.items_loaded = items_loaded;
                }
                Vec::new()
            }
            LoaderMessage::ThumbLoaded { id } => vec![Effect::RefreshThumbnail(id)],
            LoaderMessage::FullLoadComplete => {
                let Some(session) = self.session.take() else {
                    tracing::debug!("FullLoadComplete outside a session, ignoring");
                    return Vec::new();
                };
                self.last_activity = None;
                if session.stop_requested {
                    return vec![Effect::LoadStopped];
                }
                self.last_load = Some(now);
                vec![Effect::LoadSucceeded { at: now }]
            }
            LoaderMessage::ErrorOccurred {
                kind,
                message,
                detail,
            } => {
                let mut repeat = false;
                if kind == ErrorKind::NetworkUnavailable {
                    if let Some(session) = self.session.as_mut() {
                        repeat = session.network_error_seen;
                        session.network_error_seen = true;
                    }
                }
                vec![Effect::ReportError {
                    kind,
                    message,
                    detail,
                    repeat,
                }]
            }
        }
    }

    // ========================================================================
    // Watchdog
    // ========================================================================

    /// Abandon the session if the loader has been silent for too long.
    ///
    /// Called from the UI tick.
    pub fn check_watchdog(&mut self, now: Instant) -> Option<Effect> {
        let limit = self.watchdog?;
        let last = self.last_activity?;
        self.session.as_ref()?;
        let silent = now.saturating_duration_since(last);
        if silent < limit {
            return None;
        }

        tracing::warn!(silent_secs = silent.as_secs(), "Abandoning unresponsive load session");
        self.session = None;
        self.last_activity = None;
        Some(Effect::ReportError {
            kind: ErrorKind::General,
            message: Some(WATCHDOG_MESSAGE.to_string()),
            detail: Some(format!("No loader message for {} seconds", silent.as_secs())),
            repeat: false,
        })
    }

    fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NOW: i64 = 1_700_000_000;

    fn machine() -> SessionMachine {
        SessionMachine::new(Some(NOW), 30, Duration::from_secs(120))
    }

    fn error(kind: ErrorKind) -> LoaderMessage {
        LoaderMessage::error(kind, "msg", "detail")
    }

    #[test]
    fn test_full_cycle_phases() {
        let mut m = machine();
        assert_eq!(m.phase(), Phase::Idle);

        assert!(m.request_load());
        assert_eq!(m.phase(), Phase::Connecting);

        m.handle(LoaderMessage::NowLoading, NOW);
        assert_eq!(m.phase(), Phase::LoadingFeeds);
        assert_eq!(m.status_text().as_deref(), Some("Loading feeds..."));

        m.handle(LoaderMessage::RssLoadComplete, NOW);
        assert_eq!(m.phase(), Phase::LoadingItems);
        assert_eq!(m.status_text().as_deref(), Some("Loading items..."));

        m.handle(
            LoaderMessage::UpdateLoadProgress {
                total_items: 12,
                items_loaded: 5,
            },
            NOW,
        );
        assert_eq!(m.status_text().as_deref(), Some("Preloading 5 of 12 items"));

        let effects = m.handle(LoaderMessage::FullLoadComplete, NOW + 60);
        assert_eq!(effects, vec![Effect::LoadSucceeded { at: NOW + 60 }]);
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.last_load(), Some(NOW + 60));
        assert_eq!(m.status_text(), None);
    }

    #[test]
    fn test_full_load_complete_outside_session_is_noop() {
        let mut m = machine();
        let effects = m.handle(LoaderMessage::FullLoadComplete, NOW + 999);
        assert!(effects.is_empty());
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.last_load(), Some(NOW));
    }

    #[test]
    fn test_rss_load_complete_without_session_is_ignored() {
        let mut m = machine();
        m.handle(LoaderMessage::RssLoadComplete, NOW);
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn test_now_loading_without_request_creates_session() {
        let mut m = machine();
        m.handle(LoaderMessage::NowLoading, NOW);
        assert!(m.is_loading());
        assert_eq!(m.phase(), Phase::LoadingFeeds);
    }

    #[test]
    fn test_request_load_while_active_is_noop() {
        let mut m = machine();
        assert!(m.request_load());
        m.handle(LoaderMessage::NowLoading, NOW);
        assert!(!m.request_load());
        assert_eq!(m.phase(), Phase::LoadingFeeds);
    }

    #[test]
    fn test_stop_then_complete_skips_timestamp() {
        let mut m = machine();
        m.request_load();
        m.handle(LoaderMessage::NowLoading, NOW);
        assert!(m.request_stop());
        assert_eq!(m.phase(), Phase::LoadingFeeds);

        let effects = m.handle(LoaderMessage::FullLoadComplete, NOW + 60);
        assert_eq!(effects, vec![Effect::LoadStopped]);
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.last_load(), Some(NOW));
    }

    #[test]
    fn test_stop_without_session_does_nothing() {
        let mut m = machine();
        assert!(!m.request_stop());
    }

    #[test]
    fn test_client_registered_when_fresh_stays_idle() {
        let mut m = machine();
        m.begin_connect();
        assert_eq!(m.phase(), Phase::Connecting);

        let effects = m.handle(LoaderMessage::ClientRegistered, NOW + 60);
        assert!(effects.is_empty());
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn test_load_messages_while_connecting_advance_phase() {
        let mut m = machine();
        m.begin_connect();
        assert_eq!(m.phase(), Phase::Connecting);

        m.handle(LoaderMessage::NowLoading, NOW);
        assert_eq!(m.phase(), Phase::LoadingFeeds);

        m.handle(LoaderMessage::RssLoadComplete, NOW);
        assert_eq!(m.phase(), Phase::LoadingItems);

        m.handle(LoaderMessage::FullLoadComplete, NOW);
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn test_progress_after_catch_up_now_loading_shows_items_stage() {
        let mut m = machine();
        m.handle(LoaderMessage::ClientRegistered, NOW);
        m.handle(LoaderMessage::NowLoading, NOW);
        m.handle(
            LoaderMessage::UpdateLoadProgress {
                total_items: 8,
                items_loaded: 3,
            },
            NOW,
        );
        assert_eq!(m.phase(), Phase::LoadingItems);
        assert_eq!(m.status_text().as_deref(), Some("Preloading 3 of 8 items"));
    }

    #[test]
    fn test_client_registered_when_stale_requests_load() {
        let mut m = machine();
        m.begin_connect();
        let effects = m.handle(LoaderMessage::ClientRegistered, NOW + 31 * 60);
        assert_eq!(effects, vec![Effect::RequestLoad]);
        assert_eq!(m.phase(), Phase::Connecting);
    }

    #[test]
    fn test_client_registered_never_loaded_requests_load() {
        let mut m = SessionMachine::new(None, 30, Duration::from_secs(120));
        let effects = m.handle(LoaderMessage::ClientRegistered, NOW);
        assert_eq!(effects, vec![Effect::RequestLoad]);
    }

    #[test]
    fn test_category_and_thumb_messages_produce_render_effects() {
        let mut m = machine();
        assert_eq!(
            m.handle(
                LoaderMessage::CategoryLoaded {
                    category: "World".into()
                },
                NOW
            ),
            vec![Effect::RenderCategory("World".into())]
        );
        assert_eq!(
            m.handle(LoaderMessage::ThumbLoaded { id: 42 }, NOW),
            vec![Effect::RefreshThumbnail(42)]
        );
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn test_network_errors_flag_repeats_within_session() {
        let mut m = machine();
        m.handle(LoaderMessage::NowLoading, NOW);

        let first = m.handle(error(ErrorKind::NetworkUnavailable), NOW);
        let second = m.handle(error(ErrorKind::NetworkUnavailable), NOW);
        assert!(matches!(first[0], Effect::ReportError { repeat: false, .. }));
        assert!(matches!(second[0], Effect::ReportError { repeat: true, .. }));

        // A stop resets suppression
        m.request_stop();
        let third = m.handle(error(ErrorKind::NetworkUnavailable), NOW);
        assert!(matches!(third[0], Effect::ReportError { repeat: false, .. }));
    }

    #[test]
    fn test_new_session_resets_network_suppression() {
        let mut m = machine();
        m.handle(LoaderMessage::NowLoading, NOW);
        m.handle(error(ErrorKind::NetworkUnavailable), NOW);
        m.handle(LoaderMessage::FullLoadComplete, NOW);

        m.handle(LoaderMessage::NowLoading, NOW);
        let effects = m.handle(error(ErrorKind::NetworkUnavailable), NOW);
        assert!(matches!(effects[0], Effect::ReportError { repeat: false, .. }));
    }

    #[test]
    fn test_network_error_without_session_is_never_repeat() {
        let mut m = machine();
        for _ in 0..3 {
            let effects = m.handle(error(ErrorKind::NetworkUnavailable), NOW);
            assert!(matches!(effects[0], Effect::ReportError { repeat: false, .. }));
        }
    }

    #[test]
    fn test_error_layer_keeps_underlying_phase_advancing() {
        let mut m = machine();
        m.handle(LoaderMessage::NowLoading, NOW);
        m.set_error_visible(true);
        assert_eq!(m.phase(), Phase::ErrorReported);

        m.handle(LoaderMessage::RssLoadComplete, NOW);
        assert_eq!(m.phase(), Phase::ErrorReported);
        assert_eq!(m.underlying_phase(), Phase::LoadingItems);

        m.set_error_visible(false);
        assert_eq!(m.phase(), Phase::LoadingItems);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_abandons_silent_session() {
        let mut m = machine();
        m.request_load();
        m.handle(LoaderMessage::NowLoading, NOW);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(m.check_watchdog(Instant::now()), None);

        // Activity resets the timer
        m.handle(LoaderMessage::RssLoadComplete, NOW);
        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(m.check_watchdog(Instant::now()), None);

        tokio::time::advance(Duration::from_secs(30)).await;
        let effect = m.check_watchdog(Instant::now());
        assert!(matches!(
            effect,
            Some(Effect::ReportError {
                kind: ErrorKind::General,
                ..
            })
        ));
        assert_eq!(m.phase(), Phase::Idle);
        assert!(!m.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_disabled_with_zero() {
        let mut m = SessionMachine::new(Some(NOW), 30, Duration::ZERO);
        m.request_load();
        tokio::time::advance(Duration::from_secs(10_000)).await;
        assert_eq!(m.check_watchdog(Instant::now()), None);
        assert!(m.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_idle_never_fires() {
        let mut m = machine();
        tokio::time::advance(Duration::from_secs(10_000)).await;
        assert_eq!(m.check_watchdog(Instant::now()), None);
    }
}
