//! Controller: glue between the loader channel, the load state machine, the
//! cache coordinator and the error reporter.
//!
//! All state lives here and is mutated only from the UI event loop. The render
//! step reads it through the accessors below and never changes it.

use std::borrow::Cow;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::LoaderChannel;
use crate::config::Config;
use crate::coordinator::{format_staleness, CacheCoordinator, DisplayModel, ItemSlot};
use crate::preferences::{PreferenceManager, DISPLAY_FULL_ERROR_KEY};
use crate::protocol::{ControlMessage, ErrorKind, LoaderMessage};
use crate::reporter::{ErrorDialog, ErrorReporter, FATAL_EXIT_CODE};
use crate::session::{Effect, Phase, SessionMachine};
use crate::storage::Database;

/// How long a transient notice stays in the status bar.
const NOTICE_SECS: u64 = 3;

pub struct Controller {
    db: Database,
    prefs: PreferenceManager,
    channel: LoaderChannel,
    machine: SessionMachine,
    coordinator: CacheCoordinator,
    reporter: ErrorReporter,

    /// Status line: progress while loading, staleness otherwise.
    status: String,
    /// Short-lived message shown instead of the status line.
    notice: Option<(Cow<'static, str>, Instant)>,
    /// Selected slot as (category row, column).
    selected: (usize, usize),
    exit_code: Option<i32>,
    clear_out: Option<JoinHandle<()>>,
    chooser: Option<CategoryChooser>,
}

/// Category chooser overlay: every category with its pending enabled flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryChooser {
    pub entries: Vec<(String, bool)>,
    pub cursor: usize,
}

/// Unix seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Controller {
    /// Build a controller over an open store. Nothing is displayed until the
    /// first `resize`.
    pub async fn new(
        db: Database,
        config: &Config,
        prefs: PreferenceManager,
        channel: LoaderChannel,
    ) -> Result<Self> {
        let last_load = db.last_load_time().await?;
        let machine = SessionMachine::new(
            last_load,
            config.stale_after_minutes,
            Duration::from_secs(config.watchdog_secs),
        );
        let reporter = ErrorReporter::new(prefs.display_full_error());
        let coordinator = CacheCoordinator::new(db.clone(), config.item_width);

        Ok(Self {
            db,
            prefs,
            channel,
            machine,
            coordinator,
            reporter,
            status: format_staleness(last_load, unix_now()),
            notice: None,
            selected: (0, 0),
            exit_code: None,
            clear_out: None,
            chooser: None,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn model(&self) -> &DisplayModel {
        self.coordinator.model()
    }

    /// Text for the status bar.
    pub fn status(&self) -> &str {
        match &self.notice {
            Some((notice, _)) => notice,
            None => &self.status,
        }
    }

    /// Label for the refresh control.
    pub fn refresh_label(&self) -> &'static str {
        if self.machine.is_loading() {
            "stop"
        } else {
            "reload"
        }
    }

    pub fn chooser(&self) -> Option<&CategoryChooser> {
        self.chooser.as_ref()
    }

    pub fn dialog(&self) -> Option<&ErrorDialog> {
        self.reporter.current()
    }

    pub fn display_full_error(&self) -> bool {
        self.reporter.display_full_error()
    }

    pub fn selected(&self) -> (usize, usize) {
        self.selected
    }

    pub fn selected_slot(&self) -> Option<&ItemSlot> {
        self.model().slot(self.selected.0, self.selected.1)
    }

    /// Set once a fatal error has been acknowledged.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Exit status for a quit right now: a reported fatal error still exits
    /// with failure even if its dialog was never acknowledged.
    pub fn quit_status(&self) -> Option<i32> {
        self.exit_code
            .or_else(|| self.reporter.exit_pending().then_some(FATAL_EXIT_CODE))
    }

    /// The most recent clear-out task, if one has been spawned.
    pub fn take_clear_out(&mut self) -> Option<JoinHandle<()>> {
        self.clear_out.take()
    }

    // ========================================================================
    // Channel
    // ========================================================================

    /// Connect to the loader. Phase is Connecting until `ClientRegistered`.
    pub async fn connect(&mut self, loader: mpsc::Sender<ControlMessage>) {
        self.machine.begin_connect();
        if !self.channel.connect(loader).await {
            self.machine.cancel_connect();
            self.report(
                ErrorKind::General,
                Some("Could not reach the loader"),
                Some("loader control channel closed"),
                false,
            );
        }
    }

    pub async fn disconnect(&mut self) {
        self.channel.disconnect().await;
    }

    // ========================================================================
    // Loader Messages
    // ========================================================================

    /// Handle one loader message completely.
    pub async fn handle_message(&mut self, message: LoaderMessage) {
        tracing::debug!(message = message.name(), phase = ?self.machine.phase(), "Loader message");
        let now = unix_now();
        let effects = self.machine.handle(message, now);
        for effect in effects {
            self.apply(effect).await;
        }
        self.refresh_status(now);
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::RequestLoad => self.channel.send(ControlMessage::LoadData).await,
            Effect::RenderCategory(name) => {
                self.coordinator.refresh_category(&name).await;
            }
            Effect::RefreshThumbnail(id) => {
                self.coordinator.refresh_thumbnail(id).await;
            }
            Effect::LoadSucceeded { at } => {
                if let Err(e) = self.db.set_last_load_time(at).await {
                    tracing::warn!(error = %e, "Failed to persist last load time");
                }
                let age = self.prefs.clear_out_age_days();
                self.clear_out = Some(self.coordinator.spawn_clear_out(age));
                tracing::info!(at, "Load complete");
            }
            Effect::LoadStopped => tracing::info!("Load stopped"),
            Effect::ReportError {
                kind,
                message,
                detail,
                repeat,
            } => self.report(kind, message.as_deref(), detail.as_deref(), repeat),
        }
    }

    fn report(&mut self, kind: ErrorKind, message: Option<&str>, detail: Option<&str>, repeat: bool) {
        self.reporter.report(kind, message, detail, repeat);
        self.machine.set_error_visible(self.reporter.current().is_some());
    }

    fn refresh_status(&mut self, now: i64) {
        self.status = self
            .machine
            .status_text()
            .unwrap_or_else(|| format_staleness(self.machine.last_load(), now));
    }

    // ========================================================================
    // User Actions
    // ========================================================================

    /// Refresh control: start a load when idle, stop the running one otherwise.
    pub async fn refresh_pressed(&mut self) {
        if self.machine.is_loading() {
            if self.machine.request_stop() {
                tracing::info!("Stop requested");
                self.channel.send(ControlMessage::StopDataLoad).await;
            }
        } else if self.machine.request_load() {
            tracing::info!("Load requested");
            self.channel.send(ControlMessage::LoadData).await;
        }
        self.refresh_status(unix_now());
    }

    /// Dismiss the visible error dialog. Returns the exit status when a fatal
    /// error has been acknowledged.
    pub fn acknowledge_error(&mut self) -> Option<i32> {
        let code = self.reporter.acknowledge();
        self.machine.set_error_visible(self.reporter.current().is_some());
        if code.is_some() {
            self.exit_code = code;
        }
        code
    }

    /// Toggle diagnostic error wording and persist the choice.
    pub async fn toggle_full_error(&mut self) {
        let enabled = !self.reporter.display_full_error();
        if let Err(e) = self
            .prefs
            .set(&self.db, DISPLAY_FULL_ERROR_KEY, &enabled.to_string())
            .await
        {
            tracing::warn!(error = %e, "Failed to persist error display preference");
        }
        self.reporter.set_display_full_error(enabled);
        self.set_notice(if enabled {
            "Full error details on"
        } else {
            "Full error details off"
        });
    }

    /// Terminal width changed.
    pub async fn resize(&mut self, width: u16) {
        self.coordinator.resize(width).await;
        self.clamp_selection();
    }

    /// Enabled categories changed in the store.
    pub async fn categories_changed(&mut self) {
        self.coordinator.rebuild().await;
        self.clamp_selection();
    }

    /// Move the selection by whole slots, clamped to the grid.
    pub fn move_selection(&mut self, rows: isize, cols: isize) {
        let model = self.coordinator.model();
        let max_row = model.categories.len().saturating_sub(1);
        let max_col = model.row_capacity.saturating_sub(1);
        self.selected.0 = self.selected.0.saturating_add_signed(rows).min(max_row);
        self.selected.1 = self.selected.1.saturating_add_signed(cols).min(max_col);
    }

    /// Show the selected item's link.
    pub fn open_selected(&mut self) {
        let notice: Cow<'static, str> = match self.selected_slot() {
            Some(slot) => match &slot.url {
                Some(url) => Cow::Owned(url.to_string()),
                None => Cow::Borrowed("This item has no link"),
            },
            None => Cow::Borrowed("Nothing here yet"),
        };
        self.set_notice(notice);
    }

    // ========================================================================
    // Category Chooser
    // ========================================================================

    /// Open the chooser with the stored enabled flags.
    pub async fn open_chooser(&mut self) {
        match self.db.get_all_categories().await {
            Ok(categories) => {
                self.chooser = Some(CategoryChooser {
                    entries: categories.into_iter().map(|c| (c.name, c.enabled)).collect(),
                    cursor: 0,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read categories");
                self.set_notice("Could not read categories");
            }
        }
    }

    pub fn close_chooser(&mut self) {
        self.chooser = None;
    }

    pub fn chooser_move(&mut self, delta: isize) {
        if let Some(chooser) = self.chooser.as_mut() {
            let last = chooser.entries.len().saturating_sub(1);
            chooser.cursor = chooser.cursor.saturating_add_signed(delta).min(last);
        }
    }

    pub fn chooser_toggle(&mut self) {
        if let Some(chooser) = self.chooser.as_mut() {
            if let Some((_, enabled)) = chooser.entries.get_mut(chooser.cursor) {
                *enabled = !*enabled;
            }
        }
    }

    /// Store the chosen flags and rebuild the display. At least one category
    /// must stay enabled; otherwise the chooser stays open.
    pub async fn apply_chooser(&mut self) {
        let Some(chooser) = self.chooser.as_ref() else {
            return;
        };
        let flags: Vec<bool> = chooser.entries.iter().map(|(_, enabled)| *enabled).collect();
        if !flags.contains(&true) {
            self.set_notice("Choose at least one category");
            return;
        }

        self.chooser = None;
        if let Err(e) = self.db.set_enabled_categories(&flags).await {
            tracing::warn!(error = %e, "Failed to save enabled categories");
            self.set_notice("Could not save categories");
            return;
        }
        self.categories_changed().await;
        self.set_notice("Categories updated");
    }

    fn clamp_selection(&mut self) {
        self.move_selection(0, 0);
    }

    fn set_notice(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.notice = Some((msg.into(), Instant::now()));
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Periodic housekeeping: watchdog, notice expiry, staleness text.
    ///
    /// Returns true if anything visible changed.
    pub fn tick(&mut self) -> bool {
        let mut changed = false;

        if let Some(effect) = self.machine.check_watchdog(Instant::now()) {
            if let Effect::ReportError {
                kind,
                message,
                detail,
                repeat,
            } = effect
            {
                self.report(kind, message.as_deref(), detail.as_deref(), repeat);
            }
            changed = true;
        }

        if let Some((_, shown)) = &self.notice {
            if shown.elapsed().as_secs() >= NOTICE_SECS {
                self.notice = None;
                changed = true;
            }
        }

        let previous = std::mem::take(&mut self.status);
        self.refresh_status(unix_now());
        if self.status != previous {
            changed = true;
        }

        changed
    }
}
