//! Error reporter: turns loader error reports into dialogs.
//!
//! One dialog is visible at a time; further errors wait in a short FIFO queue.
//! Repeated network errors within a session are logged but not shown, and a
//! fatal error makes the process exit once its dialog is acknowledged.

use std::collections::VecDeque;

use crate::protocol::ErrorKind;

/// Errors waiting behind the visible dialog.
pub const MAX_QUEUED_ERRORS: usize = 4;

/// Exit status after a fatal error is acknowledged.
pub const FATAL_EXIT_CODE: i32 = 1;

const NETWORK_TEXT: &str = "Please check your internet connection.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDialog {
    pub kind: ErrorKind,
    pub text: String,
}

impl ErrorDialog {
    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::Fatal
    }
}

/// What happened to a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Shown,
    Queued,
    Suppressed,
    Dropped,
}

#[derive(Debug, Default)]
pub struct ErrorReporter {
    display_full_error: bool,
    visible: Option<ErrorDialog>,
    queue: VecDeque<ErrorDialog>,
    exit_pending: bool,
}

/// Dialog text for an error, or `None` when it should only be logged.
pub fn dialog_text(
    kind: ErrorKind,
    message: Option<&str>,
    detail: Option<&str>,
    repeat: bool,
    display_full_error: bool,
) -> Option<String> {
    if display_full_error {
        return Some(format!("Error: {}", detail.unwrap_or("null")));
    }
    let message = message.unwrap_or("null");
    match kind {
        ErrorKind::Fatal => Some(format!(
            "Fatal error:\n{}\nPlease try resetting the app.",
            message
        )),
        ErrorKind::General => Some(format!("Error:\n{}", message)),
        ErrorKind::NetworkUnavailable if repeat => None,
        ErrorKind::NetworkUnavailable => Some(NETWORK_TEXT.to_string()),
    }
}

impl ErrorReporter {
    pub fn new(display_full_error: bool) -> Self {
        Self {
            display_full_error,
            ..Self::default()
        }
    }

    pub fn display_full_error(&self) -> bool {
        self.display_full_error
    }

    pub fn set_display_full_error(&mut self, enabled: bool) {
        self.display_full_error = enabled;
    }

    /// The dialog currently on screen.
    pub fn current(&self) -> Option<&ErrorDialog> {
        self.visible.as_ref()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// A fatal error has been reported; the next acknowledgement exits.
    pub fn exit_pending(&self) -> bool {
        self.exit_pending
    }

    /// Report an error. `repeat` marks a network error already shown during
    /// the current session.
    pub fn report(
        &mut self,
        kind: ErrorKind,
        message: Option<&str>,
        detail: Option<&str>,
        repeat: bool,
    ) -> ReportOutcome {
        match kind {
            ErrorKind::Fatal => {
                self.exit_pending = true;
                tracing::error!(msg = message.unwrap_or("null"), detail = detail.unwrap_or("null"), "Fatal loader error");
            }
            ErrorKind::General => {
                tracing::error!(msg = message.unwrap_or("null"), detail = detail.unwrap_or("null"), "Loader error");
            }
            ErrorKind::NetworkUnavailable => {
                tracing::warn!(msg = message.unwrap_or("null"), detail = detail.unwrap_or("null"), repeat, "Network unavailable");
            }
        }

        let Some(text) = dialog_text(kind, message, detail, repeat, self.display_full_error) else {
            return ReportOutcome::Suppressed;
        };
        let dialog = ErrorDialog { kind, text };

        if self.visible.is_none() {
            self.visible = Some(dialog);
            return ReportOutcome::Shown;
        }
        if self.queue.len() >= MAX_QUEUED_ERRORS {
            tracing::warn!(kind = ?kind, "Error queue full, dropping dialog");
            return ReportOutcome::Dropped;
        }
        self.queue.push_back(dialog);
        ReportOutcome::Queued
    }

    /// Dismiss the visible dialog. Returns an exit status when the process
    /// should terminate; otherwise the next queued dialog becomes visible.
    pub fn acknowledge(&mut self) -> Option<i32> {
        let dismissed = self.visible.take()?;
        // A queued fatal dialog is still shown before exiting
        let fatal_queued = self.queue.iter().any(ErrorDialog::is_fatal);
        if dismissed.is_fatal() || (self.exit_pending && !fatal_queued) {
            tracing::info!("Fatal error acknowledged, exiting");
            return Some(FATAL_EXIT_CODE);
        }
        self.visible = self.queue.pop_front();
        None
    }
}
