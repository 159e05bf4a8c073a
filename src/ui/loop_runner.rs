//! Main event loop for the TUI.
//!
//! Multiplexes terminal input, loader messages and a periodic tick. All
//! controller state is mutated from this loop only.

use anyhow::Result;
use crossterm::{
    event::Event,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::sync::mpsc;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use super::input::{handle_input, quit};
use super::render::render;
use crate::controller::Controller;
use crate::protocol::LoaderMessage;

/// Result of handling a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Continue the event loop.
    Continue,
    /// Exit normally and restore the terminal.
    Quit,
    /// Exit with the given status after restoring the terminal.
    Exit(i32),
}

/// Run the TUI until the user quits or a fatal error is acknowledged.
///
/// Uses `tokio::select!` over signals, terminal input, inbound loader
/// messages and a 250ms tick (watchdog, notice expiry, staleness text).
///
/// Returns the process exit status requested by the controller, if any.
pub async fn run(
    controller: &mut Controller,
    mut inbound: mpsc::Receiver<LoaderMessage>,
) -> Result<Option<i32>> {
    // Install panic hook BEFORE setting up terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;
    let mut event_stream = crossterm::event::EventStream::new();
    let mut tick_interval = tokio::time::interval(Duration::from_millis(250));

    let size = terminal.size()?;
    controller.resize(size.width).await;
    let mut needs_redraw = true;
    let mut exit_status = None;

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        if needs_redraw {
            terminal.draw(|f| render(f, controller))?;
            needs_redraw = false;
        }

        // Drain queued loader messages before waiting on input
        while let Ok(message) = inbound.try_recv() {
            controller.handle_message(message).await;
            needs_redraw = true;
        }
        if needs_redraw {
            continue;
        }

        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                exit_status = action_status(quit(controller));
                break;
            }

            _ = sigint_fut => {
                tracing::info!("Received SIGINT, shutting down gracefully");
                exit_status = action_status(quit(controller));
                break;
            }

            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        needs_redraw = true;
                        match handle_input(controller, key.code, key.modifiers).await {
                            Action::Continue => {}
                            Action::Quit => break,
                            Action::Exit(status) => {
                                exit_status = Some(status);
                                break;
                            }
                        }
                    }
                    Some(Ok(Event::Resize(width, _))) => {
                        tracing::debug!(width, "Terminal resized");
                        controller.resize(width).await;
                        needs_redraw = true;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Terminal event stream error");
                    }
                    None => break,
                }
            }

            Some(message) = inbound.recv() => {
                controller.handle_message(message).await;
                needs_redraw = true;
            }

            _ = tick_interval.tick() => {
                if controller.tick() {
                    needs_redraw = true;
                }
            }
        }
    }

    restore_terminal(terminal)?;
    Ok(exit_status)
}

fn action_status(action: Action) -> Option<i32> {
    match action {
        Action::Exit(status) => Some(status),
        Action::Continue | Action::Quit => None,
    }
}

/// Set up the terminal for TUI rendering.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore terminal to normal state.
fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
