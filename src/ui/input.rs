//! Keyboard input handling.

use crossterm::event::{KeyCode, KeyModifiers};

use super::Action;
use crate::controller::Controller;

/// Dispatch a key press.
///
/// An open error dialog captures every key except Ctrl+C; Enter, Esc or Space
/// acknowledge it. The category chooser captures keys next.
pub(super) async fn handle_input(
    controller: &mut Controller,
    code: KeyCode,
    modifiers: KeyModifiers,
) -> Action {
    if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
        return quit(controller);
    }

    if controller.dialog().is_some() {
        return match code {
            KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ') => {
                match controller.acknowledge_error() {
                    Some(status) => Action::Exit(status),
                    None => Action::Continue,
                }
            }
            _ => Action::Continue,
        };
    }

    if controller.chooser().is_some() {
        match code {
            KeyCode::Up | KeyCode::Char('k') => controller.chooser_move(-1),
            KeyCode::Down | KeyCode::Char('j') => controller.chooser_move(1),
            KeyCode::Char(' ') => controller.chooser_toggle(),
            KeyCode::Enter => controller.apply_chooser().await,
            KeyCode::Esc | KeyCode::Char('c') => controller.close_chooser(),
            _ => {}
        }
        return Action::Continue;
    }

    match code {
        KeyCode::Char('q') => return quit(controller),
        KeyCode::Char('r') => controller.refresh_pressed().await,
        KeyCode::Char('e') => controller.toggle_full_error().await,
        KeyCode::Char('c') => controller.open_chooser().await,
        KeyCode::Enter => controller.open_selected(),
        KeyCode::Up | KeyCode::Char('k') => controller.move_selection(-1, 0),
        KeyCode::Down | KeyCode::Char('j') => controller.move_selection(1, 0),
        KeyCode::Left | KeyCode::Char('h') => controller.move_selection(0, -1),
        KeyCode::Right | KeyCode::Char('l') => controller.move_selection(0, 1),
        _ => {}
    }
    Action::Continue
}

/// Leave the loop, failing if a fatal error has been reported.
pub(super) fn quit(controller: &Controller) -> Action {
    match controller.quit_status() {
        Some(status) => Action::Exit(status),
        None => Action::Quit,
    }
}
