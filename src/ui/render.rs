//! Render functions for the TUI.
//!
//! Rendering is a pure projection of the controller's state: nothing here
//! mutates it.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use super::{grid, status};
use crate::controller::{CategoryChooser, Controller};
use crate::reporter::ErrorDialog;

/// Minimum terminal dimensions required for normal operation.
pub(super) const MIN_WIDTH: u16 = 30;
pub(super) const MIN_HEIGHT: u16 = 8;

pub(super) fn render(f: &mut Frame, controller: &Controller) {
    let area = f.area();

    if area.width < 1 || area.height < 1 {
        return;
    }

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = if area.height < 3 || area.width < 20 {
            Paragraph::new("Too small")
        } else {
            Paragraph::new(format!(
                "Terminal too small\n\nMinimum: {}x{}\nCurrent: {}x{}",
                MIN_WIDTH, MIN_HEIGHT, area.width, area.height
            ))
            .alignment(Alignment::Center)
        };
        f.render_widget(msg, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    status::render_header(f, controller, chunks[0]);
    grid::render(f, controller, chunks[1]);
    status::render(f, controller, chunks[2]);

    if let Some(chooser) = controller.chooser() {
        render_chooser_overlay(f, chooser);
    }
    if let Some(dialog) = controller.dialog() {
        render_error_overlay(f, dialog);
    }
}

/// Render the category chooser centered on screen.
fn render_chooser_overlay(f: &mut Frame, chooser: &CategoryChooser) {
    let area = f.area();

    let items: Vec<ListItem> = chooser
        .entries
        .iter()
        .map(|(name, enabled)| {
            let mark = if *enabled { "[x] " } else { "[ ] " };
            ListItem::new(Line::from(vec![Span::raw(mark), Span::raw(name.as_str())]))
        })
        .collect();

    let rows = u16::try_from(items.len()).unwrap_or(u16::MAX);
    let width = 46u16.min(area.width.saturating_sub(4));
    let height = rows.saturating_add(3).min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay = Rect::new(x, y, width, height);

    if overlay.width < 10 || overlay.height < 4 {
        return;
    }

    f.render_widget(Clear, overlay);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Categories ");
    let inner = block.inner(overlay);
    f.render_widget(block, overlay);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);

    let list = List::new(items).highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default().with_selected(Some(chooser.cursor));
    f.render_stateful_widget(list, chunks[0], &mut state);

    let help = Paragraph::new("(Space) toggle (Enter) save (Esc) cancel")
        .style(Style::default().fg(Color::DarkGray));
    f.render_widget(help, chunks[1]);
}

/// Render the error dialog centered on screen.
fn render_error_overlay(f: &mut Frame, dialog: &ErrorDialog) {
    let area = f.area();

    let text = format!("{}\n\n(Enter) OK", dialog.text);
    let lines = u16::try_from(text.lines().count()).unwrap_or(u16::MAX);

    let width = 56u16.min(area.width.saturating_sub(4));
    let height = lines.saturating_add(4).min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay = Rect::new(x, y, width, height);

    if overlay.width < 10 || overlay.height < 4 {
        return;
    }

    f.render_widget(Clear, overlay);

    let (border, title) = if dialog.is_fatal() {
        (Color::Red, " Fatal error ")
    } else {
        (Color::Yellow, " Error ")
    };
    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(title),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false });

    f.render_widget(paragraph, overlay);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LoaderChannel;
    use crate::config::Config;
    use crate::preferences::PreferenceManager;
    use crate::protocol::{ErrorKind, LoaderMessage};
    use crate::storage::{CategorySeed, Database, ParsedItem};
    use ratatui::{backend::TestBackend, Terminal};

    async fn controller() -> Controller {
        let db = Database::open(":memory:").await.unwrap();
        db.seed_default_categories(&[CategorySeed {
            name: "World".into(),
            url: "https://example.com/world.xml".into(),
            enabled: true,
        }])
        .await
        .unwrap();
        db.upsert_items(
            "World",
            &[ParsedItem {
                guid: "1".into(),
                title: "Election results are in".into(),
                url: None,
                thumbnail_url: None,
                published: Some(1),
            }],
        )
        .await
        .unwrap();
        let config = Config::default();
        let prefs = PreferenceManager::from_config(&config);
        let (channel, _inbound) = LoaderChannel::new();
        let mut c = Controller::new(db, &config, prefs, channel).await.unwrap();
        c.resize(80).await;
        c
    }

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[tokio::test]
    async fn test_renders_categories_status_and_refresh_label() {
        let c = controller().await;
        let mut terminal = Terminal::new(TestBackend::new(80, 12)).unwrap();
        terminal.draw(|f| render(f, &c)).unwrap();

        let text = screen(&terminal);
        assert!(text.contains("World"));
        assert!(text.contains("Election results"));
        assert!(text.contains("Never updated."));
        assert!(text.contains("reload"));
    }

    #[tokio::test]
    async fn test_renders_error_dialog() {
        let mut c = controller().await;
        c.handle_message(LoaderMessage::error(ErrorKind::General, "Feed failed", "HTTP 500"))
            .await;
        let mut terminal = Terminal::new(TestBackend::new(80, 16)).unwrap();
        terminal.draw(|f| render(f, &c)).unwrap();

        let text = screen(&terminal);
        assert!(text.contains("Feed failed"));
        assert!(text.contains("(Enter) OK"));
    }

    #[tokio::test]
    async fn test_renders_category_chooser() {
        let mut c = controller().await;
        c.open_chooser().await;
        let mut terminal = Terminal::new(TestBackend::new(80, 16)).unwrap();
        terminal.draw(|f| render(f, &c)).unwrap();

        let text = screen(&terminal);
        assert!(text.contains("Categories"));
        assert!(text.contains("[x] World"));
    }

    #[tokio::test]
    async fn test_tiny_terminal_shows_message() {
        let c = controller().await;
        let mut terminal = Terminal::new(TestBackend::new(18, 4)).unwrap();
        terminal.draw(|f| render(f, &c)).unwrap();
        assert!(screen(&terminal).contains("Too small"));
    }
}
