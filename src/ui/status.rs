use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::controller::Controller;
use crate::session::Phase;

/// Title bar: application name, phase and the refresh control.
pub(super) fn render_header(f: &mut Frame, controller: &Controller, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let phase = match controller.phase() {
        Phase::Idle => "",
        Phase::Connecting => "connecting",
        Phase::LoadingFeeds => "loading feeds",
        Phase::LoadingItems => "loading items",
        Phase::ErrorReported => "error",
    };

    let mut spans = vec![
        Span::styled(" bulletin ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(
            format!("[r] {}", controller.refresh_label()),
            Style::default().fg(Color::Cyan),
        ),
    ];
    if !phase.is_empty() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(phase, Style::default().fg(Color::Yellow)));
    }
    if controller.display_full_error() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled("full errors", Style::default().fg(Color::Magenta)));
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::Blue).fg(Color::White));
    f.render_widget(paragraph, area);
}

/// Status bar: loading progress, staleness or a transient notice.
pub(super) fn render(f: &mut Frame, controller: &Controller, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let hints = "[arrows]select [Enter]link [c]ategories [e]rrors [q]uit";
    let status = controller.status();
    let text = if usize::from(area.width) > status.len() + hints.len() + 2 {
        let pad = usize::from(area.width) - status.len() - hints.len();
        format!("{}{}{}", status, " ".repeat(pad), hints)
    } else {
        status.to_string()
    };

    let style = Style::default().bg(Color::DarkGray).fg(Color::White);
    f.render_widget(Paragraph::new(text).style(style), area);
}
