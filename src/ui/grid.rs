//! Category rows of item slots.
//!
//! Each category takes three lines: its name, then one line of thumbnail
//! glyphs and one line of titles, one column per slot.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::controller::Controller;
use crate::coordinator::{CategoryView, ItemSlot, Thumbnail};
use crate::util::truncate_to_width;

const ROW_HEIGHT: u16 = 3;

pub(super) fn render(f: &mut Frame, controller: &Controller, area: Rect) {
    let model = controller.model();
    if area.width < 1 || area.height < ROW_HEIGHT {
        return;
    }

    if model.categories.is_empty() {
        let msg = Paragraph::new("No categories enabled. Add some to config.toml.")
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(msg, area);
        return;
    }

    let (selected_row, selected_col) = controller.selected();
    let visible = usize::from(area.height / ROW_HEIGHT).max(1);
    let first = selected_row.saturating_sub(visible - 1);
    let columns = model.row_capacity.max(1);
    let slot_width = usize::from(area.width) / columns;

    for (i, category) in model.categories.iter().enumerate().skip(first).take(visible) {
        let y = area.y + u16::try_from(i - first).unwrap_or(0) * ROW_HEIGHT;
        let row = Rect::new(area.x, y, area.width, ROW_HEIGHT);
        let selected = (i == selected_row).then_some(selected_col);
        render_category(f, category, row, slot_width, selected);
    }
}

fn render_category(
    f: &mut Frame,
    category: &CategoryView,
    area: Rect,
    slot_width: usize,
    selected: Option<usize>,
) {
    let name_style = if selected.is_some() {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };

    let mut glyphs = Vec::with_capacity(category.slots.len());
    let mut titles = Vec::with_capacity(category.slots.len());
    for (col, slot) in category.slots.iter().enumerate() {
        let style = if selected == Some(col) {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        let (glyph, title) = slot_cells(slot.as_ref(), slot_width, style);
        glyphs.extend(glyph);
        titles.push(title);
    }

    let lines = vec![
        Line::from(Span::styled(category.name.clone(), name_style)),
        Line::from(glyphs),
        Line::from(titles),
    ];
    f.render_widget(Paragraph::new(lines), area);
}

/// Spans for one slot: the thumbnail line and the title cell, each padded
/// to `width` columns.
fn slot_cells(
    slot: Option<&ItemSlot>,
    width: usize,
    style: Style,
) -> (Vec<Span<'static>>, Span<'static>) {
    let cell = width.saturating_sub(1);
    let Some(slot) = slot else {
        return (
            vec![Span::raw(" ".repeat(width))],
            Span::styled(pad(&truncate_to_width("-", cell), width), style),
        );
    };

    let glyph = match &slot.thumbnail {
        Thumbnail::Loaded {
            width: w,
            height: h,
            swatch,
            ..
        } => {
            let [r, g, b] = *swatch;
            vec![
                Span::styled("██", Style::default().fg(Color::Rgb(r, g, b))),
                Span::styled(
                    pad(&format!(" {}x{}", w, h), width.saturating_sub(2)),
                    Style::default().fg(Color::DarkGray),
                ),
            ]
        }
        Thumbnail::NoThumbnailAvailable => vec![
            Span::styled("··", Style::default().fg(Color::DarkGray)),
            Span::raw(" ".repeat(width.saturating_sub(2))),
        ],
        Thumbnail::PendingOrMissing => vec![
            Span::styled("░░", Style::default().fg(Color::DarkGray)),
            Span::raw(" ".repeat(width.saturating_sub(2))),
        ],
    };

    let title = pad(&truncate_to_width(&slot.title, cell), width);
    (glyph, Span::styled(title, style))
}

fn pad(text: &str, width: usize) -> String {
    use unicode_width::UnicodeWidthStr;
    let used = text.width();
    if used >= width {
        truncate_to_width(text, width).into_owned()
    } else {
        format!("{}{}", text, " ".repeat(width - used))
    }
}
