use chrono::{DateTime, Local, Utc};
use std::collections::HashMap;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::models::{Todo, User, UserId};
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::todo_list::{owner_label, status_text};
use crate::Config;

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Details of the selected todo. Admins also see who owns it.
pub fn render_todo_detail(
    f: &mut Frame,
    area: Rect,
    todo: Option<&Todo>,
    viewer: &User,
    owners: &HashMap<UserId, String>,
    now: DateTime<Utc>,
    config: &Config,
) {
    if area.width == 0 {
        return;
    }
    let palette = Palette::from_theme(&config.get_active_theme());
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Details")
        .style(palette.base());

    let Some(todo) = todo else {
        let paragraph = Paragraph::new("Select a todo to view details")
            .block(block)
            .style(palette.base());
        f.render_widget(paragraph, area);
        return;
    };

    let label = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::from(Span::styled(todo.title.clone(), label)),
        Line::from(""),
        Line::from(vec![
            Span::styled("Status:   ", label),
            Span::styled(status_text(todo, now), Style::default().fg(palette.status(todo.status))),
        ]),
        Line::from(vec![Span::styled("Created:  ", label), Span::raw(format_time(todo.created_at))]),
        Line::from(vec![Span::styled("Deadline: ", label), Span::raw(format_time(todo.deadline))]),
        Line::from(vec![Span::styled("ID:       ", label), Span::raw(todo.id.to_string())]),
    ];
    if viewer.is_admin() {
        let owner = if todo.owner == viewer.id {
            "you".to_string()
        } else {
            owner_label(todo, owners)
        };
        lines.push(Line::from(vec![Span::styled("Owner:    ", label), Span::raw(owner)]));
    }

    let paragraph = Paragraph::new(lines)
        .block(block)
        .style(palette.base())
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}
