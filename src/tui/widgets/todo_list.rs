use chrono::{DateTime, Utc};
use std::collections::HashMap;
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::lifecycle::time_remaining;
use crate::models::{Todo, TodoStatus, UserId};
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::truncate;
use crate::Config;

fn status_indicator(status: TodoStatus) -> &'static str {
    match status {
        TodoStatus::Active => "○",
        TodoStatus::Completed => "✓",
        TodoStatus::Missed => "✗",
    }
}

/// Right-hand column: countdown for active todos, the status otherwise
pub fn status_text(todo: &Todo, now: DateTime<Utc>) -> String {
    time_remaining(todo, now)
        .map(|r| r.to_string())
        .unwrap_or_else(|| todo.status.to_string())
}

/// Display name or email of the todo's owner, the raw id if unknown
pub fn owner_label(todo: &Todo, owners: &HashMap<UserId, String>) -> String {
    owners
        .get(&todo.owner)
        .cloned()
        .unwrap_or_else(|| todo.owner.to_string())
}

pub fn render_todo_list(
    f: &mut Frame,
    area: Rect,
    todos: &[&Todo],
    now: DateTime<Utc>,
    owners: Option<&HashMap<UserId, String>>,
    list_state: &mut ListState,
    config: &Config,
) {
    let palette = Palette::from_theme(&config.get_active_theme());
    let title = format!("Todos ({})", todos.len());
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(palette.base());

    if todos.is_empty() {
        let paragraph = Paragraph::new(format!(
            "Nothing here. Press {} to add a todo.",
            crate::utils::format_key_binding_for_display(&config.key_bindings.new)
        ))
        .block(block)
        .style(palette.base());
        f.render_widget(paragraph, area);
        return;
    }

    // borders (2) + indicator (2) + gaps
    let inner_width = area.width.saturating_sub(4) as usize;
    let items: Vec<ListItem> = todos
        .iter()
        .map(|todo| {
            let status = status_text(todo, now);
            let owner = match owners {
                Some(owners) => format!(" [{}]", truncate(&owner_label(todo, owners), 20)),
                None => String::new(),
            };
            let title_width = inner_width
                .saturating_sub(status.chars().count() + owner.chars().count() + 3);
            let title = truncate(&todo.title, title_width);
            let padding = title_width.saturating_sub(title.chars().count());

            let color = palette.status(todo.status);
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", status_indicator(todo.status)), Style::default().fg(color)),
                Span::raw(title),
                Span::raw(" ".repeat(padding + 1)),
                Span::styled(status, Style::default().fg(color)),
                Span::raw(owner),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .style(palette.base())
        .highlight_style(palette.highlight())
        .highlight_symbol("> ");

    f.render_stateful_widget(list, area, list_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TodoId, UserId};
    use chrono::Duration;

    fn todo(status: TodoStatus) -> Todo {
        let created_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Todo {
            id: TodoId(1),
            title: "Buy milk".to_string(),
            owner: UserId("0123456789abcdef".to_string()),
            created_at,
            deadline: created_at + Duration::hours(24),
            status,
        }
    }

    #[test]
    fn active_todos_show_countdown() {
        let t = todo(TodoStatus::Active);
        let now = t.created_at + Duration::minutes(30);
        assert_eq!(status_text(&t, now), "23h 30m remaining");
        assert_eq!(status_text(&t, t.deadline + Duration::seconds(1)), "Expired");
    }

    #[test]
    fn terminal_todos_show_status() {
        let t = todo(TodoStatus::Completed);
        assert_eq!(status_text(&t, t.created_at), "completed");
    }

    #[test]
    fn owners_resolve_to_labels() {
        let t = todo(TodoStatus::Active);
        let mut owners = HashMap::new();
        assert_eq!(owner_label(&t, &owners), "0123456789abcdef");
        owners.insert(t.owner.clone(), "Ann".to_string());
        assert_eq!(owner_label(&t, &owners), "Ann");
    }
}
