use ratatui::layout::{Alignment, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::models::Todo;
use crate::tui::app::DELETE_OPTIONS;
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::popup_area;
use crate::Config;

pub fn render_confirm_delete(f: &mut Frame, area: Rect, todo: &Todo, selection: usize, config: &Config) {
    let palette = Palette::from_theme(&config.get_active_theme());
    let popup_area = popup_area(area, 50, 35);
    f.render_widget(Clear, popup_area);

    let mut lines = vec![
        Line::from("Delete this todo?"),
        Line::from(""),
        Line::from(todo.title.clone()),
        Line::from(""),
    ];
    for (index, option) in DELETE_OPTIONS.iter().enumerate() {
        let (prefix, style) = if index == selection {
            ("> ", palette.highlight())
        } else {
            ("  ", palette.base())
        };
        lines.push(Line::from(Span::styled(format!("{}{}", prefix, option), style)));
    }
    lines.push(Line::from(""));
    lines.push(Line::from("↑↓ to choose, Enter to confirm, y/n, Esc to cancel"));

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Confirm Delete")
                .title_alignment(Alignment::Center)
                .style(palette.base()),
        )
        .style(palette.base())
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center);

    f.render_widget(paragraph, popup_area);
}
