use ratatui::layout::{Alignment, Rect};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use crate::lifecycle::DEADLINE_WINDOW_HOURS;
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::line_input::LineInput;
use crate::Config;

/// One-line popup asking for a new todo's title. Returns the cursor
/// position.
pub fn render_new_todo_prompt(f: &mut Frame, area: Rect, input: &LineInput, config: &Config) -> (u16, u16) {
    let palette = Palette::from_theme(&config.get_active_theme());

    let width = area.width.saturating_sub(4).min(70);
    let popup = Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + area.height.saturating_sub(3) / 2,
        width,
        3.min(area.height),
    );
    f.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("New todo (due in {}h)", DEADLINE_WINDOW_HOURS))
        .title_alignment(Alignment::Center)
        .style(palette.base());
    let inner = block.inner(popup);
    let (shown, cursor_col) = input.visible(inner.width as usize, false);

    f.render_widget(Paragraph::new(shown).block(block).style(palette.base()), popup);
    (inner.x + cursor_col as u16, inner.y)
}
