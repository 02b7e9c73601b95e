use ratatui::layout::{Alignment, Rect};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use crate::lifecycle::DEADLINE_WINDOW_HOURS;
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::popup_area;
use crate::utils::format_key_binding_for_display as key;
use crate::Config;

pub fn render_help(f: &mut Frame, area: Rect, config: &Config) {
    let palette = Palette::from_theme(&config.get_active_theme());
    let popup_area = popup_area(area, 60, 70);
    f.render_widget(Clear, popup_area);

    let paragraph = Paragraph::new(build_help_text(config))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help - Key Bindings")
                .title_alignment(Alignment::Center)
                .style(palette.base()),
        )
        .style(palette.base())
        .wrap(Wrap { trim: true });

    f.render_widget(paragraph, popup_area);
}

pub fn build_help_text(config: &Config) -> String {
    let kb = &config.key_bindings;
    let mut text = String::new();

    text.push_str(&format!(
        "Every todo is due {} hours after it is created. Active todos that pass their deadline become Missed.\n\n",
        DEADLINE_WINDOW_HOURS
    ));

    text.push_str("Navigation:\n");
    text.push_str(&format!("  {} / {} or ↑ / ↓: Move selection\n", key(&kb.list_up), key(&kb.list_down)));
    text.push_str(&format!("  {}: Next filter\n", key(&kb.next_filter)));
    text.push_str(&format!(
        "  {} / {} / {} / {}: All / Active / Completed / Missed\n",
        key(&kb.filter_all),
        key(&kb.filter_active),
        key(&kb.filter_completed),
        key(&kb.filter_missed)
    ));
    text.push('\n');

    text.push_str("Actions:\n");
    text.push_str(&format!("  {}: New todo\n", key(&kb.new)));
    text.push_str(&format!("  {}: Complete selected todo\n", key(&kb.complete)));
    text.push_str(&format!("  {}: Delete selected todo\n", key(&kb.delete)));
    text.push('\n');

    text.push_str("General:\n");
    text.push_str(&format!("  {}: Sign out\n", key(&kb.sign_out)));
    text.push_str(&format!("  {}: Show/hide help\n", key(&kb.help)));
    text.push_str(&format!("  {}: Quit\n", key(&kb.quit)));

    text
}
