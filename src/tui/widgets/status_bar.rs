use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::error::{Notification, NotificationKind};
use crate::tui::widgets::color::{get_contrast_text_color, Palette};
use crate::tui::widgets::truncate;
use crate::Config;

const SEPARATOR: &str = " • ";
const ELLIPSIS: &str = "...";

/// Join as many hints as fit in `max_width`, ending in "..." when some
/// had to be dropped
pub fn fit_hints(hints: &[String], max_width: usize) -> String {
    let mut text = String::new();
    for (i, hint) in hints.iter().enumerate() {
        let sep = if i == 0 { "" } else { SEPARATOR };
        let would_be = text.chars().count() + sep.chars().count() + hint.chars().count();
        if would_be > max_width {
            if text.is_empty() {
                return truncate(hint, max_width);
            }
            if text.chars().count() + ELLIPSIS.len() > max_width {
                text = text.chars().take(max_width.saturating_sub(ELLIPSIS.len())).collect();
            }
            text.push_str(ELLIPSIS);
            return text;
        }
        text.push_str(sep);
        text.push_str(hint);
    }
    text
}

/// A pending message replaces the key hints until it times out
pub fn render_status_bar(
    f: &mut Frame,
    area: Rect,
    message: Option<&Notification>,
    key_hints: &[String],
    config: &Config,
) {
    let palette = Palette::from_theme(&config.get_active_theme());
    let max_width = area.width as usize;

    let (content, style) = match message {
        Some(notification) => {
            let bg = match notification.kind {
                NotificationKind::Success => palette.highlight_bg,
                NotificationKind::Error => Color::Red,
            };
            (
                truncate(&notification.text, max_width),
                Style::default()
                    .fg(get_contrast_text_color(bg))
                    .bg(bg)
                    .add_modifier(Modifier::BOLD),
            )
        }
        None => (fit_hints(key_hints, max_width), palette.base()),
    };

    f.render_widget(Paragraph::new(content).style(style), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints() -> Vec<String> {
        vec!["q: Quit".to_string(), "n: New".to_string(), "d: Delete".to_string()]
    }

    #[test]
    fn all_hints_fit() {
        assert_eq!(fit_hints(&hints(), 80), "q: Quit • n: New • d: Delete");
    }

    #[test]
    fn overflow_ends_with_ellipsis() {
        assert_eq!(fit_hints(&hints(), 20), "q: Quit • n: New...");
        assert_eq!(fit_hints(&hints(), 5), "q:...");
    }
}
