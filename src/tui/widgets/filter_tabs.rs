use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::Tabs;
use ratatui::Frame;

use crate::models::StatusFilter;
use crate::tui::widgets::color::Palette;
use crate::Config;

/// One tab per status filter, each showing how many todos it holds
pub fn render_filter_tabs(f: &mut Frame, area: Rect, current: StatusFilter, counts: [usize; 4], config: &Config) {
    let palette = Palette::from_theme(&config.get_active_theme());

    let titles: Vec<Line> = StatusFilter::ALL
        .iter()
        .zip(counts)
        .map(|(filter, count)| {
            Line::from(vec![
                Span::raw(" "),
                Span::raw(format!("{} ({})", filter.label(), count)),
                Span::raw(" "),
            ])
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(current.index())
        .style(palette.base())
        .highlight_style(palette.highlight())
        .divider(Span::styled("│", Style::default().fg(palette.fg)))
        .padding("", "");

    f.render_widget(tabs, area);
}
