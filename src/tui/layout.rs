use ratatui::layout::{Constraint, Direction, Flex, Layout as RatLayout, Rect};

pub struct Layout {
    pub inner_area: Rect, // Area inside the outer border
    pub tabs_area: Rect,
    pub list_area: Rect,
    pub detail_area: Rect,
    pub status_area: Rect,
}

impl Layout {
    /// Minimum terminal dimensions required for the application.
    /// Width: the sign-in form plus borders. Height: 2 borders + tabs + 8 content lines + status.
    pub const MIN_WIDTH: u16 = 40;
    pub const MIN_HEIGHT: u16 = 12;
    /// Below this inner width the detail pane is hidden
    pub const DETAIL_MIN_WIDTH: u16 = 72;

    pub fn calculate(size: Rect) -> Self {
        let width = size.width.max(Self::MIN_WIDTH + 2);
        let height = size.height.max(Self::MIN_HEIGHT + 2);
        let size = Rect::new(size.x, size.y, width, height);

        let inner_area = Rect::new(
            size.x + 1,
            size.y + 1,
            size.width.saturating_sub(2),
            size.height.saturating_sub(2),
        );

        // tabs (1 line), content, status (1 line)
        let vertical = RatLayout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(inner_area);

        let detail_width = if inner_area.width >= Self::DETAIL_MIN_WIDTH {
            inner_area.width * 40 / 100
        } else {
            0
        };
        let horizontal = RatLayout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(detail_width)])
            .split(vertical[1]);

        Self {
            inner_area,
            tabs_area: vertical[0],
            list_area: horizontal[0],
            detail_area: horizontal[1],
            status_area: vertical[2],
        }
    }

    /// Centered box for the sign-in form
    pub fn form_area(&self, height: u16) -> Rect {
        let content = Rect::new(
            self.inner_area.x,
            self.tabs_area.y,
            self.inner_area.width,
            self.status_area.y.saturating_sub(self.tabs_area.y),
        );
        let width = content.width.min(56);
        let vertical = RatLayout::vertical([Constraint::Length(height.min(content.height))]).flex(Flex::Center);
        let horizontal = RatLayout::horizontal([Constraint::Length(width)]).flex(Flex::Center);
        let [area] = vertical.areas(content);
        let [area] = horizontal.areas(area);
        area
    }
}
