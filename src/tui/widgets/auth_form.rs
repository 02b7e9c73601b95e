use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use crate::tui::app::{AuthField, AuthFormState, FormMode};
use crate::tui::widgets::color::Palette;
use crate::utils::format_key_binding_for_display;
use crate::Config;

const LABEL_WIDTH: u16 = 10;

/// Height the form needs for its current mode
pub fn form_height(form: &AuthFormState) -> u16 {
    // borders + blank + one line per field + blank + hint lines
    2 + 1 + form.fields().len() as u16 + 1 + 3
}

fn label(field: AuthField) -> &'static str {
    match field {
        AuthField::Email => "Email",
        AuthField::Password => "Password",
        AuthField::DisplayName => "Name",
    }
}

/// Draw the sign-in / register form. Returns where the terminal cursor
/// belongs.
pub fn render_auth_form(
    f: &mut Frame,
    area: Rect,
    form: &AuthFormState,
    registration_domain: Option<&str>,
    config: &Config,
) -> Option<(u16, u16)> {
    let palette = Palette::from_theme(&config.get_active_theme());
    f.render_widget(Clear, area);

    let title = match form.mode {
        FormMode::SignIn => "Sign in",
        FormMode::Register => "Create account",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_alignment(Alignment::Center)
        .style(palette.base());
    let inner = block.inner(area);
    f.render_widget(block, area);

    let value_width = inner.width.saturating_sub(LABEL_WIDTH + 1) as usize;
    let mut lines = vec![Line::from("")];
    let mut cursor = None;

    for (row, field) in form.fields().iter().enumerate() {
        let input = form.input(*field);
        let (shown, cursor_col) = input.visible(value_width, *field == AuthField::Password);
        let focused = *field == form.focus;
        let label_style = if focused {
            Style::default().fg(palette.highlight_bg).add_modifier(Modifier::BOLD)
        } else {
            palette.base()
        };
        let hint = if *field == AuthField::DisplayName && input.is_empty() && !focused {
            Span::styled("(optional)", palette.base().add_modifier(Modifier::DIM))
        } else {
            Span::styled(shown, palette.base().add_modifier(Modifier::UNDERLINED))
        };
        lines.push(Line::from(vec![
            Span::styled(format!(" {:<width$}", label(*field), width = LABEL_WIDTH as usize), label_style),
            hint,
        ]));
        if focused {
            cursor = Some((
                inner.x + 1 + LABEL_WIDTH + cursor_col as u16,
                inner.y + 1 + row as u16,
            ));
        }
    }

    lines.push(Line::from(""));
    let toggle = format_key_binding_for_display(&config.key_bindings.toggle_mode);
    let (submit, switch) = match form.mode {
        FormMode::SignIn => ("Enter: Sign in", format!("{}: Create an account", toggle)),
        FormMode::Register => ("Enter: Register", format!("{}: Back to sign in", toggle)),
    };
    lines.push(Line::from(format!(" {} • {}", submit, switch)));
    lines.push(Line::from(" Tab: Next field • Esc: Quit"));
    if form.mode == FormMode::Register {
        if let Some(domain) = registration_domain {
            lines.push(Line::from(format!(" Only @{} addresses can register", domain)));
        }
    }

    f.render_widget(Paragraph::new(lines).style(palette.base()), inner);
    cursor
}
