use ratatui::layout::Alignment;
use ratatui::widgets::{Block, Borders};
use ratatui::Frame;

use crate::models::TodoStatus;
use crate::tui::app::{App, Mode, Screen};
use crate::tui::widgets::{
    auth_form::{form_height, render_auth_form},
    color::Palette,
    confirm_delete::render_confirm_delete,
    filter_tabs::render_filter_tabs,
    help::render_help,
    prompt::render_new_todo_prompt,
    status_bar::render_status_bar,
    todo_detail::render_todo_detail,
    todo_list::render_todo_list,
};
use crate::tui::Layout;
use crate::utils::format_key_binding_for_display as key;

pub fn render(f: &mut Frame, app: &mut App, layout: &Layout) {
    let palette = Palette::from_theme(&app.config.get_active_theme());
    let title = match app.signed_in_user() {
        Some(user) if user.is_admin() => format!("Daylist - Welcome, {} (admin)", user.label()),
        Some(user) => format!("Daylist - Welcome, {}", user.label()),
        None => "Daylist".to_string(),
    };
    let outer_block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_alignment(Alignment::Center)
        .style(palette.base());
    let full_area = f.area();
    f.render_widget(outer_block, full_area);

    let registration_domain = app.config.email_policy().registration_domain;
    let key_hints = get_key_hints(app);
    let config = &app.config;

    match &mut app.screen {
        Screen::Auth(form) => {
            let area = layout.form_area(form_height(form));
            if let Some(position) = render_auth_form(f, area, form, registration_domain.as_deref(), config) {
                f.set_cursor_position(position);
            }
        }
        Screen::Dashboard(dashboard) => {
            let now = dashboard.session.now();
            let counts = dashboard.counts();
            render_filter_tabs(f, layout.tabs_area, dashboard.filter, counts, config);

            let is_admin = dashboard.session.user().is_admin();
            let owners = is_admin.then_some(&dashboard.owners);
            let todos = dashboard.session.engine().view(dashboard.filter);
            render_todo_list(
                f,
                layout.list_area,
                &todos,
                now,
                owners,
                &mut dashboard.list_state,
                config,
            );
            let selected = todos.get(dashboard.selected_index).copied();
            render_todo_detail(
                f,
                layout.detail_area,
                selected,
                dashboard.session.user(),
                &dashboard.owners,
                now,
                config,
            );

            match dashboard.mode {
                Mode::View => {}
                Mode::Create => {
                    let position = render_new_todo_prompt(f, layout.inner_area, &dashboard.new_title, config);
                    f.set_cursor_position(position);
                }
                Mode::Help => render_help(f, full_area, config),
                Mode::ConfirmDelete => {
                    if let Some(todo) = selected {
                        render_confirm_delete(f, full_area, todo, dashboard.delete_selection, config);
                    }
                }
            }
        }
    }

    render_status_bar(f, layout.status_area, app.status.message.as_ref(), &key_hints, &app.config);
}

fn get_key_hints(app: &App) -> Vec<String> {
    let kb = &app.config.key_bindings;
    let Some(dashboard) = app.dashboard() else {
        return vec![
            "Enter: Submit".to_string(),
            "Tab: Next field".to_string(),
            format!("{}: Sign in / Register", key(&kb.toggle_mode)),
            "Esc: Quit".to_string(),
        ];
    };

    match dashboard.mode {
        Mode::Help => vec![format!("Esc or {}: Exit help", key(&kb.help))],
        Mode::Create => vec!["Enter: Save".to_string(), "Esc: Cancel".to_string()],
        Mode::ConfirmDelete => vec![
            "Enter: Confirm".to_string(),
            "y: Delete".to_string(),
            "n/Esc: Cancel".to_string(),
        ],
        Mode::View => {
            let mut hints = vec![format!("{}: Quit", key(&kb.quit)), format!("{}: New", key(&kb.new))];
            // Only Active todos can be completed
            if dashboard.selected_todo().is_some_and(|t| t.status == TodoStatus::Active) {
                hints.push(format!("{}: Complete", key(&kb.complete)));
            }
            if dashboard.selected_todo().is_some() {
                hints.push(format!("{}: Delete", key(&kb.delete)));
            }
            hints.push(format!("{}: Filter", key(&kb.next_filter)));
            hints.push(format!("{}: Sign out", key(&kb.sign_out)));
            hints.push(format!("{}: Help", key(&kb.help)));
            hints
        }
    }
}
