use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, size as terminal_size, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::Terminal;
use std::io;
use std::time::Duration;

use crate::models::StatusFilter;
use crate::tui::app::{App, Mode, Screen};
use crate::tui::error::TuiError;
use crate::tui::layout::Layout;
use crate::utils::key_matches;

/// Upper bound on how long one loop iteration blocks, so status messages
/// time out and the countdowns redraw
const MAX_POLL: Duration = Duration::from_millis(250);

/// Guard that restores the terminal even on panic. A terminal left in raw
/// mode or the alternate screen is unusable.
struct TerminalGuard {
    raw_mode_enabled: bool,
    alternate_screen_enabled: bool,
}

impl TerminalGuard {
    fn new() -> Result<Self, TuiError> {
        enable_raw_mode()?;
        let mut guard = Self {
            raw_mode_enabled: true,
            alternate_screen_enabled: false,
        };
        execute!(io::stdout(), EnterAlternateScreen)?;
        guard.alternate_screen_enabled = true;
        Ok(guard)
    }

    /// Restore on normal exit; the guard then does nothing on drop
    fn restore(&mut self) -> Result<(), TuiError> {
        if self.raw_mode_enabled {
            disable_raw_mode()?;
            self.raw_mode_enabled = false;
        }
        if self.alternate_screen_enabled {
            execute!(io::stdout(), LeaveAlternateScreen)?;
            self.alternate_screen_enabled = false;
        }
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Already cleaning up, nothing useful to do with errors here
        if self.raw_mode_enabled {
            let _ = disable_raw_mode();
        }
        if self.alternate_screen_enabled {
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
        }
    }
}

pub fn run_event_loop(mut app: App) -> Result<(), TuiError> {
    // Check size before entering the alternate screen so the message is readable
    let (width, height) = terminal_size()?;
    let min_width = Layout::MIN_WIDTH + 2;
    let min_height = Layout::MIN_HEIGHT + 2;
    if width < min_width || height < min_height {
        return Err(TuiError::RenderError(format!(
            "Terminal size too small. Current: {}x{}, Minimum required: {}x{}. Please resize your terminal window.",
            width, height, min_width, min_height
        )));
    }

    let mut guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    tracing::debug!(width, height, "tui started");

    loop {
        app.tick();

        let size = terminal.size()?;
        let layout = Layout::calculate(Rect::new(0, 0, size.width, size.height));
        terminal.draw(|f| crate::tui::render::render(f, &mut app, &layout))?;

        // Wake for input, the next deadline, or a redraw, whichever is first
        let timeout = app.poll_timeout(MAX_POLL);
        if event::poll(timeout)? {
            match event::read()? {
                // Only Press events; Windows also reports Release
                Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                    if handle_key_event(&mut app, key_event) {
                        break;
                    }
                }
                // The next draw picks up the new size
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    // End the session before the terminal goes back to normal
    drop(app);
    guard.restore()?;
    tracing::debug!("tui stopped");
    Ok(())
}

/// Dispatch a key press. Returns true when the user asked to quit.
pub fn handle_key_event(app: &mut App, key_event: KeyEvent) -> bool {
    if key_event.code == KeyCode::Char('c') && key_event.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }
    match app.dashboard().map(|d| d.mode) {
        None => handle_auth_key(app, key_event),
        Some(Mode::View) => handle_view_key(app, key_event),
        Some(Mode::Create) => {
            handle_create_key(app, key_event);
            false
        }
        Some(Mode::Help) => {
            if key_event.code == KeyCode::Esc || key_matches(&app.config.key_bindings.help, &key_event) {
                app.exit_to_view_mode();
            }
            false
        }
        Some(Mode::ConfirmDelete) => {
            handle_delete_confirmation(app, key_event);
            false
        }
    }
}

fn handle_auth_key(app: &mut App, key_event: KeyEvent) -> bool {
    if key_event.code == KeyCode::Esc {
        return true;
    }
    let toggle = key_matches(&app.config.key_bindings.toggle_mode, &key_event);
    if key_event.code == KeyCode::Enter {
        app.submit_auth_form();
        return false;
    }

    let Screen::Auth(form) = &mut app.screen else {
        return false;
    };
    if toggle {
        form.toggle_mode();
        return false;
    }
    match key_event.code {
        KeyCode::Tab | KeyCode::Down => form.navigate_field(true),
        KeyCode::BackTab | KeyCode::Up => form.navigate_field(false),
        _ => {
            form.focused_input_mut().handle_key(&key_event);
        }
    }
    false
}

fn handle_view_key(app: &mut App, key_event: KeyEvent) -> bool {
    let kb = app.config.key_bindings.clone();

    if key_matches(&kb.quit, &key_event) {
        return true;
    }
    if key_matches(&kb.help, &key_event) {
        app.enter_help_mode();
    } else if key_matches(&kb.new, &key_event) {
        app.enter_create_mode();
    } else if key_matches(&kb.complete, &key_event) {
        app.complete_selected();
    } else if key_matches(&kb.delete, &key_event) {
        app.request_delete();
    } else if key_matches(&kb.sign_out, &key_event) {
        app.sign_out();
    } else if key_matches(&kb.next_filter, &key_event) {
        app.next_filter();
    } else if key_matches(&kb.filter_all, &key_event) {
        app.set_filter(StatusFilter::All);
    } else if key_matches(&kb.filter_active, &key_event) {
        app.set_filter(StatusFilter::Active);
    } else if key_matches(&kb.filter_completed, &key_event) {
        app.set_filter(StatusFilter::Completed);
    } else if key_matches(&kb.filter_missed, &key_event) {
        app.set_filter(StatusFilter::Missed);
    } else if key_matches(&kb.list_up, &key_event) || key_event.code == KeyCode::Up {
        if let Some(dashboard) = app.dashboard_mut() {
            dashboard.move_selection_up();
        }
    } else if key_matches(&kb.list_down, &key_event) || key_event.code == KeyCode::Down {
        if let Some(dashboard) = app.dashboard_mut() {
            dashboard.move_selection_down();
        }
    }
    false
}

fn handle_create_key(app: &mut App, key_event: KeyEvent) {
    match key_event.code {
        KeyCode::Esc => app.exit_to_view_mode(),
        KeyCode::Enter => app.save_new_todo(),
        _ => {
            if let Some(dashboard) = app.dashboard_mut() {
                dashboard.new_title.handle_key(&key_event);
            }
        }
    }
}

fn handle_delete_confirmation(app: &mut App, key_event: KeyEvent) {
    match key_event.code {
        KeyCode::Up | KeyCode::Down | KeyCode::Tab => app.move_delete_selection(),
        KeyCode::Enter => app.confirm_delete_selection(),
        KeyCode::Char('y') | KeyCode::Char('Y') => app.delete_selected(),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.exit_to_view_mode(),
        _ => {}
    }
}
