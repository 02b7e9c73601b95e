use ratatui::widgets::ListState;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::auth::{AuthProvider, AuthSubscription};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{AppError, Notification, NotificationKind};
use crate::lifecycle::Outcome;
use crate::models::{StatusFilter, Todo, TodoId, User, UserId};
use crate::session::Session;
use crate::store::DocumentStore;
use crate::tui::widgets::line_input::LineInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    SignIn,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthField {
    Email,
    Password,
    DisplayName,
}

#[derive(Debug, Clone)]
pub struct AuthFormState {
    pub mode: FormMode,
    pub focus: AuthField,
    pub email: LineInput,
    pub password: LineInput,
    pub display_name: LineInput,
}

impl Default for AuthFormState {
    fn default() -> Self {
        Self {
            mode: FormMode::SignIn,
            focus: AuthField::Email,
            email: LineInput::new(),
            password: LineInput::new(),
            display_name: LineInput::new(),
        }
    }
}

impl AuthFormState {
    /// Fields shown for the current mode, top to bottom
    pub fn fields(&self) -> &'static [AuthField] {
        match self.mode {
            FormMode::SignIn => &[AuthField::Email, AuthField::Password],
            FormMode::Register => &[AuthField::Email, AuthField::Password, AuthField::DisplayName],
        }
    }

    pub fn navigate_field(&mut self, forward: bool) {
        let fields = self.fields();
        let current = fields.iter().position(|f| *f == self.focus).unwrap_or(0);
        let next = if forward {
            (current + 1) % fields.len()
        } else {
            (current + fields.len() - 1) % fields.len()
        };
        self.focus = fields[next];
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            FormMode::SignIn => FormMode::Register,
            FormMode::Register => FormMode::SignIn,
        };
        self.password.clear();
        if !self.fields().contains(&self.focus) {
            self.focus = AuthField::Email;
        }
    }

    pub fn input(&self, field: AuthField) -> &LineInput {
        match field {
            AuthField::Email => &self.email,
            AuthField::Password => &self.password,
            AuthField::DisplayName => &self.display_name,
        }
    }

    pub fn focused_input_mut(&mut self) -> &mut LineInput {
        match self.focus {
            AuthField::Email => &mut self.email,
            AuthField::Password => &mut self.password,
            AuthField::DisplayName => &mut self.display_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    View,
    Create,
    Help,
    ConfirmDelete,
}

/// Options in the delete confirmation popup
pub const DELETE_OPTIONS: [&str; 2] = ["Delete", "Cancel"];

/// The signed-in screen
pub struct Dashboard {
    pub session: Session,
    pub filter: StatusFilter,
    pub mode: Mode,
    pub selected_index: usize,
    pub list_state: ListState,
    pub new_title: LineInput,
    pub delete_selection: usize,
    /// Owner labels for the admin view
    pub owners: HashMap<UserId, String>,
}

impl Dashboard {
    fn new(session: Session) -> Self {
        let mut dashboard = Self {
            session,
            filter: StatusFilter::All,
            mode: Mode::View,
            selected_index: 0,
            list_state: ListState::default(),
            new_title: LineInput::new(),
            delete_selection: 0,
            owners: HashMap::new(),
        };
        dashboard.adjust_selected_index();
        dashboard
    }

    pub fn visible_todos(&self) -> Vec<&Todo> {
        self.session.engine().view(self.filter)
    }

    pub fn selected_todo(&self) -> Option<&Todo> {
        self.visible_todos().get(self.selected_index).copied()
    }

    pub fn selected_id(&self) -> Option<TodoId> {
        self.selected_todo().map(|t| t.id)
    }

    /// Count per filter, in tab order
    pub fn counts(&self) -> [usize; 4] {
        StatusFilter::ALL.map(|f| self.session.engine().view(f).len())
    }

    /// Keep the selection inside the visible list after it changed
    pub fn adjust_selected_index(&mut self) {
        let len = self.visible_todos().len();
        if self.selected_index >= len {
            self.selected_index = len.saturating_sub(1);
        }
        self.sync_list_state();
    }

    /// Re-select `id` if it is still visible, otherwise clamp
    fn reselect(&mut self, id: Option<TodoId>) {
        if let Some(pos) = id.and_then(|id| self.visible_todos().iter().position(|t| t.id == id)) {
            self.selected_index = pos;
        }
        self.adjust_selected_index();
    }

    pub fn sync_list_state(&mut self) {
        if self.visible_todos().is_empty() {
            self.list_state.select(None);
        } else {
            self.list_state.select(Some(self.selected_index));
        }
    }

    pub fn move_selection_up(&mut self) {
        if self.selected_index > 0 {
            self.selected_index -= 1;
            self.sync_list_state();
        }
    }

    pub fn move_selection_down(&mut self) {
        if self.selected_index + 1 < self.visible_todos().len() {
            self.selected_index += 1;
            self.sync_list_state();
        }
    }

    pub fn set_filter(&mut self, filter: StatusFilter) {
        if self.filter != filter {
            self.filter = filter;
            self.selected_index = 0;
            self.adjust_selected_index();
        }
    }
}

pub enum Screen {
    Auth(AuthFormState),
    Dashboard(Box<Dashboard>),
}

#[derive(Debug, Clone, Default)]
pub struct StatusState {
    pub message: Option<Notification>,
    pub message_time: Option<Instant>,
}

pub struct App {
    pub config: Config,
    pub screen: Screen,
    pub status: StatusState,
    auth: Rc<dyn AuthProvider>,
    store: Rc<dyn DocumentStore>,
    clock: Rc<dyn Clock>,
    auth_changes: AuthSubscription,
}

impl App {
    pub fn new(
        config: Config,
        auth: Rc<dyn AuthProvider>,
        store: Rc<dyn DocumentStore>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let auth_changes = auth.on_auth_change();
        let mut app = Self {
            config,
            screen: Screen::Auth(AuthFormState::default()),
            status: StatusState::default(),
            auth,
            store,
            clock,
            auth_changes,
        };
        app.sync_auth();
        app
    }

    pub fn dashboard(&self) -> Option<&Dashboard> {
        match &self.screen {
            Screen::Dashboard(dashboard) => Some(&**dashboard),
            Screen::Auth(_) => None,
        }
    }

    pub fn dashboard_mut(&mut self) -> Option<&mut Dashboard> {
        match &mut self.screen {
            Screen::Dashboard(dashboard) => Some(&mut **dashboard),
            Screen::Auth(_) => None,
        }
    }

    pub fn signed_in_user(&self) -> Option<&User> {
        self.dashboard().map(|d| d.session.user())
    }

    /// Follow the auth provider: start a session on sign-in, tear it down
    /// on sign-out
    pub fn sync_auth(&mut self) {
        let Some(state) = self.auth_changes.latest() else {
            return;
        };
        match state {
            Some(user) => {
                if self.signed_in_user().map(|u| &u.id) == Some(&user.id) {
                    return;
                }
                self.end_session();
                match Session::start(
                    self.store.clone(),
                    self.clock.clone(),
                    user,
                    self.config.sweep_interval(),
                ) {
                    Ok(mut session) => {
                        let startup_error = session.take_startup_error();
                        self.screen = Screen::Dashboard(Box::new(Dashboard::new(session)));
                        self.refresh_owners();
                        if let Some(e) = startup_error {
                            self.notify(e.notification());
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "could not start session");
                        self.notify(e.notification());
                    }
                }
            }
            None => {
                if self.end_session() {
                    self.set_status_message("Signed out");
                }
            }
        }
    }

    /// Returns true if a session was running
    fn end_session(&mut self) -> bool {
        match std::mem::replace(&mut self.screen, Screen::Auth(AuthFormState::default())) {
            Screen::Dashboard(dashboard) => {
                dashboard.session.end();
                true
            }
            auth @ Screen::Auth(_) => {
                self.screen = auth;
                false
            }
        }
    }

    pub fn submit_auth_form(&mut self) {
        let Screen::Auth(form) = &mut self.screen else {
            return;
        };
        let email = form.email.value().to_string();
        let password = form.password.value().to_string();
        let result = match form.mode {
            FormMode::SignIn => self.auth.sign_in(&email, &password),
            FormMode::Register => {
                let name = form.display_name.value().trim();
                let name = (!name.is_empty()).then(|| name.to_string());
                self.auth.sign_up(&email, &password, name.as_deref())
            }
        };
        form.password.clear();

        match result {
            Ok(user) => {
                self.clear_status_message();
                self.sync_auth();
                // Keep any error raised while the session started
                if self.status.message.is_none() {
                    self.set_status_message(format!("Signed in as {} ({})", user.label(), user.role.as_str()));
                }
            }
            Err(e) => {
                if let Screen::Auth(form) = &mut self.screen {
                    form.focus = AuthField::Password;
                }
                self.notify(AppError::from(e).notification());
            }
        }
    }

    pub fn sign_out(&mut self) {
        if let Err(e) = self.auth.sign_out() {
            self.notify(AppError::from(e).notification());
            return;
        }
        self.sync_auth();
    }

    pub fn enter_create_mode(&mut self) {
        if let Some(dashboard) = self.dashboard_mut() {
            dashboard.new_title.clear();
            dashboard.mode = Mode::Create;
        }
    }

    pub fn exit_to_view_mode(&mut self) {
        if let Some(dashboard) = self.dashboard_mut() {
            dashboard.mode = Mode::View;
        }
    }

    pub fn enter_help_mode(&mut self) {
        if let Some(dashboard) = self.dashboard_mut() {
            dashboard.mode = Mode::Help;
        }
    }

    pub fn save_new_todo(&mut self) {
        let Some(dashboard) = self.dashboard_mut() else {
            return;
        };
        let title = dashboard.new_title.value().to_string();
        match dashboard.session.engine_mut().create(&title) {
            Ok(id) => {
                dashboard.mode = Mode::View;
                dashboard.new_title.clear();
                dashboard.reselect(Some(id));
                self.set_status_message("Todo created");
            }
            // Stay in the prompt so the title can be fixed
            Err(e) => self.notify(e.notification()),
        }
    }

    pub fn complete_selected(&mut self) {
        let Some(dashboard) = self.dashboard_mut() else {
            return;
        };
        let Some(id) = dashboard.selected_id() else {
            return;
        };
        let result = dashboard.session.engine_mut().complete(id);
        dashboard.reselect(Some(id));
        match result {
            Ok(Outcome::Changed) => self.set_status_message("Todo completed"),
            Ok(Outcome::Unchanged) => self.set_status_message("Only active todos can be completed"),
            Err(e) => self.notify(e.notification()),
        }
    }

    pub fn request_delete(&mut self) {
        if let Some(dashboard) = self.dashboard_mut() {
            if dashboard.selected_todo().is_some() {
                dashboard.delete_selection = 0;
                dashboard.mode = Mode::ConfirmDelete;
            }
        }
    }

    pub fn move_delete_selection(&mut self) {
        if let Some(dashboard) = self.dashboard_mut() {
            dashboard.delete_selection = (dashboard.delete_selection + 1) % DELETE_OPTIONS.len();
        }
    }

    /// Act on the highlighted option of the delete popup
    pub fn confirm_delete_selection(&mut self) {
        let confirmed = self
            .dashboard()
            .is_some_and(|d| DELETE_OPTIONS[d.delete_selection] == "Delete");
        if confirmed {
            self.delete_selected();
        } else {
            self.exit_to_view_mode();
        }
    }

    pub fn delete_selected(&mut self) {
        let Some(dashboard) = self.dashboard_mut() else {
            return;
        };
        dashboard.mode = Mode::View;
        let Some(id) = dashboard.selected_id() else {
            return;
        };
        let result = dashboard.session.engine_mut().delete(id);
        dashboard.adjust_selected_index();
        match result {
            Ok(()) => self.set_status_message("Todo deleted"),
            Err(e) => self.notify(e.notification()),
        }
    }

    pub fn set_filter(&mut self, filter: StatusFilter) {
        if let Some(dashboard) = self.dashboard_mut() {
            dashboard.set_filter(filter);
        }
    }

    pub fn next_filter(&mut self) {
        if let Some(dashboard) = self.dashboard_mut() {
            let next = dashboard.filter.next();
            dashboard.set_filter(next);
        }
    }

    /// Per-iteration housekeeping: auth changes, store pushes and expiry
    pub fn tick(&mut self) {
        self.sync_auth();
        self.check_status_message_timeout();

        let Some(dashboard) = self.dashboard_mut() else {
            return;
        };
        let selected = dashboard.selected_id();
        let mut error = None;
        let mut missed = 0;

        if let Err(e) = dashboard.session.pump() {
            error = Some(e);
        }
        match dashboard.session.tick() {
            Ok(ids) => missed = ids.len(),
            Err(e) => {
                error.get_or_insert(e);
            }
        }
        dashboard.reselect(selected);

        if let Some(e) = error {
            tracing::warn!(error = %e, "background refresh failed");
            self.notify(e.notification());
        } else if missed > 0 {
            self.set_status_message(format!("{} todo(s) missed their deadline", missed));
        }
        self.refresh_owners();
    }

    /// Reload owner labels for admins when a todo has an owner not seen yet
    fn refresh_owners(&mut self) {
        let Screen::Dashboard(dashboard) = &mut self.screen else {
            return;
        };
        if !dashboard.session.user().is_admin() {
            return;
        }
        let todos = dashboard.session.engine().todos();
        if todos.iter().all(|t| dashboard.owners.contains_key(&t.owner)) {
            return;
        }

        match self.auth.list_users() {
            Ok(users) => {
                dashboard.owners = users
                    .into_iter()
                    .map(|u| {
                        let label = u.label().to_string();
                        (u.id, label)
                    })
                    .collect();
            }
            Err(e) => tracing::warn!(error = %e, "could not load accounts"),
        }
        // Accounts the provider does not know keep their id
        for todo in todos {
            dashboard
                .owners
                .entry(todo.owner.clone())
                .or_insert_with(|| todo.owner.to_string());
        }
    }

    /// How long the event loop may block waiting for input
    pub fn poll_timeout(&self, max: Duration) -> Duration {
        match self.dashboard() {
            Some(dashboard) => dashboard.session.next_wake(max),
            None => max,
        }
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.notify(Notification::success(message));
    }

    pub fn notify(&mut self, notification: Notification) {
        if notification.kind == NotificationKind::Error {
            tracing::debug!(message = %notification.text, "error shown to user");
        }
        self.status.message = Some(notification);
        self.status.message_time = Some(Instant::now());
    }

    pub fn clear_status_message(&mut self) {
        self.status.message = None;
        self.status.message_time = None;
    }

    /// Clear the status message once it has been shown long enough
    pub fn check_status_message_timeout(&mut self) {
        if let Some(time) = self.status.message_time {
            if time.elapsed().as_secs() >= self.config.status_message_secs {
                self.clear_status_message();
            }
        }
    }
}
