use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::rc::Rc;
use thiserror::Error;

use crate::auth::{AuthError, AuthProvider};
use crate::clock::Clock;
use crate::error::AppError;
use crate::lifecycle::{time_remaining, Outcome, TodoEngine};
use crate::models::{StatusFilter, Todo, TodoId, User};
use crate::store::{DocumentStore, Requester, StoreError, TodoQuery};

#[derive(Parser)]
#[command(name = "daylist")]
#[command(about = "Todo list where every task has 24 hours to get done")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Account used by the one-shot commands
#[derive(Args, Debug, Clone)]
pub struct Credentials {
    /// Account email
    #[arg(long, env = "DAYLIST_EMAIL")]
    pub email: String,
    /// Account password
    #[arg(long, env = "DAYLIST_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch interactive TUI (default if no subcommand)
    Tui,
    /// Create an account (the very first account becomes admin)
    Register {
        #[command(flatten)]
        credentials: Credentials,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// Add a todo due in 24 hours
    Add {
        /// Todo title
        title: String,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Mark an active todo as completed
    Complete {
        /// Todo ID
        id: i64,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Delete a todo
    Delete {
        /// Todo ID
        id: i64,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// List visible todos
    List {
        /// all, active, completed or missed
        #[arg(long, default_value = "all")]
        filter: StatusFilter,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Mark overdue todos as missed
    Sweep {
        #[command(flatten)]
        credentials: Credentials,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AuthError> for CliError {
    fn from(e: AuthError) -> Self {
        CliError::App(e.into())
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::App(e.into())
    }
}

/// Shared handles for every one-shot command
pub struct Context<'a> {
    pub auth: &'a dyn AuthProvider,
    pub store: Rc<dyn DocumentStore>,
    pub clock: Rc<dyn Clock>,
}

impl Context<'_> {
    /// Sign in and load the user's visible todos
    fn engine(&self, credentials: &Credentials) -> Result<(User, TodoEngine), CliError> {
        let user = self.auth.sign_in(&credentials.email, &credentials.password)?;
        let mut engine = TodoEngine::new(self.store.clone(), self.clock.clone(), Requester::from(&user));
        engine.apply_snapshot(self.store.fetch(&TodoQuery::for_user(&user))?);
        Ok((user, engine))
    }
}

/// Handle the register command
pub fn handle_register(
    ctx: &Context,
    credentials: &Credentials,
    name: Option<&str>,
    out: &mut impl Write,
) -> Result<User, CliError> {
    let user = ctx
        .auth
        .sign_up(&credentials.email, &credentials.password, name)?;
    writeln!(out, "Registered {} as {}", user.email, user.role.as_str())?;
    Ok(user)
}

/// Handle the add command
pub fn handle_add(
    ctx: &Context,
    credentials: &Credentials,
    title: &str,
    out: &mut impl Write,
) -> Result<TodoId, CliError> {
    let (_, mut engine) = ctx.engine(credentials)?;
    let id = engine.create(title)?;
    let deadline = engine
        .get(id)
        .map(|t| t.deadline.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_default();
    writeln!(out, "Todo created (ID: {}), due {}", id, deadline)?;
    Ok(id)
}

/// Handle the complete command
pub fn handle_complete(
    ctx: &Context,
    credentials: &Credentials,
    id: TodoId,
    out: &mut impl Write,
) -> Result<Outcome, CliError> {
    let (_, mut engine) = ctx.engine(credentials)?;
    // Expired todos become Missed first so they cannot be completed late
    engine.sweep()?;
    let outcome = engine.complete(id)?;
    match outcome {
        Outcome::Changed => writeln!(out, "Todo {} completed", id)?,
        Outcome::Unchanged => {
            let status = engine.get(id).map(|t| t.status.as_str()).unwrap_or("gone");
            writeln!(out, "Todo {} is already {}", id, status)?
        }
    }
    Ok(outcome)
}

/// Handle the delete command
pub fn handle_delete(
    ctx: &Context,
    credentials: &Credentials,
    id: TodoId,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let (_, mut engine) = ctx.engine(credentials)?;
    engine.delete(id)?;
    writeln!(out, "Todo {} deleted", id)?;
    Ok(())
}

/// Handle the sweep command
pub fn handle_sweep(ctx: &Context, credentials: &Credentials, out: &mut impl Write) -> Result<usize, CliError> {
    let (_, mut engine) = ctx.engine(credentials)?;
    let missed = engine.sweep()?;
    writeln!(out, "{} todo(s) marked missed", missed.len())?;
    Ok(missed.len())
}

#[derive(Serialize)]
struct TodoView<'a> {
    #[serde(flatten)]
    todo: &'a Todo,
    time_remaining: Option<String>,
}

/// Handle the list command
pub fn handle_list(
    ctx: &Context,
    credentials: &Credentials,
    filter: StatusFilter,
    json: bool,
    out: &mut impl Write,
) -> Result<usize, CliError> {
    let (user, mut engine) = ctx.engine(credentials)?;
    engine.sweep()?;
    let now = engine.now();
    let todos = engine.view(filter);

    if json {
        let views: Vec<TodoView> = todos
            .iter()
            .map(|todo| TodoView {
                todo,
                time_remaining: time_remaining(todo, now).map(|r| r.to_string()),
            })
            .collect();
        serde_json::to_writer_pretty(&mut *out, &views)?;
        writeln!(out)?;
        return Ok(todos.len());
    }

    if todos.is_empty() {
        writeln!(out, "No {} todos", filter.label().to_lowercase())?;
        return Ok(0);
    }

    for todo in &todos {
        let remaining = time_remaining(todo, now)
            .map(|r| r.to_string())
            .unwrap_or_default();
        if user.is_admin() {
            writeln!(
                out,
                "{:>5}  {:<9}  {:<20}  {}  [{}]",
                todo.id, todo.status, remaining, todo.title, todo.owner
            )?;
        } else {
            writeln!(out, "{:>5}  {:<9}  {:<20}  {}", todo.id, todo.status, remaining, todo.title)?;
        }
    }
    Ok(todos.len())
}
