pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod session;
pub mod store;
pub mod tui;
pub mod utils;

pub use auth::{AuthProvider, LocalAuth};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::AppError;
pub use lifecycle::TodoEngine;
pub use models::{StatusFilter, Todo, TodoId, TodoStatus, User};
pub use session::Session;
pub use store::{DocumentStore, SqliteStore};
pub use utils::Profile;
