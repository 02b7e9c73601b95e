use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::utils::{self, Profile};

pub const LOG_FILE_NAME: &str = "daylist.log";

/// Where the log file lives: next to the database in the data directory
pub fn log_path(profile: Profile) -> Option<PathBuf> {
    utils::get_data_dir(profile).map(|dir| dir.join(LOG_FILE_NAME))
}

/// Filter from `RUST_LOG` if set, otherwise the configured level
pub fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a global subscriber appending to `path`. The terminal belongs to
/// the TUI, so nothing is written to stdout or stderr. If the file cannot be
/// opened the program carries on without logging.
pub fn init(path: &Path, default_level: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("warning: logging disabled, cannot create {}: {}", parent.display(), e);
            return;
        }
    }

    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("warning: logging disabled, cannot open {}: {}", path.display(), e);
            return;
        }
    };

    let result = tracing_subscriber::fmt()
        .with_env_filter(build_filter(default_level))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init();

    if result.is_ok() {
        tracing::debug!(path = %path.display(), "logging initialized");
    }
}
