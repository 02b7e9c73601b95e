use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::auth::EmailPolicy;
use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Longest fallback sweep interval accepted from the config file
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Only addresses at this domain may register. Empty allows any.
    #[serde(default = "default_registration_domain")]
    pub registration_domain: String,
    /// Safety-net sweep period on top of the deadline timer
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_status_message_secs")]
    pub status_message_secs: u64,
    #[serde(default)]
    pub key_bindings: KeyBindings,
    #[serde(default = "default_current_theme")]
    pub current_theme: String,
    #[serde(default)]
    pub themes: HashMap<String, Theme>,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBindings {
    #[serde(default = "default_quit")]
    pub quit: String,
    #[serde(default = "default_new")]
    pub new: String,
    #[serde(default = "default_delete")]
    pub delete: String,
    #[serde(default = "default_complete")]
    pub complete: String,
    #[serde(default = "default_help")]
    pub help: String,
    #[serde(default = "default_sign_out")]
    pub sign_out: String,
    #[serde(default = "default_next_filter")]
    pub next_filter: String,
    #[serde(default = "default_filter_all")]
    pub filter_all: String,
    #[serde(default = "default_filter_active")]
    pub filter_active: String,
    #[serde(default = "default_filter_completed")]
    pub filter_completed: String,
    #[serde(default = "default_filter_missed")]
    pub filter_missed: String,
    #[serde(default = "default_list_up")]
    pub list_up: String,
    #[serde(default = "default_list_down")]
    pub list_down: String,
    /// Switch the auth form between sign-in and register
    #[serde(default = "default_toggle_mode")]
    pub toggle_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default = "default_fg")]
    pub fg: String,
    #[serde(default = "default_bg")]
    pub bg: String,
    #[serde(default = "default_highlight_bg")]
    pub highlight_bg: String,
    #[serde(default)]
    pub highlight_fg: String,
    #[serde(default = "default_active_fg")]
    pub active_fg: String,
    #[serde(default = "default_completed_fg")]
    pub completed_fg: String,
    #[serde(default = "default_missed_fg")]
    pub missed_fg: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_level: default_log_level(),
            registration_domain: default_registration_domain(),
            sweep_interval_secs: default_sweep_interval_secs(),
            status_message_secs: default_status_message_secs(),
            key_bindings: KeyBindings::default(),
            current_theme: default_current_theme(),
            themes: HashMap::new(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            quit: default_quit(),
            new: default_new(),
            delete: default_delete(),
            complete: default_complete(),
            help: default_help(),
            sign_out: default_sign_out(),
            next_filter: default_next_filter(),
            filter_all: default_filter_all(),
            filter_active: default_filter_active(),
            filter_completed: default_filter_completed(),
            filter_missed: default_filter_missed(),
            list_up: default_list_up(),
            list_down: default_list_down(),
            toggle_mode: default_toggle_mode(),
        }
    }
}

impl KeyBindings {
    /// (name, binding) pairs, used for validation and the help screen
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("quit", &self.quit),
            ("new", &self.new),
            ("delete", &self.delete),
            ("complete", &self.complete),
            ("help", &self.help),
            ("sign_out", &self.sign_out),
            ("next_filter", &self.next_filter),
            ("filter_all", &self.filter_all),
            ("filter_active", &self.filter_active),
            ("filter_completed", &self.filter_completed),
            ("filter_missed", &self.filter_missed),
            ("list_up", &self.list_up),
            ("list_down", &self.list_down),
            ("toggle_mode", &self.toggle_mode),
        ]
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: default_fg(),
            bg: default_bg(),
            highlight_bg: default_highlight_bg(),
            highlight_fg: String::new(),
            active_fg: default_active_fg(),
            completed_fg: default_completed_fg(),
            missed_fg: default_missed_fg(),
        }
    }
}

impl Theme {
    fn preset(fg: &str, bg: &str, highlight: (&str, &str), status: [&str; 3]) -> Self {
        let [active_fg, completed_fg, missed_fg] = status.map(str::to_string);
        Self {
            fg: fg.to_string(),
            bg: bg.to_string(),
            highlight_bg: highlight.0.to_string(),
            highlight_fg: highlight.1.to_string(),
            active_fg,
            completed_fg,
            missed_fg,
        }
    }

    /// Built-in themes selectable by name without a `[themes]` entry
    pub fn get_preset_themes() -> HashMap<String, Theme> {
        HashMap::from([
            ("default".to_string(), Theme::default()),
            (
                "paper".to_string(),
                Theme::preset("black", "white", ("lightblue", "black"), ["blue", "green", "red"]),
            ),
            (
                "dusk".to_string(),
                Theme::preset("#d8dee9", "#2e3440", ("#5e81ac", ""), ["#88c0d0", "#a3be8c", "#bf616a"]),
            ),
            (
                "mono".to_string(),
                Theme::preset("white", "black", ("white", "black"), ["white", "gray", "darkgray"]),
            ),
        ])
    }
}

fn database_path_for(profile: utils::Profile) -> String {
    match utils::get_data_dir(profile) {
        Some(dir) => dir.join("daylist.db").to_string_lossy().into_owned(),
        None => format!("~/.local/share/{}/daylist.db", profile.app_name()),
    }
}

fn default_database_path() -> String {
    database_path_for(utils::Profile::Prod)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_registration_domain() -> String {
    "gmail.com".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_status_message_secs() -> u64 {
    3
}

fn default_quit() -> String {
    "q".to_string()
}

fn default_new() -> String {
    "n".to_string()
}

fn default_delete() -> String {
    "d".to_string()
}

fn default_complete() -> String {
    "Space".to_string()
}

fn default_help() -> String {
    "F1".to_string()
}

fn default_sign_out() -> String {
    "Ctrl+o".to_string()
}

fn default_next_filter() -> String {
    "Tab".to_string()
}

fn default_filter_all() -> String {
    "1".to_string()
}

fn default_filter_active() -> String {
    "2".to_string()
}

fn default_filter_completed() -> String {
    "3".to_string()
}

fn default_filter_missed() -> String {
    "4".to_string()
}

fn default_list_up() -> String {
    "k".to_string()
}

fn default_list_down() -> String {
    "j".to_string()
}

fn default_toggle_mode() -> String {
    "Ctrl+r".to_string()
}

fn default_current_theme() -> String {
    "default".to_string()
}

fn default_fg() -> String {
    "white".to_string()
}

fn default_bg() -> String {
    "black".to_string()
}

fn default_highlight_bg() -> String {
    "blue".to_string()
}

fn default_active_fg() -> String {
    "cyan".to_string()
}

fn default_completed_fg() -> String {
    "green".to_string()
}

fn default_missed_fg() -> String {
    "red".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config directory for this platform")]
    NoConfigDir,
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot write config: {0}")]
    Write(String),
    #[error("invalid setting {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    /// Load configuration from the profile's config file, or create it
    /// with defaults if missing
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        Self::load_from_path(&config_path, profile)
    }

    /// Load configuration from an explicit path. The database path from the
    /// file is honoured; a missing file is created with profile defaults.
    pub fn load_from_path(config_path: &Path, profile: utils::Profile) -> Result<Self, ConfigError> {
        let config = if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_path_buf(),
                source,
            })?;
            Self::from_toml(&contents)?
        } else {
            let config = Config {
                database_path: database_path_for(profile),
                ..Config::default()
            };
            config.save_to_path(config_path)?;
            tracing::info!(path = %config_path.display(), "wrote default config");
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reject settings the application cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SWEEP_INTERVAL_SECS).contains(&self.sweep_interval_secs) {
            return Err(ConfigError::InvalidValue(
                "sweep_interval_secs".to_string(),
                format!("must be between 1 and {}", MAX_SWEEP_INTERVAL_SECS),
            ));
        }
        for (name, binding) in self.key_bindings.entries() {
            utils::parse_key_binding(binding).map_err(|e| {
                ConfigError::InvalidValue(format!("key_bindings.{}", name), e)
            })?;
        }
        Ok(())
    }

    /// Write the config as pretty TOML, stamping the current version
    pub fn save_to_path(&self, config_path: &Path) -> Result<(), ConfigError> {
        let versioned = Config {
            config_version: Some(CURRENT_CONFIG_VERSION),
            ..self.clone()
        };
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write(e.to_string()))?;
        }
        let contents = toml::to_string_pretty(&versioned).map_err(|e| ConfigError::Write(e.to_string()))?;
        fs::write(config_path, contents).map_err(|e| ConfigError::Write(e.to_string()))
    }

    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        utils::get_config_dir(profile)
            .map(|dir| dir.join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Database path with `~` expanded
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    pub fn email_policy(&self) -> EmailPolicy {
        EmailPolicy::for_domain(&self.registration_domain)
    }

    pub fn sweep_interval(&self) -> chrono::Duration {
        let secs = self.sweep_interval_secs.clamp(1, MAX_SWEEP_INTERVAL_SECS);
        i64::try_from(secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or_else(|| chrono::TimeDelta::days(1))
    }

    /// User-defined themes shadow presets of the same name
    pub fn get_active_theme(&self) -> Theme {
        if let Some(theme) = self.themes.get(&self.current_theme) {
            theme.clone()
        } else {
            Theme::get_preset_themes()
                .remove(&self.current_theme)
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.registration_domain, "gmail.com");
        assert_eq!(config.key_bindings.complete, "Space");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let config = Config::from_toml("sweep_interval_secs = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(name, _)) if name == "sweep_interval_secs"));
    }

    #[test]
    fn bad_key_binding_is_rejected() {
        let config = Config::from_toml("[key_bindings]\nquit = \"Hyper+q\"").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(name, _)) if name == "key_bindings.quit"));
    }

    #[test]
    fn oversized_sweep_interval_is_rejected() {
        let config = Config::from_toml("sweep_interval_secs = 9223372036854775807").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(name, _)) if name == "sweep_interval_secs"));
        assert_eq!(config.sweep_interval(), chrono::TimeDelta::days(1));

        let config = Config::from_toml("sweep_interval_secs = 86400").unwrap();
        assert!(config.validate().is_ok());
        let config = Config::from_toml("sweep_interval_secs = 86401").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_domain_disables_registration_restriction() {
        let config = Config::from_toml("registration_domain = \"\"").unwrap();
        assert_eq!(config.email_policy(), EmailPolicy::unrestricted());
    }

    #[test]
    fn unknown_theme_falls_back_to_default() {
        let mut config = Config::default();
        config.current_theme = "nope".to_string();
        assert_eq!(config.get_active_theme(), Theme::default());
        config.current_theme = "paper".to_string();
        assert_eq!(config.get_active_theme().bg, "white");
        config.themes.insert("paper".to_string(), Theme::default());
        assert_eq!(config.get_active_theme(), Theme::default());
    }

    #[test]
    fn missing_file_is_created_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let created = Config::load_from_path(&path, utils::Profile::Dev).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_from_path(&path, utils::Profile::Dev).unwrap();
        assert_eq!(reloaded.database_path, created.database_path);
        assert_eq!(reloaded.config_version, Some(CURRENT_CONFIG_VERSION));
    }
}
