use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    pub(crate) fn app_name(&self) -> &'static str {
        match self {
            Profile::Dev => "daylist-dev",
            Profile::Prod => "daylist",
        }
    }
}

/// Get the configuration directory path.
/// The dev profile uses "daylist-dev" so it never touches real data.
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "daylist", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path (database and log file)
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "daylist", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parsed key binding information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKeyBinding {
    pub key_code: KeyCode,
    pub requires_ctrl: bool,
}

impl ParsedKeyBinding {
    pub fn matches(&self, key_event: &KeyEvent) -> bool {
        if self.requires_ctrl != has_primary_modifier(key_event.modifiers) {
            return false;
        }
        match (self.key_code, key_event.code) {
            // Terminals report Shift+letter as the uppercase char
            (KeyCode::Char(expected), KeyCode::Char(actual)) if self.requires_ctrl => {
                expected.eq_ignore_ascii_case(&actual)
            }
            (expected, actual) => expected == actual,
        }
    }
}

/// Check if a key event has the primary modifier (Ctrl on Windows/Linux, Option/Alt on macOS)
pub fn has_primary_modifier(modifiers: KeyModifiers) -> bool {
    #[cfg(target_os = "macos")]
    {
        modifiers.contains(KeyModifiers::CONTROL) || modifiers.contains(KeyModifiers::ALT)
    }

    #[cfg(not(target_os = "macos"))]
    {
        modifiers.contains(KeyModifiers::CONTROL)
    }
}

/// On macOS, "Ctrl+" is shown as "Opt+" since Option works there too
pub fn format_key_binding_for_display(key_binding: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        key_binding.replace("Ctrl+", "Opt+")
    }

    #[cfg(not(target_os = "macos"))]
    {
        key_binding.to_string()
    }
}

/// True if `key_event` is the key described by the config string `binding`.
/// Unparsable bindings never match (they are rejected at config load).
pub fn key_matches(binding: &str, key_event: &KeyEvent) -> bool {
    parse_key_binding(binding)
        .map(|parsed| parsed.matches(key_event))
        .unwrap_or(false)
}

/// Parse a key binding string from config into a ParsedKeyBinding
/// Supports: single keys ("q", "n", "j", "k"), special keys ("Enter", "Tab", "F1"),
/// and the Ctrl modifier ("Ctrl+o")
pub fn parse_key_binding(key_str: &str) -> Result<ParsedKeyBinding, String> {
    let key_str = key_str.trim();

    if let Some(key_part) = key_str.strip_prefix("Ctrl+") {
        let key_code = parse_key_code(key_part)?;
        return Ok(ParsedKeyBinding {
            key_code,
            requires_ctrl: true,
        });
    }

    let key_code = parse_key_code(key_str)?;
    Ok(ParsedKeyBinding {
        key_code,
        requires_ctrl: false,
    })
}

/// Parse a key code from a string (without modifiers)
fn parse_key_code(key_str: &str) -> Result<KeyCode, String> {
    match key_str {
        "Enter" => Ok(KeyCode::Enter),
        "Esc" | "Escape" => Ok(KeyCode::Esc),
        "Backspace" => Ok(KeyCode::Backspace),
        "Tab" => Ok(KeyCode::Tab),
        "Space" | " " => Ok(KeyCode::Char(' ')),
        "Left" => Ok(KeyCode::Left),
        "Right" => Ok(KeyCode::Right),
        "Up" => Ok(KeyCode::Up),
        "Down" => Ok(KeyCode::Down),
        "Home" => Ok(KeyCode::Home),
        "End" => Ok(KeyCode::End),
        "PageUp" => Ok(KeyCode::PageUp),
        "PageDown" => Ok(KeyCode::PageDown),
        "Delete" => Ok(KeyCode::Delete),
        "Insert" => Ok(KeyCode::Insert),
        _ => {
            if let Some(n) = key_str.strip_prefix('F').and_then(|n| n.parse::<u8>().ok()) {
                if (1..=12).contains(&n) {
                    return Ok(KeyCode::F(n));
                }
            }
            let mut chars = key_str.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(KeyCode::Char(c)),
                _ => Err(format!("Unknown key binding: {}", key_str)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn parses_plain_special_and_ctrl_keys() {
        assert_eq!(parse_key_binding("q").unwrap().key_code, KeyCode::Char('q'));
        assert_eq!(parse_key_binding("Space").unwrap().key_code, KeyCode::Char(' '));
        assert_eq!(parse_key_binding("F12").unwrap().key_code, KeyCode::F(12));
        let ctrl = parse_key_binding("Ctrl+o").unwrap();
        assert!(ctrl.requires_ctrl);
        assert_eq!(ctrl.key_code, KeyCode::Char('o'));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse_key_binding("F13").is_err());
        assert!(parse_key_binding("Meta+x").is_err());
        assert!(parse_key_binding("").is_err());
    }

    #[test]
    fn matching_respects_modifier() {
        assert!(key_matches("q", &key(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(!key_matches("q", &key(KeyCode::Char('q'), KeyModifiers::CONTROL)));
        assert!(key_matches("Ctrl+r", &key(KeyCode::Char('r'), KeyModifiers::CONTROL)));
        assert!(!key_matches("Ctrl+r", &key(KeyCode::Char('r'), KeyModifiers::NONE)));
        assert!(key_matches("Tab", &key(KeyCode::Tab, KeyModifiers::NONE)));
    }

    #[test]
    fn expands_home() {
        let expanded = expand_path("~/daylist.db");
        assert!(!expanded.to_string_lossy().starts_with('~') || BaseDirs::new().is_none());
        assert_eq!(expand_path("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }
}
