use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Single-line text field used by the sign-in form and the new-todo prompt.
/// The cursor is a char index, never a byte offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineInput {
    text: String,
    cursor: usize,
}

impl LineInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_string(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.chars().count();
        Self { text, cursor }
    }

    pub fn value(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    pub fn insert_char(&mut self, ch: char) {
        let at = self.byte_index(self.cursor);
        self.text.insert(at, ch);
        self.cursor += 1;
    }

    /// Backspace
    pub fn delete_char(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.text.remove(at);
    }

    /// Delete key
    pub fn delete_forward(&mut self) {
        if self.cursor < self.text.chars().count() {
            let at = self.byte_index(self.cursor);
            self.text.remove(at);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    /// Apply an editing key. Returns false for keys the field does not use.
    pub fn handle_key(&mut self, key_event: &KeyEvent) -> bool {
        if key_event.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
            return false;
        }
        match key_event.code {
            KeyCode::Char(ch) => self.insert_char(ch),
            KeyCode::Backspace => self.delete_char(),
            KeyCode::Delete => self.delete_forward(),
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Home => self.move_home(),
            KeyCode::End => self.move_end(),
            _ => return false,
        }
        true
    }

    /// Text to draw in a field `width` cells wide, scrolled so the cursor
    /// stays visible, and the cursor column within it. Masked fields show
    /// one `*` per char.
    pub fn visible(&self, width: usize, masked: bool) -> (String, usize) {
        let chars: Vec<char> = if masked {
            self.text.chars().map(|_| '*').collect()
        } else {
            self.text.chars().collect()
        };
        if width == 0 {
            return (String::new(), 0);
        }
        // Leave a cell for the cursor past the last char
        let start = (self.cursor + 1).saturating_sub(width);
        let shown: String = chars.iter().skip(start).take(width).collect();
        (shown, self.cursor - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(input: &mut LineInput, code: KeyCode) -> bool {
        input.handle_key(&KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn edits_at_cursor() {
        let mut input = LineInput::new();
        for ch in "Buy mlk".chars() {
            press(&mut input, KeyCode::Char(ch));
        }
        press(&mut input, KeyCode::Left);
        press(&mut input, KeyCode::Left);
        press(&mut input, KeyCode::Char('i'));
        assert_eq!(input.value(), "Buy milk");
        assert_eq!(input.cursor(), 6);

        press(&mut input, KeyCode::Home);
        press(&mut input, KeyCode::Delete);
        press(&mut input, KeyCode::Backspace);
        assert_eq!(input.value(), "uy milk");
        assert_eq!(input.cursor(), 0);
    }

    #[test]
    fn multibyte_chars_are_safe() {
        let mut input = LineInput::from_string("café");
        input.delete_char();
        input.insert_char('é');
        input.move_left();
        input.insert_char('ü');
        assert_eq!(input.value(), "cafüé");
    }

    #[test]
    fn ctrl_keys_are_not_consumed() {
        let mut input = LineInput::new();
        assert!(!input.handle_key(&KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL)));
        assert!(!press(&mut input, KeyCode::Enter));
        assert!(input.is_empty());
    }

    #[test]
    fn visible_window_follows_cursor() {
        let input = LineInput::from_string("abcdefgh");
        assert_eq!(input.visible(4, false), ("fgh".to_string(), 3));
        assert_eq!(input.visible(20, true), ("********".to_string(), 8));

        let mut input = input;
        input.move_home();
        assert_eq!(input.visible(4, false), ("abcd".to_string(), 0));
    }
}
