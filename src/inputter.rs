use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::trace;

/// Single line editor backing the search and filter prompts.
/// The cursor is a char index, never a byte index.
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    curser_pos: usize,
    finished: bool,
    canceled: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub changed: bool,
    pub curser_pos: usize,
}

impl Inputter {
    pub fn read(&mut self, key: KeyEvent) -> InputResult {
        let before = self.current_input.clone();
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.finished = true,
            (KeyCode::Esc, _) => {
                self.clear();
                self.canceled = true;
                self.finished = true;
            }
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => self.curser_pos = self.curser_pos.saturating_sub(1),
            (KeyCode::Right, _) => {
                self.curser_pos = std::cmp::min(self.curser_pos + 1, self.char_len())
            }
            (KeyCode::Home, _) => self.curser_pos = 0,
            (KeyCode::End, _) => self.curser_pos = self.char_len(),
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.current_input.clear();
                self.curser_pos = 0;
            }
            (KeyCode::Char(c), m) if !m.contains(KeyModifiers::CONTROL) => self.insert(c),
            (code, _) => trace!("Ignoring prompt key {code:?}"),
        }
        let mut result = self.get();
        result.changed = before != self.current_input;
        result
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            input: self.current_input.clone(),
            finished: self.finished,
            canceled: self.canceled,
            changed: false,
            curser_pos: self.curser_pos,
        }
    }

    /// Reset the prompt, optionally prefilled.
    pub fn start(&mut self, prefill: &str) {
        self.clear();
        self.current_input = prefill.to_string();
        self.curser_pos = self.char_len();
    }

    pub fn clear(&mut self) {
        self.current_input.clear();
        self.curser_pos = 0;
        self.finished = false;
        self.canceled = false;
    }

    fn char_len(&self) -> usize {
        self.current_input.chars().count()
    }

    fn byte_pos(&self, char_pos: usize) -> usize {
        self.current_input
            .char_indices()
            .nth(char_pos)
            .map(|(idx, _)| idx)
            .unwrap_or(self.current_input.len())
    }

    fn insert(&mut self, c: char) {
        let at = self.byte_pos(self.curser_pos);
        self.current_input.insert(at, c);
        self.curser_pos += 1;
    }

    fn backspace(&mut self) {
        if self.curser_pos > 0 {
            self.curser_pos -= 1;
            let at = self.byte_pos(self.curser_pos);
            self.current_input.remove(at);
        }
    }

    fn delete(&mut self) {
        if self.curser_pos < self.char_len() {
            let at = self.byte_pos(self.curser_pos);
            self.current_input.remove(at);
        }
    }
}
