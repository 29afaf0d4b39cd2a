use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::Duration;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use tracing::{trace, warn};

use crate::domain::{DaveConfig, DaveError, Message};
use crate::model::Model;

pub struct Controller {
    event_poll_time: u64,
    loads: Receiver<Message>,
}

impl Controller {
    pub fn new(cfg: &DaveConfig, loads: Receiver<Message>) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
            loads,
        }
    }

    /// Next message for the model: finished loads first, then terminal events.
    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, DaveError> {
        match self.loads.try_recv() {
            Ok(message) => return Ok(Some(message)),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => warn!("Load channel disconnected"),
        }

        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Ok(Some(Message::RawKey(key)))
                } else {
                    Ok(map_key(key))
                }
            }
            Event::Resize(width, height) => {
                Ok(Some(Message::Resize(width as usize, height as usize)))
            }
            _ => Ok(None),
        }
    }
}

pub fn map_key(key: KeyEvent) -> Option<Message> {
    let message = match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
        (KeyCode::Char('q'), _) => Some(Message::Quit),
        (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
        (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
        (KeyCode::Left, _) => Some(Message::MoveLeft),
        (KeyCode::Right, _) => Some(Message::MoveRight),
        (KeyCode::PageDown, _) | (KeyCode::Char('n'), _) => Some(Message::NextPage),
        (KeyCode::PageUp, _) | (KeyCode::Char('p'), _) => Some(Message::PreviousPage),
        (KeyCode::Home, _) | (KeyCode::Char('g'), _) => Some(Message::FirstPage),
        (KeyCode::End, _) | (KeyCode::Char('G'), _) => Some(Message::LastPage),
        (KeyCode::Char('z'), _) => Some(Message::CyclePageSize),
        (KeyCode::Tab, _) => Some(Message::NextTable),
        (KeyCode::BackTab, _) => Some(Message::PreviousTable),
        (KeyCode::Char('/'), _) => Some(Message::Search),
        (KeyCode::Char('F'), _) => Some(Message::Filter),
        (KeyCode::Char('f'), _) => Some(Message::FilterByCell),
        (KeyCode::Char('s'), _) => Some(Message::SortAscending),
        (KeyCode::Char('S'), _) => Some(Message::SortDescending),
        (KeyCode::Enter, _) => Some(Message::Enter),
        (KeyCode::Esc, _) => Some(Message::Exit),
        (KeyCode::Char('h'), _) => Some(Message::Distribution),
        (KeyCode::Char('l'), _) => Some(Message::Trend),
        (KeyCode::Char('e'), _) => Some(Message::Export),
        (KeyCode::Char('E'), _) => Some(Message::ExportAll),
        (KeyCode::Char('r'), _) => Some(Message::Refresh),
        (KeyCode::Char('t'), _) => Some(Message::ToggleTheme),
        (KeyCode::Char('y'), _) => Some(Message::CopyCell),
        (KeyCode::Char('?'), _) => Some(Message::Help),
        _ => None,
    };
    trace!("Mapped: {key:?} => {message:?}");
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn navigation_keys() {
        assert_eq!(map_key(key(KeyCode::Down)), Some(Message::MoveDown));
        assert_eq!(map_key(key(KeyCode::Char('k'))), Some(Message::MoveUp));
        assert_eq!(map_key(key(KeyCode::PageDown)), Some(Message::NextPage));
        assert_eq!(map_key(key(KeyCode::Char('p'))), Some(Message::PreviousPage));
        assert_eq!(map_key(key(KeyCode::Tab)), Some(Message::NextTable));
        assert_eq!(map_key(key(KeyCode::BackTab)), Some(Message::PreviousTable));
    }

    #[test]
    fn command_keys() {
        assert_eq!(map_key(key(KeyCode::Char('/'))), Some(Message::Search));
        assert_eq!(map_key(key(KeyCode::Char('e'))), Some(Message::Export));
        assert_eq!(map_key(key(KeyCode::Char('E'))), Some(Message::ExportAll));
        assert_eq!(map_key(key(KeyCode::Char('t'))), Some(Message::ToggleTheme));
        assert_eq!(map_key(key(KeyCode::Char('h'))), Some(Message::Distribution));
        assert_eq!(map_key(key(KeyCode::Char('l'))), Some(Message::Trend));
        assert_eq!(
            map_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Message::Quit)
        );
        assert_eq!(map_key(key(KeyCode::Char('x'))), None);
    }
}
