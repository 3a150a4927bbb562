//! Keyboard commands read from the terminal.
//!
//! Keys arrive one press at a time from `crossterm` with the terminal in raw
//! mode, so every press becomes its own [`ClientEvent::Key`].

use crate::network::ClientEvent;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::debug;
use shared::Action;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const INPUT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Act(Action),
    Quit,
}

/// Maps a typed key to a command. Keys are case-insensitive.
pub fn map_key(key: char) -> Option<Command> {
    let command = match key.to_ascii_lowercase() {
        'w' => Command::Act(Action::MoveUp),
        's' => Command::Act(Action::MoveDown),
        'a' => Command::Act(Action::MoveLeft),
        'd' => Command::Act(Action::MoveRight),
        ' ' => Command::Act(Action::Dash),
        'j' => Command::Act(Action::Secondary),
        'q' => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// Reduces a terminal key event to the key it stands for. Arrow keys alias
/// the movement letters; Ctrl+C and Esc quit, since raw mode swallows SIGINT.
pub fn key_char(key: &KeyEvent) -> Option<char> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some('q'),
        KeyCode::Char(ch) => Some(ch),
        KeyCode::Up => Some('w'),
        KeyCode::Down => Some('s'),
        KeyCode::Left => Some('a'),
        KeyCode::Right => Some('d'),
        KeyCode::Esc => Some('q'),
        _ => None,
    }
}

/// Blocking loop forwarding each key press until the event loop goes away or
/// the terminal stops delivering events.
fn forward_keys(events: mpsc::UnboundedSender<ClientEvent>) {
    while !events.is_closed() {
        match event::poll(INPUT_POLL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                debug!("Input poll failed: {}", e);
                return;
            }
        }
        match event::read() {
            Ok(Event::Key(key)) => {
                if let Some(ch) = key_char(&key) {
                    if events.send(ClientEvent::Key(ch)).is_err() {
                        return;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Input read failed: {}", e);
                return;
            }
        }
    }
}

/// Terminal reads block, so they run on the blocking pool.
pub fn spawn_key_reader(events: mpsc::UnboundedSender<ClientEvent>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || forward_keys(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::empty(),
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(map_key('w'), Some(Command::Act(Action::MoveUp)));
        assert_eq!(map_key('S'), Some(Command::Act(Action::MoveDown)));
        assert_eq!(map_key('a'), Some(Command::Act(Action::MoveLeft)));
        assert_eq!(map_key('d'), Some(Command::Act(Action::MoveRight)));
        assert_eq!(map_key(' '), Some(Command::Act(Action::Dash)));
        assert_eq!(map_key('j'), Some(Command::Act(Action::Secondary)));
        assert_eq!(map_key('q'), Some(Command::Quit));
        assert_eq!(map_key('x'), None);
    }

    #[test]
    fn test_single_press_yields_key() {
        assert_eq!(key_char(&key(KeyCode::Char('w'))), Some('w'));
        assert_eq!(key_char(&key(KeyCode::Char(' '))), Some(' '));
        assert_eq!(key_char(&key(KeyCode::Left)), Some('a'));
        assert_eq!(key_char(&key(KeyCode::Down)), Some('s'));
        assert_eq!(key_char(&key(KeyCode::Enter)), None);
    }

    #[test]
    fn test_release_and_repeat_ignored() {
        let mut release = key(KeyCode::Char('w'));
        release.kind = KeyEventKind::Release;
        assert_eq!(key_char(&release), None);

        let mut repeat = key(KeyCode::Char('w'));
        repeat.kind = KeyEventKind::Repeat;
        assert_eq!(key_char(&repeat), None);
    }

    #[test]
    fn test_ctrl_c_and_esc_quit() {
        let ctrl_c = KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            ..key(KeyCode::Char('c'))
        };
        assert_eq!(key_char(&ctrl_c).and_then(map_key), Some(Command::Quit));
        assert_eq!(key_char(&key(KeyCode::Esc)).and_then(map_key), Some(Command::Quit));
    }
}
