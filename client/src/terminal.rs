//! Terminal setup and teardown around a session.

use crossterm::{
    cursor, execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::io;

/// Holds the terminal in raw mode, and on the alternate screen when drawing,
/// until dropped.
pub struct TerminalGuard {
    alternate_screen: bool,
    active: bool,
}

impl TerminalGuard {
    pub fn enter(alternate_screen: bool) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let guard = Self {
            alternate_screen,
            active: true,
        };
        if alternate_screen {
            execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)?;
        }
        Ok(guard)
    }

    pub fn restore(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        let left = if self.alternate_screen {
            execute!(io::stdout(), cursor::Show, LeaveAlternateScreen)
        } else {
            Ok(())
        };
        terminal::disable_raw_mode().and(left)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
