//! Team flags.
//!
//! A flag is built as an [`UnplacedFlag`] and becomes a playable [`Flag`] only
//! once its base is fixed, so a flag without a base cannot be reset.

use crate::board::{Board, BoardError};
use crate::cell::Cell;
use serde::{Deserialize, Serialize};

/// Capture lifecycle of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagState {
    /// Standing on its base, uncaptured.
    AtBase,
    /// Following an enemy carrier.
    Carried,
    /// Left behind after the carrier was eliminated.
    Dropped,
}

/// Flag during match setup, before its base is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnplacedFlag {
    team_id: Cell,
    pos_x: i32,
    pos_y: i32,
}

impl UnplacedFlag {
    pub fn new(team_id: Cell, x: i32, y: i32) -> Self {
        Self {
            team_id,
            pos_x: x,
            pos_y: y,
        }
    }

    /// Fixes the current position as the permanent base.
    pub fn set_base(self) -> Flag {
        Flag {
            team_id: self.team_id,
            pos_x: self.pos_x,
            pos_y: self.pos_y,
            base_x: self.pos_x,
            base_y: self.pos_y,
            state: FlagState::AtBase,
        }
    }
}

/// Flag in play. It occupies exactly one board cell at all times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub team_id: Cell,
    pub pos_x: i32,
    pub pos_y: i32,
    base_x: i32,
    base_y: i32,
    state: FlagState,
}

impl Flag {
    /// Moves the flag: the old cell is cleared to `Empty`, then the new cell
    /// receives the team marker.
    pub fn move_to(&mut self, x: i32, y: i32, board: &mut Board) -> Result<(), BoardError> {
        if !board.contains(x, y) {
            return Err(BoardError::OutOfBounds { x, y });
        }
        board.write(self.pos_x, self.pos_y, Cell::Empty)?;
        self.pos_x = x;
        self.pos_y = y;
        board.write(self.pos_x, self.pos_y, self.team_id)
    }

    /// Returns the flag to its base and clears any capture.
    pub fn reset_pos(&mut self, board: &mut Board) -> Result<(), BoardError> {
        self.move_to(self.base_x, self.base_y, board)?;
        self.state = FlagState::AtBase;
        Ok(())
    }

    /// Base position as `(y, x)`.
    pub fn get_base(&self) -> (i32, i32) {
        (self.base_y, self.base_x)
    }

    /// Current position as `(y, x)`.
    pub fn position(&self) -> (i32, i32) {
        (self.pos_y, self.pos_x)
    }

    pub fn is_captured(&self) -> bool {
        self.state == FlagState::Carried
    }

    pub fn state(&self) -> FlagState {
        self.state
    }

    /// At base and not being carried.
    pub fn is_safe(&self) -> bool {
        self.pos_x == self.base_x && self.pos_y == self.base_y && !self.is_captured()
    }

    /// An enemy picked the flag up. Returns false if it was already carried.
    pub fn capture(&mut self) -> bool {
        if self.state == FlagState::Carried {
            return false;
        }
        self.state = FlagState::Carried;
        true
    }

    /// The carrier was eliminated; the flag stays where it is.
    pub fn drop_at_current(&mut self) {
        if self.state == FlagState::Carried {
            self.state = FlagState::Dropped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CellDelta;

    fn placed(board: &mut Board, x: i32, y: i32) -> Flag {
        board.stamp(x, y, Cell::Team1).unwrap();
        UnplacedFlag::new(Cell::Team1, x, y).set_base()
    }

    #[test]
    fn test_set_base_starts_safe() {
        let flag = UnplacedFlag::new(Cell::Flag1, 10, 4).set_base();
        assert_eq!(flag.get_base(), (4, 10));
        assert_eq!(flag.position(), (4, 10));
        assert_eq!(flag.state(), FlagState::AtBase);
        assert!(flag.is_safe());
    }

    #[test]
    fn test_move_emits_clear_then_marker() {
        let mut board = Board::new(21, 51);
        let mut flag = placed(&mut board, 5, 5);

        flag.move_to(6, 5, &mut board).unwrap();

        assert_eq!(
            board.drain_deltas(),
            vec![
                CellDelta::new(5, 5, Cell::Empty),
                CellDelta::new(6, 5, Cell::Team1),
            ]
        );
        assert_eq!((flag.pos_x, flag.pos_y), (6, 5));
        assert!(!flag.is_safe());
    }

    #[test]
    fn test_move_out_of_bounds_changes_nothing() {
        let mut board = Board::new(5, 5);
        let mut flag = placed(&mut board, 2, 2);

        assert_eq!(
            flag.move_to(5, 2, &mut board),
            Err(BoardError::OutOfBounds { x: 5, y: 2 })
        );
        assert_eq!((flag.pos_x, flag.pos_y), (2, 2));
        assert_eq!(board.read(2, 2), Ok(Cell::Team1));
        assert!(board.drain_deltas().is_empty());
    }

    #[test]
    fn test_reset_pos_restores_safety() {
        let mut board = Board::new(21, 51);
        let mut flag = placed(&mut board, 5, 5);

        assert!(flag.capture());
        flag.move_to(9, 12, &mut board).unwrap();
        assert!(flag.is_captured());
        assert!(!flag.is_safe());

        flag.reset_pos(&mut board).unwrap();

        assert!(flag.is_safe());
        assert_eq!(flag.position(), flag.get_base());
        assert_eq!(board.read(9, 12), Ok(Cell::Empty));
        assert_eq!(board.read(5, 5), Ok(Cell::Team1));
    }

    #[test]
    fn test_capture_drop_lifecycle() {
        let mut board = Board::new(8, 8);
        let mut flag = placed(&mut board, 1, 1);

        flag.drop_at_current();
        assert_eq!(flag.state(), FlagState::AtBase);

        assert!(flag.capture());
        assert!(!flag.capture());
        flag.move_to(3, 1, &mut board).unwrap();

        flag.drop_at_current();
        assert_eq!(flag.state(), FlagState::Dropped);
        assert!(!flag.is_captured());
        assert!(!flag.is_safe());

        assert!(flag.capture());
        assert_eq!(flag.state(), FlagState::Carried);
    }

    #[test]
    fn test_dropped_flag_returned_by_teammate() {
        let mut board = Board::new(8, 8);
        let mut flag = placed(&mut board, 1, 1);
        flag.capture();
        flag.move_to(4, 4, &mut board).unwrap();
        flag.drop_at_current();

        flag.reset_pos(&mut board).unwrap();
        assert_eq!(flag.state(), FlagState::AtBase);
        assert!(flag.is_safe());
    }
}
