//! Cell values stored per board coordinate and the two playing teams.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// Value occupying one board coordinate.
///
/// The discriminants are the wire codes; they must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Cell {
    Wall = 0,
    Empty = 1,
    Bush = 2,
    BaseDestination = 3,
    Team1 = 4,
    Team4 = 5,
    Flag1 = 6,
    Tower = 7,
    DashTrailA = 8,
    DashTrailB = 9,
    DashTrailC = 10,
    DashTrailD = 11,
    FreezeEffect = 12,
}

impl Cell {
    pub const ALL: [Cell; 13] = [
        Cell::Wall,
        Cell::Empty,
        Cell::Bush,
        Cell::BaseDestination,
        Cell::Team1,
        Cell::Team4,
        Cell::Flag1,
        Cell::Tower,
        Cell::DashTrailA,
        Cell::DashTrailB,
        Cell::DashTrailC,
        Cell::DashTrailD,
        Cell::FreezeEffect,
    ];

    /// Wire code of this cell.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether a player may step onto a cell holding this value.
    ///
    /// Flags are handled by the match rules and are not passable here.
    pub fn is_passable(self) -> bool {
        match self {
            Cell::Empty
            | Cell::Bush
            | Cell::BaseDestination
            | Cell::DashTrailA
            | Cell::DashTrailB
            | Cell::DashTrailC
            | Cell::DashTrailD
            | Cell::FreezeEffect => true,
            Cell::Wall | Cell::Team1 | Cell::Team4 | Cell::Flag1 | Cell::Tower => false,
        }
    }

    /// Effects that only live for a single tick before the terrain is restored.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Cell::DashTrailA
                | Cell::DashTrailB
                | Cell::DashTrailC
                | Cell::DashTrailD
                | Cell::FreezeEffect
        )
    }

    /// Dash trail variant for the n-th cell behind a dashing player.
    pub fn dash_trail(step: usize) -> Cell {
        match step % 4 {
            0 => Cell::DashTrailA,
            1 => Cell::DashTrailB,
            2 => Cell::DashTrailC,
            _ => Cell::DashTrailD,
        }
    }
}

impl From<Cell> for u8 {
    fn from(cell: Cell) -> Self {
        cell.code()
    }
}

/// Raised when a wire code has no matching [`Cell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown cell code {0}")]
pub struct UnknownCellCode(pub u8);

impl TryFrom<u8> for Cell {
    type Error = UnknownCellCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Cell::ALL
            .get(code as usize)
            .copied()
            .ok_or(UnknownCellCode(code))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// One of the two sides of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Blue,
    Red,
}

impl Team {
    pub const BOTH: [Team; 2] = [Team::Blue, Team::Red];

    /// Board marker stamped where a player of this team stands.
    pub fn marker(self) -> Cell {
        match self {
            Team::Blue => Cell::Team1,
            Team::Red => Cell::Team4,
        }
    }

    pub fn opponent(self) -> Team {
        match self {
            Team::Blue => Team::Red,
            Team::Red => Team::Blue,
        }
    }

    /// Slot of this team in `[blue, red]` score and health pairs.
    pub fn index(self) -> usize {
        match self {
            Team::Blue => 0,
            Team::Red => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_declaration_order() {
        for (index, cell) in Cell::ALL.iter().enumerate() {
            assert_eq!(cell.code() as usize, index);
            assert_eq!(Cell::try_from(index as u8), Ok(*cell));
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert_eq!(Cell::try_from(13), Err(UnknownCellCode(13)));
        assert_eq!(Cell::try_from(255), Err(UnknownCellCode(255)));
    }

    #[test]
    fn test_cell_serializes_as_single_byte() {
        let bytes = bincode::serialize(&Cell::FreezeEffect).unwrap();
        assert_eq!(bytes, vec![12]);

        let decoded: Result<Cell, _> = bincode::deserialize(&[42u8]);
        assert!(decoded.is_err());
    }

    #[test]
    fn test_passable_cells() {
        assert!(Cell::Empty.is_passable());
        assert!(Cell::Bush.is_passable());
        assert!(Cell::DashTrailC.is_passable());
        assert!(!Cell::Wall.is_passable());
        assert!(!Cell::Tower.is_passable());
        assert!(!Cell::Team4.is_passable());
    }

    #[test]
    fn test_dash_trail_cycles() {
        assert_eq!(Cell::dash_trail(0), Cell::DashTrailA);
        assert_eq!(Cell::dash_trail(3), Cell::DashTrailD);
        assert_eq!(Cell::dash_trail(4), Cell::DashTrailA);
        assert!(Cell::dash_trail(2).is_transient());
    }

    #[test]
    fn test_team_helpers() {
        assert_eq!(Team::Blue.marker(), Cell::Team1);
        assert_eq!(Team::Red.marker(), Cell::Team4);
        assert_eq!(Team::Blue.opponent(), Team::Red);
        assert_eq!(Team::Red.index(), 1);
    }
}
