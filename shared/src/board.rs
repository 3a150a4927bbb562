//! Authoritative board, its per-tick change tracker, and the plain grid that
//! travels in snapshots and backs client replicas.
//!
//! Coordinates are always passed as `(x, y)` with `x` the column and `y` the
//! row. Storage is row-major, so the cell at `(x, y)` lives at
//! `y * width + x`. Wall segments and flag bases report `(y, x)` instead; the
//! conversion happens at those call sites.

use crate::cell::Cell;
use crate::wall::WallPosition;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("coordinate ({x}, {y}) is outside the board")]
    OutOfBounds { x: i32, y: i32 },
    #[error("wall segment must be horizontal or vertical")]
    DiagonalWall,
    #[error("grid of {height}x{width} cannot hold {len} cells")]
    SizeMismatch {
        height: usize,
        width: usize,
        len: usize,
    },
    #[error("board of {height}x{width} is too small for a match")]
    TooSmall { height: usize, width: usize },
    #[error("board of {height}x{width} does not fit in a snapshot frame")]
    TooLarge { height: usize, width: usize },
}

/// A single recorded cell write, in wire order `(x, y, value)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDelta {
    pub x: i32,
    pub y: i32,
    pub value: Cell,
}

impl CellDelta {
    pub fn new(x: i32, y: i32, value: Cell) -> Self {
        Self { x, y, value }
    }
}

impl From<(i32, i32, Cell)> for CellDelta {
    fn from((x, y, value): (i32, i32, Cell)) -> Self {
        Self { x, y, value }
    }
}

/// Fixed-size rectangular grid of cells, bounds checked on every access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridParts")]
pub struct Grid {
    height: usize,
    width: usize,
    cells: Vec<Cell>,
}

#[derive(Deserialize)]
struct GridParts {
    height: usize,
    width: usize,
    cells: Vec<Cell>,
}

impl TryFrom<GridParts> for Grid {
    type Error = BoardError;

    fn try_from(parts: GridParts) -> Result<Self, Self::Error> {
        Grid::from_cells(parts.height, parts.width, parts.cells)
    }
}

impl Grid {
    /// Creates a grid with every cell set to `fill`.
    pub fn filled(height: usize, width: usize, fill: Cell) -> Self {
        Self {
            height,
            width,
            cells: vec![fill; height * width],
        }
    }

    /// Builds a grid from row-major cells.
    pub fn from_cells(height: usize, width: usize, cells: Vec<Cell>) -> Result<Self, BoardError> {
        if height.checked_mul(width) != Some(cells.len()) {
            return Err(BoardError::SizeMismatch {
                height,
                width,
                len: cells.len(),
            });
        }
        Ok(Self {
            height,
            width,
            cells,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    fn index(&self, x: i32, y: i32) -> Result<usize, BoardError> {
        if self.contains(x, y) {
            Ok(y as usize * self.width + x as usize)
        } else {
            Err(BoardError::OutOfBounds { x, y })
        }
    }

    pub fn get(&self, x: i32, y: i32) -> Result<Cell, BoardError> {
        self.index(x, y).map(|i| self.cells[i])
    }

    pub fn set(&mut self, x: i32, y: i32, value: Cell) -> Result<(), BoardError> {
        let i = self.index(x, y)?;
        self.cells[i] = value;
        Ok(())
    }

    /// Cells of row `y`, left to right.
    pub fn row(&self, y: usize) -> Option<&[Cell]> {
        if y < self.height {
            Some(&self.cells[y * self.width..(y + 1) * self.width])
        } else {
            None
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width.max(1))
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// Replays recorded writes onto a grid in order.
///
/// Every coordinate is checked before the first write, so a rejected list
/// leaves the grid untouched.
pub fn apply_deltas(grid: &mut Grid, deltas: &[CellDelta]) -> Result<(), BoardError> {
    if let Some(bad) = deltas.iter().find(|d| !grid.contains(d.x, d.y)) {
        return Err(BoardError::OutOfBounds { x: bad.x, y: bad.y });
    }
    for delta in deltas {
        grid.set(delta.x, delta.y, delta.value)?;
    }
    Ok(())
}

/// Ordered log of the writes made during the current tick.
///
/// Writes to the same coordinate are kept individually; replay order is part
/// of the contract with clients.
#[derive(Debug, Default, Clone)]
pub struct DeltaTracker {
    deltas: Vec<CellDelta>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_delta(&mut self, x: i32, y: i32, value: Cell) {
        self.deltas.push(CellDelta { x, y, value });
    }

    /// Returns everything recorded since the last drain and starts a new log.
    pub fn drain(&mut self) -> Vec<CellDelta> {
        std::mem::take(&mut self.deltas)
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// The server's authoritative board.
///
/// All runtime mutation goes through [`Board::write`], which records the
/// change for the next outgoing delta.
#[derive(Debug, Clone)]
pub struct Board {
    grid: Grid,
    tracker: DeltaTracker,
}

impl Board {
    /// Creates a board of empty cells.
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            grid: Grid::filled(height, width, Cell::Empty),
            tracker: DeltaTracker::new(),
        }
    }

    /// Creates an empty board and stamps every wall segment onto it.
    ///
    /// Walls are layout, not gameplay, so nothing is recorded in the tracker.
    pub fn with_walls(
        height: usize,
        width: usize,
        walls: &[WallPosition],
    ) -> Result<Self, BoardError> {
        let mut board = Self::new(height, width);
        for wall in walls {
            for (y, x) in wall.cells() {
                board.stamp(x, y, Cell::Wall)?;
            }
        }
        Ok(board)
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.grid.contains(x, y)
    }

    pub fn read(&self, x: i32, y: i32) -> Result<Cell, BoardError> {
        self.grid.get(x, y)
    }

    /// Sets a cell and records the change. Out of range writes change nothing.
    pub fn write(&mut self, x: i32, y: i32, value: Cell) -> Result<(), BoardError> {
        self.grid.set(x, y, value)?;
        self.tracker.save_delta(x, y, value);
        Ok(())
    }

    /// Match-setup write that is not part of any tick's delta.
    pub fn stamp(&mut self, x: i32, y: i32, value: Cell) -> Result<(), BoardError> {
        self.grid.set(x, y, value)
    }

    pub fn drain_deltas(&mut self) -> Vec<CellDelta> {
        self.tracker.drain()
    }

    pub fn pending_deltas(&self) -> usize {
        self.tracker.len()
    }

    /// Copy of the full grid for bootstrap messages.
    pub fn snapshot(&self) -> Grid {
        self.grid.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new(21, 51);
        assert_eq!(board.height(), 21);
        assert_eq!(board.width(), 51);
        assert!(board.snapshot().cells().iter().all(|c| *c == Cell::Empty));
        assert_eq!(board.pending_deltas(), 0);
    }

    #[test]
    fn test_write_records_delta() {
        let mut board = Board::new(5, 7);
        board.write(6, 4, Cell::Bush).unwrap();

        assert_eq!(board.read(6, 4), Ok(Cell::Bush));
        assert_eq!(board.drain_deltas(), vec![CellDelta::new(6, 4, Cell::Bush)]);
        assert!(board.drain_deltas().is_empty());
    }

    #[test]
    fn test_out_of_bounds_write_rejected() {
        let mut board = Board::new(21, 51);
        let before = board.snapshot();

        assert_eq!(
            board.write(-1, 0, Cell::Empty),
            Err(BoardError::OutOfBounds { x: -1, y: 0 })
        );
        assert_eq!(
            board.write(0, 51, Cell::Empty),
            Err(BoardError::OutOfBounds { x: 0, y: 51 })
        );
        assert_eq!(
            board.write(51, 0, Cell::Wall),
            Err(BoardError::OutOfBounds { x: 51, y: 0 })
        );

        assert_eq!(board.snapshot(), before);
        assert!(board.drain_deltas().is_empty());
    }

    #[test]
    fn test_repeated_writes_are_not_coalesced() {
        let mut board = Board::new(3, 3);
        board.write(1, 1, Cell::Team1).unwrap();
        board.write(1, 1, Cell::DashTrailA).unwrap();
        board.write(1, 1, Cell::Empty).unwrap();

        let deltas = board.drain_deltas();
        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[0].value, Cell::Team1);
        assert_eq!(deltas[2].value, Cell::Empty);
        assert_eq!(board.read(1, 1), Ok(Cell::Empty));
    }

    #[test]
    fn test_delta_replay_matches_board() {
        let mut board = Board::new(6, 9);
        board.stamp(0, 0, Cell::Wall).unwrap();
        let start = board.snapshot();

        board.write(2, 3, Cell::Team1).unwrap();
        board.write(2, 3, Cell::Empty).unwrap();
        board.write(8, 5, Cell::Flag1).unwrap();
        board.write(4, 0, Cell::FreezeEffect).unwrap();

        let mut replica = start.clone();
        apply_deltas(&mut replica, &board.drain_deltas()).unwrap();
        assert_eq!(replica, board.snapshot());
    }

    #[test]
    fn test_row_major_indexing() {
        let mut grid = Grid::filled(2, 3, Cell::Empty);
        grid.set(2, 0, Cell::Tower).unwrap();
        grid.set(0, 1, Cell::Bush).unwrap();

        assert_eq!(grid.cells()[2], Cell::Tower);
        assert_eq!(grid.cells()[3], Cell::Bush);
        assert_eq!(grid.row(1).unwrap(), &[Cell::Bush, Cell::Empty, Cell::Empty]);
        assert!(grid.row(2).is_none());
        assert_eq!(grid.rows().count(), 2);
    }

    #[test]
    fn test_apply_deltas_is_all_or_nothing() {
        let mut grid = Grid::filled(2, 2, Cell::Empty);
        let deltas = vec![
            CellDelta::new(0, 0, Cell::Wall),
            CellDelta::new(2, 0, Cell::Wall),
        ];

        assert_eq!(
            apply_deltas(&mut grid, &deltas),
            Err(BoardError::OutOfBounds { x: 2, y: 0 })
        );
        assert_eq!(grid.get(0, 0), Ok(Cell::Empty));
    }

    #[test]
    fn test_with_walls_is_untracked() {
        let walls = vec![
            WallPosition::new((0, 0), (0, 4)).unwrap(),
            WallPosition::new((1, 4), (3, 4)).unwrap(),
        ];
        let mut board = Board::with_walls(4, 5, &walls).unwrap();

        for x in 0..5 {
            assert_eq!(board.read(x, 0), Ok(Cell::Wall));
        }
        assert_eq!(board.read(4, 3), Ok(Cell::Wall));
        assert_eq!(board.read(3, 3), Ok(Cell::Empty));
        assert!(board.drain_deltas().is_empty());
    }

    #[test]
    fn test_with_walls_rejects_out_of_range_segment() {
        let walls = vec![WallPosition::new((0, 0), (0, 9)).unwrap()];
        assert!(matches!(
            Board::with_walls(4, 5, &walls),
            Err(BoardError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_grid_deserialize_checks_size() {
        let grid = Grid::filled(2, 2, Cell::Bush);
        let bytes = bincode::serialize(&grid).unwrap();
        let decoded: Grid = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, grid);

        assert_eq!(
            Grid::from_cells(2, 2, vec![Cell::Empty; 3]),
            Err(BoardError::SizeMismatch {
                height: 2,
                width: 2,
                len: 3
            })
        );
    }
}
