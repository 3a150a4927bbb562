use crate::board::BoardError;
use serde::{Deserialize, Serialize};

/// Straight wall segment stamped onto the board when a match is built.
///
/// Both endpoints are inclusive and given as `(y, x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallPosition {
    start_pos: (i32, i32),
    end_pos: (i32, i32),
}

impl WallPosition {
    pub fn new(start_pos: (i32, i32), end_pos: (i32, i32)) -> Result<Self, BoardError> {
        if start_pos.0 != end_pos.0 && start_pos.1 != end_pos.1 {
            return Err(BoardError::DiagonalWall);
        }
        Ok(Self { start_pos, end_pos })
    }

    /// Start of the segment as `(y, x)`.
    pub fn start_pos(&self) -> (i32, i32) {
        self.start_pos
    }

    /// End of the segment as `(y, x)`.
    pub fn end_pos(&self) -> (i32, i32) {
        self.end_pos
    }

    /// Every `(y, x)` covered by the segment, endpoints included.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> {
        let (y0, x0) = self.start_pos;
        let (y1, x1) = self.end_pos;
        let (ys, xs) = (y0.min(y1)..=y0.max(y1), x0.min(x1)..=x0.max(x1));
        ys.flat_map(move |y| xs.clone().map(move |x| (y, x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_keep_y_x_order() {
        let wall = WallPosition::new((2, 7), (2, 10)).unwrap();
        assert_eq!(wall.start_pos(), (2, 7));
        assert_eq!(wall.end_pos(), (2, 10));
    }

    #[test]
    fn test_horizontal_cells_inclusive() {
        let wall = WallPosition::new((3, 1), (3, 4)).unwrap();
        let cells: Vec<_> = wall.cells().collect();
        assert_eq!(cells, vec![(3, 1), (3, 2), (3, 3), (3, 4)]);
    }

    #[test]
    fn test_reversed_vertical_segment() {
        let wall = WallPosition::new((5, 0), (2, 0)).unwrap();
        let cells: Vec<_> = wall.cells().collect();
        assert_eq!(cells, vec![(2, 0), (3, 0), (4, 0), (5, 0)]);
    }

    #[test]
    fn test_single_cell_segment() {
        let wall = WallPosition::new((1, 1), (1, 1)).unwrap();
        assert_eq!(wall.cells().count(), 1);
    }

    #[test]
    fn test_diagonal_rejected() {
        assert_eq!(
            WallPosition::new((0, 0), (3, 3)),
            Err(BoardError::DiagonalWall)
        );
    }
}
