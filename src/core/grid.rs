//! Board Geometry
//!
//! Integer grid primitives: cells, direction vectors, bounds checks and
//! line walks. Everything here is pure and allocation-free except `walk`,
//! which collects the traversed cells.

use serde::{Serialize, Deserialize};

/// Default board width (columns).
pub const BOARD_WIDTH: i32 = 5;

/// Default board height (rows).
pub const BOARD_HEIGHT: i32 = 3;

// =============================================================================
// CELL
// =============================================================================

/// A board coordinate. `x` grows to the right, `y` grows downward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
}

impl Cell {
    /// Create a cell.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset this cell by a direction vector (no bounds check).
    #[inline]
    pub fn offset(self, dir: Direction) -> Cell {
        let (dx, dy) = dir.delta();
        Cell::new(self.x + dx, self.y + dy)
    }

    /// Same row (the basic attack's alignment axis).
    #[inline]
    pub fn same_row(self, other: Cell) -> bool {
        self.y == other.y
    }

    /// Chebyshev (king-move) distance.
    #[inline]
    pub fn chebyshev(self, other: Cell) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// Exactly one step away on both axes.
    #[inline]
    pub fn is_diagonal_neighbor(self, other: Cell) -> bool {
        (self.x - other.x).abs() == 1 && (self.y - other.y).abs() == 1
    }
}

// =============================================================================
// DIRECTION
// =============================================================================

/// One of the four orthogonal directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Toward row 0
    Up,
    /// Toward the last row
    Down,
    /// Toward column 0
    Left,
    /// Toward the last column
    Right,
}

impl Direction {
    /// All directions, in a fixed order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit vector `(dx, dy)`.
    #[inline]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Horizontal direction from `from` toward `to`.
    ///
    /// Same column falls back to `Right`.
    pub fn toward_column(from: Cell, to: Cell) -> Direction {
        if to.x < from.x {
            Direction::Left
        } else {
            Direction::Right
        }
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// Immutable `width x height` grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Number of columns
    pub width: i32,
    /// Number of rows
    pub height: i32,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(BOARD_WIDTH, BOARD_HEIGHT)
    }
}

impl Board {
    /// Create a board.
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Check `0 <= x < w` and `0 <= y < h`.
    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.y >= 0 && cell.x < self.width && cell.y < self.height
    }

    /// Neighbouring cell in `dir`, or `None` if it would leave the board.
    #[inline]
    pub fn step(&self, from: Cell, dir: Direction) -> Option<Cell> {
        let next = from.offset(dir);
        self.contains(next).then_some(next)
    }

    /// Cells traversed from `from` (exclusive) in `dir` up to the edge.
    pub fn walk(&self, from: Cell, dir: Direction) -> Vec<Cell> {
        let mut cells = Vec::new();
        let mut cursor = from;
        while let Some(next) = self.step(cursor, dir) {
            cells.push(next);
            cursor = next;
        }
        cells
    }

    /// Every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Cell::new(x, y)))
    }

    /// Total number of cells.
    pub fn area(&self) -> usize {
        (self.width.max(0) * self.height.max(0)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_bounds() {
        let board = Board::default();
        assert!(board.contains(Cell::new(0, 0)));
        assert!(board.contains(Cell::new(4, 2)));
        assert!(!board.contains(Cell::new(5, 0)));
        assert!(!board.contains(Cell::new(0, 3)));
        assert!(!board.contains(Cell::new(-1, 1)));
    }

    #[test]
    fn test_step_rejects_edges() {
        let board = Board::default();
        assert_eq!(board.step(Cell::new(0, 1), Direction::Left), None);
        assert_eq!(board.step(Cell::new(0, 0), Direction::Up), None);
        assert_eq!(board.step(Cell::new(0, 1), Direction::Right), Some(Cell::new(1, 1)));
        assert_eq!(board.step(Cell::new(2, 1), Direction::Down), Some(Cell::new(2, 2)));
    }

    #[test]
    fn test_walk_to_edge() {
        let board = Board::default();
        let cells = board.walk(Cell::new(1, 1), Direction::Right);
        assert_eq!(cells, vec![Cell::new(2, 1), Cell::new(3, 1), Cell::new(4, 1)]);

        let cells = board.walk(Cell::new(1, 1), Direction::Left);
        assert_eq!(cells, vec![Cell::new(0, 1)]);

        assert!(board.walk(Cell::new(4, 0), Direction::Right).is_empty());
    }

    #[test]
    fn test_toward_column() {
        let a = Cell::new(2, 0);
        assert_eq!(Direction::toward_column(a, Cell::new(0, 2)), Direction::Left);
        assert_eq!(Direction::toward_column(a, Cell::new(4, 0)), Direction::Right);
        // Same column uses the default
        assert_eq!(Direction::toward_column(a, Cell::new(2, 2)), Direction::Right);
    }

    #[test]
    fn test_distance_helpers() {
        let a = Cell::new(1, 1);
        assert_eq!(a.chebyshev(Cell::new(3, 2)), 2);
        assert!(a.is_diagonal_neighbor(Cell::new(2, 2)));
        assert!(a.is_diagonal_neighbor(Cell::new(0, 0)));
        assert!(!a.is_diagonal_neighbor(Cell::new(2, 1)));
        assert!(!a.is_diagonal_neighbor(Cell::new(3, 3)));
        assert!(a.same_row(Cell::new(4, 1)));
    }

    #[test]
    fn test_cells_row_major() {
        let board = Board::default();
        let cells: Vec<Cell> = board.cells().collect();
        assert_eq!(cells.len(), board.area());
        assert_eq!(cells[0], Cell::new(0, 0));
        assert_eq!(cells[5], Cell::new(0, 1));
        assert_eq!(cells[14], Cell::new(4, 2));
    }
}
