use std::collections::{BTreeSet, btree_set};

use serde::{Deserialize, Serialize};

use crate::{Position, direction::Direction};

/// Side length of the game field.
pub const DEFAULT_GRID_SIZE: usize = 10;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },
}

/// Static dimensions of the field.
///
/// `width` bounds the row coordinate `x`, `height` bounds the column coordinate `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBounds {
    pub width: usize,
    pub height: usize,
}

impl Default for GridBounds {
    fn default() -> Self {
        GridBounds {
            width: DEFAULT_GRID_SIZE,
            height: DEFAULT_GRID_SIZE,
        }
    }
}

impl GridBounds {
    pub const fn new(width: usize, height: usize) -> Self {
        GridBounds { width, height }
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// The cell one step from `pos` in `direction`, or `None` if it leaves the grid.
    pub fn neighbor(&self, pos: Position, direction: Direction) -> Option<Position> {
        let (dx, dy) = direction.delta();
        pos.offset(dx, dy).filter(|next| self.contains(*next))
    }

    /// In-grid neighbors of `pos`, visited in the given direction order.
    pub fn neighbors<'a>(
        &'a self,
        pos: Position,
        order: &'a [Direction],
    ) -> impl Iterator<Item = (Direction, Position)> + 'a {
        order
            .iter()
            .filter_map(move |dir| self.neighbor(pos, *dir).map(|next| (*dir, next)))
    }

    /// Converts raw signed coordinates into a position on this grid.
    pub fn try_position(&self, x: i64, y: i64) -> Result<Position, GridError> {
        let out_of_bounds = GridError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        };
        let (Ok(ux), Ok(uy)) = (usize::try_from(x), usize::try_from(y)) else {
            return Err(out_of_bounds);
        };
        let pos = Position::new(ux, uy);
        if self.contains(pos) {
            Ok(pos)
        } else {
            Err(out_of_bounds)
        }
    }

    /// Number of cells on the field.
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Known impassable cells. Grows for the lifetime of a session and never shrinks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallSet {
    cells: BTreeSet<Position>,
}

impl WallSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a wall. Returns `true` if it was not known before.
    pub fn insert(&mut self, pos: Position) -> bool {
        self.cells.insert(pos)
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.cells.contains(&pos)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, Position> {
        self.cells.iter()
    }
}

impl Extend<Position> for WallSet {
    fn extend<I: IntoIterator<Item = Position>>(&mut self, iter: I) {
        self.cells.extend(iter);
    }
}

impl FromIterator<Position> for WallSet {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        WallSet {
            cells: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a WallSet {
    type Item = &'a Position;
    type IntoIter = btree_set::Iter<'a, Position>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}

/// Borrowed view of the field: its bounds plus the walls known so far.
#[derive(Debug, Clone, Copy)]
pub struct GridModel<'a> {
    pub bounds: GridBounds,
    pub walls: &'a WallSet,
}

impl<'a> GridModel<'a> {
    pub fn new(bounds: GridBounds, walls: &'a WallSet) -> Self {
        GridModel { bounds, walls }
    }

    /// A cell can be entered if it lies on the grid and is not a known wall.
    pub fn is_open(&self, pos: Position) -> bool {
        self.bounds.contains(pos) && !self.walls.contains(pos)
    }

    /// The neighbor in `direction` if it can be entered.
    pub fn open_neighbor(&self, pos: Position, direction: Direction) -> Option<Position> {
        self.bounds
            .neighbor(pos, direction)
            .filter(|next| !self.walls.contains(*next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbor_respects_bounds() {
        let bounds = GridBounds::default();
        let corner = Position::new(0, 0);
        assert_eq!(bounds.neighbor(corner, Direction::Up), None);
        assert_eq!(bounds.neighbor(corner, Direction::Left), None);
        assert_eq!(
            bounds.neighbor(corner, Direction::Down),
            Some(Position::new(1, 0))
        );
        let far = Position::new(9, 9);
        assert_eq!(bounds.neighbor(far, Direction::Down), None);
        assert_eq!(bounds.neighbor(far, Direction::Right), None);
    }

    #[test]
    fn try_position_rejects_negative_and_large() {
        let bounds = GridBounds::default();
        assert_eq!(bounds.try_position(3, 4), Ok(Position::new(3, 4)));
        assert!(matches!(
            bounds.try_position(-1, 4),
            Err(GridError::OutOfBounds { x: -1, y: 4, .. })
        ));
        assert!(bounds.try_position(0, 10).is_err());
    }

    #[test]
    fn walls_only_grow() {
        let mut walls = WallSet::new();
        assert!(walls.insert(Position::new(1, 0)));
        assert!(!walls.insert(Position::new(1, 0)));
        walls.extend([Position::new(2, 2), Position::new(1, 0)]);
        assert_eq!(walls.len(), 2);
    }

    #[test]
    fn open_cells() {
        let walls: WallSet = [Position::new(1, 0)].into_iter().collect();
        let model = GridModel::new(GridBounds::default(), &walls);
        assert!(!model.is_open(Position::new(1, 0)));
        assert!(!model.is_open(Position::new(10, 0)));
        assert!(model.is_open(Position::new(0, 1)));
        assert_eq!(model.open_neighbor(Position::new(0, 0), Direction::Down), None);
    }
}
