use std::fmt;

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod arbiter;
pub mod arena;
pub mod config;
pub mod direction;
pub mod engine;
pub mod explorer;
pub mod greedy;
pub mod map;
pub mod observation;
pub mod protocol;

/// Identifier of a player, as used in the lobby topics (e.g. `"Player1"`).
pub type AgentId = String;

/// Team name a player registered with.
pub type TeamName = String;

/// Represents a 2D coordinate.
///
/// `x` is the row index and `y` the column index, matching the game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Straight-line distance, used to rank coins.
    pub fn euclidean_distance(&self, other: &Position) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Returns manhattan distance between two positions
    pub fn manhattan_distance(&self, other: &Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Offsets the position by a signed displacement.
    ///
    /// Returns `None` if either coordinate would become negative.
    pub fn offset(&self, dx: isize, dy: isize) -> Option<Position> {
        Some(Position {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
