//! Mapping between unit displacements and move symbols.
//!
//! Axis convention, used by every policy: `x` is the row, `y` the column.
//!
//! | symbol  | (dx, dy) |
//! |---------|----------|
//! | `UP`    | (-1, 0)  |
//! | `DOWN`  | (+1, 0)  |
//! | `LEFT`  | (0, -1)  |
//! | `RIGHT` | (0, +1)  |

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Position;

/// One of the four move commands accepted by the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown move symbol '{0}', expected UP, DOWN, LEFT or RIGHT")]
pub struct ParseDirectionError(pub String);

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit displacement `(dx, dy)` of this direction.
    pub const fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }

    /// Inverse of [`Direction::delta`]. Anything that is not a unit step yields `None`.
    pub const fn from_delta(dx: isize, dy: isize) -> Option<Direction> {
        match (dx, dy) {
            (-1, 0) => Some(Direction::Up),
            (1, 0) => Some(Direction::Down),
            (0, -1) => Some(Direction::Left),
            (0, 1) => Some(Direction::Right),
            _ => None,
        }
    }

    /// Direction of the single step leading from `src` to `dst`, if they are 4-adjacent.
    pub fn between(src: Position, dst: Position) -> Option<Direction> {
        let dx = dst.x as isize - src.x as isize;
        let dy = dst.y as isize - src.y as isize;
        Direction::from_delta(dx, dy)
    }

    /// The literal published on the move topic.
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            "LEFT" => Ok(Direction::Left),
            "RIGHT" => Ok(Direction::Right),
            other => Err(ParseDirectionError(other.to_string())),
        }
    }
}

/// Outcome of a decision: step in a direction, or stay where we are.
///
/// Resting publishes nothing for that agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Stay,
    Move(Direction),
}

impl Action {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Action::Stay => None,
            Action::Move(dir) => Some(dir),
        }
    }

    /// Where the agent ends up if the action is applied unobstructed.
    pub fn target(self, from: Position) -> Option<Position> {
        match self {
            Action::Stay => Some(from),
            Action::Move(dir) => {
                let (dx, dy) = dir.delta();
                from.offset(dx, dy)
            }
        }
    }
}

impl From<Option<Direction>> for Action {
    fn from(dir: Option<Direction>) -> Self {
        dir.map_or(Action::Stay, Action::Move)
    }
}
