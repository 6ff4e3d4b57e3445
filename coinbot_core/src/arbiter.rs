use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Position,
    direction::{Action, Direction},
    map::GridModel,
};

/// Order in which replacement moves are tried.
pub const PRIORITY: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Right,
    Direction::Left,
];

/// Which other agents count as obstacles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionScope {
    pub teammates: bool,
    pub enemies: bool,
}

impl Default for CollisionScope {
    fn default() -> Self {
        CollisionScope {
            teammates: true,
            enemies: true,
        }
    }
}

impl CollisionScope {
    pub const NONE: CollisionScope = CollisionScope {
        teammates: false,
        enemies: false,
    };

    pub fn includes(&self, is_teammate: bool) -> bool {
        if is_teammate { self.teammates } else { self.enemies }
    }
}

/// Vetoes moves into walls, off the field, or onto a cell another agent was last seen on.
///
/// Positions are last-known snapshots, not the moves others are about to make this
/// round: two agents can still pick the same free cell simultaneously.
#[derive(Debug, Clone)]
pub struct CollisionArbiter<'a> {
    grid: GridModel<'a>,
    occupied: HashSet<Position>,
}

impl<'a> CollisionArbiter<'a> {
    pub fn new(grid: GridModel<'a>, occupied: impl IntoIterator<Item = Position>) -> Self {
        CollisionArbiter {
            grid,
            occupied: occupied.into_iter().collect(),
        }
    }

    /// Target cell of `direction` if it is on the field, not a wall and not occupied.
    pub fn safe_target(&self, from: Position, direction: Direction) -> Option<Position> {
        self.grid
            .open_neighbor(from, direction)
            .filter(|target| !self.occupied.contains(target))
    }

    pub fn is_safe(&self, from: Position, direction: Direction) -> bool {
        self.safe_target(from, direction).is_some()
    }

    /// Safe directions in priority order.
    pub fn safe_directions(&self, from: Position) -> impl Iterator<Item = Direction> + '_ {
        PRIORITY
            .into_iter()
            .filter(move |dir| self.is_safe(from, *dir))
    }

    /// Picks the first safe direction by priority, or stays when boxed in.
    pub fn select(&self, from: Position) -> Action {
        Action::from(self.safe_directions(from).next())
    }

    /// Keeps a safe proposal; replaces an unsafe one with [`CollisionArbiter::select`].
    pub fn filter(&self, from: Position, proposed: Action) -> Action {
        match proposed {
            Action::Stay => Action::Stay,
            Action::Move(dir) if self.is_safe(from, dir) => proposed,
            Action::Move(dir) => {
                let replacement = self.select(from);
                debug!(%from, rejected = %dir, ?replacement, "Arbiter overrode move");
                replacement
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{GridBounds, WallSet};

    fn arbiter<'a>(walls: &'a WallSet, occupied: &[Position]) -> CollisionArbiter<'a> {
        CollisionArbiter::new(
            GridModel::new(GridBounds::default(), walls),
            occupied.iter().copied(),
        )
    }

    #[test]
    fn never_targets_a_neighbors_cell() {
        let walls = WallSet::new();
        let a = Position::new(3, 3);
        let b = Position::new(3, 4);
        let arbiter = arbiter(&walls, &[b]);
        for dir in Direction::ALL {
            let chosen = arbiter.filter(a, Action::Move(dir));
            assert_ne!(chosen.target(a), Some(b), "proposal {dir} led onto B");
        }
        assert!(!arbiter.is_safe(a, Direction::Right));
        assert_eq!(
            arbiter.filter(a, Action::Move(Direction::Right)),
            Action::Move(Direction::Up)
        );
    }

    #[test]
    fn mutual_visibility_is_symmetric() {
        let walls = WallSet::new();
        let a = Position::new(3, 3);
        let b = Position::new(3, 4);
        let for_b = arbiter(&walls, &[a]);
        for dir in Direction::ALL {
            assert_ne!(for_b.filter(b, Action::Move(dir)).target(b), Some(a));
        }
    }

    #[test]
    fn walled_in_corner_stays_instead_of_moving_left() {
        let walls: WallSet = [Position::new(1, 0), Position::new(0, 1)].into_iter().collect();
        let arbiter = arbiter(&walls, &[]);
        let corner = Position::new(0, 0);
        assert_eq!(arbiter.select(corner), Action::Stay);
        for dir in Direction::ALL {
            assert_eq!(arbiter.filter(corner, Action::Move(dir)), Action::Stay);
        }
    }

    #[test]
    fn boxed_in_by_agents_stays() {
        let walls = WallSet::new();
        let center = Position::new(5, 5);
        let arbiter = arbiter(
            &walls,
            &[
                Position::new(4, 5),
                Position::new(6, 5),
                Position::new(5, 4),
                Position::new(5, 6),
            ],
        );
        assert_eq!(arbiter.select(center), Action::Stay);
    }

    #[test]
    fn selection_follows_priority() {
        let walls: WallSet = [Position::new(4, 5)].into_iter().collect();
        let arbiter = arbiter(&walls, &[Position::new(6, 5)]);
        let from = Position::new(5, 5);
        assert_eq!(
            arbiter.safe_directions(from).collect::<Vec<_>>(),
            vec![Direction::Right, Direction::Left]
        );
        assert_eq!(arbiter.select(from), Action::Move(Direction::Right));
    }

    #[test]
    fn stay_and_safe_moves_pass_through() {
        let walls = WallSet::new();
        let arbiter = arbiter(&walls, &[Position::new(0, 0)]);
        let from = Position::new(5, 5);
        assert_eq!(arbiter.filter(from, Action::Stay), Action::Stay);
        assert_eq!(
            arbiter.filter(from, Action::Move(Direction::Left)),
            Action::Move(Direction::Left)
        );
    }

    #[test]
    fn stale_positions_allow_a_same_cell_race() {
        // A at (2,2) and B at (2,4) both see (2,3) empty: each is free to take it.
        let walls = WallSet::new();
        let a = Position::new(2, 2);
        let b = Position::new(2, 4);
        let target = Position::new(2, 3);

        let for_a = arbiter(&walls, &[b]);
        let for_b = arbiter(&walls, &[a]);
        let a_move = for_a.filter(a, Action::Move(Direction::Right));
        let b_move = for_b.filter(b, Action::Move(Direction::Left));
        assert_eq!(a_move.target(a), Some(target));
        assert_eq!(b_move.target(b), Some(target));
    }

    #[test]
    fn scope_selects_agent_groups() {
        assert!(CollisionScope::default().includes(true));
        assert!(CollisionScope::default().includes(false));
        let teammates_only = CollisionScope {
            teammates: true,
            enemies: false,
        };
        assert!(teammates_only.includes(true));
        assert!(!teammates_only.includes(false));
        assert!(!CollisionScope::NONE.includes(true));
    }
}
