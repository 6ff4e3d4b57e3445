use tracing::trace;

use crate::{
    Position,
    direction::{Action, Direction},
    map::GridModel,
};

/// Scan order when the step toward the chosen coin is blocked.
pub const BLOCKED_SCAN: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
];

/// Scan order when no coin is in view.
pub const IDLE_SCAN: [Direction; 4] = [
    Direction::Right,
    Direction::Down,
    Direction::Left,
    Direction::Up,
];

/// Closest coin by straight-line distance. The first of equally close coins wins.
pub fn nearest_coin(from: Position, coins: &[Position]) -> Option<Position> {
    let mut best: Option<(Position, f64)> = None;
    for coin in coins {
        let distance = from.euclidean_distance(coin);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((*coin, distance)),
        }
    }
    best.map(|(coin, _)| coin)
}

/// The single step toward `target`, settling the row first and the column second.
///
/// Returns `None` when already standing on the target.
pub fn step_toward(from: Position, target: Position) -> Option<Direction> {
    use std::cmp::Ordering::*;

    match (target.x.cmp(&from.x), target.y.cmp(&from.y)) {
        (Greater, _) => Some(Direction::Down),
        (Less, _) => Some(Direction::Up),
        (Equal, Greater) => Some(Direction::Right),
        (Equal, Less) => Some(Direction::Left),
        (Equal, Equal) => None,
    }
}

/// First direction in `order` leading to an enterable cell.
pub fn first_open(grid: &GridModel<'_>, from: Position, order: &[Direction]) -> Option<Direction> {
    order
        .iter()
        .copied()
        .find(|dir| grid.open_neighbor(from, *dir).is_some())
}

/// Steers toward the nearest visible coin while refusing to walk into known walls
/// or off the field.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyPolicy;

impl GreedyPolicy {
    pub fn decide(&self, from: Position, coins: &[Position], grid: &GridModel<'_>) -> Action {
        let Some(coin) = nearest_coin(from, coins) else {
            let action = Action::from(first_open(grid, from, &IDLE_SCAN));
            trace!(%from, ?action, "No coin in view, scanning");
            return action;
        };

        let Some(toward) = step_toward(from, coin) else {
            return Action::Stay;
        };

        if grid.open_neighbor(from, toward).is_some() {
            trace!(%from, %coin, %toward, "Heading for coin");
            return Action::Move(toward);
        }

        let action = Action::from(first_open(grid, from, &BLOCKED_SCAN));
        trace!(%from, %coin, %toward, ?action, "Direct step blocked");
        action
    }
}
