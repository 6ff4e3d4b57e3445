use std::collections::{HashSet, VecDeque};

use crate::{
    Position,
    direction::{Action, Direction},
    map::GridBounds,
};

/// Order in which the neighbors of a dequeued cell are queued.
pub const EXPANSION_ORDER: [Direction; 4] = [
    Direction::Right,
    Direction::Down,
    Direction::Left,
    Direction::Up,
];

/// Lifecycle of one agent's exploration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorerPhase {
    AwaitingFirstObservation,
    Exploring,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExploreError {
    #[error("No observation has seeded the frontier yet")]
    NotSeeded,
    #[error("Frontier is exhausted")]
    Exhausted,
}

/// Result of advancing the search by one cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExploreStep {
    /// The cell taken from the front of the frontier.
    pub current: Position,
    /// Step from the previously dequeued cell, or `Stay` when the two are not adjacent.
    pub action: Action,
    /// Neighbors added to the back of the frontier.
    pub enqueued: Vec<Position>,
}

/// Breadth-first walk over unexplored cells for a single agent.
///
/// Knows nothing about coins or walls. The frontier is FIFO, holds no duplicates,
/// and never holds a cell that has already been explored.
#[derive(Debug, Clone)]
pub struct FrontierExplorer {
    frontier: VecDeque<Position>,
    queued: HashSet<Position>,
    explored: HashSet<Position>,
    previous: Option<Position>,
    phase: ExplorerPhase,
}

impl Default for FrontierExplorer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrontierExplorer {
    pub fn new() -> Self {
        FrontierExplorer {
            frontier: VecDeque::new(),
            queued: HashSet::new(),
            explored: HashSet::new(),
            previous: None,
            phase: ExplorerPhase::AwaitingFirstObservation,
        }
    }

    /// Queues the agent's first observed position. Later calls are ignored.
    ///
    /// Returns `true` if the frontier was seeded by this call.
    pub fn seed(&mut self, start: Position) -> bool {
        if self.phase != ExplorerPhase::AwaitingFirstObservation {
            return false;
        }
        self.frontier.push_back(start);
        self.queued.insert(start);
        self.phase = ExplorerPhase::Exploring;
        true
    }

    /// Dequeues the oldest frontier cell, marks it explored and queues its unexplored
    /// in-grid neighbors.
    pub fn step(&mut self, bounds: GridBounds) -> Result<ExploreStep, ExploreError> {
        match self.phase {
            ExplorerPhase::AwaitingFirstObservation => return Err(ExploreError::NotSeeded),
            ExplorerPhase::Exhausted => return Err(ExploreError::Exhausted),
            ExplorerPhase::Exploring => {}
        }

        let Some(current) = self.frontier.pop_front() else {
            self.phase = ExplorerPhase::Exhausted;
            return Err(ExploreError::Exhausted);
        };
        self.queued.remove(&current);
        self.explored.insert(current);

        let mut enqueued = Vec::new();
        for (_, neighbor) in bounds.neighbors(current, &EXPANSION_ORDER) {
            if self.explored.contains(&neighbor) || self.queued.contains(&neighbor) {
                continue;
            }
            self.frontier.push_back(neighbor);
            self.queued.insert(neighbor);
            enqueued.push(neighbor);
        }

        let action = Action::from(
            self.previous
                .and_then(|previous| Direction::between(previous, current)),
        );
        self.previous = Some(current);

        Ok(ExploreStep {
            current,
            action,
            enqueued,
        })
    }

    /// Moves an exploring agent with nothing left to visit into `Exhausted`.
    ///
    /// Returns `true` if the agent is (now) exhausted.
    pub fn check_exhausted(&mut self) -> bool {
        if self.phase == ExplorerPhase::Exploring && self.frontier.is_empty() {
            self.phase = ExplorerPhase::Exhausted;
        }
        self.phase == ExplorerPhase::Exhausted
    }

    pub fn phase(&self) -> ExplorerPhase {
        self.phase
    }

    pub fn frontier(&self) -> impl Iterator<Item = &Position> {
        self.frontier.iter()
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_explored(&self, pos: Position) -> bool {
        self.explored.contains(&pos)
    }

    pub fn explored_len(&self) -> usize {
        self.explored.len()
    }
}
