//! Local stand-in for the game server.
//!
//! Holds the true field, produces the partial game state each player would receive,
//! and applies published moves. Used for offline runs and end-to-end tests.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, trace};

use crate::{
    AgentId, Position, TeamName,
    config::EngineConfig,
    direction::Action,
    engine::GameRound,
    map::{GridBounds, GridError, WallSet},
    observation::{GameState, RawCell},
};

/// How far (in Chebyshev distance) a player can see.
pub const DEFAULT_VIEW_RADIUS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error(transparent)]
    OutOfBounds(#[from] GridError),
    #[error("Position {0} is a wall")]
    Wall(Position),
    #[error("Position {0} is already occupied")]
    Occupied(Position),
    #[error("Player '{0}' is already on the field")]
    DuplicatePlayer(AgentId),
    #[error("Player '{0}' is not on the field")]
    UnknownPlayer(AgentId),
    #[error("Coin value must be 1, 2 or 3, got {0}")]
    InvalidCoin(u8),
    #[error("Map string is empty")]
    EmptyMap,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map code '{token}' at position ({x}, {y})")]
    UnknownToken { token: String, x: usize, y: usize },
    #[error("Field is too crowded to place {0} more cells")]
    NoRoom(usize),
}

/// Holds the state of a player within the arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub team: TeamName,
    pub position: Position,
    pub collected: u32,
}

/// Represents the outcome of applying one player's move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResult {
    Rested,
    Moved,
    Collected(u8),
    Blocked(String),
}

#[derive(Debug, Clone)]
pub struct Arena {
    bounds: GridBounds,
    walls: WallSet,
    coins: BTreeMap<Position, u8>,
    players: BTreeMap<AgentId, PlayerState>,
    scores: BTreeMap<TeamName, u32>,
    view_radius: usize,
}

impl Arena {
    /// Creates an empty field.
    pub fn new(bounds: GridBounds) -> Self {
        Arena {
            bounds,
            walls: WallSet::new(),
            coins: BTreeMap::new(),
            players: BTreeMap::new(),
            scores: BTreeMap::new(),
            view_radius: DEFAULT_VIEW_RADIUS,
        }
    }

    pub fn with_view_radius(mut self, radius: usize) -> Self {
        self.view_radius = radius;
        self
    }

    fn check_free(&self, position: Position) -> Result<(), ArenaError> {
        if !self.bounds.contains(position) {
            return Err(GridError::OutOfBounds {
                x: position.x as i64,
                y: position.y as i64,
                width: self.bounds.width,
                height: self.bounds.height,
            }
            .into());
        }
        if self.walls.contains(position) {
            return Err(ArenaError::Wall(position));
        }
        if self.player_at(position).is_some() {
            return Err(ArenaError::Occupied(position));
        }
        Ok(())
    }

    pub fn add_wall(&mut self, position: Position) -> Result<(), ArenaError> {
        self.check_free(position)?;
        if self.coins.contains_key(&position) {
            return Err(ArenaError::Occupied(position));
        }
        self.walls.insert(position);
        Ok(())
    }

    pub fn add_coin(&mut self, position: Position, value: u8) -> Result<(), ArenaError> {
        if !(1..=3).contains(&value) {
            return Err(ArenaError::InvalidCoin(value));
        }
        self.check_free(position)?;
        if self.coins.contains_key(&position) {
            return Err(ArenaError::Occupied(position));
        }
        self.coins.insert(position, value);
        Ok(())
    }

    pub fn add_player(
        &mut self,
        name: impl Into<AgentId>,
        team: impl Into<TeamName>,
        position: Position,
    ) -> Result<(), ArenaError> {
        let name = name.into();
        if self.players.contains_key(&name) {
            return Err(ArenaError::DuplicatePlayer(name));
        }
        self.check_free(position)?;
        if self.coins.contains_key(&position) {
            debug!(player = %name, %position, "Placing player on top of a coin");
        }
        let team = team.into();
        self.scores.entry(team.clone()).or_insert(0);
        self.players.insert(
            name,
            PlayerState {
                team,
                position,
                collected: 0,
            },
        );
        Ok(())
    }

    /// Places the configured agents, walls and coins at random free cells.
    pub fn random(
        config: &EngineConfig,
        seed: u64,
        walls: usize,
        coins: usize,
    ) -> Result<Self, ArenaError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut arena = Arena::new(config.grid);
        let needed = config.agents.len() + walls + coins;
        if needed > config.grid.area() {
            return Err(ArenaError::NoRoom(needed));
        }

        for agent in &config.agents {
            let cell = arena.random_free_cell(&mut rng);
            arena.add_player(agent.name.clone(), agent.team.clone(), cell)?;
        }
        for _ in 0..walls {
            let cell = arena.random_free_cell(&mut rng);
            arena.add_wall(cell)?;
        }
        for _ in 0..coins {
            let cell = arena.random_free_cell(&mut rng);
            let value = rng.random_range(1..=3);
            arena.add_coin(cell, value)?;
        }
        Ok(arena)
    }

    fn random_free_cell(&self, rng: &mut StdRng) -> Position {
        let free: Vec<Position> = (0..self.bounds.width)
            .flat_map(|x| (0..self.bounds.height).map(move |y| Position::new(x, y)))
            .filter(|pos| {
                !self.walls.contains(*pos)
                    && !self.coins.contains_key(pos)
                    && self.player_at(*pos).is_none()
            })
            .collect();
        // Callers check there is room before asking.
        free[rng.random_range(0..free.len())]
    }

    pub fn player_at(&self, position: Position) -> Option<&AgentId> {
        self.players
            .iter()
            .find(|(_, state)| state.position == position)
            .map(|(name, _)| name)
    }

    fn visible(&self, from: Position, cell: Position) -> bool {
        from.x.abs_diff(cell.x).max(from.y.abs_diff(cell.y)) <= self.view_radius
    }

    /// The partial game state `player` would receive this round.
    pub fn game_state(&self, player: &str) -> Result<GameState, ArenaError> {
        let me = self
            .players
            .get(player)
            .ok_or_else(|| ArenaError::UnknownPlayer(player.to_string()))?;
        let raw = |pos: &Position| -> RawCell { [pos.x as i64, pos.y as i64] };

        let mut state = GameState {
            current_position: raw(&me.position),
            ..GameState::default()
        };
        for (pos, value) in self.coins.iter().filter(|(pos, _)| self.visible(me.position, **pos)) {
            match *value {
                1 => state.coin1.push(raw(pos)),
                2 => state.coin2.push(raw(pos)),
                _ => state.coin3.push(raw(pos)),
            }
        }
        state.walls = self
            .walls
            .iter()
            .filter(|pos| self.visible(me.position, **pos))
            .map(raw)
            .collect();
        for (name, other) in &self.players {
            if name == player || !self.visible(me.position, other.position) {
                continue;
            }
            if other.team == me.team {
                state.teammate_positions.push(raw(&other.position));
            } else {
                state.enemy_positions.push(raw(&other.position));
            }
        }
        Ok(state)
    }

    /// Applies a single action for a given player.
    pub fn apply(&mut self, player: &str, action: Action) -> Result<MoveResult, ArenaError> {
        let current = self
            .players
            .get(player)
            .ok_or_else(|| ArenaError::UnknownPlayer(player.to_string()))?
            .position;

        let direction = match action {
            Action::Stay => return Ok(MoveResult::Rested),
            Action::Move(direction) => direction,
        };
        let Some(target) = self.bounds.neighbor(current, direction) else {
            return Ok(MoveResult::Blocked("Target position is out of bounds.".to_string()));
        };
        if self.walls.contains(target) {
            return Ok(MoveResult::Blocked("Cannot move into a wall.".to_string()));
        }
        if let Some(other) = self.player_at(target) {
            return Ok(MoveResult::Blocked(format!(
                "Target position is occupied by {other}."
            )));
        }

        let coin = self.coins.remove(&target);
        let Some(state) = self.players.get_mut(player) else {
            return Err(ArenaError::UnknownPlayer(player.to_string()));
        };
        state.position = target;
        trace!(player, from = %current, to = %target, "Moved");

        match coin {
            Some(value) => {
                state.collected += u32::from(value);
                *self.scores.entry(state.team.clone()).or_insert(0) += u32::from(value);
                debug!(player, %target, value, "Collected coin");
                Ok(MoveResult::Collected(value))
            }
            None => Ok(MoveResult::Moved),
        }
    }

    /// Applies one round of moves in player order. Players without a move rest.
    ///
    /// Moves are applied one after another against the live field, so when two players
    /// pick the same free cell the later one is blocked.
    pub fn apply_round(&mut self, moves: &GameRound) -> BTreeMap<AgentId, MoveResult> {
        let names: Vec<AgentId> = self.players.keys().cloned().collect();
        names
            .into_iter()
            .map(|name| {
                let action = Action::from(moves.get(&name).copied());
                let result = self
                    .apply(&name, action)
                    .unwrap_or_else(|err| MoveResult::Blocked(err.to_string()));
                (name, result)
            })
            .collect()
    }

    /// All coins have been picked up.
    pub fn is_finished(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    pub fn walls(&self) -> &WallSet {
        &self.walls
    }

    pub fn coins(&self) -> &BTreeMap<Position, u8> {
        &self.coins
    }

    pub fn players(&self) -> &BTreeMap<AgentId, PlayerState> {
        &self.players
    }

    pub fn scores(&self) -> &BTreeMap<TeamName, u32> {
        &self.scores
    }

    pub fn position_of(&self, player: &str) -> Option<Position> {
        self.players.get(player).map(|state| state.position)
    }
}

/// Team a map start code `P<n>` plays for: players 1 and 2 are `ATeam`, 3 and 4
/// `BTeam`, and so on alternating in pairs.
pub fn team_for_player_number(n: u32) -> TeamName {
    if (n.saturating_sub(1) / 2) % 2 == 0 {
        "ATeam".to_string()
    } else {
        "BTeam".to_string()
    }
}

/// Loads an arena from a whitespace-separated token map, one row per line.
///
/// Codes: `BL` floor, `WL`/`WA` wall, `C1`-`C3` coin of that value, `P1`-`P9` start of
/// player `Player<n>`. Line index is the row (`x`), token index the column (`y`).
pub fn load_arena_from_string(map_string: &str) -> Result<Arena, ArenaError> {
    let lines: Vec<&str> = map_string.trim().lines().collect();
    if lines.is_empty() {
        return Err(ArenaError::EmptyMap);
    }

    let mut columns = 0;
    let mut parsed_rows: Vec<Vec<&str>> = Vec::with_capacity(lines.len());

    for (row, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if row == 0 {
            columns = tokens.len();
        } else if tokens.len() != columns {
            return Err(ArenaError::InconsistentWidth {
                row,
                expected: columns,
                found: tokens.len(),
            });
        }
        parsed_rows.push(tokens);
    }

    // Rows run along x, so the row count bounds x.
    let mut arena = Arena::new(GridBounds::new(parsed_rows.len(), columns));

    for (x, row_tokens) in parsed_rows.iter().enumerate() {
        for (y, token) in row_tokens.iter().enumerate() {
            let pos = Position::new(x, y);
            match *token {
                "BL" => {}
                "WL" | "WA" => arena.add_wall(pos)?,
                "C1" => arena.add_coin(pos, 1)?,
                "C2" => arena.add_coin(pos, 2)?,
                "C3" => arena.add_coin(pos, 3)?,
                player if player.len() == 2 && player.starts_with('P') => {
                    let n: u32 = player[1..].parse().map_err(|_| ArenaError::UnknownToken {
                        token: player.to_string(),
                        x,
                        y,
                    })?;
                    arena.add_player(format!("Player{n}"), team_for_player_number(n), pos)?;
                }
                unknown => {
                    return Err(ArenaError::UnknownToken {
                        token: unknown.to_string(),
                        x,
                        y,
                    });
                }
            }
        }
    }

    Ok(arena)
}
