use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::{
    AgentId, Position,
    map::{GridBounds, GridError, GridModel, WallSet},
};

/// Raw coordinate pair as sent by the game server.
pub type RawCell = [i64; 2];

/// Per-player game state message, as published on `games/{lobby}/{player}/game_state`.
///
/// Lists the server omits or sends as `null` are read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub current_position: RawCell,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub coin1: Vec<RawCell>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub coin2: Vec<RawCell>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub coin3: Vec<RawCell>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub walls: Vec<RawCell>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub enemy_positions: Vec<RawCell>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub teammate_positions: Vec<RawCell>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RawCell>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<RawCell>>::deserialize(deserializer)?.unwrap_or_default())
}

impl GameState {
    pub fn from_json(payload: &str) -> Result<Self, ObservationError> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ObservationError {
    #[error("Malformed game state payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Reported current position is off the field: {0}")]
    OutOfBounds(#[from] GridError),
}

/// Latest validated snapshot for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub agent: AgentId,
    pub position: Position,
    /// Visible coins, flattened in `coin1`, `coin2`, `coin3` order.
    pub coins: Vec<Position>,
    pub walls: Vec<Position>,
    pub teammates: Vec<Position>,
    pub enemies: Vec<Position>,
}

impl Observation {
    /// Validates a raw game state against the field.
    ///
    /// An off-grid current position rejects the whole message. Off-grid cells in the
    /// other lists are dropped: they can never be entered, so they carry no information.
    pub fn from_game_state(
        agent: &str,
        state: &GameState,
        bounds: GridBounds,
    ) -> Result<Self, ObservationError> {
        let [x, y] = state.current_position;
        let position = bounds.try_position(x, y)?;

        let cells = |label: &str, raw: &[RawCell]| -> Vec<Position> {
            raw.iter()
                .filter_map(|[x, y]| match bounds.try_position(*x, *y) {
                    Ok(pos) => Some(pos),
                    Err(err) => {
                        debug!(agent, label, %err, "Dropping off-grid cell");
                        None
                    }
                })
                .collect()
        };

        let mut coins = cells("coin1", &state.coin1);
        coins.extend(cells("coin2", &state.coin2));
        coins.extend(cells("coin3", &state.coin3));

        Ok(Observation {
            agent: agent.to_string(),
            position,
            coins,
            walls: cells("walls", &state.walls),
            teammates: cells("teammatePositions", &state.teammate_positions),
            enemies: cells("enemyPositions", &state.enemy_positions),
        })
    }
}

#[derive(Debug, Default)]
struct AgentRecord {
    latest: Option<Observation>,
    /// Set by a valid update, consumed when a round begins.
    fresh: bool,
}

/// Per-agent latest known state plus the shared wall knowledge.
///
/// Written only through [`ObservationStore::ingest`]; decision code borrows it immutably.
#[derive(Debug)]
pub struct ObservationStore {
    bounds: GridBounds,
    walls: WallSet,
    records: BTreeMap<AgentId, AgentRecord>,
}

impl ObservationStore {
    pub fn new(bounds: GridBounds) -> Self {
        ObservationStore {
            bounds,
            walls: WallSet::new(),
            records: BTreeMap::new(),
        }
    }

    /// Parses and stores a JSON game state for `agent`.
    ///
    /// A rejected payload leaves the previous snapshot in place but withdraws the
    /// agent from the current round.
    pub fn ingest(&mut self, agent: &str, payload: &str) -> Result<&Observation, ObservationError> {
        match GameState::from_json(payload) {
            Ok(state) => self.ingest_state(agent, &state),
            Err(err) => {
                self.reject(agent, &err);
                Err(err)
            }
        }
    }

    /// Stores an already decoded game state for `agent`.
    pub fn ingest_state(
        &mut self,
        agent: &str,
        state: &GameState,
    ) -> Result<&Observation, ObservationError> {
        let observation = match Observation::from_game_state(agent, state, self.bounds) {
            Ok(observation) => observation,
            Err(err) => {
                self.reject(agent, &err);
                return Err(err);
            }
        };

        let before = self.walls.len();
        self.walls.extend(observation.walls.iter().copied());
        if self.walls.len() > before {
            debug!(
                agent,
                new = self.walls.len() - before,
                total = self.walls.len(),
                "Learned walls"
            );
        }

        let record = self.records.entry(agent.to_string()).or_default();
        record.fresh = true;
        let latest: &Observation = record.latest.insert(observation);
        Ok(latest)
    }

    fn reject(&mut self, agent: &str, err: &ObservationError) {
        warn!(agent, %err, "Dropping observation, agent sits out this round");
        self.records.entry(agent.to_string()).or_default().fresh = false;
    }

    /// Starts a round: returns the agents holding an update since the last round and
    /// clears their freshness.
    pub fn drain_fresh(&mut self) -> Vec<AgentId> {
        self.records
            .iter_mut()
            .filter(|(_, record)| record.fresh)
            .map(|(agent, record)| {
                record.fresh = false;
                agent.clone()
            })
            .collect()
    }

    pub fn is_fresh(&self, agent: &str) -> bool {
        self.records.get(agent).is_some_and(|record| record.fresh)
    }

    pub fn latest(&self, agent: &str) -> Option<&Observation> {
        self.records.get(agent)?.latest.as_ref()
    }

    /// Last reported position of every agent that has been observed at least once.
    pub fn last_known_positions(&self) -> impl Iterator<Item = (&AgentId, Position)> {
        self.records
            .iter()
            .filter_map(|(agent, record)| record.latest.as_ref().map(|obs| (agent, obs.position)))
    }

    pub fn walls(&self) -> &WallSet {
        &self.walls
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    pub fn grid(&self) -> GridModel<'_> {
        GridModel::new(self.bounds, &self.walls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "currentPosition": [2, 5],
        "coin1": [[5, 5]],
        "coin2": [],
        "coin3": [[0, 0], [11, 3]],
        "walls": [[1, 0], [-1, 5]],
        "enemyPositions": [[3, 3]],
        "teammatePositions": null
    }"#;

    #[test]
    fn parses_and_validates_game_state() {
        let mut store = ObservationStore::new(GridBounds::default());
        let obs = store.ingest("Player1", SAMPLE).unwrap();
        assert_eq!(obs.position, Position::new(2, 5));
        assert_eq!(obs.coins, vec![Position::new(5, 5), Position::new(0, 0)]);
        assert_eq!(obs.walls, vec![Position::new(1, 0)]);
        assert_eq!(obs.enemies, vec![Position::new(3, 3)]);
        assert!(obs.teammates.is_empty());
        assert!(store.walls().contains(Position::new(1, 0)));
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let state = GameState::from_json(r#"{"currentPosition": [0, 0]}"#).unwrap();
        assert!(state.coin1.is_empty());
        assert!(state.walls.is_empty());
    }

    #[test]
    fn malformed_payload_keeps_previous_state_and_skips_round() {
        let mut store = ObservationStore::new(GridBounds::default());
        store.ingest("Player1", SAMPLE).unwrap();
        assert!(store.is_fresh("Player1"));

        assert!(matches!(
            store.ingest("Player1", "{not json"),
            Err(ObservationError::Malformed(_))
        ));
        assert!(!store.is_fresh("Player1"));
        assert_eq!(
            store.latest("Player1").map(|obs| obs.position),
            Some(Position::new(2, 5))
        );
        assert!(store.drain_fresh().is_empty());
    }

    #[test]
    fn off_grid_position_is_rejected() {
        let mut store = ObservationStore::new(GridBounds::default());
        let err = store
            .ingest("Player1", r#"{"currentPosition": [10, 0]}"#)
            .unwrap_err();
        assert!(matches!(err, ObservationError::OutOfBounds(_)));
        assert!(store.latest("Player1").is_none());
    }

    #[test]
    fn latest_update_wins_and_walls_accumulate() {
        let mut store = ObservationStore::new(GridBounds::default());
        store
            .ingest("Player1", r#"{"currentPosition": [0, 0], "walls": [[1, 1]]}"#)
            .unwrap();
        store
            .ingest("Player1", r#"{"currentPosition": [0, 1], "walls": [[2, 2]]}"#)
            .unwrap();
        let obs = store.latest("Player1").unwrap();
        assert_eq!(obs.position, Position::new(0, 1));
        assert_eq!(obs.walls, vec![Position::new(2, 2)]);
        assert_eq!(store.walls().len(), 2);

        assert_eq!(store.drain_fresh(), vec!["Player1".to_string()]);
        assert!(store.drain_fresh().is_empty());
    }

    #[test]
    fn walls_are_shared_between_agents() {
        let mut store = ObservationStore::new(GridBounds::default());
        store
            .ingest("Player1", r#"{"currentPosition": [0, 0], "walls": [[1, 1]]}"#)
            .unwrap();
        store
            .ingest("Player2", r#"{"currentPosition": [5, 5], "walls": [[6, 6]]}"#)
            .unwrap();
        assert!(store.grid().walls.contains(Position::new(1, 1)));
        assert!(store.grid().walls.contains(Position::new(6, 6)));
        let positions: Vec<_> = store.last_known_positions().map(|(_, pos)| pos).collect();
        assert_eq!(positions, vec![Position::new(0, 0), Position::new(5, 5)]);
    }
}
