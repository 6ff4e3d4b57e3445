use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::{
    AgentId, Position, TeamName,
    agent::{self, Agent, AgentView, DecisionError},
    arbiter::CollisionArbiter,
    config::{ConfigError, EngineConfig, Mode},
    direction::{Action, Direction},
    observation::{GameState, ObservationError, ObservationStore},
};

/// Moves chosen for one round, keyed by player.
pub type GameRound = BTreeMap<AgentId, Direction>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundStatus {
    Running,
    /// An exploring agent ran out of frontier; the whole group stops with it.
    Exhausted { agents: Vec<AgentId> },
    /// An external STOP was received.
    Stopped,
}

/// Everything decided in one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub round: u64,
    pub moves: GameRound,
    /// Agents that decided to stay put; nothing is published for them.
    pub resting: Vec<AgentId>,
    /// Agents without a usable observation this round.
    pub skipped: Vec<AgentId>,
    pub status: RoundStatus,
    /// Set only on the round in which the engine halted itself. Later rounds keep the
    /// final status but leave this unset, so STOP goes out once.
    pub halted: bool,
}

impl RoundOutcome {
    fn empty(round: u64, status: RoundStatus) -> Self {
        RoundOutcome {
            round,
            moves: GameRound::new(),
            resting: Vec::new(),
            skipped: Vec::new(),
            status,
            halted: false,
        }
    }

    pub fn is_final(&self) -> bool {
        self.status != RoundStatus::Running
    }
}

struct AgentSlot {
    team: TeamName,
    behavior: Box<dyn Agent>,
}

/// Owns all per-session state: the observation store and one behavior per agent.
///
/// Ingestion and decision are separate calls; nothing is decided as a side effect of
/// receiving a message.
pub struct Engine {
    config: EngineConfig,
    store: ObservationStore,
    agents: BTreeMap<AgentId, AgentSlot>,
    round: u64,
    status: RoundStatus,
    last_actions: BTreeMap<AgentId, Action>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let agents = config
            .agents
            .iter()
            .map(|spec| {
                let slot = AgentSlot {
                    team: spec.team.clone(),
                    behavior: agent::for_mode(config.mode, spec.name.clone()),
                };
                (spec.name.clone(), slot)
            })
            .collect();
        info!(
            mode = %config.mode,
            agents = config.agents.len(),
            width = config.grid.width,
            height = config.grid.height,
            "Engine ready"
        );
        Ok(Engine {
            store: ObservationStore::new(config.grid),
            config,
            agents,
            round: 0,
            status: RoundStatus::Running,
            last_actions: BTreeMap::new(),
        })
    }

    /// Stores a JSON game state for `agent`. Messages for players this engine does not
    /// control are ignored.
    pub fn ingest(&mut self, agent: &str, payload: &str) -> Result<(), ObservationError> {
        if !self.agents.contains_key(agent) {
            debug!(agent, "Ignoring game state for untracked player");
            return Ok(());
        }
        let observation = self.store.ingest(agent, payload)?;
        if let Some(slot) = self.agents.get_mut(agent) {
            slot.behavior.observe(observation);
        }
        Ok(())
    }

    /// Same as [`Engine::ingest`] for an already decoded game state.
    pub fn ingest_state(&mut self, agent: &str, state: &GameState) -> Result<(), ObservationError> {
        if !self.agents.contains_key(agent) {
            debug!(agent, "Ignoring game state for untracked player");
            return Ok(());
        }
        let observation = self.store.ingest_state(agent, state)?;
        if let Some(slot) = self.agents.get_mut(agent) {
            slot.behavior.observe(observation);
        }
        Ok(())
    }

    /// Cells `agent` must not step onto, honoring the configured collision scope.
    fn occupied_for(&self, agent: &str) -> Vec<Position> {
        let scope = self.config.collision;
        let Some(team) = self.agents.get(agent).map(|slot| &slot.team) else {
            return Vec::new();
        };

        let mut occupied: Vec<Position> = self
            .store
            .last_known_positions()
            .filter(|(other, _)| other.as_str() != agent)
            .filter_map(|(other, pos)| {
                let other_team = &self.agents.get(other)?.team;
                scope.includes(other_team == team).then_some(pos)
            })
            .collect();

        if let Some(obs) = self.store.latest(agent) {
            if scope.teammates {
                occupied.extend(obs.teammates.iter().copied());
            }
            if scope.enemies {
                occupied.extend(obs.enemies.iter().copied());
            }
            occupied.retain(|pos| *pos != obs.position);
        }
        occupied
    }

    /// Runs the configured policy for one agent, then the arbiter.
    pub fn decide(&mut self, agent: &str) -> Result<Action, DecisionError> {
        let occupied = self.occupied_for(agent);
        let slot = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| DecisionError::UnknownAgent(agent.to_string()))?;
        let observation = self
            .store
            .latest(agent)
            .ok_or_else(|| DecisionError::NoObservation(agent.to_string()))?;

        let grid = self.store.grid();
        let arbiter = CollisionArbiter::new(grid, occupied);
        let view = AgentView {
            observation,
            grid,
            arbiter: &arbiter,
        };

        let proposed = slot.behavior.get_action(&view)?;
        let action = arbiter.filter(observation.position, proposed);
        debug!(
            agent,
            position = %observation.position,
            ?proposed,
            ?action,
            "Decided"
        );
        Ok(action)
    }

    /// Decides a move for every agent that reported in since the previous round.
    pub fn decide_round(&mut self) -> RoundOutcome {
        if self.status != RoundStatus::Running {
            return RoundOutcome::empty(self.round, self.status.clone());
        }
        self.round += 1;
        let fresh: BTreeSet<AgentId> = self.store.drain_fresh().into_iter().collect();

        if self.config.mode == Mode::Explore {
            let exhausted: Vec<AgentId> = self
                .agents
                .iter_mut()
                .filter_map(|(id, slot)| slot.behavior.is_exhausted().then(|| id.clone()))
                .collect();
            if !exhausted.is_empty() {
                info!(round = self.round, ?exhausted, "Frontier exhausted, halting group");
                self.status = RoundStatus::Exhausted { agents: exhausted };
                let mut outcome = RoundOutcome::empty(self.round, self.status.clone());
                outcome.halted = true;
                return outcome;
            }
        }

        let mut outcome = RoundOutcome::empty(self.round, RoundStatus::Running);
        let ids: Vec<AgentId> = self.agents.keys().cloned().collect();
        for id in ids {
            if !fresh.contains(&id) {
                debug!(agent = %id, "No fresh observation, skipping");
                outcome.skipped.push(id);
                continue;
            }
            match self.decide(&id) {
                Ok(action) => {
                    self.last_actions.insert(id.clone(), action);
                    match action {
                        Action::Move(dir) => {
                            outcome.moves.insert(id, dir);
                        }
                        Action::Stay => outcome.resting.push(id),
                    }
                }
                Err(err) => {
                    warn!(agent = %id, %err, "Decision failed, skipping");
                    outcome.skipped.push(id);
                }
            }
        }

        info!(
            round = self.round,
            moves = outcome.moves.len(),
            resting = outcome.resting.len(),
            skipped = outcome.skipped.len(),
            "Round decided"
        );
        outcome
    }

    /// External STOP: no further moves are produced.
    pub fn stop(&mut self) {
        if self.status == RoundStatus::Running {
            info!(round = self.round, "Session stopped");
            self.status = RoundStatus::Stopped;
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RoundStatus::Running
    }

    pub fn status(&self) -> &RoundStatus {
        &self.status
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn describe(&self, agent: &str) -> Option<String> {
        self.agents.get(agent).map(|slot| slot.behavior.describe())
    }

    pub fn last_action(&self, agent: &str) -> Option<Action> {
        self.last_actions.get(agent).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::CollisionScope;

    fn engine(mode: Mode) -> Engine {
        Engine::new(EngineConfig::two_teams().with_mode(mode)).unwrap()
    }

    #[test]
    fn greedy_heads_for_coin_past_a_wall() {
        let mut engine = Engine::new(
            EngineConfig::default()
                .with_mode(Mode::Greedy)
                .with_agent("Player1", "ATeam"),
        )
        .unwrap();
        engine
            .ingest(
                "Player1",
                r#"{"currentPosition": [0, 0], "coin1": [[0, 5]], "walls": [[1, 0]]}"#,
            )
            .unwrap();
        let outcome = engine.decide_round();
        assert_eq!(outcome.moves.get("Player1"), Some(&Direction::Right));

        engine
            .ingest("Player1", r#"{"currentPosition": [0, 1], "coin1": [[0, 5]]}"#)
            .unwrap();
        let outcome = engine.decide_round();
        assert_eq!(outcome.round, 2);
        assert_eq!(outcome.moves.get("Player1"), Some(&Direction::Right));
        // The wall seen in round one is still known.
        assert!(engine.store().walls().contains(Position::new(1, 0)));
    }

    #[test]
    fn agents_without_updates_are_skipped() {
        let mut engine = engine(Mode::Greedy);
        engine
            .ingest("Player1", r#"{"currentPosition": [5, 5]}"#)
            .unwrap();
        engine.ingest("Player2", "garbage").unwrap_err();
        let outcome = engine.decide_round();
        assert_eq!(outcome.moves.len(), 1);
        assert_eq!(
            outcome.skipped,
            vec!["Player2".to_string(), "Player3".to_string(), "Player4".to_string()]
        );

        // Nothing new arrived: everyone sits this one out.
        let outcome = engine.decide_round();
        assert!(outcome.moves.is_empty());
        assert_eq!(outcome.skipped.len(), 4);
    }

    #[test]
    fn untracked_players_are_ignored() {
        let mut engine = engine(Mode::Greedy);
        engine
            .ingest("Player9", r#"{"currentPosition": [5, 5]}"#)
            .unwrap();
        assert!(engine.store().latest("Player9").is_none());
        assert_eq!(
            engine.decide("Player9"),
            Err(DecisionError::UnknownAgent("Player9".to_string()))
        );
    }

    #[test]
    fn first_exploration_round_rests() {
        let mut engine = Engine::new(
            EngineConfig::default()
                .with_mode(Mode::Explore)
                .with_agent("Player1", "ATeam"),
        )
        .unwrap();
        engine
            .ingest("Player1", r#"{"currentPosition": [5, 5]}"#)
            .unwrap();
        let outcome = engine.decide_round();
        assert_eq!(outcome.resting, vec!["Player1".to_string()]);
        assert!(outcome.moves.is_empty());
        assert_eq!(
            engine.describe("Player1").as_deref(),
            Some("exploring, frontier 4, explored 1")
        );
    }

    #[test]
    fn exhausted_frontier_halts_the_group() {
        let mut engine = Engine::new(
            EngineConfig {
                grid: crate::map::GridBounds::new(1, 1),
                ..EngineConfig::default()
            }
            .with_mode(Mode::Explore)
            .with_agent("Player1", "ATeam")
            .with_agent("Player2", "ATeam"),
        )
        .unwrap();
        engine
            .ingest("Player1", r#"{"currentPosition": [0, 0]}"#)
            .unwrap();
        let outcome = engine.decide_round();
        assert_eq!(outcome.status, RoundStatus::Running);

        // Player1's 1x1 world is fully explored now.
        engine
            .ingest("Player1", r#"{"currentPosition": [0, 0]}"#)
            .unwrap();
        let outcome = engine.decide_round();
        assert_eq!(
            outcome.status,
            RoundStatus::Exhausted {
                agents: vec!["Player1".to_string()]
            }
        );
        assert!(outcome.is_final());
        assert!(outcome.halted);
        assert!(!engine.is_running());

        for _ in 0..3 {
            engine
                .ingest("Player1", r#"{"currentPosition": [0, 0]}"#)
                .unwrap();
            let later = engine.decide_round();
            assert!(later.moves.is_empty());
            assert!(later.is_final());
            assert!(!later.halted);
        }
    }

    #[test]
    fn stop_ends_the_session() {
        let mut engine = engine(Mode::Greedy);
        engine.stop();
        engine
            .ingest("Player1", r#"{"currentPosition": [5, 5]}"#)
            .unwrap();
        let outcome = engine.decide_round();
        assert_eq!(outcome.status, RoundStatus::Stopped);
        assert!(outcome.moves.is_empty());
    }

    #[test]
    fn engine_agents_avoid_each_other() {
        let mut engine = engine(Mode::Greedy);
        // Player1 wants to go right onto Player2.
        engine
            .ingest("Player1", r#"{"currentPosition": [3, 3], "coin1": [[3, 6]]}"#)
            .unwrap();
        engine
            .ingest("Player2", r#"{"currentPosition": [3, 4]}"#)
            .unwrap();
        let outcome = engine.decide_round();
        assert_eq!(outcome.moves.get("Player1"), Some(&Direction::Up));
    }

    #[test]
    fn collision_scope_controls_enemy_avoidance() {
        let config = EngineConfig::two_teams()
            .with_mode(Mode::Greedy)
            .with_collision(CollisionScope {
                teammates: true,
                enemies: false,
            });
        let mut teammates_only = Engine::new(config).unwrap();
        // Player3 is on the other team and sits where Player1 wants to go.
        teammates_only
            .ingest(
                "Player1",
                r#"{"currentPosition": [3, 3], "coin1": [[3, 6]], "enemyPositions": [[3, 4]]}"#,
            )
            .unwrap();
        teammates_only
            .ingest("Player3", r#"{"currentPosition": [3, 4]}"#)
            .unwrap();
        let outcome = teammates_only.decide_round();
        assert_eq!(outcome.moves.get("Player1"), Some(&Direction::Right));

        let mut engine = engine(Mode::Greedy);
        engine
            .ingest(
                "Player1",
                r#"{"currentPosition": [3, 3], "coin1": [[3, 6]], "enemyPositions": [[3, 4]]}"#,
            )
            .unwrap();
        let outcome = engine.decide_round();
        assert_eq!(outcome.moves.get("Player1"), Some(&Direction::Up));
    }

    #[test]
    fn walled_in_agent_rests() {
        let mut engine = engine(Mode::Sweep);
        engine
            .ingest(
                "Player1",
                r#"{"currentPosition": [0, 0], "walls": [[1, 0], [0, 1]]}"#,
            )
            .unwrap();
        let outcome = engine.decide_round();
        assert_eq!(outcome.resting, vec!["Player1".to_string()]);
        assert_eq!(engine.last_action("Player1"), Some(Action::Stay));
    }
}
