use crate::{
    AgentId,
    arbiter::CollisionArbiter,
    config::Mode,
    direction::Action,
    explorer::{ExploreError, ExplorerPhase, FrontierExplorer},
    greedy::GreedyPolicy,
    map::GridModel,
    observation::Observation,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    #[error("Agent '{0}' is not controlled by this engine")]
    UnknownAgent(AgentId),
    #[error("Agent '{0}' has not been observed yet")]
    NoObservation(AgentId),
    #[error("Exploration failed: {0}")]
    Explore(#[from] ExploreError),
}

/// Read-only view of what one agent knows this round.
#[derive(Debug)]
pub struct AgentView<'a> {
    pub observation: &'a Observation,
    pub grid: GridModel<'a>,
    pub arbiter: &'a CollisionArbiter<'a>,
}

/// Trait defining the behavior of an agent.
/// Agents propose a move from their view; the engine runs the proposal past the arbiter.
pub trait Agent {
    /// Returns the player name of this agent.
    fn id(&self) -> &str;

    /// Called for every accepted observation, before any decision that uses it.
    fn observe(&mut self, _observation: &Observation) {}

    /// Proposes this round's move.
    /// `&mut self` allows the agent to keep search state between rounds.
    fn get_action(&mut self, view: &AgentView<'_>) -> Result<Action, DecisionError>;

    /// Whether the agent has run out of work. Only exploring agents ever do.
    fn is_exhausted(&mut self) -> bool {
        false
    }

    /// Short human-readable status line.
    fn describe(&self) -> String;
}

/// Builds the behavior for `mode`.
pub fn for_mode(mode: Mode, id: impl Into<AgentId>) -> Box<dyn Agent> {
    let id = id.into();
    match mode {
        Mode::Explore => Box::new(ExplorerAgent::new(id)),
        Mode::Greedy => Box::new(GreedyAgent::new(id)),
        Mode::Sweep => Box::new(SweepAgent::new(id)),
    }
}

/// Walks the field breadth-first from where it was first seen.
#[derive(Debug)]
pub struct ExplorerAgent {
    id: AgentId,
    explorer: FrontierExplorer,
}

impl ExplorerAgent {
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            explorer: FrontierExplorer::new(),
        }
    }

    pub fn explorer(&self) -> &FrontierExplorer {
        &self.explorer
    }
}

impl Agent for ExplorerAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn observe(&mut self, observation: &Observation) {
        self.explorer.seed(observation.position);
    }

    fn get_action(&mut self, view: &AgentView<'_>) -> Result<Action, DecisionError> {
        let step = self.explorer.step(view.grid.bounds)?;
        Ok(step.action)
    }

    fn is_exhausted(&mut self) -> bool {
        self.explorer.check_exhausted()
    }

    fn describe(&self) -> String {
        let phase = match self.explorer.phase() {
            ExplorerPhase::AwaitingFirstObservation => "waiting",
            ExplorerPhase::Exploring => "exploring",
            ExplorerPhase::Exhausted => "exhausted",
        };
        format!(
            "{phase}, frontier {}, explored {}",
            self.explorer.frontier_len(),
            self.explorer.explored_len()
        )
    }
}

/// Chases the nearest visible coin.
#[derive(Debug)]
pub struct GreedyAgent {
    id: AgentId,
    policy: GreedyPolicy,
    coins_in_view: usize,
}

impl GreedyAgent {
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            policy: GreedyPolicy,
            coins_in_view: 0,
        }
    }
}

impl Agent for GreedyAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn observe(&mut self, observation: &Observation) {
        self.coins_in_view = observation.coins.len();
    }

    fn get_action(&mut self, view: &AgentView<'_>) -> Result<Action, DecisionError> {
        let obs = view.observation;
        Ok(self.policy.decide(obs.position, &obs.coins, &view.grid))
    }

    fn describe(&self) -> String {
        format!("greedy, {} coins in view", self.coins_in_view)
    }
}

/// Takes the first safe direction in arbiter priority order, every round.
#[derive(Debug)]
pub struct SweepAgent {
    id: AgentId,
}

impl SweepAgent {
    pub fn new(id: AgentId) -> Self {
        Self { id }
    }
}

impl Agent for SweepAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn get_action(&mut self, view: &AgentView<'_>) -> Result<Action, DecisionError> {
        Ok(view.arbiter.select(view.observation.position))
    }

    fn describe(&self) -> String {
        "sweep".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Position,
        direction::Direction,
        map::{GridBounds, WallSet},
    };

    fn observation(x: usize, y: usize, coins: Vec<Position>) -> Observation {
        Observation {
            agent: "Player1".to_string(),
            position: Position::new(x, y),
            coins,
            walls: Vec::new(),
            teammates: Vec::new(),
            enemies: Vec::new(),
        }
    }

    #[test]
    fn explorer_agent_is_seeded_by_first_observation_only() {
        let mut agent = ExplorerAgent::new("Player1".to_string());
        assert!(!agent.is_exhausted());
        agent.observe(&observation(5, 5, Vec::new()));
        agent.observe(&observation(0, 0, Vec::new()));
        assert_eq!(
            agent.explorer().frontier().copied().collect::<Vec<_>>(),
            vec![Position::new(5, 5)]
        );
    }

    #[test]
    fn agents_by_mode() {
        let walls = WallSet::new();
        let grid = GridModel::new(GridBounds::default(), &walls);
        let arbiter = CollisionArbiter::new(grid, std::iter::empty());
        let obs = observation(2, 5, vec![Position::new(5, 5)]);
        let view = AgentView {
            observation: &obs,
            grid,
            arbiter: &arbiter,
        };

        let mut greedy = for_mode(Mode::Greedy, "Player1");
        greedy.observe(&obs);
        assert_eq!(greedy.get_action(&view), Ok(Action::Move(Direction::Down)));

        let mut sweep = for_mode(Mode::Sweep, "Player1");
        assert_eq!(sweep.get_action(&view), Ok(Action::Move(Direction::Up)));

        let mut explorer = for_mode(Mode::Explore, "Player1");
        assert_eq!(
            explorer.get_action(&view),
            Err(DecisionError::Explore(ExploreError::NotSeeded))
        );
        explorer.observe(&obs);
        assert_eq!(explorer.get_action(&view), Ok(Action::Stay));
        assert_eq!(explorer.id(), "Player1");
    }
}
