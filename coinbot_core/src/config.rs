use std::{collections::HashSet, fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{AgentId, TeamName, arbiter::CollisionScope, map::GridBounds};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Agent '{0}' is listed more than once")]
    DuplicateAgent(AgentId),
    #[error("Grid must have a positive size, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },
    #[error("Unknown mode '{0}', expected explore, greedy or sweep")]
    UnknownMode(String),
}

/// Decision policy shared by every agent of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Breadth-first frontier walk, no goal.
    Explore,
    /// Head for the nearest visible coin.
    #[default]
    Greedy,
    /// Take the first safe direction in fixed priority order.
    Sweep,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Explore => "explore",
            Mode::Greedy => "greedy",
            Mode::Sweep => "sweep",
        })
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "explore" => Ok(Mode::Explore),
            "greedy" => Ok(Mode::Greedy),
            "sweep" => Ok(Mode::Sweep),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// A player controlled by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: AgentId,
    pub team: TeamName,
}

impl AgentSpec {
    pub fn new(name: impl Into<AgentId>, team: impl Into<TeamName>) -> Self {
        AgentSpec {
            name: name.into(),
            team: team.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridBounds,
    pub mode: Mode,
    pub collision: CollisionScope,
    pub agents: Vec<AgentSpec>,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.width == 0 || self.grid.height == 0 {
            return Err(ConfigError::EmptyGrid {
                width: self.grid.width,
                height: self.grid.height,
            });
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::DuplicateAgent(agent.name.clone()));
            }
        }
        Ok(())
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_collision(mut self, collision: CollisionScope) -> Self {
        self.collision = collision;
        self
    }

    pub fn with_agent(mut self, name: impl Into<AgentId>, team: impl Into<TeamName>) -> Self {
        self.agents.push(AgentSpec::new(name, team));
        self
    }

    /// The four-player lobby the game is usually played with: two per team.
    pub fn two_teams() -> Self {
        Self::default()
            .with_agent("Player1", "ATeam")
            .with_agent("Player2", "ATeam")
            .with_agent("Player3", "BTeam")
            .with_agent("Player4", "BTeam")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_json_with_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "mode": "explore",
                "collision": { "teammates": true, "enemies": false },
                "agents": [{ "name": "Player1", "team": "ATeam" }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.mode, Mode::Explore);
        assert_eq!(config.grid, GridBounds::new(10, 10));
        assert!(!config.collision.enemies);
        assert_eq!(config.agents, vec![AgentSpec::new("Player1", "ATeam")]);
    }

    #[test]
    fn rejects_duplicate_agents() {
        let err = EngineConfig::from_json_str(
            r#"{"agents": [{"name": "P", "team": "A"}, {"name": "P", "team": "B"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateAgent(name) if name == "P"));
    }

    #[test]
    fn rejects_empty_grid() {
        let err = EngineConfig::from_json_str(r#"{"grid": {"width": 0, "height": 10}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyGrid { width: 0, .. }));
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Explore".parse::<Mode>().unwrap(), Mode::Explore);
        assert_eq!("sweep".parse::<Mode>().unwrap(), Mode::Sweep);
        assert!("random".parse::<Mode>().is_err());
    }

    #[test]
    fn two_team_lobby() {
        let config = EngineConfig::two_teams();
        assert_eq!(config.agents.len(), 4);
        assert!(config.validate().is_ok());
    }
}
