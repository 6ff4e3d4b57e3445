//! Topic layout and message payloads of the lobby protocol.
//!
//! Pure data plumbing: connecting, subscribing and publishing belong to whatever
//! transport carries these messages.

use serde::{Deserialize, Serialize};

use crate::{
    AgentId, TeamName,
    config::EngineConfig,
    direction::Direction,
    engine::RoundOutcome,
};

/// Topic on which players are registered for a lobby.
pub const NEW_GAME: &str = "new_game";
pub const START: &str = "START";
pub const STOP: &str = "STOP";

/// Registration payload published on [`NEW_GAME`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGame {
    pub lobby_name: String,
    pub team_name: TeamName,
    pub player_name: AgentId,
}

/// Topic names for one lobby.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    lobby: String,
}

impl Topics {
    pub fn new(lobby: impl Into<String>) -> Self {
        Topics {
            lobby: lobby.into(),
        }
    }

    pub fn lobby_name(&self) -> &str {
        &self.lobby
    }

    pub fn lobby(&self) -> String {
        format!("games/{}/lobby", self.lobby)
    }

    pub fn game_state(&self, player: &str) -> String {
        format!("games/{}/{}/game_state", self.lobby, player)
    }

    pub fn moves(&self, player: &str) -> String {
        format!("games/{}/{}/move", self.lobby, player)
    }

    pub fn start(&self) -> String {
        format!("games/{}/start", self.lobby)
    }

    pub fn scores(&self) -> String {
        format!("games/{}/scores", self.lobby)
    }

    /// Topics a client listens on for the whole session.
    pub fn subscriptions(&self) -> Vec<String> {
        vec![self.lobby(), self.game_state("+"), self.scores()]
    }
}

/// A message received from the game, classified by topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    GameState { player: AgentId, payload: String },
    Start,
    Stop,
    Lobby(String),
    Scores(String),
    Other { topic: String },
}

impl Inbound {
    pub fn parse(topics: &Topics, topic: &str, payload: &str) -> Inbound {
        let parts: Vec<&str> = topic.split('/').collect();
        match parts.as_slice() {
            ["games", lobby, player, "game_state"] if *lobby == topics.lobby => {
                Inbound::GameState {
                    player: player.to_string(),
                    payload: payload.to_string(),
                }
            }
            ["games", lobby, "start"] if *lobby == topics.lobby => match payload.trim() {
                START => Inbound::Start,
                STOP => Inbound::Stop,
                _ => Inbound::Other {
                    topic: topic.to_string(),
                },
            },
            ["games", lobby, "lobby"] if *lobby == topics.lobby => {
                Inbound::Lobby(payload.to_string())
            }
            ["games", lobby, "scores"] if *lobby == topics.lobby => {
                Inbound::Scores(payload.to_string())
            }
            _ => Inbound::Other {
                topic: topic.to_string(),
            },
        }
    }
}

/// A message for the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Register(NewGame),
    Stop,
    Move { player: AgentId, direction: Direction },
}

impl Outbound {
    /// Topic and payload to publish.
    pub fn to_message(&self, topics: &Topics) -> (String, String) {
        match self {
            Outbound::Register(new_game) => (
                NEW_GAME.to_string(),
                serde_json::json!({
                    "lobby_name": new_game.lobby_name,
                    "team_name": new_game.team_name,
                    "player_name": new_game.player_name,
                })
                .to_string(),
            ),
            Outbound::Stop => (topics.start(), STOP.to_string()),
            Outbound::Move { player, direction } => {
                (topics.moves(player), direction.as_str().to_string())
            }
        }
    }
}

/// Registrations for every agent in the config.
pub fn registrations(topics: &Topics, config: &EngineConfig) -> Vec<Outbound> {
    config
        .agents
        .iter()
        .map(|agent| {
            Outbound::Register(NewGame {
                lobby_name: topics.lobby_name().to_string(),
                team_name: agent.team.clone(),
                player_name: agent.name.clone(),
            })
        })
        .collect()
}

/// What to publish after a round: one move per moving agent, then STOP on the one
/// round in which the engine halted itself.
pub fn round_messages(outcome: &RoundOutcome) -> Vec<Outbound> {
    let mut messages: Vec<Outbound> = outcome
        .moves
        .iter()
        .map(|(player, direction)| Outbound::Move {
            player: player.clone(),
            direction: *direction,
        })
        .collect();
    if outcome.halted {
        messages.push(Outbound::Stop);
    }
    messages
}
