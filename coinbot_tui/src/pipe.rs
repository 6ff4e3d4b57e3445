//! Line-oriented bridge to an external transport.
//!
//! Input lines are `<topic>\t<payload>`; a line holding only `---` closes the round.
//! Output lines use the same shape.

use std::io::{BufRead, Write};

use anyhow::Result;
use coinbot_core::{
    engine::Engine,
    protocol::{Inbound, Outbound, Topics, registrations, round_messages},
};
use tracing::{debug, info, warn};

pub const ROUND_BOUNDARY: &str = "---";

fn write_message<W: Write>(out: &mut W, topics: &Topics, message: &Outbound) -> Result<()> {
    let (topic, payload) = message.to_message(topics);
    writeln!(out, "{topic}\t{payload}")?;
    Ok(())
}

pub fn write_registrations<W: Write>(out: &mut W, topics: &Topics, engine: &Engine) -> Result<()> {
    for message in registrations(topics, engine.config()) {
        write_message(out, topics, &message)?;
    }
    out.flush()?;
    Ok(())
}

/// Feeds `input` to the engine until it ends, a STOP arrives, or the engine halts.
pub fn run<R: BufRead, W: Write>(
    engine: &mut Engine,
    topics: &Topics,
    input: R,
    out: &mut W,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if line == ROUND_BOUNDARY {
            let outcome = engine.decide_round();
            for message in round_messages(&outcome) {
                write_message(out, topics, &message)?;
            }
            out.flush()?;
            if outcome.is_final() {
                info!(round = outcome.round, status = ?outcome.status, "Session over");
                break;
            }
            continue;
        }

        let Some((topic, payload)) = line.split_once('\t') else {
            warn!(line, "Expected <topic>\\t<payload>, ignoring line");
            continue;
        };
        match Inbound::parse(topics, topic, payload) {
            Inbound::GameState { player, payload } => {
                if let Err(err) = engine.ingest(&player, &payload) {
                    debug!(%player, %err, "Game state dropped");
                }
            }
            Inbound::Start => info!(lobby = topics.lobby_name(), "Game started"),
            Inbound::Stop => {
                engine.stop();
                break;
            }
            Inbound::Lobby(payload) => info!(%payload, "Lobby"),
            Inbound::Scores(payload) => info!(%payload, "Scores"),
            Inbound::Other { topic } => debug!(%topic, "Ignoring message"),
        }
    }
    Ok(())
}
