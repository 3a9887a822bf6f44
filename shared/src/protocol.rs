//! Message catalogue exchanged between clients and the server.
//!
//! Every payload is a JSON object carrying a `type` discriminator plus the
//! fields of that message. Maps keyed by player id travel as JSON objects
//! with decimal string keys and are parsed back into integer ids.

use crate::{Cell, Direction, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the server to leave the lobby and start a match.
    StartGame,
    Input { direction: Direction },
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Lobby {
        connected: usize,
        max: usize,
    },
    /// Server is at capacity; the connection is closed right after.
    Full,
    Start {
        player_id: PlayerId,
        #[serde(with = "id_map")]
        players: BTreeMap<PlayerId, String>,
    },
    Update {
        data: WorldSnapshot,
    },
    /// Fruit eaten per player over the match.
    GameOver {
        #[serde(with = "id_map")]
        scores: BTreeMap<PlayerId, i64>,
    },
}

impl ServerMessage {
    /// Wire name of the message, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Lobby { .. } => "lobby",
            ServerMessage::Full => "full",
            ServerMessage::Start { .. } => "start",
            ServerMessage::Update { .. } => "update",
            ServerMessage::GameOver { .. } => "game_over",
        }
    }
}

/// Read-only copy of the world after a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(with = "id_map")]
    pub snakes: BTreeMap<PlayerId, Vec<Cell>>,
    pub fruit: Cell,
    #[serde(with = "id_map")]
    pub alive: BTreeMap<PlayerId, bool>,
    #[serde(with = "id_map")]
    pub scores: BTreeMap<PlayerId, i64>,
    #[serde(with = "id_map")]
    pub names: BTreeMap<PlayerId, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A complete frame whose payload is not a message we understand.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(message)
}

pub fn decode<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Serde adapter for maps keyed by player id.
///
/// Tagged enums buffer their content before picking a variant, and the
/// buffered keys are plain strings, so ids are parsed explicitly here.
mod id_map {
    use crate::PlayerId;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<V, S>(map: &BTreeMap<PlayerId, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        map.serialize(serializer)
    }

    pub fn deserialize<'de, V, D>(deserializer: D) -> Result<BTreeMap<PlayerId, V>, D::Error>
    where
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, V>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| {
                key.parse::<PlayerId>()
                    .map(|id| (id, value))
                    .map_err(|_| D::Error::custom(format!("invalid player id `{}`", key)))
            })
            .collect()
    }
}
