//! Connection registry for the lobby and the running match
//!
//! This module tracks every connected player on the server side:
//! - Player id assignment and capacity enforcement
//! - Display names, including the frozen roster handed to a match
//! - Per-connection outbound queues and broadcast delivery
//! - Reaping peers whose writer has gone away
//!
//! The registry never touches sockets itself. Each connection owns a writer
//! task draining a bounded queue, so a slow or broken peer only ever loses
//! its own messages.

use log::{debug, info, warn};
use shared::{PlayerId, ServerMessage};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Player ids and display names for one match.
pub type Roster = BTreeMap<PlayerId, String>;

/// Messages buffered per connection before new ones are dropped.
pub const OUTBOUND_QUEUE_LEN: usize = 64;

const PLACEHOLDER_NAME: &str = "Player TEMP";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("server is full ({max} players)")]
    CapacityExceeded { max: usize },
    #[error("a match is in progress")]
    LobbyClosed,
}

/// Outcome of handing a message to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full; this message is lost for this peer only.
    Dropped,
    /// Writer has exited; the peer is dead.
    Closed,
}

/// A registered player connection
#[derive(Debug)]
pub struct Connection {
    pub id: PlayerId,
    pub addr: SocketAddr,
    pub name: String,
    outbound: mpsc::Sender<ServerMessage>,
}

impl Connection {
    pub fn new(id: PlayerId, addr: SocketAddr, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            addr,
            name: PLACEHOLDER_NAME.to_string(),
            outbound,
        }
    }

    /// Queues a message without waiting on the socket.
    pub fn deliver(&self, message: ServerMessage) -> Delivery {
        match self.outbound.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(message)) => {
                warn!(
                    "Outbound queue for player {} is full, dropping {}",
                    self.id,
                    message.kind()
                );
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Owns every live connection and the id counter.
///
/// Ids increase for the lifetime of the process and are never handed out
/// twice, so a roster built from the registry stays unambiguous even after
/// players leave.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: BTreeMap<PlayerId, Connection>,
    next_id: PlayerId,
    max_connections: usize,
    lobby_open: bool,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 0,
            max_connections,
            lobby_open: true,
        }
    }

    /// Admits a new connection and returns its player id.
    ///
    /// Fails when the registry already holds `max_connections` players, or
    /// while a match is running.
    pub fn register(
        &mut self,
        addr: SocketAddr,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<PlayerId, RegistryError> {
        if !self.lobby_open {
            return Err(RegistryError::LobbyClosed);
        }
        if self.connections.len() >= self.max_connections {
            return Err(RegistryError::CapacityExceeded {
                max: self.max_connections,
            });
        }

        let id = self.next_id;
        self.next_id += 1;

        info!("Player {} connected from {}", id, addr);
        self.connections
            .insert(id, Connection::new(id, addr, outbound));
        Ok(id)
    }

    /// Removes a connection. Dropping its queue lets the writer task close
    /// the socket. Returns false if it was already gone.
    pub fn unregister(&mut self, id: PlayerId) -> bool {
        if let Some(connection) = self.connections.remove(&id) {
            info!("{} (player {}) left", connection.name, id);
            true
        } else {
            false
        }
    }

    /// Sends to one player. Returns false if the player is unknown or dead.
    pub fn send_to(&mut self, id: PlayerId, message: ServerMessage) -> bool {
        let delivery = match self.connections.get(&id) {
            Some(connection) => connection.deliver(message),
            None => return false,
        };
        if delivery == Delivery::Closed {
            self.unregister(id);
            return false;
        }
        true
    }

    /// Sends to every registered player. Peers whose writer has exited are
    /// removed and their ids returned.
    pub fn broadcast(&mut self, message: &ServerMessage) -> Vec<PlayerId> {
        let dead: Vec<PlayerId> = self
            .connections
            .values()
            .filter(|connection| connection.deliver(message.clone()) == Delivery::Closed)
            .map(|connection| connection.id)
            .collect();

        for id in &dead {
            debug!("Pruning dead connection for player {}", id);
            self.unregister(*id);
        }
        dead
    }

    /// Closes the lobby and names players `Player 1`, `Player 2`, ... in
    /// registration order. The result is the match roster.
    pub fn rename_for_match(&mut self) -> Roster {
        self.lobby_open = false;
        for (index, connection) in self.connections.values_mut().enumerate() {
            connection.name = format!("Player {}", index + 1);
        }
        self.roster()
    }

    /// Lets new players in again after a match.
    pub fn reopen_lobby(&mut self) {
        self.lobby_open = true;
    }

    pub fn is_lobby_open(&self) -> bool {
        self.lobby_open
    }

    pub fn roster(&self) -> Roster {
        self.connections
            .iter()
            .map(|(id, connection)| (*id, connection.name.clone()))
            .collect()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
