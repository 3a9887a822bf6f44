//! # Snake Server Library
//!
//! This library provides the authoritative server for a real-time multiplayer
//! snake game. Players connect over TCP, wait together in a lobby, and once
//! anyone asks to start, the server runs a tick-based simulation and
//! broadcasts every resulting state to all participants.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Movement, collisions, scoring and fruit placement all happen here. Clients
//! only send the direction they want to go next; the server decides what
//! actually happened and tells everyone.
//!
//! ### Lobby and Match Lifecycle
//! The server cycles lobby -> match -> lobby. While in the lobby it announces
//! how many players are connected about once a second. A match ends when the
//! last snake dies; the server sends final scores, pauses briefly so clients
//! can show them, and reopens the lobby.
//!
//! ### Connection Handling
//! Up to four players may be connected at once. A fifth connection is told
//! the server is full and closed. A player whose socket fails is removed
//! without disturbing anyone else; if that happens mid-match, their snake
//! keeps its last direction until it dies.
//!
//! ## Architecture Design
//!
//! ### Tasks
//! - **Acceptor**: admits sockets while the lobby is open
//! - **Reader** (one per connection): decodes frames and forwards commands
//! - **Writer** (one per connection): drains that player's outbound queue
//! - **Orchestrator**: the single owner of the world; runs lobby and ticks
//!
//! ### Shared State
//! The connection registry sits behind an async `RwLock`. The world is never
//! shared: handlers reach the orchestrator only through a command channel,
//! and the orchestrator applies the latest direction of each player at the
//! start of every tick.
//!
//! ### Wire Protocol
//! Every message is a 4-byte big-endian length followed by a JSON object
//! with a `type` field. See the `shared` crate for the message catalogue.
//!
//! ## Module Organization
//!
//! - `config`: server settings and their validation
//! - `network`: listener, per-connection tasks, `Server`
//! - `orchestrator`: lobby/match state machine and tick loop
//! - `registry`: connected players, names, broadcast
//! - `world`: the deterministic snake simulation
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod network;
pub mod orchestrator;
pub mod registry;
pub mod world;
