//! TCP front end: accepting players, per-connection reader and writer tasks,
//! and wiring them to the orchestrator.

use crate::config::ServerConfig;
use crate::orchestrator::{GameCommand, Orchestrator, Phase};
use crate::registry::{ConnectionRegistry, RegistryError, OUTBOUND_QUEUE_LEN};
use log::{debug, error, info, warn};
use shared::{framing, ClientMessage, PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};

/// Commands buffered between handlers and the orchestrator.
const COMMAND_QUEUE_LEN: usize = 1000;

/// Main server: owns the listener until `run` hands it to the acceptor.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(
        config: ServerConfig,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        config.validate()?;
        let listener = TcpListener::bind(config.address()).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server { listener, config })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the acceptor and the orchestrator until either stops.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let registry = Arc::new(RwLock::new(ConnectionRegistry::new(self.config.max_players)));
        let (cmd_sender, cmd_receiver) = mpsc::channel::<GameCommand>(COMMAND_QUEUE_LEN);
        let (phase_sender, phase_receiver) = watch::channel(Phase::Lobby);

        let orchestrator = Orchestrator::new(
            self.config.clone(),
            Arc::clone(&registry),
            cmd_receiver,
            phase_sender,
        );
        let game_handle = tokio::spawn(orchestrator.run());

        let acceptor = Acceptor {
            listener: self.listener,
            registry,
            commands: cmd_sender,
            phase: phase_receiver,
        };
        let network_handle = tokio::spawn(acceptor.run());

        info!("Server started successfully");

        tokio::select! {
            result = game_handle => result?,
            result = network_handle => result?,
        }

        Ok(())
    }
}

struct Acceptor {
    listener: TcpListener,
    registry: Arc<RwLock<ConnectionRegistry>>,
    commands: mpsc::Sender<GameCommand>,
    phase: watch::Receiver<Phase>,
}

impl Acceptor {
    async fn run(mut self) {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!("Could not disable Nagle for {}: {}", addr, e);
            }

            if !self.admit(stream, addr).await {
                info!("Orchestrator gone, acceptor stopping");
                return;
            }
        }
    }

    /// Registers a socket, holding it until the lobby is open. Returns false
    /// once the orchestrator has stopped.
    async fn admit(&mut self, stream: TcpStream, addr: SocketAddr) -> bool {
        let (reader, mut writer) = stream.into_split();
        let (out_sender, out_receiver) = mpsc::channel(OUTBOUND_QUEUE_LEN);

        let registered = loop {
            if !self.wait_for_lobby().await {
                return false;
            }
            match self.registry.write().await.register(addr, out_sender.clone()) {
                Err(RegistryError::LobbyClosed) => {
                    // Lobby flag lags the phase; wait for the next transition.
                    if self.phase.changed().await.is_err() {
                        return false;
                    }
                }
                other => break other,
            }
        };

        match registered {
            Ok(player_id) => {
                tokio::spawn(write_loop(player_id, writer, out_receiver));
                tokio::spawn(handle_connection(
                    player_id,
                    reader,
                    Arc::clone(&self.registry),
                    self.commands.clone(),
                ));
            }
            Err(e) => {
                info!("Rejecting {}: {}", addr, e);
                if let Err(e) = framing::send_message(&mut writer, &ServerMessage::Full).await {
                    debug!("Could not tell {} the server is full: {}", addr, e);
                }
                if let Err(e) = writer.shutdown().await {
                    debug!("Could not close connection to {}: {}", addr, e);
                }
            }
        }
        true
    }

    async fn wait_for_lobby(&mut self) -> bool {
        while *self.phase.borrow_and_update() != Phase::Lobby {
            if self.phase.changed().await.is_err() {
                return false;
            }
        }
        true
    }
}

/// Drains one connection's outbound queue onto its socket. Ends when the
/// registry drops the queue or a write fails, closing the write side.
async fn write_loop(
    player_id: PlayerId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        if let Err(e) = framing::send_message(&mut writer, &message).await {
            debug!("Failed to send {} to player {}: {}", message.kind(), player_id, e);
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!("Could not close connection to player {}: {}", player_id, e);
    }
}

/// Reads one player's frames for the life of the connection and forwards
/// them to the orchestrator. Any read failure counts as a disconnect.
async fn handle_connection(
    player_id: PlayerId,
    mut reader: OwnedReadHalf,
    registry: Arc<RwLock<ConnectionRegistry>>,
    commands: mpsc::Sender<GameCommand>,
) {
    loop {
        let command = match framing::recv_message::<_, ClientMessage>(&mut reader).await {
            Ok(Some(Ok(ClientMessage::StartGame))) => GameCommand::StartGame { player_id },
            Ok(Some(Ok(ClientMessage::Input { direction }))) => GameCommand::Input {
                player_id,
                direction,
            },
            Ok(Some(Err(e))) => {
                debug!("Ignoring message from player {}: {}", player_id, e);
                continue;
            }
            Ok(None) => {
                info!("Player {} disconnected", player_id);
                break;
            }
            Err(e) => {
                warn!("Connection to player {} failed: {}", player_id, e);
                break;
            }
        };

        if commands.send(command).await.is_err() {
            break;
        }
    }

    registry.write().await.unregister(player_id);
}
