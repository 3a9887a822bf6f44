//! Lobby and match state machine.
//!
//! The orchestrator is the only owner of the `World`. Connection handlers
//! talk to it through `GameCommand`s; it answers through the registry's
//! broadcast and per-player sends.

use crate::config::ServerConfig;
use crate::registry::{ConnectionRegistry, Roster};
use crate::world::World;
use log::{debug, info};
use shared::{Direction, PlayerId, ServerMessage};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Requests forwarded from connection handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameCommand {
    StartGame { player_id: PlayerId },
    Input { player_id: PlayerId, direction: Direction },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Running,
    /// `game_over` has been sent; clients are showing the scoreboard.
    GameOver,
}

/// Result of one finished match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub roster: Roster,
    pub scores: BTreeMap<PlayerId, i64>,
    pub ticks: u64,
}

pub struct Orchestrator {
    config: ServerConfig,
    registry: Arc<RwLock<ConnectionRegistry>>,
    commands: mpsc::Receiver<GameCommand>,
    phase: watch::Sender<Phase>,
}

impl Orchestrator {
    pub fn new(
        config: ServerConfig,
        registry: Arc<RwLock<ConnectionRegistry>>,
        commands: mpsc::Receiver<GameCommand>,
        phase: watch::Sender<Phase>,
    ) -> Self {
        Self {
            config,
            registry,
            commands,
            phase,
        }
    }

    /// Cycles lobby -> match -> lobby until every command sender is gone.
    pub async fn run(mut self) {
        while self.run_lobby().await {
            match self.run_match().await {
                Some(summary) => info!(
                    "Match over after {} ticks, scores {:?}. Returning to lobby",
                    summary.ticks, summary.scores
                ),
                None => info!("Everyone left before the match began"),
            }
        }
        info!("Command channel closed, orchestrator stopping");
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.send_replace(phase);
    }

    /// Broadcasts lobby status until someone asks to start. Returns false
    /// if the command channel closed.
    async fn run_lobby(&mut self) -> bool {
        self.registry.write().await.reopen_lobby();
        self.set_phase(Phase::Lobby);

        // Requests sent during the last match do not carry over.
        while self.commands.try_recv().is_ok() {}

        let mut lobby_timer = interval(self.config.lobby_interval);
        lobby_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = lobby_timer.tick() => self.broadcast_lobby().await,

                command = self.commands.recv() => match command {
                    Some(GameCommand::StartGame { player_id }) => {
                        if self.registry.read().await.is_empty() {
                            debug!("Ignoring start from player {}: lobby is empty", player_id);
                            continue;
                        }
                        info!("Player {} started the match", player_id);
                        return true;
                    }
                    Some(GameCommand::Input { .. }) => {}
                    None => return false,
                },
            }
        }
    }

    async fn broadcast_lobby(&self) {
        let mut registry = self.registry.write().await;
        let message = ServerMessage::Lobby {
            connected: registry.len(),
            max: registry.max_connections(),
        };
        let dead = registry.broadcast(&message);
        if !dead.is_empty() {
            info!("Removed {} unreachable players from the lobby", dead.len());
        }
    }

    /// Plays one match with everyone currently connected.
    async fn run_match(&mut self) -> Option<MatchSummary> {
        self.set_phase(Phase::Running);
        let roster = self.registry.write().await.rename_for_match();
        if roster.is_empty() {
            return None;
        }

        info!("Starting match with {} players", roster.len());
        let mut world = World::new(&roster, self.config.world_settings());

        {
            let mut registry = self.registry.write().await;
            for id in roster.keys() {
                registry.send_to(
                    *id,
                    ServerMessage::Start {
                        player_id: *id,
                        players: roster.clone(),
                    },
                );
            }
        }

        sleep(self.config.start_delay).await;

        let mut intents: HashMap<PlayerId, Direction> = HashMap::new();
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        ticker.tick().await;

        while !world.is_over() {
            self.collect_intents(&mut intents);
            for (id, direction) in &intents {
                world.set_intent(*id, *direction);
            }

            let report = world.tick();
            for id in &report.died {
                info!(
                    "{} died on tick {}",
                    roster.get(id).map(String::as_str).unwrap_or("unknown"),
                    world.tick_count()
                );
            }
            if !report.ate.is_empty() {
                debug!("Tick {}: fruit eaten by {:?}", world.tick_count(), report.ate);
            }

            let update = ServerMessage::Update {
                data: world.snapshot(),
            };
            self.registry.write().await.broadcast(&update);

            ticker.tick().await;
        }

        let scores = world.final_scores();
        self.set_phase(Phase::GameOver);
        self.registry
            .write()
            .await
            .broadcast(&ServerMessage::GameOver {
                scores: scores.clone(),
            });

        sleep(self.config.game_over_cooldown).await;

        Some(MatchSummary {
            roster,
            scores,
            ticks: world.tick_count(),
        })
    }

    /// Drains pending commands. The latest direction per player wins and is
    /// kept for later ticks.
    fn collect_intents(&mut self, intents: &mut HashMap<PlayerId, Direction>) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                GameCommand::Input {
                    player_id,
                    direction,
                } => {
                    intents.insert(player_id, direction);
                }
                GameCommand::StartGame { .. } => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::OUTBOUND_QUEUE_LEN;
    use crate::world::Board;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::time::timeout;

    fn fast_config() -> ServerConfig {
        ServerConfig {
            board: Board {
                width: 100,
                height: 100,
                cell_size: 20,
            },
            tick_interval: Duration::from_millis(5),
            lobby_interval: Duration::from_millis(10),
            start_delay: Duration::from_millis(1),
            game_over_cooldown: Duration::from_millis(1),
            ..ServerConfig::default()
        }
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    struct Harness {
        orchestrator: Orchestrator,
        registry: Arc<RwLock<ConnectionRegistry>>,
        commands: mpsc::Sender<GameCommand>,
        phase: watch::Receiver<Phase>,
    }

    fn harness() -> Harness {
        let config = fast_config();
        let registry = Arc::new(RwLock::new(ConnectionRegistry::new(config.max_players)));
        let (commands, command_rx) = mpsc::channel(16);
        let (phase_tx, phase) = watch::channel(Phase::Lobby);
        Harness {
            orchestrator: Orchestrator::new(config, Arc::clone(&registry), command_rx, phase_tx),
            registry,
            commands,
            phase,
        }
    }

    async fn join(
        registry: &Arc<RwLock<ConnectionRegistry>>,
    ) -> (PlayerId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_LEN * 8);
        let id = registry.write().await.register(test_addr(), tx).unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_collect_intents_keeps_latest_per_player() {
        let mut h = harness();
        for direction in [Direction::Up, Direction::Left] {
            h.commands
                .send(GameCommand::Input {
                    player_id: 0,
                    direction,
                })
                .await
                .unwrap();
        }
        h.commands
            .send(GameCommand::Input {
                player_id: 1,
                direction: Direction::Down,
            })
            .await
            .unwrap();
        h.commands
            .send(GameCommand::StartGame { player_id: 1 })
            .await
            .unwrap();

        let mut intents = HashMap::new();
        intents.insert(2, Direction::Right);
        h.orchestrator.collect_intents(&mut intents);

        assert_eq!(intents.len(), 3);
        assert_eq!(intents[&0], Direction::Left);
        assert_eq!(intents[&1], Direction::Down);
        assert_eq!(intents[&2], Direction::Right);
    }

    #[tokio::test]
    async fn test_lobby_broadcasts_until_start() {
        let mut h = harness();
        let (id, mut rx) = join(&h.registry).await;

        let commands = h.commands.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(35)).await;
            commands.send(GameCommand::StartGame { player_id: id }).await.unwrap();
        });

        let started = timeout(Duration::from_secs(2), h.orchestrator.run_lobby())
            .await
            .unwrap();
        assert!(started);

        let mut lobby_messages = 0;
        while let Ok(message) = rx.try_recv() {
            assert_eq!(
                message,
                ServerMessage::Lobby {
                    connected: 1,
                    max: 4
                }
            );
            lobby_messages += 1;
        }
        assert!(lobby_messages >= 2);
        assert_eq!(*h.phase.borrow(), Phase::Lobby);
    }

    #[tokio::test]
    async fn test_lobby_ignores_stale_start_requests() {
        let mut h = harness();
        let (id, _rx) = join(&h.registry).await;
        h.commands
            .send(GameCommand::StartGame { player_id: id })
            .await
            .unwrap();

        let result = timeout(Duration::from_millis(50), h.orchestrator.run_lobby()).await;
        assert!(result.is_err(), "stale start request should not start a match");
    }

    #[tokio::test]
    async fn test_lobby_stops_when_commands_close() {
        let mut h = harness();
        drop(h.commands);
        let started = timeout(Duration::from_secs(1), h.orchestrator.run_lobby())
            .await
            .unwrap();
        assert!(!started);
    }

    #[tokio::test]
    async fn test_match_runs_to_game_over() {
        let mut h = harness();
        let (id, mut rx) = join(&h.registry).await;

        let summary = timeout(Duration::from_secs(2), h.orchestrator.run_match())
            .await
            .unwrap()
            .unwrap();

        // Snake starts at column 2 of 5 heading right: dead on the third tick.
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.roster[&id], "Player 1");
        assert_eq!(*h.phase.borrow(), Phase::GameOver);

        match rx.try_recv().unwrap() {
            ServerMessage::Start { player_id, players } => {
                assert_eq!(player_id, id);
                assert_eq!(players, summary.roster);
            }
            other => panic!("Expected start, got {:?}", other),
        }

        let mut last_update = None;
        let mut updates = 0;
        loop {
            match rx.try_recv().unwrap() {
                ServerMessage::Update { data } => {
                    updates += 1;
                    last_update = Some(data);
                }
                ServerMessage::GameOver { scores } => {
                    let data = last_update.expect("update before game over");
                    assert!(!data.alive[&id]);
                    assert_eq!(scores[&id], data.scores[&id] - 3);
                    assert_eq!(scores, summary.scores);
                    break;
                }
                other => panic!("Unexpected message {:?}", other),
            }
        }
        assert_eq!(updates, 3);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_match_applies_buffered_input() {
        let mut h = harness();
        let (id, mut rx) = join(&h.registry).await;
        h.commands
            .send(GameCommand::Input {
                player_id: id,
                direction: Direction::Down,
            })
            .await
            .unwrap();

        timeout(Duration::from_secs(2), h.orchestrator.run_match())
            .await
            .unwrap()
            .unwrap();

        let _start = rx.try_recv().unwrap();
        match rx.try_recv().unwrap() {
            ServerMessage::Update { data } => {
                // Head started at (40, 20) and turned down.
                assert_eq!(data.snakes[&id][0], shared::Cell::new(40, 40));
            }
            other => panic!("Expected update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_match_without_players_is_skipped() {
        let mut h = harness();
        let summary = h.orchestrator.run_match().await;
        assert!(summary.is_none());
    }
}
