//! Headless client for poking at a running server: joins the lobby,
//! optionally starts the match, steers away from walls and snakes, and
//! prints what it sees.

use clap::Parser;
use log::{info, warn};
use rand::seq::SliceRandom;
use shared::{
    recv_message, send_message, Cell, ClientMessage, Direction, PlayerId, ServerMessage,
    WorldSnapshot,
};
use std::collections::HashSet;
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless snake client", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:5555")]
    server: String,

    /// Ask the server to start the match as soon as we are in the lobby
    #[arg(long)]
    start: bool,

    /// Number of matches to play before exiting
    #[arg(short = 'r', long, default_value_t = 1)]
    rounds: u32,

    /// Board width in pixels
    #[arg(long, default_value_t = shared::BOARD_WIDTH)]
    width: i32,

    /// Board height in pixels
    #[arg(long, default_value_t = shared::BOARD_HEIGHT)]
    height: i32,

    /// Size of one grid cell in pixels
    #[arg(long, default_value_t = shared::CELL_SIZE)]
    cell_size: i32,
}

struct Pilot {
    width: i32,
    height: i32,
    cell_size: i32,
    heading: Direction,
}

impl Pilot {
    /// Keeps going straight if that is safe, otherwise turns to a random
    /// safe neighbour. Returns a direction only when it changes.
    fn steer(&mut self, me: PlayerId, state: &WorldSnapshot) -> Option<Direction> {
        let head = *state.snakes.get(&me)?.first()?;
        let blocked: HashSet<Cell> = state.snakes.values().flatten().copied().collect();

        let safe = |direction: Direction| {
            let next = head.step(direction, self.cell_size);
            next.x >= 0
                && next.x < self.width
                && next.y >= 0
                && next.y < self.height
                && !blocked.contains(&next)
        };

        if safe(self.heading) {
            return None;
        }

        let mut options: Vec<Direction> = Direction::ALL
            .into_iter()
            .filter(|d| *d != self.heading.opposite() && safe(*d))
            .collect();
        options.shuffle(&mut rand::thread_rng());

        let choice = options.first().copied()?;
        self.heading = choice;
        Some(choice)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    stream.set_nodelay(true)?;
    println!("Connected to {}", args.server);
    let (mut reader, mut writer) = stream.into_split();

    let mut pilot = Pilot {
        width: args.width,
        height: args.height,
        cell_size: args.cell_size,
        heading: Direction::Right,
    };
    let mut me: Option<PlayerId> = None;
    let mut rounds_left = args.rounds;
    let mut asked_to_start = false;

    while let Some(frame) = recv_message::<_, ServerMessage>(&mut reader).await? {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping unreadable message: {}", e);
                continue;
            }
        };

        match message {
            ServerMessage::Lobby { connected, max } => {
                println!("Lobby: {}/{} players", connected, max);
                if args.start && !asked_to_start {
                    send_message(&mut writer, &ClientMessage::StartGame).await?;
                    asked_to_start = true;
                }
            }
            ServerMessage::Full => {
                println!("Server is full");
                break;
            }
            ServerMessage::Start { player_id, players } => {
                let name = players.get(&player_id).map(String::as_str).unwrap_or("unnamed");
                println!("Match started, we are {} ({})", name, player_id);
                me = Some(player_id);
                pilot.heading = Direction::Right;
            }
            ServerMessage::Update { data } => {
                let Some(id) = me else { continue };
                if !data.alive.get(&id).copied().unwrap_or(false) {
                    continue;
                }
                if let Some(direction) = pilot.steer(id, &data) {
                    info!("Turning {:?}", direction);
                    send_message(&mut writer, &ClientMessage::Input { direction }).await?;
                }
                println!(
                    "Length {} | fruit at ({}, {})",
                    data.snakes.get(&id).map_or(0, Vec::len),
                    data.fruit.x,
                    data.fruit.y
                );
            }
            ServerMessage::GameOver { scores } => {
                println!("Final scores:");
                let mut ranked: Vec<(PlayerId, i64)> = scores.into_iter().collect();
                ranked.sort_by(|a, b| b.1.cmp(&a.1));
                for (id, score) in ranked {
                    let marker = if Some(id) == me { " (you)" } else { "" };
                    println!("  player {}: {} fruit{}", id, score, marker);
                }

                me = None;
                asked_to_start = false;
                rounds_left = rounds_left.saturating_sub(1);
                if rounds_left == 0 {
                    break;
                }
                // Hold the scoreboard like a real client before rejoining the lobby.
                tokio::time::sleep(shared::SCOREBOARD_DISPLAY).await;
            }
        }
    }

    println!("Test client finished");
    Ok(())
}
