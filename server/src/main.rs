use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use server::world::Board;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = shared::DEFAULT_HOST)]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Board width in pixels
    #[arg(long, default_value_t = shared::BOARD_WIDTH)]
    width: i32,

    /// Board height in pixels
    #[arg(long, default_value_t = shared::BOARD_HEIGHT)]
    height: i32,

    /// Size of one grid cell in pixels
    #[arg(long, default_value_t = shared::CELL_SIZE)]
    cell_size: i32,

    /// Milliseconds between simulation ticks
    #[arg(short, long, default_value_t = shared::TICK_INTERVAL.as_millis() as u64)]
    tick_ms: u64,

    /// Maximum number of connected players
    #[arg(short, long, default_value_t = shared::MAX_PLAYERS)]
    max_players: usize,

    /// Keep dead snakes on the board as obstacles for everyone still alive
    #[arg(long)]
    corpses_block: bool,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            board: Board {
                width: args.width,
                height: args.height,
                cell_size: args.cell_size,
            },
            max_players: args.max_players,
            tick_interval: Duration::from_millis(args.tick_ms),
            corpses_are_hazards: args.corpses_block,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!(
        "Board {}x{} ({}px cells), {} players max, {:?} per tick",
        config.board.width,
        config.board.height,
        config.board.cell_size,
        config.max_players,
        config.tick_interval
    );

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
