//! Server settings. Defaults reproduce the fixed constants of the game; the
//! binary lets each one be overridden from the command line.

use crate::world::{Board, Settings};
use shared::{
    DEFAULT_HOST, DEFAULT_PORT, GAME_OVER_COOLDOWN, LOBBY_BROADCAST_INTERVAL, MAX_PLAYERS,
    START_DELAY, TICK_INTERVAL,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("cell size must be positive, got {0}")]
    InvalidCellSize(i32),
    #[error("board {width}x{height} is not a whole number of {cell_size}px cells")]
    UnalignedBoard {
        width: i32,
        height: i32,
        cell_size: i32,
    },
    #[error("board {columns}x{rows} cells is too small for a {min}-cell snake")]
    BoardTooSmall { columns: i32, rows: i32, min: i32 },
    #[error("max players must be at least 1")]
    NoPlayers,
    #[error("tick interval must be non-zero")]
    ZeroTickInterval,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub board: Board,
    pub max_players: usize,
    pub tick_interval: Duration,
    pub lobby_interval: Duration,
    pub start_delay: Duration,
    pub game_over_cooldown: Duration,
    pub corpses_are_hazards: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            board: Board::default(),
            max_players: MAX_PLAYERS,
            tick_interval: TICK_INTERVAL,
            lobby_interval: LOBBY_BROADCAST_INTERVAL,
            start_delay: START_DELAY,
            game_over_cooldown: GAME_OVER_COOLDOWN,
            corpses_are_hazards: false,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn world_settings(&self) -> Settings {
        Settings {
            board: self.board,
            corpses_are_hazards: self.corpses_are_hazards,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let Board {
            width,
            height,
            cell_size,
        } = self.board;

        if cell_size <= 0 {
            return Err(ConfigError::InvalidCellSize(cell_size));
        }
        if width % cell_size != 0 || height % cell_size != 0 {
            return Err(ConfigError::UnalignedBoard {
                width,
                height,
                cell_size,
            });
        }
        let min = shared::INITIAL_SNAKE_LENGTH as i32;
        let (columns, rows) = (self.board.columns(), self.board.rows());
        if columns < min || rows < 1 {
            return Err(ConfigError::BoardTooSmall { columns, rows, min });
        }
        if self.max_players == 0 {
            return Err(ConfigError::NoPlayers);
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        Ok(())
    }
}
