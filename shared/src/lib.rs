//! Types shared by the snake server and its clients: board constants, grid
//! geometry, the message catalogue and the length-prefixed framing used on
//! the wire.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod framing;
pub mod protocol;

pub use framing::{recv_message, send_message, TransportError, MAX_FRAME_LEN};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage, WorldSnapshot};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5555;

/// Board size in pixels. Cells are `CELL_SIZE` pixels wide.
pub const BOARD_WIDTH: i32 = 600;
pub const BOARD_HEIGHT: i32 = 400;
pub const CELL_SIZE: i32 = 20;

pub const MAX_PLAYERS: usize = 4;
pub const INITIAL_SNAKE_LENGTH: usize = 3;

pub const TICK_INTERVAL: Duration = Duration::from_millis(150);
pub const LOBBY_BROADCAST_INTERVAL: Duration = Duration::from_secs(1);
pub const START_DELAY: Duration = Duration::from_millis(500);
pub const GAME_OVER_COOLDOWN: Duration = Duration::from_secs(1);

/// How long a client keeps the final scoreboard on screen before returning
/// to its lobby view. The server does not wait for it.
pub const SCOREBOARD_DISPLAY: Duration = Duration::from_secs(4);

pub type PlayerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Unit step in grid cells. Screen coordinates: y grows downwards.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

/// A grid-aligned board position in pixels. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step of `cell_size` pixels away.
    pub fn step(self, direction: Direction, cell_size: i32) -> Cell {
        let (dx, dy) = direction.delta();
        Cell {
            x: self.x + dx * cell_size,
            y: self.y + dy * cell_size,
        }
    }
}

impl From<(i32, i32)> for Cell {
    fn from((x, y): (i32, i32)) -> Self {
        Cell { x, y }
    }
}

impl From<Cell> for (i32, i32) {
    fn from(cell: Cell) -> Self {
        (cell.x, cell.y)
    }
}
