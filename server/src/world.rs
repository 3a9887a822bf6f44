//! Authoritative snake simulation.
//!
//! A `World` is built from a match roster, advanced one tick at a time by
//! the orchestrator, and thrown away when the match ends. All moves and
//! deaths of a tick are resolved against the board as it stood before the
//! tick.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    Cell, Direction, PlayerId, WorldSnapshot, BOARD_HEIGHT, BOARD_WIDTH, CELL_SIZE,
    INITIAL_SNAKE_LENGTH,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::registry::Roster;

/// Random draws before `random_position` falls back to scanning free cells.
const PLACEMENT_ATTEMPTS: usize = 64;

/// Board geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    pub width: i32,
    pub height: i32,
    pub cell_size: i32,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            width: BOARD_WIDTH,
            height: BOARD_HEIGHT,
            cell_size: CELL_SIZE,
        }
    }
}

impl Board {
    pub fn columns(&self) -> i32 {
        self.width / self.cell_size
    }

    pub fn rows(&self) -> i32 {
        self.height / self.cell_size
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.x < self.width && cell.y >= 0 && cell.y < self.height
    }

    fn cell_at(&self, column: i32, row: i32) -> Cell {
        Cell::new(column * self.cell_size, row * self.cell_size)
    }

    /// Head cells for up to four snakes: top, right, bottom and left of
    /// centre. Columns leave room for a body trailing to the left.
    pub fn start_positions(&self) -> [Cell; 4] {
        let (cols, rows) = (self.columns(), self.rows());
        let min_col = INITIAL_SNAKE_LENGTH as i32 - 1;
        let at = |col: i32, row: i32| self.cell_at(col.max(min_col), row);
        [
            at(cols / 2, rows / 4),
            at(3 * cols / 4, rows / 2),
            at(cols / 2, 3 * rows / 4),
            at(cols / 4, rows / 2),
        ]
    }
}

/// Per-match simulation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub board: Board,
    /// Whether dead snakes keep blocking the board. Off by default: only
    /// living bodies are obstacles.
    pub corpses_are_hazards: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            board: Board::default(),
            corpses_are_hazards: false,
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub died: Vec<PlayerId>,
    pub ate: Vec<PlayerId>,
}

#[derive(Debug, Clone)]
pub struct World {
    settings: Settings,
    tick: u64,
    snakes: BTreeMap<PlayerId, VecDeque<Cell>>,
    directions: BTreeMap<PlayerId, Direction>,
    alive: BTreeMap<PlayerId, bool>,
    scores: BTreeMap<PlayerId, i64>,
    names: Roster,
    fruit: Cell,
    rng: StdRng,
}

impl World {
    pub fn new(roster: &Roster, settings: Settings) -> Self {
        Self::with_rng(roster, settings, StdRng::from_entropy())
    }

    /// Deterministic world: same roster, settings and seed give the same match.
    pub fn with_seed(roster: &Roster, settings: Settings, seed: u64) -> Self {
        Self::with_rng(roster, settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(roster: &Roster, settings: Settings, rng: StdRng) -> Self {
        let board = settings.board;
        let starts = board.start_positions();

        let mut world = Self {
            settings,
            tick: 0,
            snakes: BTreeMap::new(),
            directions: BTreeMap::new(),
            alive: BTreeMap::new(),
            scores: BTreeMap::new(),
            names: roster.clone(),
            fruit: Cell::new(0, 0),
            rng,
        };

        for (index, &id) in roster.keys().enumerate() {
            let head = starts[index % starts.len()];
            let mut body = VecDeque::with_capacity(INITIAL_SNAKE_LENGTH);
            let mut cell = head;
            for _ in 0..INITIAL_SNAKE_LENGTH {
                body.push_back(cell);
                cell = cell.step(Direction::Left, board.cell_size);
            }

            info!("Spawned player {} at ({}, {})", id, head.x, head.y);
            world.snakes.insert(id, body);
            world.directions.insert(id, Direction::Right);
            world.alive.insert(id, true);
            world.scores.insert(id, INITIAL_SNAKE_LENGTH as i64);
        }

        // A fresh board always has room; origin is only a placeholder.
        world.fruit = world.random_position().unwrap_or(world.fruit);
        world
    }

    /// Picks a uniformly random grid cell not covered by any snake.
    ///
    /// Returns `None` only when every cell is occupied.
    pub fn random_position(&mut self) -> Option<Cell> {
        let board = self.settings.board;
        let (cols, rows) = (board.columns(), board.rows());
        if cols <= 0 || rows <= 0 {
            return None;
        }

        let occupied: HashSet<Cell> = self.snakes.values().flatten().copied().collect();

        for _ in 0..PLACEMENT_ATTEMPTS {
            let cell = board.cell_at(self.rng.gen_range(0..cols), self.rng.gen_range(0..rows));
            if !occupied.contains(&cell) {
                return Some(cell);
            }
        }

        // Crowded board: pick among the free cells directly.
        let free: Vec<Cell> = (0..rows)
            .flat_map(|row| (0..cols).map(move |col| (col, row)))
            .map(|(col, row)| board.cell_at(col, row))
            .filter(|cell| !occupied.contains(cell))
            .collect();

        if free.is_empty() {
            None
        } else {
            Some(free[self.rng.gen_range(0..free.len())])
        }
    }

    /// Steers a living snake. Reversing straight into its own neck is
    /// refused. Returns whether the direction was accepted.
    pub fn set_intent(&mut self, id: PlayerId, direction: Direction) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        match self.directions.get_mut(&id) {
            Some(current) if direction != current.opposite() => {
                *current = direction;
                true
            }
            _ => false,
        }
    }

    /// Advances every living snake by one cell and resolves collisions.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let board = self.settings.board;
        let mut report = TickReport::default();

        let candidates: BTreeMap<PlayerId, Cell> = self
            .snakes
            .iter()
            .filter(|(id, _)| self.is_alive(**id))
            .filter_map(|(id, body)| {
                let head = *body.front()?;
                Some((*id, head.step(self.directions[id], board.cell_size)))
            })
            .collect();

        // Bodies without their heads, as they were before anyone moved.
        let hazards: HashSet<Cell> = self
            .snakes
            .iter()
            .filter(|(id, _)| self.settings.corpses_are_hazards || self.is_alive(**id))
            .flat_map(|(_, body)| body.iter().skip(1).copied())
            .collect();

        let mut head_counts: HashMap<Cell, usize> = HashMap::new();
        for head in candidates.values() {
            *head_counts.entry(*head).or_insert(0) += 1;
        }

        for (&id, &head) in &candidates {
            let out_of_bounds = !board.contains(head);
            let hit_body = hazards.contains(&head);
            let hit_head = head_counts[&head] > 1;

            if out_of_bounds || hit_body || hit_head {
                debug!(
                    "Player {} died at ({}, {}): wall={} body={} head={}",
                    id, head.x, head.y, out_of_bounds, hit_body, hit_head
                );
                self.alive.insert(id, false);
                report.died.push(id);
                continue;
            }

            if let Some(body) = self.snakes.get_mut(&id) {
                body.push_front(head);
                if head == self.fruit {
                    if let Some(score) = self.scores.get_mut(&id) {
                        *score += 1;
                    }
                    report.ate.push(id);
                } else {
                    body.pop_back();
                }
            }
        }

        if !report.ate.is_empty() {
            if let Some(fruit) = self.random_position() {
                self.fruit = fruit;
            }
        }

        report
    }

    /// Copy of the current state for broadcasting.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            snakes: self
                .snakes
                .iter()
                .map(|(id, body)| (*id, body.iter().copied().collect()))
                .collect(),
            fruit: self.fruit,
            alive: self.alive.clone(),
            scores: self.scores.clone(),
            names: self.names.clone(),
        }
    }

    /// True once every snake in the match is dead.
    pub fn is_over(&self) -> bool {
        self.alive.values().all(|alive| !alive)
    }

    /// Fruit eaten per player: raw score minus the starting length.
    pub fn final_scores(&self) -> BTreeMap<PlayerId, i64> {
        self.scores
            .iter()
            .map(|(id, score)| (*id, score - INITIAL_SNAKE_LENGTH as i64))
            .collect()
    }

    pub fn is_alive(&self, id: PlayerId) -> bool {
        self.alive.get(&id).copied().unwrap_or(false)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn fruit(&self) -> Cell {
        self.fruit
    }

    pub fn direction(&self, id: PlayerId) -> Option<Direction> {
        self.directions.get(&id).copied()
    }
}
