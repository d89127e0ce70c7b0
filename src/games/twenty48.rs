use crate::scores::ScoreBoard;
use crate::ui::{self, Cell, Flash, Rgb, TerminalGuard};
use crossterm::event::KeyCode;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::io::Stdout;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const SCORE_KEY: &str = "2048";

pub const SIZE: usize = 4;
pub const WIN_TILE: u32 = 2048;
const HISTORY_LIMIT: usize = 10;
const FOUR_CHANCE: f64 = 0.1;
const TILE_WIDTH: usize = 8;
const SPAWN_FLASH: Duration = Duration::from_millis(250);

pub type Grid = [[u32; SIZE]; SIZE];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction
{
    Up,
    Down,
    Left,
    Right,
}

impl Direction
{
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Grid coordinates of the `k`-th cell of line `line`, ordered so that
    /// index 0 is the cell tiles slide toward.
    fn coords(self, line: usize, k: usize) -> (usize, usize)
    {
        match self {
            Direction::Left => (line, k),
            Direction::Right => (line, SIZE - 1 - k),
            Direction::Up => (k, line),
            Direction::Down => (SIZE - 1 - k, line),
        }
    }
}

/// Compacts a line toward index 0 and merges equal neighbours once each.
/// Returns the new line and the points gained from merges.
pub fn slide_row(row: [u32; SIZE]) -> ([u32; SIZE], u32)
{
    let tiles: Vec<u32> = row.iter().copied().filter(|&value| value != 0).collect();
    let mut out = [0; SIZE];
    let mut gained = 0;
    let mut write = 0;
    let mut i = 0;
    while i < tiles.len() {
        if i + 1 < tiles.len() && tiles[i] == tiles[i + 1] {
            let merged = tiles[i] * 2;
            out[write] = merged;
            gained += merged;
            i += 2;
        } else {
            out[write] = tiles[i];
            i += 1;
        }
        write += 1;
    }
    (out, gained)
}

pub fn shift(grid: &Grid, dir: Direction) -> (Grid, u32)
{
    let mut next = *grid;
    let mut gained = 0;
    for line in 0..SIZE {
        let mut cells = [0; SIZE];
        for (k, cell) in cells.iter_mut().enumerate() {
            let (r, c) = dir.coords(line, k);
            *cell = grid[r][c];
        }
        let (slid, points) = slide_row(cells);
        gained += points;
        for (k, value) in slid.into_iter().enumerate() {
            let (r, c) = dir.coords(line, k);
            next[r][c] = value;
        }
    }
    (next, gained)
}

pub fn has_tile(grid: &Grid, value: u32) -> bool
{
    grid.iter().flatten().any(|&cell| cell == value)
}

/// Full board with no equal neighbours in either axis.
pub fn is_game_over(grid: &Grid) -> bool
{
    if has_tile(grid, 0) {
        return false;
    }
    for r in 0..SIZE {
        for c in 0..SIZE {
            let value = grid[r][c];
            if r + 1 < SIZE && grid[r + 1][c] == value {
                return false;
            }
            if c + 1 < SIZE && grid[r][c + 1] == value {
                return false;
            }
        }
    }
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Snapshot
{
    grid: Grid,
    score: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MoveOutcome
{
    pub moved: bool,
    pub gained: u32,
    pub spawned: Option<(usize, usize)>,
    /// True only on the move that first produced a 2048 tile.
    pub reached_win: bool,
}

pub struct Game2048
{
    grid: Grid,
    score: u32,
    history: VecDeque<Snapshot>,
    won: bool,
    over: bool,
}

impl Game2048
{
    pub fn new(rng: &mut impl Rng) -> Self
    {
        let mut game = Self::from_grid([[0; SIZE]; SIZE]);
        game.spawn_tile(rng);
        game.spawn_tile(rng);
        game
    }

    pub fn from_grid(grid: Grid) -> Self
    {
        Self {
            grid,
            score: 0,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            won: has_tile(&grid, WIN_TILE),
            over: is_game_over(&grid),
        }
    }

    pub fn grid(&self) -> &Grid
    {
        &self.grid
    }

    pub fn score(&self) -> u32
    {
        self.score
    }

    pub fn is_won(&self) -> bool
    {
        self.won
    }

    pub fn is_over(&self) -> bool
    {
        self.over
    }

    pub fn undo_depth(&self) -> usize
    {
        self.history.len()
    }

    /// Places a 2 (or, one time in ten, a 4) on a random empty cell.
    pub fn spawn_tile(&mut self, rng: &mut impl Rng) -> Option<(usize, usize)>
    {
        let empty: Vec<(usize, usize)> = (0..SIZE)
            .flat_map(|r| (0..SIZE).map(move |c| (r, c)))
            .filter(|&(r, c)| self.grid[r][c] == 0)
            .collect();
        let &(r, c) = empty.choose(rng)?;
        self.grid[r][c] = if rng.gen_bool(FOUR_CHANCE) { 4 } else { 2 };
        Some((r, c))
    }

    pub fn apply_move(&mut self, dir: Direction, rng: &mut impl Rng) -> MoveOutcome
    {
        if self.over {
            return MoveOutcome::default();
        }
        let (next, gained) = shift(&self.grid, dir);
        if next == self.grid {
            return MoveOutcome::default();
        }

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(Snapshot {
            grid: self.grid,
            score: self.score,
        });

        self.grid = next;
        self.score += gained;
        let spawned = self.spawn_tile(rng);

        let reached_win = !self.won && has_tile(&self.grid, WIN_TILE);
        if reached_win {
            self.won = true;
        }
        self.over = is_game_over(&self.grid);

        MoveOutcome {
            moved: true,
            gained,
            spawned,
            reached_win,
        }
    }

    pub fn undo(&mut self) -> bool
    {
        let Some(snapshot) = self.history.pop_back() else {
            return false;
        };
        self.grid = snapshot.grid;
        self.score = snapshot.score;
        self.won = has_tile(&self.grid, WIN_TILE);
        self.over = false;
        true
    }
}

pub fn run(scores_path: &Path) -> Result<(), String>
{
    let mut term = TerminalGuard::enter()?;
    let mut rng = rand::thread_rng();
    let mut scores = ScoreBoard::open(scores_path, SCORE_KEY);
    let mut game = Game2048::new(&mut rng);
    let mut message: Option<String> = None;
    let mut pop: Option<((usize, usize), Flash)> = None;
    let mut over_recorded = false;

    info!("2048 started");

    let mut last_draw = Instant::now();

    loop {
        let mut quit = false;
        for key in ui::poll_keys()? {
            if ui::is_quit(&key) {
                quit = true;
                break;
            }
            let dir = match key.code {
                KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => Some(Direction::Up),
                KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => Some(Direction::Down),
                KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => Some(Direction::Left),
                KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => Some(Direction::Right),
                KeyCode::Char('u') | KeyCode::Char('U') => {
                    if game.undo() {
                        message = Some("Undone.".to_string());
                        over_recorded = false;
                    }
                    None
                }
                KeyCode::Char('n') | KeyCode::Char('N') => {
                    scores.finish(game.score())?;
                    info!(score = game.score(), "2048 restarted");
                    game = Game2048::new(&mut rng);
                    message = None;
                    over_recorded = false;
                    None
                }
                _ => None,
            };
            let Some(dir) = dir else {
                continue;
            };
            let outcome = game.apply_move(dir, &mut rng);
            if !outcome.moved {
                continue;
            }
            message = None;
            if let Some(cell) = outcome.spawned {
                pop = Some((cell, Flash::new(Instant::now(), SPAWN_FLASH)));
            }
            if outcome.reached_win {
                info!(score = game.score(), "reached 2048");
                message = Some("You reached 2048! Keep going.".to_string());
            }
            debug!(?dir, gained = outcome.gained, score = game.score(), "2048 move");
        }
        if quit {
            break;
        }

        if game.is_over() && !over_recorded {
            over_recorded = true;
            let is_new_best = scores.finish(game.score())?;
            info!(score = game.score(), is_new_best, "2048 game over");
            message = Some(if is_new_best {
                format!("Game over! New high score: {}", game.score())
            } else {
                format!("Game over! Your score: {}", game.score())
            });
        }

        if last_draw.elapsed() >= ui::TICK {
            draw(term.stdout(), &game, scores.best(), message.as_deref(), pop.as_ref())?;
            last_draw = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    scores.finish(game.score())?;
    info!(score = game.score(), "2048 finished");
    Ok(())
}

fn tile_colors(value: u32) -> (Rgb, Rgb)
{
    let bg = match value {
        0 => Rgb::new(205, 193, 180),
        2 => Rgb::new(238, 228, 218),
        4 => Rgb::new(237, 224, 200),
        8 => Rgb::new(242, 177, 121),
        16 => Rgb::new(245, 149, 99),
        32 => Rgb::new(246, 124, 95),
        64 => Rgb::new(246, 94, 59),
        128 => Rgb::new(237, 207, 114),
        256 => Rgb::new(237, 204, 97),
        512 => Rgb::new(237, 200, 80),
        1024 => Rgb::new(237, 197, 63),
        2048 => Rgb::new(237, 194, 46),
        _ => Rgb::new(60, 58, 50),
    };
    let fg = if value <= 4 {
        Rgb::new(119, 110, 101)
    } else {
        ui::WHITE
    };
    (bg, fg)
}

fn draw(
    stdout: &mut Stdout,
    game: &Game2048,
    best: u32,
    message: Option<&str>,
    pop: Option<&((usize, usize), Flash)>,
) -> Result<(), String>
{
    let now = Instant::now();
    let mut lines = Vec::new();
    lines.push("KB Arcade - 2048".to_string());
    lines.push(format!(
        "Score: {}  Best: {}  Undo: {}",
        game.score(),
        best.max(game.score()),
        game.undo_depth()
    ));
    lines.push(String::new());

    for r in 0..SIZE {
        let mut rows = vec![Vec::new(), Vec::new(), Vec::new()];
        for c in 0..SIZE {
            let value = game.grid()[r][c];
            let (mut bg, fg) = tile_colors(value);
            if let Some(((pr, pc), flash)) = pop {
                if (*pr, *pc) == (r, c) && flash.is_active(now) {
                    bg = ui::lerp_color(ui::WHITE, bg, flash.progress(now));
                }
            }
            let label = if value == 0 {
                String::new()
            } else {
                value.to_string()
            };
            let text = format!("{:^width$}", label, width = TILE_WIDTH);
            for (idx, row) in rows.iter_mut().enumerate() {
                if idx == 1 {
                    row.extend(text.chars().map(|ch| Cell {
                        ch,
                        fg: Some(fg),
                        bg: Some(bg),
                    }));
                } else {
                    row.extend(std::iter::repeat(Cell::block(bg)).take(TILE_WIDTH));
                }
                row.push(Cell::BLANK);
            }
        }
        for row in rows {
            lines.push(ui::render_row(&row));
        }
        lines.push(String::new());
    }

    if let Some(msg) = message {
        lines.push(msg.to_string());
    }
    lines.push("Arrows/WASD slide. U undo, N new game, Esc quits.".to_string());

    ui::draw_lines(stdout, &lines)
}
