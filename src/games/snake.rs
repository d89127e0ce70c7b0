use super::Difficulty;
use crate::scores::ScoreBoard;
use crate::ui::{self, Cell, Rgb, TerminalGuard};
use crossterm::event::KeyCode;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::io::Stdout;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const SCORE_KEY: &str = "snake";

const GRID: i32 = 20;
const START: Pos = Pos { x: 10, y: 10 };
const FOOD_POINTS: u32 = 10;
const SPEEDUP: Duration = Duration::from_millis(2);
const MIN_INTERVAL: Duration = Duration::from_millis(50);
const FOOD_PULSE: Duration = Duration::from_millis(600);

const HEAD: Rgb = Rgb::new(50, 130, 184);
const BODY: Rgb = Rgb::new(15, 76, 117);
const FOOD: Rgb = Rgb::new(255, 107, 107);
const FOOD_GLOW: Rgb = Rgb::new(255, 71, 87);
const FLOOR: Rgb = Rgb::new(26, 26, 46);
const CRASH: Rgb = Rgb::new(231, 76, 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pos
{
    pub x: i32,
    pub y: i32,
}

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
    fn delta(self) -> (i32, i32)
    {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    fn opposite(self) -> Self
    {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome
{
    /// No direction chosen yet, or the game is already over.
    Idle,
    Moved,
    Ate,
    HitWall,
    HitSelf,
    /// The snake covers the whole grid.
    Filled,
}

fn tick_interval(difficulty: Difficulty) -> Duration
{
    match difficulty {
        Difficulty::Easy => Duration::from_millis(200),
        Difficulty::Medium => Duration::from_millis(150),
        Difficulty::Hard => Duration::from_millis(100),
    }
}

pub struct SnakeState
{
    body: VecDeque<Pos>,
    heading: Option<Direction>,
    pending: Option<Direction>,
    food: Option<Pos>,
    score: u32,
    interval: Duration,
    over: bool,
    won: bool,
}

impl SnakeState
{
    pub fn new(difficulty: Difficulty, rng: &mut impl Rng) -> Self
    {
        let mut state = Self {
            body: VecDeque::from([START]),
            heading: None,
            pending: None,
            food: None,
            score: 0,
            interval: tick_interval(difficulty),
            over: false,
            won: false,
        };
        state.food = state.spawn_food(rng);
        state
    }

    pub fn head(&self) -> Pos
    {
        self.body[0]
    }

    pub fn body(&self) -> &VecDeque<Pos>
    {
        &self.body
    }

    pub fn food(&self) -> Option<Pos>
    {
        self.food
    }

    pub fn score(&self) -> u32
    {
        self.score
    }

    pub fn interval(&self) -> Duration
    {
        self.interval
    }

    pub fn is_over(&self) -> bool
    {
        self.over
    }

    pub fn is_won(&self) -> bool
    {
        self.won
    }

    pub fn is_started(&self) -> bool
    {
        self.heading.is_some() || self.pending.is_some()
    }

    /// Queues a turn for the next step. The reverse of the last applied
    /// heading is refused.
    pub fn change_direction(&mut self, dir: Direction) -> bool
    {
        if self.over {
            return false;
        }
        if self.heading.is_some_and(|heading| heading.opposite() == dir) {
            return false;
        }
        self.pending = Some(dir);
        true
    }

    pub fn step(&mut self, rng: &mut impl Rng) -> StepOutcome
    {
        if self.over {
            return StepOutcome::Idle;
        }
        let Some(dir) = self.pending.take().or(self.heading) else {
            return StepOutcome::Idle;
        };
        self.heading = Some(dir);

        let (dx, dy) = dir.delta();
        let head = self.head();
        let next = Pos {
            x: head.x + dx,
            y: head.y + dy,
        };

        if next.x < 0 || next.x >= GRID || next.y < 0 || next.y >= GRID {
            self.over = true;
            return StepOutcome::HitWall;
        }

        let grows = self.food == Some(next);
        // The tail moves out of the way this step unless the snake is growing.
        let solid = if grows {
            self.body.len()
        } else {
            self.body.len() - 1
        };
        if self.body.iter().take(solid).any(|segment| *segment == next) {
            self.over = true;
            return StepOutcome::HitSelf;
        }

        self.body.push_front(next);
        if !grows {
            self.body.pop_back();
            return StepOutcome::Moved;
        }

        self.score += FOOD_POINTS;
        self.interval = self.interval.saturating_sub(SPEEDUP).max(MIN_INTERVAL);
        self.food = self.spawn_food(rng);
        if self.food.is_none() {
            self.over = true;
            self.won = true;
            return StepOutcome::Filled;
        }
        StepOutcome::Ate
    }

    fn spawn_food(&self, rng: &mut impl Rng) -> Option<Pos>
    {
        let mut free = Vec::with_capacity((GRID * GRID) as usize);
        for y in 0..GRID {
            for x in 0..GRID {
                let pos = Pos { x, y };
                if !self.body.contains(&pos) {
                    free.push(pos);
                }
            }
        }
        free.choose(rng).copied()
    }

    #[cfg(test)]
    fn with_body(body: &[Pos], heading: Option<Direction>, food: Option<Pos>) -> Self
    {
        Self {
            body: body.iter().copied().collect(),
            heading,
            pending: None,
            food,
            score: 0,
            interval: tick_interval(Difficulty::Medium),
            over: false,
            won: false,
        }
    }
}

pub fn run(difficulty: Difficulty, scores_path: &Path) -> Result<(), String>
{
    let mut term = TerminalGuard::enter()?;
    let mut rng = rand::thread_rng();
    let mut scores = ScoreBoard::open(scores_path, SCORE_KEY);
    let mut state = SnakeState::new(difficulty, &mut rng);
    let mut paused = false;

    info!(%difficulty, "snake started");

    let start = Instant::now();
    let mut last_step = Instant::now();
    let mut last_draw = Instant::now();

    loop {
        let mut quit = false;
        for key in ui::poll_keys()? {
            if ui::is_quit(&key) {
                quit = true;
                break;
            }
            match key.code {
                KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => {
                    state.change_direction(Direction::Up);
                }
                KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => {
                    state.change_direction(Direction::Down);
                }
                KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => {
                    state.change_direction(Direction::Left);
                }
                KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => {
                    state.change_direction(Direction::Right);
                }
                KeyCode::Char(' ') => {
                    if state.is_started() {
                        paused = !paused;
                    }
                }
                _ => {}
            }
        }
        if quit {
            break;
        }

        if !paused && last_step.elapsed() >= state.interval() {
            let outcome = state.step(&mut rng);
            if outcome != StepOutcome::Idle && outcome != StepOutcome::Moved {
                debug!(?outcome, score = state.score(), "snake step");
            }
            last_step = Instant::now();
        }

        if state.is_over() {
            draw(term.stdout(), &state, difficulty, scores.best(), paused, start)?;
            std::thread::sleep(ui::FINAL_FRAME);
            break;
        }

        if last_draw.elapsed() >= ui::TICK {
            draw(term.stdout(), &state, difficulty, scores.best(), paused, start)?;
            last_draw = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    let is_new_best = scores.finish(state.score())?;
    info!(score = state.score(), length = state.body().len(), won = state.is_won(), "snake finished");
    draw_summary(term.stdout(), &state, scores.best(), is_new_best)?;
    ui::wait_for_space()?;
    Ok(())
}

fn draw(
    stdout: &mut Stdout,
    state: &SnakeState,
    difficulty: Difficulty,
    best: u32,
    paused: bool,
    start: Instant,
) -> Result<(), String>
{
    let lines = frame_lines(state, difficulty, best, paused, start, Instant::now());
    ui::draw_lines(stdout, &lines)
}

fn frame_lines(
    state: &SnakeState,
    difficulty: Difficulty,
    best: u32,
    paused: bool,
    start: Instant,
    now: Instant,
) -> Vec<String>
{
    let mut lines = Vec::new();
    lines.push("KB Arcade - Snake".to_string());
    lines.push(format!(
        "Difficulty: {}  Score: {}  Best: {}  Tick: {}ms",
        difficulty,
        state.score(),
        best.max(state.score()),
        state.interval().as_millis()
    ));
    lines.push(String::new());

    let glow = ui::pulse(start, now, FOOD_PULSE);
    let food_color = ui::lerp_color(FOOD, FOOD_GLOW, glow);
    let mut field = vec![vec![Cell::block(FLOOR); (GRID * 2) as usize]; GRID as usize];
    if let Some(food) = state.food() {
        let row = &mut field[food.y as usize];
        row[(food.x * 2) as usize] = Cell::fg('(', food_color);
        row[(food.x * 2 + 1) as usize] = Cell::fg(')', food_color);
    }
    let crashed = state.is_over() && !state.is_won();
    for (idx, segment) in state.body().iter().enumerate() {
        let color = match idx {
            0 if crashed => CRASH,
            0 => HEAD,
            _ => BODY,
        };
        let row = &mut field[segment.y as usize];
        row[(segment.x * 2) as usize] = Cell::block(color);
        row[(segment.x * 2 + 1) as usize] = Cell::block(color);
    }

    lines.push(format!("+{}+", "-".repeat((GRID * 2) as usize)));
    for row in &field {
        lines.push(format!("|{}|", ui::render_row(row)));
    }
    lines.push(format!("+{}+", "-".repeat((GRID * 2) as usize)));

    lines.push(String::new());
    if crashed {
        lines.push("Crashed!".to_string());
    } else if state.is_won() {
        lines.push("Board filled!".to_string());
    } else if !state.is_started() {
        lines.push("Press an arrow key (or WASD) to start.".to_string());
    } else if paused {
        lines.push("Paused. SPACE resumes.".to_string());
    } else {
        lines.push("Arrows/WASD steer. SPACE pauses.".to_string());
    }
    lines.push("Esc quits.".to_string());
    lines
}

fn draw_summary(
    stdout: &mut Stdout,
    state: &SnakeState,
    best: u32,
    is_new_best: bool,
) -> Result<(), String>
{
    let mut lines = Vec::new();
    lines.push(if state.is_won() {
        "The snake fills the board!".to_string()
    } else {
        "Game over".to_string()
    });
    lines.push(String::new());
    lines.push(format!("Score: {}", state.score()));
    lines.push(format!("Length: {}", state.body().len()));
    lines.push(format!("Best: {}", best));
    if is_new_best {
        lines.push("New high score!".to_string());
    }
    lines.push(String::new());
    lines.push("Press SPACE to exit.".to_string());
    ui::draw_lines(stdout, &lines)
}
