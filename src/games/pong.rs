use super::Difficulty;
use crate::scores::ScoreBoard;
use crate::ui::{self, Cell, Flash, Rgb, TerminalGuard};
use crossterm::event::KeyCode;
use rand::Rng;
use std::f32::consts::PI;
use std::io::Stdout;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const SCORE_KEY: &str = "pong";

pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 400.0;
pub const BALL_RADIUS: f32 = 10.0;
pub const PADDLE_WIDTH: f32 = 10.0;
pub const PADDLE_HEIGHT: f32 = 100.0;
const PLAYER_STEP: f32 = 20.0;
const AI_TRACKING: f32 = 0.1;
const AI_RETURN: f32 = 0.5;
const AI_TRACK_SLACK: f32 = 10.0;
const AI_CENTER_SLACK: f32 = 20.0;
const RALLY_SPEEDUP: f32 = 1.05;
const BOUNCE_SPREAD: f32 = PI / 3.0;

const VIEW_COLS: usize = 60;
const VIEW_ROWS: usize = 20;
const POINT_FLASH: Duration = Duration::from_millis(600);

const BALL: Rgb = Rgb::new(255, 107, 107);
const COURT: Rgb = Rgb::new(26, 26, 46);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tuning
{
    pub ai_speed: f32,
    pub ball_speed: f32,
    pub max_score: u32,
}

impl Tuning
{
    pub fn for_difficulty(difficulty: Difficulty) -> Self
    {
        let (ai_speed, ball_speed, max_score) = match difficulty {
            Difficulty::Easy => (3.0, 4.0, 3),
            Difficulty::Medium => (5.0, 6.0, 5),
            Difficulty::Hard => (7.0, 8.0, 7),
        };
        Self {
            ai_speed,
            ball_speed,
            max_score,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ball
{
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Paddle
{
    pub x: f32,
    /// Top edge.
    pub y: f32,
    pub score: u32,
}

impl Paddle
{
    fn center(&self) -> f32
    {
        self.y + PADDLE_HEIGHT / 2.0
    }

    fn clamp(&mut self)
    {
        self.y = self.y.clamp(0.0, FIELD_HEIGHT - PADDLE_HEIGHT);
    }

    fn covers(&self, y: f32) -> bool
    {
        y > self.y && y < self.y + PADDLE_HEIGHT
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side
{
    Player,
    Ai,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome
{
    Idle,
    Rally,
    WallBounce,
    PaddleHit(Side),
    Point(Side),
    MatchOver(Side),
}

pub struct PongState
{
    ball: Ball,
    player: Paddle,
    ai: Paddle,
    tuning: Tuning,
    winner: Option<Side>,
}

impl PongState
{
    pub fn new(difficulty: Difficulty) -> Self
    {
        let tuning = Tuning::for_difficulty(difficulty);
        let paddle_y = FIELD_HEIGHT / 2.0 - PADDLE_HEIGHT / 2.0;
        Self {
            ball: Ball {
                x: FIELD_WIDTH / 2.0,
                y: FIELD_HEIGHT / 2.0,
                vx: tuning.ball_speed,
                vy: tuning.ball_speed,
            },
            player: Paddle {
                x: 0.0,
                y: paddle_y,
                score: 0,
            },
            ai: Paddle {
                x: FIELD_WIDTH - PADDLE_WIDTH,
                y: paddle_y,
                score: 0,
            },
            tuning,
            winner: None,
        }
    }

    pub fn ball(&self) -> &Ball
    {
        &self.ball
    }

    pub fn player(&self) -> &Paddle
    {
        &self.player
    }

    pub fn ai(&self) -> &Paddle
    {
        &self.ai
    }

    pub fn tuning(&self) -> &Tuning
    {
        &self.tuning
    }

    pub fn winner(&self) -> Option<Side>
    {
        self.winner
    }

    pub fn move_player(&mut self, steps: i32)
    {
        if self.winner.is_some() {
            return;
        }
        self.player.y += steps as f32 * PLAYER_STEP;
        self.player.clamp();
    }

    /// Advances one frame.
    pub fn step(&mut self, rng: &mut impl Rng) -> FrameOutcome
    {
        if self.winner.is_some() {
            return FrameOutcome::Idle;
        }

        self.ball.x += self.ball.vx;
        self.ball.y += self.ball.vy;
        self.steer_ai();

        let mut outcome = FrameOutcome::Rally;

        if self.ball.y - BALL_RADIUS < 0.0 {
            self.ball.y = BALL_RADIUS;
            self.ball.vy = self.ball.vy.abs();
            outcome = FrameOutcome::WallBounce;
        } else if self.ball.y + BALL_RADIUS > FIELD_HEIGHT {
            self.ball.y = FIELD_HEIGHT - BALL_RADIUS;
            self.ball.vy = -self.ball.vy.abs();
            outcome = FrameOutcome::WallBounce;
        }

        let player_hit = self.ball.x - BALL_RADIUS < self.player.x + PADDLE_WIDTH
            && self.player.covers(self.ball.y);
        let ai_hit = self.ball.x + BALL_RADIUS > self.ai.x && self.ai.covers(self.ball.y);
        if player_hit {
            self.deflect(Side::Player);
            outcome = FrameOutcome::PaddleHit(Side::Player);
        } else if ai_hit {
            self.deflect(Side::Ai);
            outcome = FrameOutcome::PaddleHit(Side::Ai);
        }

        let scorer = if self.ball.x < 0.0 {
            Some(Side::Ai)
        } else if self.ball.x > FIELD_WIDTH {
            Some(Side::Player)
        } else {
            None
        };
        if let Some(side) = scorer {
            let paddle = match side {
                Side::Player => &mut self.player,
                Side::Ai => &mut self.ai,
            };
            paddle.score += 1;
            let reached = paddle.score >= self.tuning.max_score;
            self.serve(rng);
            if reached {
                self.winner = Some(side);
                return FrameOutcome::MatchOver(side);
            }
            return FrameOutcome::Point(side);
        }

        outcome
    }

    fn steer_ai(&mut self)
    {
        let center = self.ai.center();
        if self.ball.vx > 0.0 {
            let step = self.tuning.ai_speed * AI_TRACKING;
            if center < self.ball.y - AI_TRACK_SLACK {
                self.ai.y += step;
            } else if center > self.ball.y + AI_TRACK_SLACK {
                self.ai.y -= step;
            }
        } else if self.ball.vx < 0.0 {
            let step = self.tuning.ai_speed * AI_RETURN;
            let middle = FIELD_HEIGHT / 2.0;
            if center < middle - AI_CENTER_SLACK {
                self.ai.y += step;
            } else if center > middle + AI_CENTER_SLACK {
                self.ai.y -= step;
            }
        }
        self.ai.clamp();
    }

    /// Off-centre hits leave at a steeper angle, and every return is a bit
    /// faster than the last.
    fn deflect(&mut self, side: Side)
    {
        let paddle = match side {
            Side::Player => &self.player,
            Side::Ai => &self.ai,
        };
        let hit = (self.ball.y - paddle.y) / PADDLE_HEIGHT;
        let angle = (hit - 0.5) * BOUNCE_SPREAD;
        let speed = self.ball.vx.abs() * RALLY_SPEEDUP;
        let direction = match side {
            Side::Player => 1.0,
            Side::Ai => -1.0,
        };
        self.ball.vx = direction * speed;
        self.ball.vy = speed * angle.sin();
    }

    fn serve(&mut self, rng: &mut impl Rng)
    {
        let speed = self.tuning.ball_speed;
        self.ball = Ball {
            x: FIELD_WIDTH / 2.0,
            y: FIELD_HEIGHT / 2.0,
            vx: if rng.gen_bool(0.5) { speed } else { -speed },
            vy: if rng.gen_bool(0.5) { speed } else { -speed },
        };
    }
}

pub fn run(difficulty: Difficulty, scores_path: &Path) -> Result<(), String>
{
    let mut term = TerminalGuard::enter()?;
    let mut rng = rand::thread_rng();
    let mut scores = ScoreBoard::open(scores_path, SCORE_KEY);
    let mut state = PongState::new(difficulty);
    let mut started = false;
    let mut paused = false;
    let mut flash: Option<(Side, Flash)> = None;

    info!(%difficulty, "pong started");

    let mut last_frame = Instant::now();

    loop {
        let mut quit = false;
        for key in ui::poll_keys()? {
            if ui::is_quit(&key) {
                quit = true;
                break;
            }
            match key.code {
                KeyCode::Char(' ') => {
                    if !started {
                        started = true;
                    } else {
                        paused = !paused;
                    }
                }
                KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => {
                    if started && !paused {
                        state.move_player(-1);
                    }
                }
                KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => {
                    if started && !paused {
                        state.move_player(1);
                    }
                }
                _ => {}
            }
        }
        if quit {
            break;
        }

        if last_frame.elapsed() >= ui::TICK {
            if started && !paused {
                match state.step(&mut rng) {
                    FrameOutcome::Point(side) | FrameOutcome::MatchOver(side) => {
                        debug!(
                            ?side,
                            player = state.player().score,
                            ai = state.ai().score,
                            "pong point"
                        );
                        flash = Some((side, Flash::new(Instant::now(), POINT_FLASH)));
                    }
                    _ => {}
                }
            }
            draw(term.stdout(), &state, difficulty, scores.best(), started, paused, flash.as_ref())?;
            last_frame = Instant::now();
        }

        if state.winner().is_some() {
            break;
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    let points = state.player().score;
    let is_new_best = scores.finish(points)?;
    info!(
        player = points,
        ai = state.ai().score,
        winner = ?state.winner(),
        "pong finished"
    );
    if state.winner().is_some() {
        draw_summary(term.stdout(), &state, scores.best(), is_new_best)?;
        ui::wait_for_space()?;
    }
    Ok(())
}

fn to_col(x: f32) -> usize
{
    ((x / FIELD_WIDTH) * VIEW_COLS as f32).floor().clamp(0.0, (VIEW_COLS - 1) as f32) as usize
}

fn to_row(y: f32) -> usize
{
    ((y / FIELD_HEIGHT) * VIEW_ROWS as f32).floor().clamp(0.0, (VIEW_ROWS - 1) as f32) as usize
}

fn draw(
    stdout: &mut Stdout,
    state: &PongState,
    difficulty: Difficulty,
    best: u32,
    started: bool,
    paused: bool,
    flash: Option<&(Side, Flash)>,
) -> Result<(), String>
{
    let now = Instant::now();
    let mut field = vec![vec![Cell::block(COURT); VIEW_COLS]; VIEW_ROWS];

    for (row, line) in field.iter_mut().enumerate() {
        if row % 2 == 0 {
            line[VIEW_COLS / 2] = Cell {
                ch: '|',
                fg: Some(ui::GREY),
                bg: Some(COURT),
            };
        }
    }

    for paddle in [state.player(), state.ai()] {
        let col = to_col(paddle.x);
        let top = to_row(paddle.y);
        let bottom = to_row(paddle.y + PADDLE_HEIGHT - 1.0);
        for line in field.iter_mut().take(bottom + 1).skip(top) {
            line[col] = Cell::block(ui::WHITE);
        }
    }

    let ball = state.ball();
    field[to_row(ball.y)][to_col(ball.x)] = Cell {
        ch: 'o',
        fg: Some(BALL),
        bg: Some(COURT),
    };

    let score_color = |side: Side| match flash {
        Some((scorer, f)) if *scorer == side && f.is_active(now) => ui::lerp_color(ui::GOLD, ui::WHITE, f.progress(now)),
        _ => ui::WHITE,
    };
    let player_score = format!("You {}", state.player().score);
    let ai_score = format!("{} AI", state.ai().score);
    let mut header: Vec<Cell> = player_score.chars().map(|ch| Cell::fg(ch, score_color(Side::Player))).collect();
    header.extend(std::iter::repeat(Cell::BLANK).take(VIEW_COLS.saturating_sub(player_score.len() + ai_score.len())));
    header.extend(ai_score.chars().map(|ch| Cell::fg(ch, score_color(Side::Ai))));

    let mut lines = Vec::new();
    lines.push("KB Arcade - Pong".to_string());
    lines.push(format!(
        "Difficulty: {}  First to {}  Best: {}",
        difficulty,
        state.tuning().max_score,
        best
    ));
    lines.push(String::new());
    lines.push(format!(" {}", ui::render_row(&header)));
    lines.push(format!("+{}+", "-".repeat(VIEW_COLS)));
    for line in &field {
        lines.push(format!("|{}|", ui::render_row(line)));
    }
    lines.push(format!("+{}+", "-".repeat(VIEW_COLS)));
    lines.push(String::new());
    if !started {
        lines.push("Press SPACE to serve.".to_string());
    } else if paused {
        lines.push("Paused. SPACE resumes.".to_string());
    } else {
        lines.push("Up/Down or W/S move your paddle. SPACE pauses.".to_string());
    }
    lines.push("Esc quits.".to_string());

    ui::draw_lines(stdout, &lines)
}

fn draw_summary(
    stdout: &mut Stdout,
    state: &PongState,
    best: u32,
    is_new_best: bool,
) -> Result<(), String>
{
    let mut lines = Vec::new();
    lines.push(match state.winner() {
        Some(Side::Player) => "You win!".to_string(),
        _ => "The AI wins.".to_string(),
    });
    lines.push(String::new());
    lines.push(format!("You {} - {} AI", state.player().score, state.ai().score));
    lines.push(format!("Best: {}", best));
    if is_new_best {
        lines.push("New high score!".to_string());
    }
    lines.push(String::new());
    lines.push("Press SPACE to exit.".to_string());
    ui::draw_lines(stdout, &lines)
}
