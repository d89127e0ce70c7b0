use super::Difficulty;
use crate::scores::ScoreBoard;
use crate::ui::{self, Cell, Flash, Rgb, TerminalGuard};
use crossterm::event::KeyCode;
use rand::Rng;
use std::io::Stdout;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const SCORE_KEY: &str = "tetris";

pub const WIDTH: usize = 10;
pub const HEIGHT: usize = 20;

const LINE_POINTS: [u32; 5] = [0, 40, 100, 300, 1200];
const LINES_PER_LEVEL: u32 = 10;
const LEVEL_SPEEDUP_MS: u64 = 50;
const MIN_DROP_MS: u64 = 50;
const SOFT_DROP_POINTS: u32 = 1;
const HARD_DROP_POINTS: u32 = 2;
const CLEAR_FLASH: Duration = Duration::from_millis(800);

/// Row-major grid of colour indices; 0 is empty, 1..=7 match `PieceKind`.
pub type Board = [[u8; WIDTH]; HEIGHT];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PieceKind
{
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind
{
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    pub fn random(rng: &mut impl Rng) -> Self
    {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn cell_value(self) -> u8
    {
        match self {
            PieceKind::I => 1,
            PieceKind::O => 2,
            PieceKind::T => 3,
            PieceKind::S => 4,
            PieceKind::Z => 5,
            PieceKind::J => 6,
            PieceKind::L => 7,
        }
    }

    fn rows(self) -> &'static [&'static str]
    {
        match self {
            PieceKind::I => &["####"],
            PieceKind::O => &["##", "##"],
            PieceKind::T => &[".#.", "###"],
            PieceKind::S => &[".##", "##."],
            PieceKind::Z => &["##.", ".##"],
            PieceKind::J => &["#..", "###"],
            PieceKind::L => &["..#", "###"],
        }
    }

    pub fn shape(self) -> Vec<Vec<bool>>
    {
        self.rows()
            .iter()
            .map(|row| row.chars().map(|ch| ch == '#').collect())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Piece
{
    pub kind: PieceKind,
    pub shape: Vec<Vec<bool>>,
    pub x: i32,
    pub y: i32,
}

impl Piece
{
    /// Top row, horizontally centred.
    pub fn spawn(kind: PieceKind) -> Self
    {
        let shape = kind.shape();
        let cols = shape[0].len() as i32;
        Self {
            kind,
            shape,
            x: WIDTH as i32 / 2 - cols / 2,
            y: 0,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_
    {
        self.shape.iter().enumerate().flat_map(move |(row, line)| {
            line.iter()
                .enumerate()
                .filter(|(_, filled)| **filled)
                .map(move |(col, _)| (self.x + col as i32, self.y + row as i32))
        })
    }

    pub fn rotated(&self) -> Piece
    {
        Piece {
            shape: rotate_clockwise(&self.shape),
            ..self.clone()
        }
    }
}

pub fn rotate_clockwise(shape: &[Vec<bool>]) -> Vec<Vec<bool>>
{
    let rows = shape.len();
    let cols = shape.first().map_or(0, |row| row.len());
    (0..cols)
        .map(|i| (0..rows).map(|j| shape[rows - 1 - j][i]).collect())
        .collect()
}

/// Removes every full row, shifting the rows above down, and returns the
/// indices (top to bottom) of the rows that were full.
pub fn clear_full_rows(board: &mut Board) -> Vec<usize>
{
    let full: Vec<usize> = (0..HEIGHT)
        .filter(|&y| board[y].iter().all(|&cell| cell != 0))
        .collect();
    if full.is_empty() {
        return full;
    }

    let mut write = HEIGHT;
    for read in (0..HEIGHT).rev() {
        if full.contains(&read) {
            continue;
        }
        write -= 1;
        board[write] = board[read];
    }
    for row in board.iter_mut().take(write) {
        *row = [0; WIDTH];
    }
    full
}

pub fn line_points(lines: usize, level: u32) -> u32
{
    LINE_POINTS.get(lines).copied().unwrap_or(LINE_POINTS[4]) * level
}

fn base_interval(difficulty: Difficulty) -> Duration
{
    match difficulty {
        Difficulty::Easy => Duration::from_millis(1500),
        Difficulty::Medium => Duration::from_millis(1000),
        Difficulty::Hard => Duration::from_millis(500),
    }
}

fn level_interval(base: Duration, level: u32) -> Duration
{
    let base = base.as_millis() as u64;
    let faster = (level.saturating_sub(1) as u64) * LEVEL_SPEEDUP_MS;
    Duration::from_millis(base.saturating_sub(faster).max(MIN_DROP_MS))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockReport
{
    pub cleared_rows: Vec<usize>,
    pub points: u32,
    pub game_over: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome
{
    Idle,
    Fell,
    Locked(LockReport),
}

pub struct TetrisState
{
    board: Board,
    current: Piece,
    next: Piece,
    score: u32,
    lines: u32,
    level: u32,
    base_interval: Duration,
    drop_interval: Duration,
    over: bool,
}

impl TetrisState
{
    pub fn new(difficulty: Difficulty, rng: &mut impl Rng) -> Self
    {
        let base = base_interval(difficulty);
        Self {
            board: [[0; WIDTH]; HEIGHT],
            current: Piece::spawn(PieceKind::random(rng)),
            next: Piece::spawn(PieceKind::random(rng)),
            score: 0,
            lines: 0,
            level: 1,
            base_interval: base,
            drop_interval: base,
            over: false,
        }
    }

    pub fn board(&self) -> &Board
    {
        &self.board
    }

    pub fn current(&self) -> &Piece
    {
        &self.current
    }

    pub fn next(&self) -> &Piece
    {
        &self.next
    }

    pub fn score(&self) -> u32
    {
        self.score
    }

    pub fn lines(&self) -> u32
    {
        self.lines
    }

    pub fn level(&self) -> u32
    {
        self.level
    }

    pub fn drop_interval(&self) -> Duration
    {
        self.drop_interval
    }

    pub fn is_over(&self) -> bool
    {
        self.over
    }

    /// Cells above the top edge are allowed; walls, floor and settled blocks
    /// are not.
    pub fn is_valid(&self, piece: &Piece, dx: i32, dy: i32) -> bool
    {
        piece.cells().all(|(x, y)| {
            let (x, y) = (x + dx, y + dy);
            if x < 0 || x >= WIDTH as i32 || y >= HEIGHT as i32 {
                return false;
            }
            y < 0 || self.board[y as usize][x as usize] == 0
        })
    }

    pub fn move_piece(&mut self, dx: i32, dy: i32) -> bool
    {
        if self.over || !self.is_valid(&self.current, dx, dy) {
            return false;
        }
        self.current.x += dx;
        self.current.y += dy;
        true
    }

    pub fn rotate(&mut self) -> bool
    {
        if self.over {
            return false;
        }
        let rotated = self.current.rotated();
        if !self.is_valid(&rotated, 0, 0) {
            return false;
        }
        self.current = rotated;
        true
    }

    pub fn soft_drop(&mut self) -> bool
    {
        if self.move_piece(0, 1) {
            self.score += SOFT_DROP_POINTS;
            true
        } else {
            false
        }
    }

    pub fn hard_drop(&mut self, rng: &mut impl Rng) -> LockReport
    {
        if self.over {
            return LockReport {
                game_over: true,
                ..LockReport::default()
            };
        }
        let mut distance = 0;
        while self.move_piece(0, 1) {
            distance += 1;
        }
        self.score += distance * HARD_DROP_POINTS;
        self.lock(rng)
    }

    /// One gravity step.
    pub fn tick(&mut self, rng: &mut impl Rng) -> TickOutcome
    {
        if self.over {
            return TickOutcome::Idle;
        }
        if self.move_piece(0, 1) {
            return TickOutcome::Fell;
        }
        TickOutcome::Locked(self.lock(rng))
    }

    fn lock(&mut self, rng: &mut impl Rng) -> LockReport
    {
        let value = self.current.kind.cell_value();
        let cells: Vec<(i32, i32)> = self.current.cells().collect();
        for (x, y) in cells {
            if y >= 0 {
                self.board[y as usize][x as usize] = value;
            }
        }

        let cleared_rows = clear_full_rows(&mut self.board);
        let points = line_points(cleared_rows.len(), self.level);
        if !cleared_rows.is_empty() {
            self.score += points;
            self.lines += cleared_rows.len() as u32;
            self.level = self.lines / LINES_PER_LEVEL + 1;
            self.drop_interval = level_interval(self.base_interval, self.level);
        }

        let upcoming = Piece::spawn(PieceKind::random(rng));
        self.current = std::mem::replace(&mut self.next, upcoming);
        if !self.is_valid(&self.current, 0, 0) {
            self.over = true;
        }

        LockReport {
            cleared_rows,
            points,
            game_over: self.over,
        }
    }

    #[cfg(test)]
    fn with_board(board: Board, current: PieceKind, next: PieceKind) -> Self
    {
        let base = base_interval(Difficulty::Medium);
        Self {
            board,
            current: Piece::spawn(current),
            next: Piece::spawn(next),
            score: 0,
            lines: 0,
            level: 1,
            base_interval: base,
            drop_interval: base,
            over: false,
        }
    }
}

pub fn run(difficulty: Difficulty, scores_path: &Path) -> Result<(), String>
{
    let mut term = TerminalGuard::enter()?;
    let mut rng = rand::thread_rng();
    let mut scores = ScoreBoard::open(scores_path, SCORE_KEY);
    let mut state = TetrisState::new(difficulty, &mut rng);
    let mut paused = false;
    let mut banner: Option<(String, Flash)> = None;

    info!(%difficulty, "tetris started");

    let mut last_drop = Instant::now();
    let mut last_draw = Instant::now();

    loop {
        let mut quit = false;
        let mut locked: Option<LockReport> = None;
        for key in ui::poll_keys()? {
            if ui::is_quit(&key) {
                quit = true;
                break;
            }
            if let KeyCode::Char('p') | KeyCode::Char('P') = key.code {
                paused = !paused;
                continue;
            }
            if paused {
                continue;
            }
            match key.code {
                KeyCode::Left => {
                    state.move_piece(-1, 0);
                }
                KeyCode::Right => {
                    state.move_piece(1, 0);
                }
                KeyCode::Up => {
                    state.rotate();
                }
                KeyCode::Down => {
                    state.soft_drop();
                }
                KeyCode::Char(' ') => {
                    locked = Some(state.hard_drop(&mut rng));
                    last_drop = Instant::now();
                }
                _ => {}
            }
        }
        if quit {
            break;
        }

        if !paused && locked.is_none() && last_drop.elapsed() >= state.drop_interval() {
            if let TickOutcome::Locked(report) = state.tick(&mut rng) {
                locked = Some(report);
            }
            last_drop = Instant::now();
        }

        if let Some(report) = locked {
            if !report.cleared_rows.is_empty() {
                debug!(
                    rows = report.cleared_rows.len(),
                    points = report.points,
                    level = state.level(),
                    "lines cleared"
                );
                banner = Some((clear_label(report.cleared_rows.len(), report.points), Flash::new(Instant::now(), CLEAR_FLASH)));
            }
        }

        if state.is_over() {
            draw(term.stdout(), &state, difficulty, scores.best(), paused, banner.as_ref())?;
            std::thread::sleep(ui::FINAL_FRAME);
            break;
        }

        if last_draw.elapsed() >= ui::TICK {
            draw(term.stdout(), &state, difficulty, scores.best(), paused, banner.as_ref())?;
            last_draw = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    let is_new_best = scores.finish(state.score())?;
    info!(score = state.score(), lines = state.lines(), level = state.level(), "tetris finished");
    draw_summary(term.stdout(), &state, scores.best(), is_new_best)?;
    ui::wait_for_space()?;
    Ok(())
}

fn clear_label(rows: usize, points: u32) -> String
{
    let name = match rows {
        1 => "Single",
        2 => "Double",
        3 => "Triple",
        _ => "Tetris",
    };
    format!("{name}! +{points}")
}

fn piece_color(value: u8) -> Rgb
{
    match value {
        1 => Rgb::new(255, 0, 0),
        2 => Rgb::new(0, 255, 0),
        3 => Rgb::new(0, 0, 255),
        4 => Rgb::new(255, 255, 0),
        5 => Rgb::new(255, 0, 255),
        6 => Rgb::new(0, 255, 255),
        7 => Rgb::new(255, 165, 0),
        _ => Rgb::new(22, 33, 62),
    }
}

fn draw(
    stdout: &mut Stdout,
    state: &TetrisState,
    difficulty: Difficulty,
    best: u32,
    paused: bool,
    banner: Option<&(String, Flash)>,
) -> Result<(), String>
{
    let lines = frame_lines(state, difficulty, best, paused, banner, Instant::now());
    ui::draw_lines(stdout, &lines)
}

fn frame_lines(
    state: &TetrisState,
    difficulty: Difficulty,
    best: u32,
    paused: bool,
    banner: Option<&(String, Flash)>,
    now: Instant,
) -> Vec<String>
{
    let mut field: Vec<Vec<Cell>> = state
        .board()
        .iter()
        .map(|row| {
            row.iter()
                .flat_map(|&value| [Cell::block(piece_color(value)); 2])
                .collect()
        })
        .collect();
    let active = piece_color(state.current().kind.cell_value());
    for (x, y) in state.current().cells() {
        if y >= 0 && (y as usize) < HEIGHT && x >= 0 && (x as usize) < WIDTH {
            let row = &mut field[y as usize];
            row[x as usize * 2] = Cell::block(active);
            row[x as usize * 2 + 1] = Cell::block(active);
        }
    }

    let mut side = vec![
        format!("Score: {}", state.score()),
        format!("Best:  {}", best.max(state.score())),
        format!("Lines: {}", state.lines()),
        format!("Level: {}", state.level()),
        format!("Drop:  {}ms", state.drop_interval().as_millis()),
        String::new(),
        "Next:".to_string(),
    ];
    let next = state.next();
    let next_color = piece_color(next.kind.cell_value());
    for line in &next.shape {
        let cells: Vec<Cell> = line
            .iter()
            .flat_map(|&filled| {
                let cell = if filled { Cell::block(next_color) } else { Cell::BLANK };
                [cell; 2]
            })
            .collect();
        side.push(ui::render_row(&cells));
    }
    if let Some((label, flash)) = banner {
        if flash.is_active(now) {
            side.push(String::new());
            let color = ui::lerp_color(ui::GOLD, ui::GREY, flash.progress(now));
            side.push(ui::render_row(&label.chars().map(|ch| Cell::fg(ch, color)).collect::<Vec<_>>()));
        }
    }

    let mut lines = Vec::new();
    lines.push("KB Arcade - Tetris".to_string());
    lines.push(format!("Difficulty: {}", difficulty));
    lines.push(String::new());
    lines.push(format!("+{}+", "-".repeat(WIDTH * 2)));
    for (idx, row) in field.iter().enumerate() {
        let extra = side.get(idx).map(String::as_str).unwrap_or("");
        lines.push(format!("|{}|  {}", ui::render_row(row), extra));
    }
    lines.push(format!("+{}+", "-".repeat(WIDTH * 2)));
    lines.push(String::new());
    if state.is_over() {
        lines.push("Top out!".to_string());
    } else if paused {
        lines.push("Paused. P resumes.".to_string());
    } else {
        lines.push("Left/Right move, Up rotate, Down soft drop, SPACE hard drop.".to_string());
    }
    lines.push("P pauses. Esc quits.".to_string());
    lines
}

fn draw_summary(
    stdout: &mut Stdout,
    state: &TetrisState,
    best: u32,
    is_new_best: bool,
) -> Result<(), String>
{
    let mut lines = Vec::new();
    lines.push("Game over".to_string());
    lines.push(String::new());
    lines.push(format!("Score: {}", state.score()));
    lines.push(format!("Lines: {}", state.lines()));
    lines.push(format!("Level: {}", state.level()));
    lines.push(format!("Best: {}", best));
    if is_new_best {
        lines.push("New high score!".to_string());
    }
    lines.push(String::new());
    lines.push("Press SPACE to exit.".to_string());
    ui::draw_lines(stdout, &lines)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng
    {
        StdRng::seed_from_u64(11)
    }

    fn empty() -> Board
    {
        [[0; WIDTH]; HEIGHT]
    }

    fn full_row() -> [u8; WIDTH]
    {
        [1; WIDTH]
    }

    fn piece_at(kind: PieceKind, x: i32, y: i32) -> Piece
    {
        Piece {
            x,
            y,
            ..Piece::spawn(kind)
        }
    }

    mod pieces
    {
        use super::*;

        #[test]
        fn spawn_is_centred_on_top()
        {
            assert_eq!((Piece::spawn(PieceKind::I).x, Piece::spawn(PieceKind::I).y), (3, 0));
            assert_eq!(Piece::spawn(PieceKind::O).x, 4);
            assert_eq!(Piece::spawn(PieceKind::T).x, 4);
        }

        #[test]
        fn every_piece_has_four_cells()
        {
            for kind in PieceKind::ALL {
                assert_eq!(Piece::spawn(kind).cells().count(), 4, "{kind:?}");
            }
        }

        #[test]
        fn rotating_t_points_it_right()
        {
            let rotated = rotate_clockwise(&PieceKind::T.shape());
            assert_eq!(
                rotated,
                vec![vec![true, false], vec![true, true], vec![true, false]]
            );
        }

        #[test]
        fn rotating_i_stands_it_up()
        {
            let rotated = rotate_clockwise(&PieceKind::I.shape());
            assert_eq!(rotated.len(), 4);
            assert!(rotated.iter().all(|row| row == &vec![true]));
        }
    }

    mod movement
    {
        use super::*;

        #[test]
        fn moves_inside_the_walls()
        {
            let mut state = TetrisState::with_board(empty(), PieceKind::O, PieceKind::I);
            assert!(state.move_piece(-1, 0));
            assert_eq!(state.current().x, 3);
            assert!(state.move_piece(0, 1));
            assert_eq!(state.current().y, 1);
        }

        #[test]
        fn walls_and_floor_block()
        {
            let mut state = TetrisState::with_board(empty(), PieceKind::O, PieceKind::I);
            state.current = piece_at(PieceKind::O, 0, 5);
            assert!(!state.move_piece(-1, 0));
            state.current = piece_at(PieceKind::O, WIDTH as i32 - 2, 5);
            assert!(!state.move_piece(1, 0));
            state.current = piece_at(PieceKind::O, 4, HEIGHT as i32 - 2);
            assert!(!state.move_piece(0, 1));
        }

        #[test]
        fn settled_blocks_block()
        {
            let mut board = empty();
            board[10][5] = 3;
            let mut state = TetrisState::with_board(board, PieceKind::O, PieceKind::I);
            state.current = piece_at(PieceKind::O, 4, 8);
            assert!(!state.move_piece(0, 1));
            assert_eq!(state.current().y, 8);
        }

        #[test]
        fn cells_above_the_top_are_allowed()
        {
            let state = TetrisState::with_board(empty(), PieceKind::O, PieceKind::I);
            let piece = piece_at(PieceKind::O, 4, -1);
            assert!(state.is_valid(&piece, 0, 0));
        }

        #[test]
        fn blocked_rotation_is_rejected()
        {
            let mut state = TetrisState::with_board(empty(), PieceKind::I, PieceKind::O);
            // Lying flat on the floor: standing up would poke through it.
            state.current = piece_at(PieceKind::I, 3, HEIGHT as i32 - 1);
            assert!(!state.rotate());
            assert_eq!(state.current().shape, PieceKind::I.shape());
        }

        #[test]
        fn free_rotation_applies()
        {
            let mut state = TetrisState::with_board(empty(), PieceKind::T, PieceKind::O);
            assert!(state.rotate());
            assert_eq!(state.current().shape.len(), 3);
        }

        #[test]
        fn soft_drop_scores_one()
        {
            let mut state = TetrisState::with_board(empty(), PieceKind::O, PieceKind::I);
            assert!(state.soft_drop());
            assert_eq!(state.score(), 1);
            state.current = piece_at(PieceKind::O, 4, HEIGHT as i32 - 2);
            assert!(!state.soft_drop());
            assert_eq!(state.score(), 1);
        }
    }

    mod locking
    {
        use super::*;

        #[test]
        fn hard_drop_scores_two_per_row_and_locks()
        {
            let mut rng = rng();
            let mut state = TetrisState::with_board(empty(), PieceKind::O, PieceKind::I);
            let report = state.hard_drop(&mut rng);
            assert_eq!(state.score(), 18 * 2);
            assert!(report.cleared_rows.is_empty());
            assert_eq!(state.board()[19][4], PieceKind::O.cell_value());
            assert_eq!(state.board()[18][5], PieceKind::O.cell_value());
            assert_eq!(state.current().kind, PieceKind::I);
        }

        #[test]
        fn tick_falls_then_locks()
        {
            let mut rng = rng();
            let mut state = TetrisState::with_board(empty(), PieceKind::O, PieceKind::T);
            state.current = piece_at(PieceKind::O, 4, HEIGHT as i32 - 3);
            assert_eq!(state.tick(&mut rng), TickOutcome::Fell);
            match state.tick(&mut rng) {
                TickOutcome::Locked(report) => assert!(!report.game_over),
                other => panic!("expected lock, got {other:?}"),
            }
            assert_eq!(state.current().kind, PieceKind::T);
        }

        #[test]
        fn single_line_clear_scores_forty()
        {
            let mut rng = rng();
            let mut board = empty();
            board[19] = full_row();
            board[19][0] = 0;
            board[19][1] = 0;
            board[18][7] = 6;
            let mut state = TetrisState::with_board(board, PieceKind::O, PieceKind::I);
            state.current = piece_at(PieceKind::O, 0, HEIGHT as i32 - 2);
            let report = state.hard_drop(&mut rng);
            assert_eq!(report.cleared_rows, vec![19]);
            assert_eq!(report.points, 40);
            assert_eq!(state.lines(), 1);
            assert_eq!(state.score(), 40);
            // What was left of row 18 drops to the floor.
            assert_eq!(state.board()[19][0], PieceKind::O.cell_value());
            assert_eq!(state.board()[19][7], 6);
            assert_eq!(state.board()[18], [0; WIDTH]);
        }

        #[test]
        fn tetris_clears_four_rows()
        {
            let mut rng = rng();
            let mut board = empty();
            for y in 16..20 {
                board[y] = full_row();
                board[y][9] = 0;
            }
            let mut state = TetrisState::with_board(board, PieceKind::I, PieceKind::O);
            state.current = Piece {
                shape: rotate_clockwise(&PieceKind::I.shape()),
                ..piece_at(PieceKind::I, 9, 16)
            };
            let report = state.hard_drop(&mut rng);
            assert_eq!(report.cleared_rows, vec![16, 17, 18, 19]);
            assert_eq!(report.points, 1200);
            assert!(state.board().iter().all(|row| row == &[0; WIDTH]));
        }

        #[test]
        fn locking_into_a_blocked_spawn_ends_the_game()
        {
            let mut rng = rng();
            let mut board = empty();
            board[1][4] = 2;
            let mut state = TetrisState::with_board(board, PieceKind::I, PieceKind::O);
            state.current = piece_at(PieceKind::I, 0, 10);
            let report = state.hard_drop(&mut rng);
            assert!(report.game_over);
            assert!(state.is_over());
            assert!(!state.move_piece(1, 0));
            assert_eq!(state.tick(&mut rng), TickOutcome::Idle);
        }
    }

    mod rendering
    {
        use super::*;

        #[test]
        fn final_frame_shows_the_locked_stack()
        {
            let mut rng = rng();
            let mut board = empty();
            board[1][4] = 2;
            let mut state = TetrisState::with_board(board, PieceKind::I, PieceKind::O);
            state.current = piece_at(PieceKind::I, 0, 10);
            let now = Instant::now();
            let before = frame_lines(&state, Difficulty::Medium, 0, false, None, now);
            assert!(!before.iter().any(|line| line == "Top out!"));

            state.hard_drop(&mut rng);
            assert!(state.is_over());
            let lines = frame_lines(&state, Difficulty::Medium, 0, false, None, now);
            assert!(lines.iter().any(|line| line == "Top out!"));
            // Title, difficulty, blank and top border come before the board.
            let landed = &lines[4 + HEIGHT - 1];
            let i_bg = piece_color(PieceKind::I.cell_value());
            let escape = format!("48;2;{};{};{}", i_bg.r, i_bg.g, i_bg.b);
            assert!(landed.contains(&escape));
        }
    }

    mod scoring
    {
        use super::*;

        #[test]
        fn points_scale_with_level()
        {
            assert_eq!(line_points(0, 3), 0);
            assert_eq!(line_points(1, 1), 40);
            assert_eq!(line_points(2, 2), 200);
            assert_eq!(line_points(3, 1), 300);
            assert_eq!(line_points(4, 5), 6000);
        }

        #[test]
        fn level_uses_the_old_level_then_advances()
        {
            let mut rng = rng();
            let mut board = empty();
            board[19] = full_row();
            board[19][0] = 0;
            board[19][1] = 0;
            let mut state = TetrisState::with_board(board, PieceKind::O, PieceKind::I);
            state.lines = 9;
            state.current = piece_at(PieceKind::O, 0, HEIGHT as i32 - 2);
            let report = state.hard_drop(&mut rng);
            assert_eq!(report.points, 40);
            assert_eq!(state.lines(), 10);
            assert_eq!(state.level(), 2);
            assert_eq!(state.drop_interval(), Duration::from_millis(950));
        }

        #[test]
        fn drop_interval_bottoms_out()
        {
            assert_eq!(level_interval(Duration::from_millis(500), 1), Duration::from_millis(500));
            assert_eq!(level_interval(Duration::from_millis(500), 9), Duration::from_millis(100));
            assert_eq!(level_interval(Duration::from_millis(500), 40), Duration::from_millis(50));
        }

        #[test]
        fn difficulty_sets_base_interval()
        {
            let mut rng = rng();
            assert_eq!(TetrisState::new(Difficulty::Easy, &mut rng).drop_interval(), Duration::from_millis(1500));
            assert_eq!(TetrisState::new(Difficulty::Hard, &mut rng).drop_interval(), Duration::from_millis(500));
        }

        #[test]
        fn clearing_keeps_rows_between_gaps()
        {
            let mut board = empty();
            board[17] = full_row();
            board[18][3] = 4;
            board[19] = full_row();
            let cleared = clear_full_rows(&mut board);
            assert_eq!(cleared, vec![17, 19]);
            assert_eq!(board[19][3], 4);
            assert_eq!(board[18], [0; WIDTH]);
        }
    }

    proptest! {
        #[test]
        fn four_rotations_are_identity(idx in 0usize..7)
        {
            let shape = PieceKind::ALL[idx].shape();
            let mut turned = shape.clone();
            for _ in 0..4 {
                turned = rotate_clockwise(&turned);
            }
            prop_assert_eq!(turned, shape);
        }

        #[test]
        fn clearing_never_changes_partial_rows(mask in proptest::collection::vec(any::<bool>(), WIDTH * HEIGHT))
        {
            let mut board = empty();
            for (i, filled) in mask.iter().enumerate() {
                board[i / WIDTH][i % WIDTH] = u8::from(*filled);
            }
            let partial: Vec<[u8; WIDTH]> = board
                .iter()
                .filter(|row| row.iter().any(|&cell| cell == 0))
                .copied()
                .collect();
            let cleared = clear_full_rows(&mut board);
            prop_assert_eq!(cleared.len() + partial.len(), HEIGHT);
            let bottom = &board[HEIGHT - partial.len()..];
            prop_assert_eq!(bottom, &partial[..]);
        }
    }
}
