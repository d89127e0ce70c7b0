use super::Difficulty;
use crate::scores::ScoreBoard;
use crate::ui::{self, Cell, Flash, Rgb, TerminalGuard};
use crossterm::event::KeyCode;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::io::Stdout;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const SCORE_KEY: &str = "memory";
pub const HINTS_PER_GAME: u8 = 3;

const RESOLVE_DELAY: Duration = Duration::from_millis(600);
const HINT_FLASH: Duration = Duration::from_millis(1500);
const RESULT_FLASH: Duration = Duration::from_millis(400);
const CARD_WIDTH: usize = 5;

const SYMBOLS: [(char, Rgb); 12] = [
    ('@', Rgb::new(255, 107, 107)),
    ('#', Rgb::new(78, 205, 196)),
    ('$', Rgb::new(255, 217, 61)),
    ('%', Rgb::new(149, 225, 211)),
    ('&', Rgb::new(243, 129, 129)),
    ('*', Rgb::new(168, 230, 207)),
    ('+', Rgb::new(255, 170, 165)),
    ('=', Rgb::new(116, 185, 255)),
    ('?', Rgb::new(162, 155, 254)),
    ('!', Rgb::new(253, 121, 168)),
    ('~', Rgb::new(0, 184, 148)),
    ('^', Rgb::new(225, 112, 85)),
];

const CARD_BACK: Rgb = Rgb::new(52, 73, 94);
const CARD_FACE: Rgb = Rgb::new(236, 240, 241);
const MATCHED: Rgb = Rgb::new(39, 174, 96);
const MISSED: Rgb = Rgb::new(192, 57, 43);
const CURSOR: Rgb = Rgb::new(241, 196, 15);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout
{
    pub pairs: usize,
    pub columns: usize,
}

impl Layout
{
    pub fn for_difficulty(difficulty: Difficulty) -> Self
    {
        match difficulty {
            Difficulty::Easy => Self { pairs: 4, columns: 3 },
            Difficulty::Medium => Self { pairs: 8, columns: 4 },
            Difficulty::Hard => Self { pairs: 12, columns: 5 },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Card
{
    /// Index into the symbol table; the two cards of a pair share it.
    pub symbol: usize,
    pub face_up: bool,
    pub matched: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipOutcome
{
    Ignored,
    First,
    /// Two cards are face-up and waiting for `resolve`.
    Second,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution
{
    Nothing,
    Matched(usize, usize),
    Missed(usize, usize),
    Won(usize, usize),
}

pub struct MemoryState
{
    cards: Vec<Card>,
    layout: Layout,
    pending: Vec<usize>,
    moves: u32,
    matched_pairs: usize,
    hints_left: u8,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl MemoryState
{
    pub fn new(difficulty: Difficulty, rng: &mut impl Rng) -> Self
    {
        let layout = Layout::for_difficulty(difficulty);
        let mut symbols: Vec<usize> = (0..layout.pairs).chain(0..layout.pairs).collect();
        symbols.shuffle(rng);
        let cards = symbols
            .into_iter()
            .map(|symbol| Card {
                symbol,
                face_up: false,
                matched: false,
            })
            .collect();
        Self {
            cards,
            layout,
            pending: Vec::with_capacity(2),
            moves: 0,
            matched_pairs: 0,
            hints_left: HINTS_PER_GAME,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn cards(&self) -> &[Card]
    {
        &self.cards
    }

    pub fn layout(&self) -> Layout
    {
        self.layout
    }

    pub fn moves(&self) -> u32
    {
        self.moves
    }

    pub fn matched_pairs(&self) -> usize
    {
        self.matched_pairs
    }

    pub fn hints_left(&self) -> u8
    {
        self.hints_left
    }

    pub fn is_won(&self) -> bool
    {
        self.matched_pairs == self.layout.pairs
    }

    /// Time since the first flip, frozen once the board is cleared.
    pub fn elapsed(&self, now: Instant) -> Duration
    {
        match self.started_at {
            Some(start) => self.finished_at.unwrap_or(now).saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    pub fn flip(&mut self, index: usize, now: Instant) -> FlipOutcome
    {
        if self.is_won() || self.pending.len() >= 2 {
            return FlipOutcome::Ignored;
        }
        let Some(card) = self.cards.get_mut(index) else {
            return FlipOutcome::Ignored;
        };
        if card.face_up || card.matched {
            return FlipOutcome::Ignored;
        }

        self.started_at.get_or_insert(now);
        card.face_up = true;
        self.pending.push(index);
        if self.pending.len() == 2 {
            self.moves += 1;
            FlipOutcome::Second
        } else {
            FlipOutcome::First
        }
    }

    pub fn resolve(&mut self, now: Instant) -> Resolution
    {
        if self.pending.len() != 2 {
            return Resolution::Nothing;
        }
        let (a, b) = (self.pending[0], self.pending[1]);
        self.pending.clear();

        if self.cards[a].symbol != self.cards[b].symbol {
            self.cards[a].face_up = false;
            self.cards[b].face_up = false;
            return Resolution::Missed(a, b);
        }

        self.cards[a].matched = true;
        self.cards[b].matched = true;
        self.matched_pairs += 1;
        if self.is_won() {
            self.finished_at = Some(now);
            Resolution::Won(a, b)
        } else {
            Resolution::Matched(a, b)
        }
    }

    /// Spends a hint on the first pair whose cards are both still face-down.
    pub fn hint(&mut self) -> Option<(usize, usize)>
    {
        if self.hints_left == 0 {
            return None;
        }
        let mut seen: HashMap<usize, usize> = HashMap::new();
        let mut found = None;
        for (index, card) in self.cards.iter().enumerate() {
            if card.matched || card.face_up {
                continue;
            }
            if let Some(&first) = seen.get(&card.symbol) {
                found = Some((first, index));
                break;
            }
            seen.insert(card.symbol, index);
        }
        if found.is_some() {
            self.hints_left -= 1;
        }
        found
    }

    pub fn score(&self) -> u32
    {
        final_score(self.layout.pairs, self.moves)
    }
}

pub fn final_score(pairs: usize, moves: u32) -> u32
{
    let pairs = pairs as i64;
    let wasted = (moves as i64 - pairs).max(0);
    (pairs * 100 - wasted * 10).max(pairs * 10) as u32
}

/// Cursor movement on a grid whose last row may be short.
pub fn move_cursor(cursor: usize, dx: i32, dy: i32, columns: usize, len: usize) -> usize
{
    if len == 0 || columns == 0 {
        return 0;
    }
    let col = (cursor % columns) as i32;
    let row = (cursor / columns) as i32;
    let rows = len.div_ceil(columns) as i32;
    let new_col = (col + dx).clamp(0, columns as i32 - 1);
    let new_row = (row + dy).clamp(0, rows - 1);
    let target = new_row as usize * columns + new_col as usize;
    if target < len { target } else { cursor }
}

enum Highlight
{
    Hint(usize, usize),
    Matched(usize, usize),
    Missed(usize, usize),
}

impl Highlight
{
    fn covers(&self, index: usize) -> bool
    {
        let (a, b) = match self {
            Highlight::Hint(a, b) | Highlight::Matched(a, b) | Highlight::Missed(a, b) => (*a, *b),
        };
        index == a || index == b
    }
}

pub fn run(difficulty: Difficulty, scores_path: &Path) -> Result<(), String>
{
    let mut term = TerminalGuard::enter()?;
    let mut rng = rand::thread_rng();
    let mut scores = ScoreBoard::open(scores_path, SCORE_KEY);
    let mut state = MemoryState::new(difficulty, &mut rng);
    let mut cursor = 0;
    let mut resolve_at: Option<Instant> = None;
    let mut highlight: Option<(Highlight, Flash)> = None;
    let mut new_best = false;

    info!(%difficulty, "memory started");

    let mut last_tick = Instant::now();

    loop {
        let mut quit = false;
        for key in ui::poll_keys()? {
            if ui::is_quit(&key) {
                quit = true;
                break;
            }
            let columns = state.layout().columns;
            let len = state.cards().len();
            match key.code {
                KeyCode::Left => cursor = move_cursor(cursor, -1, 0, columns, len),
                KeyCode::Right => cursor = move_cursor(cursor, 1, 0, columns, len),
                KeyCode::Up => cursor = move_cursor(cursor, 0, -1, columns, len),
                KeyCode::Down => cursor = move_cursor(cursor, 0, 1, columns, len),
                KeyCode::Enter | KeyCode::Char(' ') => {
                    if state.flip(cursor, Instant::now()) == FlipOutcome::Second {
                        resolve_at = Some(Instant::now() + RESOLVE_DELAY);
                    }
                }
                KeyCode::Char('h') | KeyCode::Char('H') => {
                    if let Some((a, b)) = state.hint() {
                        debug!(hints_left = state.hints_left(), "memory hint used");
                        highlight = Some((Highlight::Hint(a, b), Flash::new(Instant::now(), HINT_FLASH)));
                    }
                }
                KeyCode::Char('n') | KeyCode::Char('N') => {
                    state = MemoryState::new(difficulty, &mut rng);
                    cursor = 0;
                    resolve_at = None;
                    highlight = None;
                    new_best = false;
                }
                _ => {}
            }
        }
        if quit {
            break;
        }

        if last_tick.elapsed() >= ui::TICK {
            let now = Instant::now();
            if resolve_at.is_some_and(|at| now >= at) {
                resolve_at = None;
                match state.resolve(now) {
                    Resolution::Matched(a, b) => {
                        highlight = Some((Highlight::Matched(a, b), Flash::new(now, RESULT_FLASH)));
                    }
                    Resolution::Missed(a, b) => {
                        highlight = Some((Highlight::Missed(a, b), Flash::new(now, RESULT_FLASH)));
                    }
                    Resolution::Won(a, b) => {
                        highlight = Some((Highlight::Matched(a, b), Flash::new(now, RESULT_FLASH)));
                        new_best = scores.finish(state.score())?;
                        info!(
                            score = state.score(),
                            moves = state.moves(),
                            seconds = state.elapsed(now).as_secs(),
                            "memory cleared"
                        );
                    }
                    Resolution::Nothing => {}
                }
            }
            if highlight.as_ref().is_some_and(|(_, flash)| !flash.is_active(now)) {
                highlight = None;
            }
            draw(term.stdout(), &state, difficulty, cursor, highlight.as_ref(), scores.best(), new_best)?;
            last_tick = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    info!(
        pairs = state.matched_pairs(),
        moves = state.moves(),
        "memory finished"
    );
    Ok(())
}

fn card_cells(
    card: &Card,
    index: usize,
    selected: bool,
    highlight: Option<&(Highlight, Flash)>,
    now: Instant,
) -> Vec<Cell>
{
    let (symbol, color) = SYMBOLS[card.symbol % SYMBOLS.len()];
    let lit = highlight.filter(|(h, _)| h.covers(index));
    let mut bg = if card.matched {
        MATCHED
    } else if card.face_up {
        CARD_FACE
    } else {
        CARD_BACK
    };
    if let Some((kind, flash)) = lit {
        let t = flash.progress(now);
        bg = match kind {
            Highlight::Hint(..) => {
                if ui::blink(flash.started(), now, Duration::from_millis(300)) {
                    ui::GOLD
                } else {
                    bg
                }
            }
            Highlight::Matched(..) => ui::lerp_color(ui::GOLD, MATCHED, t),
            Highlight::Missed(..) => ui::lerp_color(MISSED, bg, t),
        };
    }
    let face = if card.face_up || card.matched {
        Cell {
            ch: symbol,
            fg: Some(if card.matched { ui::WHITE } else { color }),
            bg: Some(bg),
        }
    } else {
        Cell {
            ch: '?',
            fg: Some(ui::GREY),
            bg: Some(bg),
        }
    };
    let edge = if selected {
        Cell {
            ch: '>',
            fg: Some(CURSOR),
            bg: None,
        }
    } else {
        Cell::BLANK
    };
    let closing = if selected {
        Cell {
            ch: '<',
            fg: Some(CURSOR),
            bg: None,
        }
    } else {
        Cell::BLANK
    };
    vec![edge, Cell::block(bg), face, Cell::block(bg), closing]
}

fn draw(
    stdout: &mut Stdout,
    state: &MemoryState,
    difficulty: Difficulty,
    cursor: usize,
    highlight: Option<&(Highlight, Flash)>,
    best: u32,
    new_best: bool,
) -> Result<(), String>
{
    let now = Instant::now();
    let layout = state.layout();

    let mut lines = Vec::new();
    lines.push("KB Arcade - Memory".to_string());
    lines.push(format!(
        "Difficulty: {}  Moves: {}  Pairs: {}/{}  Time: {}  Hints: {}  Best: {}",
        difficulty,
        state.moves(),
        state.matched_pairs(),
        layout.pairs,
        ui::format_time(state.elapsed(now).as_secs()),
        state.hints_left(),
        best
    ));
    lines.push(String::new());

    for (row, chunk) in state.cards().chunks(layout.columns).enumerate() {
        let mut cells = Vec::with_capacity(layout.columns * (CARD_WIDTH + 1));
        for (col, card) in chunk.iter().enumerate() {
            let index = row * layout.columns + col;
            cells.extend(card_cells(card, index, index == cursor, highlight, now));
            cells.push(Cell::BLANK);
        }
        lines.push(format!("  {}", ui::render_row(&cells)));
        lines.push(String::new());
    }

    if state.is_won() {
        lines.push(format!(
            "All pairs found in {} moves! Score: {}",
            state.moves(),
            state.score()
        ));
        if new_best {
            lines.push("New high score!".to_string());
        }
        lines.push("N starts a new game, Esc quits.".to_string());
    } else {
        lines.push("Arrows move, Enter/Space flip, H hint, N new game.".to_string());
        lines.push("Esc quits.".to_string());
    }

    ui::draw_lines(stdout, &lines)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn game(difficulty: Difficulty) -> MemoryState
    {
        MemoryState::new(difficulty, &mut StdRng::seed_from_u64(11))
    }

    fn partner(state: &MemoryState, index: usize) -> usize
    {
        let symbol = state.cards()[index].symbol;
        state
            .cards()
            .iter()
            .enumerate()
            .position(|(i, card)| i != index && card.symbol == symbol)
            .unwrap()
    }

    fn non_partner(state: &MemoryState, index: usize) -> usize
    {
        let symbol = state.cards()[index].symbol;
        state.cards().iter().position(|card| card.symbol != symbol).unwrap()
    }

    #[test]
    fn deck_holds_each_symbol_twice()
    {
        for (difficulty, pairs) in [(Difficulty::Easy, 4), (Difficulty::Medium, 8), (Difficulty::Hard, 12)] {
            let state = game(difficulty);
            assert_eq!(state.cards().len(), pairs * 2);
            for symbol in 0..pairs {
                let count = state.cards().iter().filter(|card| card.symbol == symbol).count();
                assert_eq!(count, 2);
            }
            assert!(state.cards().iter().all(|card| !card.face_up && !card.matched));
        }
    }

    #[test]
    fn layouts_follow_difficulty()
    {
        assert_eq!(Layout::for_difficulty(Difficulty::Easy), Layout { pairs: 4, columns: 3 });
        assert_eq!(Layout::for_difficulty(Difficulty::Medium).columns, 4);
        assert_eq!(Layout::for_difficulty(Difficulty::Hard).columns, 5);
    }

    #[test]
    fn matching_pair_stays_up()
    {
        let mut state = game(Difficulty::Easy);
        let now = Instant::now();
        let other = partner(&state, 0);
        assert_eq!(state.flip(0, now), FlipOutcome::First);
        assert_eq!(state.flip(other, now), FlipOutcome::Second);
        assert_eq!(state.moves(), 1);
        assert_eq!(state.resolve(now), Resolution::Matched(0, other));
        assert!(state.cards()[0].matched);
        assert!(state.cards()[other].matched);
        assert_eq!(state.matched_pairs(), 1);
    }

    #[test]
    fn mismatch_flips_back()
    {
        let mut state = game(Difficulty::Easy);
        let now = Instant::now();
        let other = non_partner(&state, 0);
        state.flip(0, now);
        state.flip(other, now);
        assert_eq!(state.resolve(now), Resolution::Missed(0, other));
        assert!(!state.cards()[0].face_up);
        assert!(!state.cards()[other].face_up);
        assert_eq!(state.moves(), 1);
    }

    #[test]
    fn flips_are_ignored_while_a_pair_is_pending()
    {
        let mut state = game(Difficulty::Medium);
        let now = Instant::now();
        let other = non_partner(&state, 0);
        state.flip(0, now);
        assert_eq!(state.flip(0, now), FlipOutcome::Ignored);
        state.flip(other, now);
        let third = (0..state.cards().len()).find(|&i| i != 0 && i != other).unwrap();
        assert_eq!(state.flip(third, now), FlipOutcome::Ignored);
        assert_eq!(state.moves(), 1);
        assert_eq!(state.flip(99, now), FlipOutcome::Ignored);
    }

    #[test]
    fn resolve_without_two_cards_is_a_no_op()
    {
        let mut state = game(Difficulty::Easy);
        let now = Instant::now();
        assert_eq!(state.resolve(now), Resolution::Nothing);
        state.flip(0, now);
        assert_eq!(state.resolve(now), Resolution::Nothing);
        assert!(state.cards()[0].face_up);
    }

    #[test]
    fn clearing_the_board_wins_and_stops_the_clock()
    {
        let mut state = game(Difficulty::Easy);
        let start = Instant::now();
        assert_eq!(state.elapsed(start), Duration::ZERO);

        let end = start + Duration::from_secs(42);
        let mut last = Resolution::Nothing;
        for symbol in 0..4 {
            let indices: Vec<usize> = state
                .cards()
                .iter()
                .enumerate()
                .filter(|(_, card)| card.symbol == symbol)
                .map(|(i, _)| i)
                .collect();
            state.flip(indices[0], start);
            state.flip(indices[1], start);
            last = state.resolve(end);
        }
        assert!(matches!(last, Resolution::Won(..)));
        assert!(state.is_won());
        assert_eq!(state.score(), 400);
        assert_eq!(state.elapsed(end + Duration::from_secs(60)), Duration::from_secs(42));
        assert_eq!(state.flip(0, end), FlipOutcome::Ignored);
    }

    #[test]
    fn hints_point_at_a_real_pair_and_run_out()
    {
        let mut state = game(Difficulty::Medium);
        for left in (0..HINTS_PER_GAME).rev() {
            let (a, b) = state.hint().unwrap();
            assert_ne!(a, b);
            assert_eq!(state.cards()[a].symbol, state.cards()[b].symbol);
            assert_eq!(state.hints_left(), left);
        }
        assert_eq!(state.hint(), None);
    }

    #[test]
    fn hint_skips_face_up_cards()
    {
        let mut state = game(Difficulty::Easy);
        let now = Instant::now();
        state.flip(0, now);
        let (a, b) = state.hint().unwrap();
        assert!(a != 0 && b != 0);
        assert_ne!(state.cards()[a].symbol, state.cards()[0].symbol);
    }

    #[test]
    fn score_penalises_wasted_moves()
    {
        assert_eq!(final_score(8, 8), 800);
        assert_eq!(final_score(8, 12), 760);
        assert_eq!(final_score(8, 200), 80);
        assert_eq!(final_score(4, 4), 400);
    }

    #[test]
    fn cursor_stays_on_real_cards()
    {
        // Hard: 24 cards, 5 wide, last row has 4.
        assert_eq!(move_cursor(0, -1, 0, 5, 24), 0);
        assert_eq!(move_cursor(4, 1, 0, 5, 24), 4);
        assert_eq!(move_cursor(2, 0, 1, 5, 24), 7);
        assert_eq!(move_cursor(19, 0, 1, 5, 24), 19);
        assert_eq!(move_cursor(18, 0, 1, 5, 24), 23);
        assert_eq!(move_cursor(7, 0, -1, 5, 24), 2);
    }
}
