//! Terminal plumbing and the small animation helpers every game draws with.

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};
use std::io::{self, Stdout, Write};
use std::time::{Duration, Instant};

pub const TICK: Duration = Duration::from_millis(16);
/// How long the last frame of a finished game stays up before the summary.
pub const FINAL_FRAME: Duration = Duration::from_millis(800);

pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };
pub const GREY: Rgb = Rgb { r: 90, g: 90, b: 90 };
pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
pub const GOLD: Rgb = Rgb { r: 255, g: 215, b: 0 };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb
{
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb
{
    pub const fn new(r: u8, g: u8, b: u8) -> Self
    {
        Self { r, g, b }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell
{
    pub ch: char,
    pub fg: Option<Rgb>,
    pub bg: Option<Rgb>,
}

impl Cell
{
    pub const BLANK: Cell = Cell {
        ch: ' ',
        fg: None,
        bg: None,
    };

    pub fn fg(ch: char, color: Rgb) -> Self
    {
        Self {
            ch,
            fg: Some(color),
            bg: None,
        }
    }

    pub fn block(color: Rgb) -> Self
    {
        Self {
            ch: ' ',
            fg: None,
            bg: Some(color),
        }
    }
}

pub struct TerminalGuard
{
    stdout: Stdout,
}

impl TerminalGuard
{
    pub fn enter() -> Result<Self, String>
    {
        let mut stdout = io::stdout();
        terminal::enable_raw_mode().map_err(|err| err.to_string())?;
        execute!(stdout, EnterAlternateScreen, Hide).map_err(|err| err.to_string())?;
        Ok(Self { stdout })
    }

    pub fn stdout(&mut self) -> &mut Stdout
    {
        &mut self.stdout
    }
}

impl Drop for TerminalGuard
{
    fn drop(&mut self)
    {
        let _ = execute!(self.stdout, Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

pub fn draw_lines(stdout: &mut Stdout, lines: &[String]) -> Result<(), String>
{
    let output = format!("{}\r\n", lines.join("\r\n"));
    queue!(stdout, MoveTo(0, 0), Clear(ClearType::All)).map_err(|err| err.to_string())?;
    stdout.write_all(output.as_bytes()).map_err(|err| err.to_string())?;
    stdout.flush().map_err(|err| err.to_string())?;
    Ok(())
}

/// Drains every pending key press without blocking.
pub fn poll_keys() -> Result<Vec<KeyEvent>, String>
{
    let mut keys = Vec::new();
    while event::poll(Duration::from_millis(0)).map_err(|err| err.to_string())? {
        if let Event::Key(key) = event::read().map_err(|err| err.to_string())? {
            if key.kind != KeyEventKind::Release {
                keys.push(key);
            }
        }
    }
    Ok(keys)
}

pub fn is_quit(key: &KeyEvent) -> bool
{
    match key.code {
        KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

pub fn wait_for_space() -> Result<(), String>
{
    while event::poll(Duration::from_millis(0)).map_err(|err| err.to_string())? {
        let _ = event::read().map_err(|err| err.to_string())?;
    }

    loop {
        if event::poll(Duration::from_millis(50)).map_err(|err| err.to_string())? {
            if let Event::Key(KeyEvent {
                code: KeyCode::Char(' '),
                ..
            }) = event::read().map_err(|err| err.to_string())?
            {
                break;
            }
        }
    }
    Ok(())
}

pub fn render_row(row: &[Cell]) -> String
{
    let mut line = String::with_capacity(row.len() + 16);
    let mut active: (Option<Rgb>, Option<Rgb>) = (None, None);
    for cell in row {
        let wanted = (cell.fg, cell.bg);
        if wanted != active {
            line.push_str("\x1b[0m");
            if let Some(color) = cell.fg {
                line.push_str(&ansi_fg(color));
            }
            if let Some(color) = cell.bg {
                line.push_str(&ansi_bg(color));
            }
            active = wanted;
        }
        line.push(cell.ch);
    }
    if active != (None, None) {
        line.push_str("\x1b[0m");
    }
    line
}

fn ansi_fg(color: Rgb) -> String
{
    format!("\x1b[38;2;{};{};{}m", color.r, color.g, color.b)
}

fn ansi_bg(color: Rgb) -> String
{
    format!("\x1b[48;2;{};{};{}m", color.r, color.g, color.b)
}

/// `m:ss`, as shown by the timed games.
pub fn format_time(seconds: u64) -> String
{
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32
{
    a + (b - a) * t
}

pub fn lerp_color(start: Rgb, end: Rgb, t: f32) -> Rgb
{
    let t = t.clamp(0.0, 1.0);
    Rgb {
        r: lerp(start.r as f32, end.r as f32, t) as u8,
        g: lerp(start.g as f32, end.g as f32, t) as u8,
        b: lerp(start.b as f32, end.b as f32, t) as u8,
    }
}

/// On for the first half of every period.
pub fn blink(start: Instant, now: Instant, period: Duration) -> bool
{
    let period = period.as_millis().max(1);
    let elapsed = now.saturating_duration_since(start).as_millis();
    (elapsed % period) < period / 2
}

/// Smooth 0..1..0 wave over `period`.
pub fn pulse(start: Instant, now: Instant, period: Duration) -> f32
{
    let period = period.as_secs_f32().max(f32::EPSILON);
    let elapsed = now.saturating_duration_since(start).as_secs_f32();
    let phase = (elapsed / period).fract();
    0.5 - 0.5 * (phase * std::f32::consts::TAU).cos()
}

/// A highlight that stays on for a fixed time after it is triggered.
#[derive(Clone, Copy, Debug)]
pub struct Flash
{
    started: Instant,
    duration: Duration,
}

impl Flash
{
    pub fn new(started: Instant, duration: Duration) -> Self
    {
        Self { started, duration }
    }

    pub fn started(&self) -> Instant
    {
        self.started
    }

    pub fn is_active(&self, now: Instant) -> bool
    {
        now.saturating_duration_since(self.started) < self.duration
    }

    pub fn progress(&self, now: Instant) -> f32
    {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn formats_minutes_and_seconds()
    {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(59), "0:59");
        assert_eq!(format_time(61), "1:01");
        assert_eq!(format_time(754), "12:34");
    }

    #[test]
    fn plain_row_has_no_escapes()
    {
        let row = vec![Cell::BLANK, Cell { ch: 'x', ..Cell::BLANK }];
        assert_eq!(render_row(&row), " x");
    }

    #[test]
    fn colored_runs_share_one_escape()
    {
        let red = Rgb::new(255, 0, 0);
        let row = vec![Cell::fg('a', red), Cell::fg('b', red), Cell::BLANK];
        let line = render_row(&row);
        assert_eq!(line.matches("38;2;255;0;0").count(), 1);
        assert!(line.starts_with("\x1b[0m\x1b[38;2;255;0;0mab"));
        assert!(line.ends_with(" "));
    }

    #[test]
    fn lerp_color_clamps()
    {
        assert_eq!(lerp_color(BLACK, WHITE, 2.0), WHITE);
        assert_eq!(lerp_color(BLACK, WHITE, -1.0), BLACK);
        assert_eq!(lerp_color(BLACK, Rgb::new(200, 100, 0), 0.5), Rgb::new(100, 50, 0));
    }

    #[test]
    fn blink_alternates()
    {
        let start = Instant::now();
        let period = Duration::from_millis(200);
        assert!(blink(start, start, period));
        assert!(!blink(start, start + Duration::from_millis(150), period));
        assert!(blink(start, start + Duration::from_millis(210), period));
    }

    #[test]
    fn pulse_peaks_mid_period()
    {
        let start = Instant::now();
        let period = Duration::from_millis(1000);
        assert!(pulse(start, start, period) < 0.01);
        assert!(pulse(start, start + Duration::from_millis(500), period) > 0.99);
    }

    #[test]
    fn flash_expires()
    {
        let start = Instant::now();
        let flash = Flash::new(start, Duration::from_millis(500));
        assert!(flash.is_active(start + Duration::from_millis(100)));
        assert!(!flash.is_active(start + Duration::from_millis(500)));
        assert!((flash.progress(start + Duration::from_millis(250)) - 0.5).abs() < 0.01);
        assert_eq!(flash.progress(start + Duration::from_secs(3)), 1.0);
    }
}
