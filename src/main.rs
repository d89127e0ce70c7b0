mod config;
mod games;
mod logging;
mod scores;
mod ui;

use clap::{Parser, Subcommand};
use config::Settings;
use games::Difficulty;
use scores::HighScores;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "kb-arcade", version, about = "Casual terminal games with shared high scores")]
struct Cli
{
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command
{
    /// List the available games.
    List,
    /// Show the stored high score of every game.
    Scores,
    Snake
    {
        #[arg(long, value_enum, default_value_t)]
        difficulty: Difficulty,
    },
    Tetris
    {
        #[arg(long, value_enum, default_value_t)]
        difficulty: Difficulty,
    },
    #[command(name = "2048")]
    Twenty48,
    Pong
    {
        #[arg(long, value_enum, default_value_t)]
        difficulty: Difficulty,
    },
    Memory
    {
        #[arg(long, value_enum, default_value_t)]
        difficulty: Difficulty,
    },
}

fn main()
{
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String>
{
    let cli = Cli::parse();
    let settings = Settings::from_env().map_err(|err| format!("{err:#}"))?;
    if let Err(err) = logging::init(&settings) {
        eprintln!("Warning: logging disabled ({err:#}).");
    }

    match cli.command {
        None => interactive_menu(&settings),
        Some(Command::List) => {
            list_games();
            Ok(())
        }
        Some(Command::Scores) => print_scores(&settings),
        Some(Command::Snake { difficulty }) => run_game(games::snake::SCORE_KEY, difficulty, &settings),
        Some(Command::Tetris { difficulty }) => run_game(games::tetris::SCORE_KEY, difficulty, &settings),
        Some(Command::Twenty48) => run_game(games::twenty48::SCORE_KEY, Difficulty::default(), &settings),
        Some(Command::Pong { difficulty }) => run_game(games::pong::SCORE_KEY, difficulty, &settings),
        Some(Command::Memory { difficulty }) => run_game(games::memory::SCORE_KEY, difficulty, &settings),
    }
}

fn run_game(key: &str, difficulty: Difficulty, settings: &Settings) -> Result<(), String>
{
    let scores_path = settings.scores_path();
    info!(game = key, %difficulty, "launching");
    match key {
        games::snake::SCORE_KEY => games::snake::run(difficulty, &scores_path),
        games::tetris::SCORE_KEY => games::tetris::run(difficulty, &scores_path),
        games::twenty48::SCORE_KEY => games::twenty48::run(&scores_path),
        games::pong::SCORE_KEY => games::pong::run(difficulty, &scores_path),
        games::memory::SCORE_KEY => games::memory::run(difficulty, &scores_path),
        _ => Err(format!("Unknown game '{key}'. Run with --help.")),
    }
}

fn interactive_menu(settings: &Settings) -> Result<(), String>
{
    let registry = games::registry();
    println!("KB Arcade");
    println!();
    println!("Select a game:");
    for (idx, game) in registry.iter().enumerate() {
        println!("  {}. {} - {}", idx + 1, game.name, game.description);
    }
    println!();
    print!("Enter number or name (default 1, q to quit): ");
    std::io::Write::flush(&mut std::io::stdout())
        .map_err(|err| format!("Failed to flush stdout: {err}"))?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|err| format!("Failed to read input: {err}"))?;

    match pick_game(&registry, input.trim()) {
        MenuChoice::Quit => Ok(()),
        MenuChoice::Game(key) => run_game(key, Difficulty::default(), settings),
        MenuChoice::Invalid => Err("Invalid selection.".to_string()),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum MenuChoice
{
    Game(&'static str),
    Quit,
    Invalid,
}

fn pick_game(registry: &[games::GameDescriptor], choice: &str) -> MenuChoice
{
    if choice.eq_ignore_ascii_case("q") {
        return MenuChoice::Quit;
    }
    if choice.is_empty() {
        return registry.first().map_or(MenuChoice::Invalid, |game| MenuChoice::Game(game.key));
    }
    if let Ok(index) = choice.parse::<usize>() {
        if index >= 1 && index <= registry.len() {
            return MenuChoice::Game(registry[index - 1].key);
        }
    }
    registry
        .iter()
        .find(|game| game.name.eq_ignore_ascii_case(choice) || game.key.eq_ignore_ascii_case(choice))
        .map_or(MenuChoice::Invalid, |game| MenuChoice::Game(game.key))
}

fn list_games()
{
    println!("Available games:");
    for game in games::registry() {
        println!("  {:<10} - {}", game.key, game.description);
    }
}

fn print_scores(settings: &Settings) -> Result<(), String>
{
    let path = settings.scores_path();
    let table = HighScores::load(&path).map_err(|err| format!("{err:#}"))?;
    println!("High scores ({}):", path.display());
    for game in games::registry() {
        println!("  {:<10} {}", game.name, table.get(game.key));
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn menu_accepts_numbers_names_and_keys()
    {
        let registry = games::registry();
        assert_eq!(pick_game(&registry, ""), MenuChoice::Game("snake"));
        assert_eq!(pick_game(&registry, "2"), MenuChoice::Game("tetris"));
        assert_eq!(pick_game(&registry, "PONG"), MenuChoice::Game("pong"));
        assert_eq!(pick_game(&registry, "2048"), MenuChoice::Game("2048"));
        assert_eq!(pick_game(&registry, "Q"), MenuChoice::Quit);
        assert_eq!(pick_game(&registry, "9"), MenuChoice::Invalid);
        assert_eq!(pick_game(&registry, "chess"), MenuChoice::Invalid);
    }

    #[test]
    fn cli_parses_game_subcommands()
    {
        let cli = Cli::try_parse_from(["kb-arcade", "tetris", "--difficulty", "hard"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Tetris {
                difficulty: Difficulty::Hard
            })
        ));

        let cli = Cli::try_parse_from(["kb-arcade", "2048"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Twenty48)));

        let cli = Cli::try_parse_from(["kb-arcade", "snake"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Snake {
                difficulty: Difficulty::Medium
            })
        ));

        let cli = Cli::try_parse_from(["kb-arcade"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_rejects_unknown_difficulty()
    {
        assert!(Cli::try_parse_from(["kb-arcade", "pong", "--difficulty", "insane"]).is_err());
    }
}
