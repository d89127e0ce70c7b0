pub mod memory;
pub mod pong;
pub mod snake;
pub mod tetris;
pub mod twenty48;

use clap::ValueEnum;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Difficulty
{
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let name = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        f.write_str(name)
    }
}

pub struct GameDescriptor
{
    pub name: &'static str,
    /// High-score key; also the subcommand name.
    pub key: &'static str,
    pub description: &'static str,
}

pub fn registry() -> Vec<GameDescriptor>
{
    vec![
        GameDescriptor {
            name: "Snake",
            key: snake::SCORE_KEY,
            description: "Eat, grow, and stay off the walls",
        },
        GameDescriptor {
            name: "Tetris",
            key: tetris::SCORE_KEY,
            description: "Stack tetrominoes and clear lines",
        },
        GameDescriptor {
            name: "2048",
            key: twenty48::SCORE_KEY,
            description: "Slide and merge tiles up to 2048",
        },
        GameDescriptor {
            name: "Pong",
            key: pong::SCORE_KEY,
            description: "Beat the AI paddle to the point limit",
        },
        GameDescriptor {
            name: "Memory",
            key: memory::SCORE_KEY,
            description: "Match every pair in as few moves as possible",
        },
    ]
}
