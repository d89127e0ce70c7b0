use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// One persisted best score per game key.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct HighScores
{
    #[serde(default)]
    scores: BTreeMap<String, u32>,
}

impl HighScores
{
    pub fn load(path: &Path) -> Result<Self>
    {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let table: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()>
    {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> u32
    {
        self.scores.get(key).copied().unwrap_or(0)
    }

    /// Keeps `score` only if it beats the stored one. Ties do not count.
    pub fn submit(&mut self, key: &str, score: u32) -> bool
    {
        if score > self.get(key) {
            self.scores.insert(key.to_string(), score);
            true
        } else {
            false
        }
    }
}

/// Loads the table, falling back to an empty one when the file is unreadable.
fn load_or_empty(path: &Path, key: &str) -> HighScores
{
    match HighScores::load(path) {
        Ok(table) => table,
        Err(err) => {
            warn!(game = key, "ignoring unreadable score file: {err:#}");
            HighScores::default()
        }
    }
}

/// Load, submit and save in one go. Returns whether `score` is a new best.
/// An unreadable file is replaced by a fresh table.
pub fn record(path: &Path, key: &str, score: u32) -> Result<bool>
{
    let mut table = load_or_empty(path, key);
    if !table.submit(key, score) {
        return Ok(false);
    }
    table.save(path)?;
    info!(game = key, score, "new high score");
    Ok(true)
}

/// Handle given to each game: knows where scores live and what the best was
/// when the game started.
pub struct ScoreBoard<'a>
{
    path: &'a Path,
    key: &'static str,
    best: u32,
}

impl<'a> ScoreBoard<'a>
{
    pub fn open(path: &'a Path, key: &'static str) -> Self
    {
        let best = load_or_empty(path, key).get(key);
        Self { path, key, best }
    }

    pub fn best(&self) -> u32
    {
        self.best
    }

    /// Persists `score` if it is a new best and updates the cached value.
    pub fn finish(&mut self, score: u32) -> Result<bool, String>
    {
        let is_new = record(self.path, self.key, score).map_err(|err| format!("{err:#}"))?;
        if is_new {
            self.best = score;
        }
        Ok(is_new)
    }
}
