use anyhow::{Result, bail};
use std::env;
use std::path::{Path, PathBuf};
use tracing::Level;

const HOME_VAR: &str = "KB_ARCADE_HOME";
const LOG_VAR: &str = "KB_ARCADE_LOG";
const DATA_DIR_NAME: &str = ".kb-arcade";
const SCORES_FILE: &str = "scores.json";
const LOG_FILE: &str = "kb-arcade.log";

pub struct Settings
{
    data_dir: PathBuf,
    log_level: Option<Level>,
}

impl Settings
{
    pub fn from_env() -> Result<Self>
    {
        let home = env::var(HOME_VAR).ok();
        let user_home = env::var("HOME").ok();
        let level = env::var(LOG_VAR).ok();
        Self::resolve(home.as_deref(), user_home.as_deref(), level.as_deref())
    }

    fn resolve(home: Option<&str>, user_home: Option<&str>, level: Option<&str>) -> Result<Self>
    {
        let data_dir = match (home, user_home) {
            (Some(dir), _) if !dir.trim().is_empty() => PathBuf::from(dir),
            (_, Some(user)) if !user.trim().is_empty() => Path::new(user).join(DATA_DIR_NAME),
            _ => PathBuf::from(".").join(DATA_DIR_NAME),
        };
        let log_level = match level {
            Some(value) => parse_level(value)?,
            None => Some(Level::INFO),
        };
        Ok(Self { data_dir, log_level })
    }

    pub fn data_dir(&self) -> &Path
    {
        &self.data_dir
    }

    pub fn scores_path(&self) -> PathBuf
    {
        self.data_dir.join(SCORES_FILE)
    }

    pub fn log_path(&self) -> PathBuf
    {
        self.data_dir.join(LOG_FILE)
    }

    /// `None` means logging is switched off.
    pub fn log_level(&self) -> Option<Level>
    {
        self.log_level
    }
}

fn parse_level(value: &str) -> Result<Option<Level>>
{
    let level = match value.trim().to_ascii_lowercase().as_str() {
        "off" => None,
        "error" => Some(Level::ERROR),
        "warn" => Some(Level::WARN),
        "info" | "" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        other => bail!("Unknown {LOG_VAR} level '{other}'"),
    };
    Ok(level)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn explicit_home_wins()
    {
        let settings = Settings::resolve(Some("/tmp/arcade"), Some("/home/pat"), None).unwrap();
        assert_eq!(settings.data_dir(), Path::new("/tmp/arcade"));
        assert_eq!(settings.scores_path(), Path::new("/tmp/arcade/scores.json"));
        assert_eq!(settings.log_level(), Some(Level::INFO));
    }

    #[test]
    fn falls_back_to_user_home()
    {
        let settings = Settings::resolve(None, Some("/home/pat"), None).unwrap();
        assert_eq!(settings.data_dir(), Path::new("/home/pat/.kb-arcade"));
        assert_eq!(settings.log_path(), Path::new("/home/pat/.kb-arcade/kb-arcade.log"));
    }

    #[test]
    fn falls_back_to_working_dir()
    {
        let settings = Settings::resolve(Some("  "), None, None).unwrap();
        assert_eq!(settings.data_dir(), Path::new("./.kb-arcade"));
    }

    #[test]
    fn parses_levels()
    {
        let settings = Settings::resolve(None, None, Some("DEBUG")).unwrap();
        assert_eq!(settings.log_level(), Some(Level::DEBUG));
        let settings = Settings::resolve(None, None, Some("off")).unwrap();
        assert_eq!(settings.log_level(), None);
        assert!(Settings::resolve(None, None, Some("loud")).is_err());
    }
}
