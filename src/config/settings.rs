use crate::error::{BlockchainError, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Process-wide defaults for the binary. Library code never reads this;
/// it receives explicit values instead.
pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(|| {
    Config::from_env().unwrap_or_else(|e| {
        log::warn!("Falling back to default configuration: {e}");
        Config::default()
    })
});

pub const DEFAULT_DIFFICULTY: u32 = 12;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_WALLET_FILE: &str = "wallet.dat";

const CONFIG_FILE_KEY: &str = "LEDGER_CONFIG";
const DATA_DIR_KEY: &str = "LEDGER_DATA_DIR";
const DIFFICULTY_KEY: &str = "LEDGER_DIFFICULTY";
const WALLET_FILE_KEY: &str = "LEDGER_WALLET_FILE";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub difficulty: u32,
    pub wallet_file: PathBuf,
}

// Every key is optional in the file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    difficulty: Option<u32>,
    wallet_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            difficulty: DEFAULT_DIFFICULTY,
            wallet_file: PathBuf::from(DEFAULT_WALLET_FILE),
        }
    }
}

impl Config {
    /// Defaults, then the file named by `LEDGER_CONFIG` (if set), then the
    /// individual `LEDGER_*` variables.
    pub fn from_env() -> Result<Config> {
        let mut config = match env::var(CONFIG_FILE_KEY) {
            Ok(path) => Config::load(path)?,
            Err(_) => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Load a TOML file on top of the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            BlockchainError::Config(format!(
                "Failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Config::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Config> {
        let file: FileConfig = toml::from_str(text)?;
        let mut config = Config::default();
        if let Some(data_dir) = file.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(difficulty) = file.difficulty {
            config.difficulty = difficulty;
        }
        if let Some(wallet_file) = file.wallet_file {
            config.wallet_file = wallet_file;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(value) = env::var(DIFFICULTY_KEY) {
            self.difficulty = value.parse().map_err(|e| {
                BlockchainError::Config(format!("Invalid {DIFFICULTY_KEY} '{value}': {e}"))
            })?;
        }
        if let Ok(file) = env::var(WALLET_FILE_KEY) {
            self.wallet_file = PathBuf::from(file);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > 256 {
            return Err(BlockchainError::Config(format!(
                "Difficulty must be at most 256 bits, got {}",
                self.difficulty
            )));
        }
        Ok(())
    }

    /// Directory holding the sled database of the block store.
    pub fn blocks_path(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.difficulty, DEFAULT_DIFFICULTY);
        assert_eq!(config.blocks_path(), PathBuf::from("data").join("blocks"));
    }

    #[test]
    fn test_parse_partial_file() {
        let config = Config::parse("difficulty = 4\n").unwrap();
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.wallet_file, PathBuf::from(DEFAULT_WALLET_FILE));
    }

    #[test]
    fn test_parse_rejects_oversized_difficulty() {
        let result = Config::parse("difficulty = 300\n");
        assert!(matches!(result, Err(BlockchainError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(&path, "data_dir = \"/tmp/ledger\"\nwallet_file = \"keys.dat\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ledger"));
        assert_eq!(config.wallet_file, PathBuf::from("keys.dat"));
        assert_eq!(config.difficulty, DEFAULT_DIFFICULTY);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/ledger.toml").is_err());
    }
}
