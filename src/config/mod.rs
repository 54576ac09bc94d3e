//! Configuration management
//!
//! Defaults for the data directory, mining difficulty and wallet file,
//! layered from a TOML file and environment variables.

pub mod settings;

pub use settings::{Config, DEFAULT_DIFFICULTY, GLOBAL_CONFIG};
