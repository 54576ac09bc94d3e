//! Command-line interface
//!
//! Argument parsing for the `utxo-chain` binary and how its global flags
//! combine with the configuration file and environment.

pub mod commands;

pub use commands::{Command, Opt};
