use crate::config::{Config, GLOBAL_CONFIG};
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "utxo-chain", about = "Single-node proof-of-work UTXO ledger")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,
    #[arg(long = "data-dir", global = true, help = "Directory holding the block store")]
    pub data_dir: Option<PathBuf>,
    #[arg(long = "difficulty", global = true, help = "Proof-of-work difficulty in bits")]
    pub difficulty: Option<u32>,
    #[arg(long = "wallet-file", global = true, help = "Wallet file path")]
    pub wallet_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

impl Opt {
    /// The process configuration (`--config` file, or the environment) with
    /// any explicit flags applied on top.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => GLOBAL_CONFIG.clone(),
        };
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
        }
        if let Some(wallet_file) = &self.wallet_file {
            config.wallet_file = wallet_file.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    #[command(name = "createblockchain", about = "Create a new blockchain")]
    Createblockchain {
        #[arg(help = "The address to send genesis block reward to")]
        address: String,
    },
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(
        name = "getbalance",
        about = "Get the wallet balance of the target address"
    )]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(name = "send", about = "Send coins and mine the transaction into a block")]
    Send {
        #[arg(help = "Source wallet address")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: u64,
    },
    #[command(name = "printchain", about = "Print all blocks in the blockchain")]
    Printchain,
    #[command(name = "audit", about = "Check linkage and proof-of-work of every block")]
    Audit,
}
