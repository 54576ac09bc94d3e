//! # UTXO Chain - A Single-Node Proof-of-Work Ledger
//!
//! An append-only chain of mined blocks, each committing to its transactions
//! through a Merkle root, stored in a transactional key-value store.
//! Balances are never stored: every query walks the chain and derives the
//! unspent outputs from what the blocks record.
//!
//! ## How the Code Is Organized
//! - `core/`: blocks, transactions, Merkle commitment, proof-of-work, the chain
//! - `storage/`: the `KvStore` contract with sled and in-memory backends
//! - `wallet/`: ECDSA P-256 key pairs and Base58 addresses
//! - `config/`: defaults, TOML file and environment overrides for the binary
//! - `utils/`: hashing, signing and bincode helpers
//! - `cli/`: command-line arguments of the `utxo-chain` binary
//!
//! ## Where to Start Reading
//! 1. `core/blockchain.rs` for appending blocks and the UTXO queries
//! 2. `core/transaction.rs` for locks, signing and verification
//! 3. `core/proof_of_work.rs` for the nonce search
//! 4. `storage/kv.rs` for the atomicity the chain relies on

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, BlockchainIterator, Lock, MerkleProof, MerkleTree, ProofOfWork, TXInput,
    TXOutput, Transaction, SUBSIDY,
};
pub use error::{BlockchainError, ErrorKind, Result};
pub use storage::{KvStore, MemoryStore, SledStore, StoreReader, StoreWriter};
pub use utils::{
    base58_decode, base58_encode, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, ripemd160_digest, sha256_digest, EcdsaP256, SignatureScheme,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};
