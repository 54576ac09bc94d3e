//! Core ledger functionality
//!
//! Blocks, transactions, the Merkle commitment, proof-of-work and the chain
//! itself.

pub mod block;
pub mod blockchain;
pub mod merkle;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{
    iterate, Blockchain, BlockchainIterator, GENESIS_COINBASE_DATA, TIP_BLOCK_HASH_KEY,
};
pub use merkle::{MerkleProof, MerkleTree, ProofElement};
pub use proof_of_work::ProofOfWork;
pub use transaction::{Lock, TXInput, TXOutput, Transaction, COINBASE_VOUT, SUBSIDY};
