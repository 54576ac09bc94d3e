use crate::core::{MerkleProof, MerkleTree, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;

/// A mined block. Fields are private and there are no setters: once
/// [`Block::new_block`] returns, the value is never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    hash: Vec<u8>,
    transactions: Vec<Transaction>,
    pre_block_hash: Vec<u8>,
    nonce: i64,
}

impl Block {
    pub fn new_block(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        pow: &ProofOfWork,
    ) -> Result<Block> {
        Self::mine(pre_block_hash, transactions, pow, None)
    }

    /// Mine a block, abandoning the search when `cancel` is set.
    pub fn new_block_with_cancel(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        pow: &ProofOfWork,
        cancel: &AtomicBool,
    ) -> Result<Block> {
        Self::mine(pre_block_hash, transactions, pow, Some(cancel))
    }

    fn mine(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        pow: &ProofOfWork,
        cancel: Option<&AtomicBool>,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            hash: vec![],
            transactions: transactions.to_vec(),
            pre_block_hash,
            nonce: 0,
        };
        let merkle_root = block.hash_transactions()?;

        info!(
            "Starting proof-of-work for block with {} transactions (difficulty: {})",
            transactions.len(),
            pow.get_difficulty()
        );
        let (nonce, hash) = match cancel {
            Some(flag) => pow.run_with_cancel(&block.pre_block_hash, &merkle_root, flag)?,
            None => pow.run(&block.pre_block_hash, &merkle_root)?,
        };
        block.nonce = nonce;
        block.hash = hash;
        info!(
            "Proof-of-work completed for block: {} (nonce: {nonce})",
            HEXLOWER.encode(&block.hash)
        );

        Ok(block)
    }

    pub fn generate_genesis_block(coinbase: &Transaction, pow: &ProofOfWork) -> Result<Block> {
        Block::new_block(vec![], std::slice::from_ref(coinbase), pow)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    /// Only the genesis block has no predecessor.
    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    /// Merkle root over the serialized transactions, so any change to any
    /// field of any transaction changes the commitment.
    pub fn hash_transactions(&self) -> Result<Vec<u8>> {
        MerkleTree::calculate_merkle_root(&self.serialized_transactions()?)
    }

    /// Inclusion proof for the transaction at `transaction_index`.
    pub fn generate_merkle_proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        MerkleTree::new(&self.serialized_transactions()?)?.generate_proof(transaction_index)
    }

    pub fn verify_merkle_proof(&self, proof: &MerkleProof) -> Result<bool> {
        Ok(proof.merkle_root == self.hash_transactions()? && MerkleTree::verify_proof(proof))
    }

    fn serialized_transactions(&self) -> Result<Vec<Vec<u8>>> {
        self.transactions.iter().map(Transaction::serialize).collect()
    }

    #[cfg(test)]
    pub(crate) fn transactions_mut(&mut self) -> &mut Vec<Transaction> {
        &mut self.transactions
    }
}
