//! Test utilities for ledger testing

use crate::core::{Block, Blockchain, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::{KvStore, MemoryStore, SledStore};
use crate::wallet::{Wallet, Wallets};
use tempfile::TempDir;

/// Low enough that a block is found after a few hundred hashes
pub const TEST_DIFFICULTY: u32 = 8;

pub fn test_pow() -> Result<ProofOfWork> {
    ProofOfWork::new(TEST_DIFFICULTY)
}

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| BlockchainError::Io(e.to_string()))
}

/// In-memory chain whose genesis reward goes to the returned wallet
pub fn create_test_blockchain() -> Result<(Blockchain<MemoryStore>, Wallet)> {
    let owner = Wallet::new()?;
    let blockchain =
        Blockchain::create_blockchain(MemoryStore::new(), test_pow()?, &owner.get_address())?;
    Ok((blockchain, owner))
}

/// Sled-backed chain in a temporary directory, kept alive by the `TempDir`
pub fn create_test_sled_blockchain() -> Result<(Blockchain<SledStore>, Wallet, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let owner = Wallet::new()?;
    let blockchain = Blockchain::create_blockchain_with_path(
        temp_dir.path().join("blocks"),
        test_pow()?,
        &owner.get_address(),
    )?;
    Ok((blockchain, owner, temp_dir))
}

/// Create test wallets backed by a file in `dir`
pub fn create_test_wallets(dir: &TempDir, count: usize) -> Result<(Wallets, Vec<String>)> {
    let mut wallets = Wallets::load(dir.path().join("wallet.dat"))?;
    let mut addresses = Vec::new();

    for _ in 0..count {
        addresses.push(wallets.create_wallet()?);
    }

    Ok((wallets, addresses))
}

/// Sign a payment from `from` and mine it into its own block
pub fn send_and_mine<S: KvStore>(
    blockchain: &Blockchain<S>,
    from: &Wallet,
    to: &str,
    amount: u64,
) -> Result<Block> {
    let tx = Transaction::new_utxo_transaction(from, to, amount, blockchain)?;
    blockchain.add_block(&[tx])
}

/// Walk the chain from the tip and check linkage, proof-of-work and a Merkle
/// inclusion proof for every transaction
pub fn validate_blockchain_integrity<S: KvStore>(blockchain: &Blockchain<S>) -> Result<bool> {
    let mut expected_hash = blockchain.get_tip_hash()?;

    for block in blockchain.iterator() {
        let block = block?;
        if block.get_hash() != expected_hash.as_slice() {
            return Ok(false);
        }
        if !blockchain.get_pow().validate(&block) {
            return Ok(false);
        }
        for idx in 0..block.get_transactions().len() {
            let proof = block.generate_merkle_proof(idx)?;
            if !block.verify_merkle_proof(&proof)? {
                return Ok(false);
            }
        }
        expected_hash = block.get_pre_block_hash().to_vec();
    }

    Ok(expected_hash.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Lock, SUBSIDY};

    #[test]
    fn test_create_test_blockchain() {
        let (blockchain, owner) = create_test_blockchain().unwrap();
        assert_eq!(blockchain.get_block_hashes().unwrap().len(), 1);
        let owner_lock = Lock::PubKeyHash(owner.get_pub_key_hash());
        assert_eq!(blockchain.get_balance(&owner_lock).unwrap(), SUBSIDY);
    }

    #[test]
    fn test_create_test_sled_blockchain() {
        let (blockchain, _owner, temp_dir) = create_test_sled_blockchain().unwrap();
        assert_eq!(
            blockchain.get_store().get_path(),
            Some(temp_dir.path().join("blocks").as_path())
        );
        assert_eq!(blockchain.audit().unwrap(), 1);
    }

    #[test]
    fn test_create_test_wallets() {
        let dir = create_temp_dir().unwrap();
        let (_wallets, addresses) = create_test_wallets(&dir, 5).unwrap();
        assert_eq!(addresses.len(), 5);

        // All addresses should be unique
        for i in 0..addresses.len() {
            for j in i + 1..addresses.len() {
                assert_ne!(addresses[i], addresses[j]);
            }
        }

        let reloaded = Wallets::load(dir.path().join("wallet.dat")).unwrap();
        assert_eq!(reloaded.get_addresses().len(), 5);
    }

    #[test]
    fn test_validate_blockchain_integrity() {
        let (blockchain, owner) = create_test_blockchain().unwrap();
        let recipient = Wallet::new().unwrap();
        send_and_mine(&blockchain, &owner, &recipient.get_address(), 45).unwrap();

        assert!(validate_blockchain_integrity(&blockchain).unwrap());
    }
}
