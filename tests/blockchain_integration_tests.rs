//! Ledger integration tests
//!
//! Drives the public API against a real sled store in a temporary directory:
//! bootstrapping, payments, persistence across reopen and audits.

use std::collections::HashMap;
use std::sync::Arc;
use utxo_chain::core::{Block, Blockchain, Lock, ProofOfWork, Transaction, SUBSIDY};
use utxo_chain::error::{BlockchainError, ErrorKind};
use utxo_chain::storage::{KvStore, MemoryStore, SledStore};
use utxo_chain::utils::{EcdsaP256, SignatureScheme};
use utxo_chain::wallet::{Wallet, Wallets};
use tempfile::tempdir;

const TEST_DIFFICULTY: u32 = 8;

fn pow() -> ProofOfWork {
    ProofOfWork::new(TEST_DIFFICULTY).unwrap()
}

fn lock_of(wallet: &Wallet) -> Lock {
    Lock::PubKeyHash(wallet.get_pub_key_hash())
}

#[test]
fn test_proof_of_work_validation() {
    let test_address = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
    let coinbase_tx = Transaction::new_coinbase_tx(test_address, "integration").unwrap();

    let block = Block::new_block(vec![9; 32], &[coinbase_tx], &pow()).unwrap();

    assert!(pow().validate(&block));
    let proof = block.generate_merkle_proof(0).unwrap();
    assert!(block.verify_merkle_proof(&proof).unwrap());
    // the difficulty is part of the hashed payload
    assert!(!ProofOfWork::new(TEST_DIFFICULTY - 1).unwrap().validate(&block));
}

#[test]
fn test_payment_persists_across_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("blocks");
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();

    let tip = {
        let blockchain =
            Blockchain::create_blockchain_with_path(&db_path, pow(), &alice.get_address())
                .unwrap();
        let tx = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 30, &blockchain)
            .unwrap();
        let block = blockchain.add_block(&[tx]).unwrap();
        blockchain.get_store().flush().unwrap();
        block.get_hash().to_vec()
    };

    let reopened = Blockchain::open_with_path(&db_path, pow()).unwrap();
    assert_eq!(reopened.get_tip_hash().unwrap(), tip);
    assert_eq!(reopened.get_balance(&lock_of(&alice)).unwrap(), 70);
    assert_eq!(reopened.get_balance(&lock_of(&bob)).unwrap(), 30);
    assert_eq!(reopened.audit().unwrap(), 2);
}

#[test]
fn test_create_refuses_existing_chain() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("blocks");
    let alice = Wallet::new().unwrap();

    drop(Blockchain::create_blockchain_with_path(&db_path, pow(), &alice.get_address()).unwrap());

    let again = Blockchain::create_blockchain_with_path(&db_path, pow(), &alice.get_address());
    assert!(matches!(again, Err(BlockchainError::Database(_))));
}

#[test]
fn test_open_without_chain() {
    let temp_dir = tempdir().unwrap();
    let result = Blockchain::open_with_path(temp_dir.path().join("blocks"), pow());
    let err = result.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Storage);
}

#[test]
fn test_chain_of_payments() {
    let store = SledStore::temporary().unwrap();
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let carol = Wallet::new().unwrap();
    let blockchain = Blockchain::create_blockchain(store, pow(), &alice.get_address()).unwrap();

    let tx = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 60, &blockchain).unwrap();
    blockchain.add_block(&[tx]).unwrap();
    let tx = Transaction::new_utxo_transaction(&bob, &carol.get_address(), 25, &blockchain).unwrap();
    blockchain.add_block(&[tx]).unwrap();
    let tx = Transaction::new_utxo_transaction(&carol, &alice.get_address(), 25, &blockchain).unwrap();
    blockchain.add_block(&[tx]).unwrap();

    assert_eq!(blockchain.get_balance(&lock_of(&alice)).unwrap(), 65);
    assert_eq!(blockchain.get_balance(&lock_of(&bob)).unwrap(), 35);
    assert_eq!(blockchain.get_balance(&lock_of(&carol)).unwrap(), 0);
    assert!(blockchain.find_utxo(&lock_of(&carol)).unwrap().is_empty());

    let total: u64 = [&alice, &bob, &carol]
        .iter()
        .map(|w| blockchain.get_balance(&lock_of(w)).unwrap())
        .sum();
    assert_eq!(total, SUBSIDY);
    assert_eq!(blockchain.get_block_hashes().unwrap().len(), 4);
}

#[test]
fn test_insufficient_funds_adds_no_block() {
    let store = MemoryStore::new();
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let blockchain = Blockchain::create_blockchain(store, pow(), &alice.get_address()).unwrap();

    let result = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 500, &blockchain);
    let err = result.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(blockchain.get_block_hashes().unwrap().len(), 1);
    assert_eq!(blockchain.get_balance(&lock_of(&alice)).unwrap(), SUBSIDY);
}

#[test]
fn test_mining_reward_block() {
    let store = MemoryStore::new();
    let alice = Wallet::new().unwrap();
    let blockchain = Blockchain::create_blockchain(store, pow(), &alice.get_address()).unwrap();

    let reward = Transaction::new_coinbase_tx(&alice.get_address(), "").unwrap();
    let block = blockchain.add_block(&[reward]).unwrap();

    assert!(!block.is_genesis());
    assert_eq!(blockchain.get_tip_hash().unwrap(), block.get_hash());
    assert_eq!(blockchain.get_balance(&lock_of(&alice)).unwrap(), 2 * SUBSIDY);
}

#[test]
fn test_empty_block_rejected() {
    let alice = Wallet::new().unwrap();
    let blockchain =
        Blockchain::create_blockchain(MemoryStore::new(), pow(), &alice.get_address()).unwrap();

    let result = blockchain.add_block(&[]);
    assert!(matches!(result, Err(BlockchainError::InvalidBlock(_))));
}

// Accepts every signature, so ownership is the only check left.
struct AcceptAll;

impl SignatureScheme for AcceptAll {
    fn sign(&self, _private_key: &[u8], _message: &[u8]) -> utxo_chain::Result<Vec<u8>> {
        Ok(vec![1])
    }

    fn verify(&self, _public_key: &[u8], _message: &[u8], _signature: &[u8]) -> bool {
        true
    }
}

#[test]
fn test_custom_signer_still_checks_ownership() {
    let alice = Wallet::new().unwrap();
    let mallory = Wallet::new().unwrap();
    let blockchain =
        Blockchain::create_blockchain(MemoryStore::new(), pow(), &alice.get_address())
            .unwrap()
            .with_signer(Arc::new(AcceptAll));

    let (available, _) = blockchain.find_spendable_outputs(&lock_of(&alice), 10).unwrap();
    assert_eq!(available, SUBSIDY);

    // mallory's key cannot claim alice's outputs, whatever the signer says
    let stolen = Transaction::new_utxo_transaction(&mallory, &mallory.get_address(), 10, &blockchain);
    assert!(matches!(
        stolen,
        Err(BlockchainError::InsufficientFunds { .. })
    ));

    let tx = Transaction::new_utxo_transaction(&alice, &mallory.get_address(), 10, &blockchain)
        .unwrap();
    assert!(blockchain.verify_transaction(&tx).unwrap());

    // the placeholder signature is rejected by the real scheme
    let funding = blockchain
        .find_transaction(tx.get_vin()[0].get_txid())
        .unwrap();
    let prev_txs = HashMap::from([(funding.get_id_hex(), funding)]);
    assert!(!tx.verify(&prev_txs, &EcdsaP256));
}

#[test]
fn test_wallet_file_round_trip() {
    let temp_dir = tempdir().unwrap();
    let wallet_path = temp_dir.path().join("wallet.dat");

    let address = {
        let mut wallets = Wallets::load(&wallet_path).unwrap();
        wallets.create_wallet().unwrap()
    };

    let wallets = Wallets::load(&wallet_path).unwrap();
    assert_eq!(wallets.get_addresses(), vec![address.clone()]);
    let wallet = wallets.get_wallet(&address).unwrap();
    assert_eq!(wallet.get_address(), address);
}

#[test]
fn test_store_update_is_atomic() {
    let store = SledStore::temporary().unwrap();
    let result: utxo_chain::Result<()> = store.update(|writer| {
        writer.set(b"first", b"1")?;
        Err(BlockchainError::Database("abort".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(store.view(|reader| reader.get(b"first")).unwrap(), None);
}
