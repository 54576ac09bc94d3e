// The ledger: an append-only chain of mined blocks kept in a key-value store.
// Blocks live under their own hash and the tip key always names the newest one.
// UTXO state is never persisted, every query derives it by walking the chain.

use crate::core::{Block, Lock, ProofOfWork, TXOutput, Transaction, SUBSIDY};
use crate::error::{BlockchainError, Result};
use crate::storage::{KvStore, SledStore};
use crate::utils::{EcdsaP256, SignatureScheme};
use data_encoding::HEXLOWER;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Key holding the hash of the most recent block
pub const TIP_BLOCK_HASH_KEY: &[u8] = b"tip_block_hash";

/// Memo of the genesis coinbase transaction
pub const GENESIS_COINBASE_DATA: &str = "First Transaction from Genesis Block";

pub struct Blockchain<S: KvStore = SledStore> {
    store: S,
    pow: ProofOfWork,
    signer: Arc<dyn SignatureScheme>,
}

impl<S: KvStore> Blockchain<S> {
    /// Mine a genesis block paying [`crate::core::SUBSIDY`] to `genesis_address`
    /// and store it as the tip. Fails if `store` already holds a chain.
    pub fn create_blockchain(
        store: S,
        pow: ProofOfWork,
        genesis_address: &str,
    ) -> Result<Blockchain<S>> {
        if read_tip(&store)?.is_some() {
            return Err(BlockchainError::Database(
                "Blockchain already exists".to_string(),
            ));
        }

        info!("Creating genesis block for address: {genesis_address}");
        let coinbase_tx = Transaction::new_coinbase_tx(genesis_address, GENESIS_COINBASE_DATA)?;
        let genesis = Block::generate_genesis_block(&coinbase_tx, &pow)?;
        let block_data = genesis.serialize()?;

        store.update(|writer| {
            if writer.get(TIP_BLOCK_HASH_KEY)?.is_some() {
                return Err(BlockchainError::Database(
                    "Blockchain already exists".to_string(),
                ));
            }
            writer.set(genesis.get_hash(), &block_data)?;
            writer.set(TIP_BLOCK_HASH_KEY, genesis.get_hash())
        })?;
        info!("Genesis block stored: {}", genesis.get_hash_hex());

        Ok(Blockchain {
            store,
            pow,
            signer: Arc::new(EcdsaP256),
        })
    }

    /// Attach to the chain already held by `store`.
    pub fn open(store: S, pow: ProofOfWork) -> Result<Blockchain<S>> {
        if read_tip(&store)?.is_none() {
            return Err(BlockchainError::NotFound(
                "No existing blockchain found. Create one first.".to_string(),
            ));
        }
        Ok(Blockchain {
            store,
            pow,
            signer: Arc::new(EcdsaP256),
        })
    }

    /// Replace the signature scheme used to sign and verify inputs.
    pub fn with_signer(mut self, signer: Arc<dyn SignatureScheme>) -> Blockchain<S> {
        self.signer = signer;
        self
    }

    pub fn get_store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn get_pow(&self) -> &ProofOfWork {
        &self.pow
    }

    pub fn get_tip_hash(&self) -> Result<Vec<u8>> {
        read_tip(&self.store)?
            .ok_or_else(|| BlockchainError::NotFound("Tip hash not found".to_string()))
    }

    /// Validate `transactions`, mine them into a block on the current tip and
    /// make that block the new tip. On any error the chain is unchanged.
    pub fn add_block(&self, transactions: &[Transaction]) -> Result<Block> {
        self.append(transactions, None)
    }

    pub fn add_block_with_cancel(
        &self,
        transactions: &[Transaction],
        cancel: &AtomicBool,
    ) -> Result<Block> {
        self.append(transactions, Some(cancel))
    }

    fn append(&self, transactions: &[Transaction], cancel: Option<&AtomicBool>) -> Result<Block> {
        check_coinbase_rules(transactions)?;
        for (i, transaction) in transactions.iter().enumerate() {
            if !transaction.has_valid_id()? {
                warn!("Rejecting block: transaction at index {i} has a forged id");
                return Err(BlockchainError::Transaction(format!(
                    "Transaction id {} at index {i} does not match its content",
                    transaction.get_id_hex()
                )));
            }
            if !self.verify_transaction(transaction)? {
                warn!("Rejecting block: invalid transaction at index {i}");
                return Err(BlockchainError::Transaction(format!(
                    "Invalid transaction at index {i}"
                )));
            }
        }
        self.check_for_double_spending(transactions)?;
        for transaction in transactions.iter().filter(|tx| !tx.is_coinbase()) {
            let prev_txs = self.previous_transactions(transaction)?;
            transaction.verify_balance(&prev_txs)?;
        }

        let tip_hash = self.get_tip_hash()?;
        let block = match cancel {
            Some(flag) => {
                Block::new_block_with_cancel(tip_hash.clone(), transactions, &self.pow, flag)?
            }
            None => Block::new_block(tip_hash.clone(), transactions, &self.pow)?,
        };
        let block_data = block.serialize()?;

        self.store.update(|writer| {
            let current_tip = writer.get(TIP_BLOCK_HASH_KEY)?;
            if current_tip.as_deref() != Some(tip_hash.as_slice()) {
                return Err(BlockchainError::Database(
                    "Tip changed while mining; block discarded".to_string(),
                ));
            }
            writer.set(block.get_hash(), &block_data)?;
            writer.set(TIP_BLOCK_HASH_KEY, block.get_hash())
        })?;

        info!(
            "Successfully mined block: {} (difficulty: {})",
            block.get_hash_hex(),
            self.pow.get_difficulty()
        );
        Ok(block)
    }

    // Rejects outputs spent twice in the batch, outputs already spent on the
    // chain and transaction ids the chain already holds.
    fn check_for_double_spending(&self, transactions: &[Transaction]) -> Result<()> {
        let mut spent_on_chain: HashSet<(Vec<u8>, i64)> = HashSet::new();
        let mut known_ids: HashSet<Vec<u8>> = HashSet::new();
        for block in self.iterator() {
            for transaction in block?.get_transactions() {
                known_ids.insert(transaction.get_id().to_vec());
                if transaction.is_coinbase() {
                    continue;
                }
                for input in transaction.get_vin() {
                    spent_on_chain.insert((input.get_txid().to_vec(), input.get_vout()));
                }
            }
        }

        let mut spent_in_batch: HashSet<(Vec<u8>, i64)> = HashSet::new();
        for (tx_index, transaction) in transactions.iter().enumerate() {
            if !known_ids.insert(transaction.get_id().to_vec()) {
                return Err(BlockchainError::Transaction(format!(
                    "Transaction {} at index {tx_index} is already recorded",
                    transaction.get_id_hex()
                )));
            }
            if transaction.is_coinbase() {
                continue;
            }

            for input in transaction.get_vin() {
                let output_reference = (input.get_txid().to_vec(), input.get_vout());
                if spent_on_chain.contains(&output_reference) {
                    return Err(BlockchainError::Transaction(format!(
                        "Double-spending detected in transaction {tx_index}: output {}:{} already spent on chain",
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
                if !spent_in_batch.insert(output_reference) {
                    return Err(BlockchainError::Transaction(format!(
                        "Double-spending detected in transaction {tx_index}: output {}:{} already spent in this block",
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Blocks from the tip back to genesis.
    pub fn iterator(&self) -> BlockchainIterator<'_, S> {
        match self.get_tip_hash() {
            Ok(tip_hash) => iterate(&self.store, &tip_hash),
            Err(e) => BlockchainIterator::failed(&self.store, e),
        }
    }

    /// Blocks from `block_hash` back to genesis.
    pub fn iter_from(&self, block_hash: &[u8]) -> BlockchainIterator<'_, S> {
        iterate(&self.store, block_hash)
    }

    // Transactions with outputs owned by `owner` that no later input spends,
    // each paired with the indexes of those outputs. Blocks are visited tip
    // first and the transactions of each block last to first.
    fn collect_unspent(&self, owner: &Lock) -> Result<Vec<(Transaction, Vec<usize>)>> {
        let mut unspent = vec![];
        let mut spent_txos: HashMap<String, HashSet<usize>> = HashMap::new();

        for block in self.iterator() {
            let block = block?;
            for tx in block.get_transactions().iter().rev() {
                let txid_hex = tx.get_id_hex();
                let spent = spent_txos.get(&txid_hex);
                let outs: Vec<usize> = tx
                    .get_vout()
                    .iter()
                    .enumerate()
                    .filter(|(idx, out)| {
                        out.is_locked_by(owner) && !spent.is_some_and(|s| s.contains(idx))
                    })
                    .map(|(idx, _)| idx)
                    .collect();
                if !outs.is_empty() {
                    unspent.push((tx.clone(), outs));
                }

                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    if let Some(out_idx) = txin.output_index() {
                        spent_txos
                            .entry(HEXLOWER.encode(txin.get_txid()))
                            .or_default()
                            .insert(out_idx);
                    }
                }
            }
        }
        Ok(unspent)
    }

    pub fn find_unspent_transactions(&self, owner: &Lock) -> Result<Vec<Transaction>> {
        Ok(self
            .collect_unspent(owner)?
            .into_iter()
            .map(|(tx, _)| tx)
            .collect())
    }

    pub fn find_utxo(&self, owner: &Lock) -> Result<Vec<TXOutput>> {
        Ok(self
            .collect_unspent(owner)?
            .into_iter()
            .flat_map(|(tx, outs)| {
                outs.into_iter()
                    .map(|idx| tx.get_vout()[idx].clone())
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    pub fn get_balance(&self, owner: &Lock) -> Result<u64> {
        self.find_utxo(owner)?.iter().try_fold(0u64, |total, out| {
            total
                .checked_add(out.get_value())
                .ok_or_else(|| BlockchainError::Transaction("Balance overflow".to_string()))
        })
    }

    /// Pick unspent outputs of `owner` until they cover `amount`. Outputs are
    /// taken newest first: tip block first, and within a block the last
    /// transaction first. Returns the total picked and
    /// `txid_hex -> output indexes`; a total below `amount` means the funds
    /// are insufficient.
    pub fn find_spendable_outputs(
        &self,
        owner: &Lock,
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0u64;

        'outer: for (tx, outs) in self.collect_unspent(owner)? {
            let txid_hex = tx.get_id_hex();
            for idx in outs {
                if accumulated >= amount {
                    break 'outer;
                }
                accumulated = accumulated.saturating_add(tx.get_vout()[idx].get_value());
                unspent_outputs.entry(txid_hex.clone()).or_default().push(idx);
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        for block in self.iterator() {
            if let Some(tx) = block?
                .get_transactions()
                .iter()
                .find(|tx| tx.get_id() == txid)
            {
                return Ok(tx.clone());
            }
        }
        Err(BlockchainError::NotFound(format!(
            "Transaction {} not found",
            HEXLOWER.encode(txid)
        )))
    }

    // Every transaction `tx` spends from, keyed by hex id, in one chain walk.
    fn previous_transactions(&self, tx: &Transaction) -> Result<HashMap<String, Transaction>> {
        let mut wanted: HashSet<Vec<u8>> = tx
            .get_vin()
            .iter()
            .map(|vin| vin.get_txid().to_vec())
            .collect();
        let mut prev_txs = HashMap::new();

        for block in self.iterator() {
            if wanted.is_empty() {
                break;
            }
            for prev_tx in block?.get_transactions() {
                if wanted.remove(prev_tx.get_id()) {
                    prev_txs.insert(prev_tx.get_id_hex(), prev_tx.clone());
                }
            }
        }

        match wanted.iter().next() {
            Some(missing) => Err(BlockchainError::NotFound(format!(
                "Transaction {} not found",
                HEXLOWER.encode(missing)
            ))),
            None => Ok(prev_txs),
        }
    }

    pub fn sign_transaction(&self, tx: &mut Transaction, private_key: &[u8]) -> Result<()> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.previous_transactions(tx).map_err(|e| match e {
            BlockchainError::NotFound(msg) => BlockchainError::Signing(msg),
            other => other,
        })?;
        tx.sign(private_key, &prev_txs, self.signer.as_ref())
    }

    /// `Ok(false)` for a transaction that is not valid against this chain;
    /// `Err` only when the chain itself cannot be read.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = match self.previous_transactions(tx) {
            Ok(prev_txs) => prev_txs,
            Err(BlockchainError::NotFound(msg)) => {
                warn!("Cannot verify transaction {}: {msg}", tx.get_id_hex());
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        Ok(tx.verify(&prev_txs, self.signer.as_ref()))
    }

    pub fn validate_block(&self, block: &Block) -> Result<()> {
        if !self.pow.validate(block) {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} fails proof-of-work",
                block.get_hash_hex()
            )));
        }
        Ok(())
    }

    /// Walk the chain checking that every block is stored under its own hash,
    /// links to its predecessor and satisfies proof-of-work. Returns the
    /// number of blocks checked.
    pub fn audit(&self) -> Result<usize> {
        let mut expected_hash = self.get_tip_hash()?;
        let mut count = 0;
        for block in self.iterator() {
            let block = block?;
            if block.get_hash() != expected_hash.as_slice() {
                return Err(BlockchainError::InvalidBlock(format!(
                    "Block stored under {} has hash {}",
                    HEXLOWER.encode(&expected_hash),
                    block.get_hash_hex()
                )));
            }
            self.validate_block(&block)?;
            expected_hash = block.get_pre_block_hash().to_vec();
            count += 1;
        }
        info!("Audit passed for {count} blocks");
        Ok(count)
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        let block_bytes = self.store.view(|reader| reader.get(block_hash))?;
        block_bytes.map(|bytes| Block::deserialize(&bytes)).transpose()
    }

    /// Block hashes from the tip back to genesis.
    pub fn get_block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        self.iterator()
            .map(|block| block.map(|b| b.get_hash().to_vec()))
            .collect()
    }
}

impl Blockchain<SledStore> {
    pub fn create_blockchain_with_path<P: AsRef<Path>>(
        db_path: P,
        pow: ProofOfWork,
        genesis_address: &str,
    ) -> Result<Blockchain<SledStore>> {
        Self::create_blockchain(SledStore::open(db_path)?, pow, genesis_address)
    }

    pub fn open_with_path<P: AsRef<Path>>(
        db_path: P,
        pow: ProofOfWork,
    ) -> Result<Blockchain<SledStore>> {
        Self::open(SledStore::open(db_path)?, pow)
    }
}

// At most one coinbase per block, paying no more than the subsidy.
fn check_coinbase_rules(transactions: &[Transaction]) -> Result<()> {
    let mut coinbases = transactions.iter().filter(|tx| tx.is_coinbase());
    if let Some(coinbase) = coinbases.next() {
        let minted = coinbase.get_output_value()?;
        if minted > SUBSIDY {
            return Err(BlockchainError::Transaction(format!(
                "Coinbase {} mints {minted}, more than the subsidy of {SUBSIDY}",
                coinbase.get_id_hex()
            )));
        }
    }
    if coinbases.next().is_some() {
        return Err(BlockchainError::Transaction(
            "Block carries more than one coinbase transaction".to_string(),
        ));
    }
    Ok(())
}

fn read_tip<S: KvStore>(store: &S) -> Result<Option<Vec<u8>>> {
    store.view(|reader| reader.get(TIP_BLOCK_HASH_KEY))
}

/// Walk blocks stored in `store` from `start_hash` back to genesis.
pub fn iterate<'a, S: KvStore>(store: &'a S, start_hash: &[u8]) -> BlockchainIterator<'a, S> {
    BlockchainIterator {
        store,
        current_hash: start_hash.to_vec(),
        pending_error: None,
        done: false,
    }
}

/// Yields each block from a starting hash back to genesis. A missing or
/// undecodable block is reported once and ends the walk.
pub struct BlockchainIterator<'a, S: KvStore> {
    store: &'a S,
    current_hash: Vec<u8>,
    pending_error: Option<BlockchainError>,
    done: bool,
}

impl<'a, S: KvStore> BlockchainIterator<'a, S> {
    fn failed(store: &'a S, error: BlockchainError) -> BlockchainIterator<'a, S> {
        BlockchainIterator {
            store,
            current_hash: vec![],
            pending_error: Some(error),
            done: false,
        }
    }

    fn load_current(&self) -> Result<Block> {
        let data = self
            .store
            .view(|reader| reader.get(&self.current_hash))?
            .ok_or_else(|| {
                BlockchainError::NotFound(format!(
                    "Block {} not found",
                    HEXLOWER.encode(&self.current_hash)
                ))
            })?;
        Block::deserialize(&data)
    }
}

impl<S: KvStore> Iterator for BlockchainIterator<'_, S> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(error) = self.pending_error.take() {
            self.done = true;
            return Some(Err(error));
        }

        match self.load_current() {
            Ok(block) => {
                if block.is_genesis() {
                    self.done = true;
                } else {
                    self.current_hash = block.get_pre_block_hash().to_vec();
                }
                Some(Ok(block))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
