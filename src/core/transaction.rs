// Transactions move value by consuming earlier outputs and creating new ones.
// Outputs are locked to an owner; inputs prove ownership with a signature.

use crate::core::Blockchain;
use crate::error::{BlockchainError, Result};
use crate::storage::KvStore;
use crate::utils::{deserialize, serialize, sha256_digest, SignatureScheme};
use crate::wallet::{address_to_pub_key_hash, convert_address, hash_pub_key, Wallet};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Reward carried by every coinbase transaction. [`Transaction::new_coinbase_tx`]
/// mints exactly this much; the ledger refuses blocks whose coinbase pays more.
pub const SUBSIDY: u64 = 100;

/// Output index of the coinbase sentinel input
pub const COINBASE_VOUT: i64 = -1;

/// Who may spend an output.
///
/// `PubKeyHash` is the normal lock. `Address` keeps outputs written by older
/// ledgers that locked to a plain address string; it is matched exactly and
/// against the public key hash the address encodes, never by substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum Lock {
    PubKeyHash(Vec<u8>),
    Address(String),
}

impl Lock {
    /// Public key hash lock for a Base58 address.
    pub fn from_address(address: &str) -> Result<Lock> {
        Ok(Lock::PubKeyHash(address_to_pub_key_hash(address)?))
    }

    pub fn is_locked_by(&self, owner: &Lock) -> bool {
        match (self, owner) {
            (Lock::PubKeyHash(a), Lock::PubKeyHash(b)) => a == b,
            (Lock::Address(a), Lock::Address(b)) => a == b,
            _ => match (self.pub_key_hash(), owner.pub_key_hash()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Whether the holder of `pub_key` can satisfy this lock.
    pub fn is_owned_by_key(&self, pub_key: &[u8]) -> bool {
        !pub_key.is_empty() && self.is_locked_by(&Lock::PubKeyHash(hash_pub_key(pub_key)))
    }

    /// Bytes committed into the signable digest of inputs spending this lock.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Lock::PubKeyHash(hash) => hash.as_slice(),
            Lock::Address(address) => address.as_bytes(),
        }
    }

    fn pub_key_hash(&self) -> Option<Vec<u8>> {
        match self {
            Lock::PubKeyHash(hash) => Some(hash.clone()),
            Lock::Address(address) => address_to_pub_key_hash(address).ok(),
        }
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lock::PubKeyHash(hash) => write!(f, "{}", convert_address(hash)),
            Lock::Address(address) => write!(f, "{address}"),
        }
    }
}

// "Spend output #vout of transaction txid"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i64,
    // coinbase inputs carry their memo here
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: i64) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    /// The referenced output index, `None` for the coinbase sentinel.
    pub fn output_index(&self) -> Option<usize> {
        usize::try_from(self.vout).ok()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    pub fn is_coinbase_sentinel(&self) -> bool {
        self.txid.is_empty() && self.vout == COINBASE_VOUT
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    lock: Lock,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        Self::with_lock(value, Lock::from_address(address)?)
    }

    /// Output locked to a plain address string.
    pub fn new_legacy(value: u64, address: &str) -> Result<TXOutput> {
        if address.is_empty() {
            return Err(BlockchainError::InvalidAddress(
                "Empty legacy address".to_string(),
            ));
        }
        Self::with_lock(value, Lock::Address(address.to_string()))
    }

    pub fn with_lock(value: u64, lock: Lock) -> Result<TXOutput> {
        if value == 0 {
            return Err(BlockchainError::Transaction(
                "Output value must be positive".to_string(),
            ));
        }
        Ok(TXOutput { value, lock })
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_lock(&self) -> &Lock {
        &self.lock
    }

    pub fn is_locked_by(&self, owner: &Lock) -> bool {
        self.lock.is_locked_by(owner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mint [`SUBSIDY`] to `to`. An empty memo is replaced by a unique one so
    /// two rewards to the same address never share an id.
    pub fn new_coinbase_tx(to: &str, memo: &str) -> Result<Transaction> {
        let txout = TXOutput::new(SUBSIDY, to)?;
        let memo = if memo.is_empty() {
            format!("Coins to {to} ({})", Uuid::new_v4())
        } else {
            memo.to_string()
        };
        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: memo.into_bytes(),
            pub_key: vec![],
        };
        Self::from_parts(vec![tx_input], vec![txout])
    }

    /// Pay `amount` from `from` to `to`, returning change to `from`, signed
    /// with the sender's key.
    pub fn new_utxo_transaction<S: KvStore>(
        from: &Wallet,
        to: &str,
        amount: u64,
        blockchain: &Blockchain<S>,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }
        let to_lock = Lock::from_address(to)?;
        let from_lock = Lock::PubKeyHash(from.get_pub_key_hash());

        let (accumulated, valid_outputs) =
            blockchain.find_spendable_outputs(&from_lock, amount)?;
        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut selected: Vec<(String, Vec<usize>)> = valid_outputs.into_iter().collect();
        selected.sort();

        let mut inputs = vec![];
        for (txid_hex, outs) in selected {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                BlockchainError::Transaction(format!("Invalid transaction ID: {e}"))
            })?;
            for out in outs {
                let vout = i64::try_from(out).map_err(|_| {
                    BlockchainError::Transaction(format!("Output index {out} out of range"))
                })?;
                inputs.push(TXInput {
                    txid: txid.clone(),
                    vout,
                    signature: vec![],
                    pub_key: from.get_public_key().to_vec(),
                });
            }
        }

        let mut outputs = vec![TXOutput::with_lock(amount, to_lock)?];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TXOutput::with_lock(change, from_lock)?);
        }

        let mut tx = Self::from_parts(inputs, outputs)?;
        blockchain.sign_transaction(&mut tx, from.get_pkcs8())?;
        Ok(tx)
    }

    /// Assemble a transaction and freeze its id. No value rules are applied
    /// here, a hand-built coinbase may pay any amount until the ledger sees it.
    pub fn from_parts(vin: Vec<TXInput>, vout: Vec<TXOutput>) -> Result<Transaction> {
        let mut tx = Transaction {
            id: vec![],
            vin,
            vout,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].is_coinbase_sentinel()
    }

    /// SHA-256 of the encoding with an empty id and unsigned inputs. The
    /// coinbase memo stays, it lives in the sentinel's signature slot.
    fn hash(&self) -> Result<Vec<u8>> {
        let inputs = self
            .vin
            .iter()
            .map(|input| {
                if input.is_coinbase_sentinel() {
                    input.clone()
                } else {
                    TXInput {
                        signature: vec![],
                        ..input.clone()
                    }
                }
            })
            .collect();
        let tx_copy = Transaction {
            id: vec![],
            vin: inputs,
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    /// Whether the stored id is the hash of the transaction's own content.
    pub(crate) fn has_valid_id(&self) -> Result<bool> {
        Ok(self.hash()? == self.id)
    }

    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
            .collect();
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    /// Digest signed by input `idx`: every signature and public key cleared,
    /// with the spent output's lock in place of that input's public key.
    pub fn signable_digest(&self, idx: usize, spent_lock: &Lock) -> Result<Vec<u8>> {
        let mut tx_copy = self.trimmed_copy();
        let input = tx_copy.vin.get_mut(idx).ok_or_else(|| {
            BlockchainError::Transaction(format!("Input index {idx} out of range"))
        })?;
        input.pub_key = spent_lock.as_bytes().to_vec();
        tx_copy.hash()
    }

    /// Sign every input. `prev_txs` maps hex ids to the transactions the
    /// inputs spend from.
    pub fn sign(
        &mut self,
        private_key: &[u8],
        prev_txs: &HashMap<String, Transaction>,
        scheme: &dyn SignatureScheme,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut signatures = Vec::with_capacity(self.vin.len());
        for (idx, vin) in self.vin.iter().enumerate() {
            let spent = prev_output(vin, prev_txs).map_err(BlockchainError::Signing)?;
            let digest = self.signable_digest(idx, spent.get_lock())?;
            signatures.push(scheme.sign(private_key, &digest)?);
        }
        for (vin, signature) in self.vin.iter_mut().zip(signatures) {
            vin.signature = signature;
        }
        Ok(())
    }

    /// Check ownership and signatures of every input. Coinbase transactions
    /// need no signatures.
    pub fn verify(
        &self,
        prev_txs: &HashMap<String, Transaction>,
        scheme: &dyn SignatureScheme,
    ) -> bool {
        if self.is_coinbase() {
            return true;
        }
        if self.vin.is_empty() {
            log::warn!("Transaction {} has no inputs", self.get_id_hex());
            return false;
        }

        for (idx, vin) in self.vin.iter().enumerate() {
            if vin.is_coinbase_sentinel() {
                log::warn!("Coinbase sentinel input in regular transaction {}", self.get_id_hex());
                return false;
            }
            let spent = match prev_output(vin, prev_txs) {
                Ok(output) => output,
                Err(reason) => {
                    log::warn!("{reason}");
                    return false;
                }
            };
            if !spent.get_lock().is_owned_by_key(vin.get_pub_key()) {
                log::warn!(
                    "Input {idx} of {} does not own the output it spends",
                    self.get_id_hex()
                );
                return false;
            }
            let digest = match self.signable_digest(idx, spent.get_lock()) {
                Ok(digest) => digest,
                Err(e) => {
                    log::error!("Cannot build signable digest: {e}");
                    return false;
                }
            };
            if !scheme.verify(vin.get_pub_key(), &digest, vin.get_signature()) {
                log::warn!("Bad signature on input {idx} of {}", self.get_id_hex());
                return false;
            }
        }
        true
    }

    /// Inputs must carry exactly the value the outputs create.
    pub fn verify_balance(&self, prev_txs: &HashMap<String, Transaction>) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }
        let input_value = self.get_input_value(prev_txs)?;
        let output_value = self.get_output_value()?;
        if input_value != output_value {
            return Err(BlockchainError::Transaction(format!(
                "Transaction balance violation: inputs={input_value}, outputs={output_value}"
            )));
        }
        Ok(())
    }

    pub fn get_input_value(&self, prev_txs: &HashMap<String, Transaction>) -> Result<u64> {
        if self.is_coinbase() {
            return Ok(0);
        }
        self.vin.iter().try_fold(0u64, |total, vin| {
            let spent = prev_output(vin, prev_txs).map_err(BlockchainError::Transaction)?;
            total
                .checked_add(spent.get_value())
                .ok_or_else(|| BlockchainError::Transaction("Input value overflow".to_string()))
        })
    }

    pub fn get_output_value(&self) -> Result<u64> {
        self.vout.iter().try_fold(0u64, |total, vout| {
            total
                .checked_add(vout.get_value())
                .ok_or_else(|| BlockchainError::Transaction("Output value overflow".to_string()))
        })
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_hex(&self) -> String {
        HEXLOWER.encode(&self.id)
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }

    #[cfg(test)]
    pub(crate) fn tamper_output_value(&mut self, idx: usize, value: u64) {
        self.vout[idx].value = value;
    }

    #[cfg(test)]
    pub(crate) fn tamper_id(&mut self, id: Vec<u8>) {
        self.id = id;
    }

    #[cfg(test)]
    pub(crate) fn tamper_input_pub_key(&mut self, idx: usize, pub_key: Vec<u8>) {
        self.vin[idx].pub_key = pub_key;
    }
}

// The output `vin` spends, or a description of why it cannot be resolved.
fn prev_output<'a>(
    vin: &TXInput,
    prev_txs: &'a HashMap<String, Transaction>,
) -> std::result::Result<&'a TXOutput, String> {
    let txid_hex = HEXLOWER.encode(vin.get_txid());
    let prev_tx = prev_txs
        .get(&txid_hex)
        .ok_or_else(|| format!("Previous transaction {txid_hex} not found"))?;
    vin.output_index()
        .and_then(|idx| prev_tx.vout.get(idx))
        .ok_or_else(|| format!("Output {} of {txid_hex} does not exist", vin.get_vout()))
}
