use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use num_bigint::{BigInt, Sign};
use std::sync::atomic::{AtomicBool, Ordering};

const MAX_NONCE: i64 = i64::MAX;
const MAX_DIFFICULTY: u32 = 256;

// How many nonces are tried between checks of the cancel flag.
const CANCEL_CHECK_INTERVAL: i64 = 4096;

/// Nonce search and validation for a fixed difficulty.
///
/// The target is `1 << (256 - difficulty)`; a digest is accepted when it is
/// strictly below the target read as a big-endian unsigned integer.
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    target: BigInt,
    difficulty: u32,
    max_nonce: i64,
}

impl ProofOfWork {
    pub fn new(difficulty: u32) -> Result<ProofOfWork> {
        if difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "Difficulty must be at most {MAX_DIFFICULTY} bits, got {difficulty}"
            )));
        }
        let target = BigInt::from(1) << (MAX_DIFFICULTY - difficulty) as usize;
        Ok(ProofOfWork {
            target,
            difficulty,
            max_nonce: MAX_NONCE,
        })
    }

    /// Stop the search after `max_nonce` instead of the whole `i64` range.
    pub fn with_max_nonce(mut self, max_nonce: i64) -> ProofOfWork {
        self.max_nonce = max_nonce;
        self
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_target(&self) -> &BigInt {
        &self.target
    }

    /// `prev_hash || merkle_root || nonce (8 bytes BE) || difficulty (8 bytes BE)`
    pub fn prepare_data(&self, pre_block_hash: &[u8], merkle_root: &[u8], nonce: i64) -> Vec<u8> {
        let mut data_bytes = Vec::with_capacity(pre_block_hash.len() + merkle_root.len() + 16);
        data_bytes.extend_from_slice(pre_block_hash);
        data_bytes.extend_from_slice(merkle_root);
        data_bytes.extend_from_slice(&nonce.to_be_bytes());
        data_bytes.extend_from_slice(&i64::from(self.difficulty).to_be_bytes());
        data_bytes
    }

    pub fn meets_target(&self, hash: &[u8]) -> bool {
        BigInt::from_bytes_be(Sign::Plus, hash) < self.target
    }

    pub fn run(&self, pre_block_hash: &[u8], merkle_root: &[u8]) -> Result<(i64, Vec<u8>)> {
        self.search(pre_block_hash, merkle_root, None)
    }

    /// Like [`ProofOfWork::run`], giving up with a mining error once `cancel`
    /// is set.
    pub fn run_with_cancel(
        &self,
        pre_block_hash: &[u8],
        merkle_root: &[u8],
        cancel: &AtomicBool,
    ) -> Result<(i64, Vec<u8>)> {
        self.search(pre_block_hash, merkle_root, Some(cancel))
    }

    fn search(
        &self,
        pre_block_hash: &[u8],
        merkle_root: &[u8],
        cancel: Option<&AtomicBool>,
    ) -> Result<(i64, Vec<u8>)> {
        log::debug!("Mining with difficulty {}", self.difficulty);
        for nonce in 0..=self.max_nonce {
            if nonce % CANCEL_CHECK_INTERVAL == 0
                && cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                log::warn!("Mining cancelled at nonce {nonce}");
                return Err(BlockchainError::Mining(format!(
                    "Mining cancelled at nonce {nonce}"
                )));
            }

            let data = self.prepare_data(pre_block_hash, merkle_root, nonce);
            let hash = sha256_digest(data.as_slice());
            if self.meets_target(&hash) {
                log::debug!("Found nonce {nonce}: {}", HEXLOWER.encode(&hash));
                return Ok((nonce, hash));
            }
        }

        log::error!(
            "Nonce space exhausted at {} without meeting difficulty {}",
            self.max_nonce,
            self.difficulty
        );
        Err(BlockchainError::Mining(format!(
            "Nonce space exhausted at {} without meeting difficulty {}",
            self.max_nonce, self.difficulty
        )))
    }

    /// Recompute the digest from the block's own content and nonce.
    /// Valid iff it reproduces the stored hash and meets the target.
    pub fn validate(&self, block: &Block) -> bool {
        let merkle_root = match block.hash_transactions() {
            Ok(root) => root,
            Err(e) => {
                log::error!("Cannot commit block transactions: {e}");
                return false;
            }
        };
        let data = self.prepare_data(block.get_pre_block_hash(), &merkle_root, block.get_nonce());
        let hash = sha256_digest(data.as_slice());

        hash.as_slice() == block.get_hash() && self.meets_target(&hash)
    }
}
