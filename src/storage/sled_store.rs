use crate::error::{BlockchainError, Result};
use crate::storage::{KvStore, StoreReader, StoreWriter};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree,
    UnabortableTransactionError,
};
use sled::{Db, Tree};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

const BLOCKS_TREE: &str = "blocks";

/// Block store backed by one sled tree. Both `view` and `update` run as sled
/// transactions, so reads inside a scope see a consistent snapshot.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    tree: Tree,
    path: Option<PathBuf>,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SledStore> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        Self::with_db(db, Some(path))
    }

    /// A store that is deleted when dropped.
    pub fn temporary() -> Result<SledStore> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        Self::with_db(db, None)
    }

    fn with_db(db: Db, path: Option<PathBuf>) -> Result<SledStore> {
        let tree = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))?;
        Ok(SledStore { db, tree, path })
    }

    pub fn get_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| BlockchainError::Database(format!("Failed to flush database: {e}")))?;
        Ok(())
    }

    fn run<T>(
        &self,
        f: impl Fn(&mut SledTxn<'_>) -> Result<T>,
    ) -> Result<T> {
        self.tree
            .transaction(|tx_db| {
                let mut txn = SledTxn {
                    tx_db,
                    failure: RefCell::new(None),
                };
                match f(&mut txn) {
                    Ok(value) => Ok(value),
                    // sled's own errors go back to sled so conflicts are retried
                    Err(err) => match txn.failure.take() {
                        Some(raw) => Err(ConflictableTransactionError::from(raw)),
                        None => Err(ConflictableTransactionError::Abort(err)),
                    },
                }
            })
            .map_err(|e: TransactionError<BlockchainError>| match e {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => {
                    BlockchainError::Database(format!("Transaction failed: {err}"))
                }
            })
    }
}

struct SledTxn<'a> {
    tx_db: &'a TransactionalTree,
    failure: RefCell<Option<UnabortableTransactionError>>,
}

impl SledTxn<'_> {
    fn record(&self, err: UnabortableTransactionError) -> BlockchainError {
        let message = format!("Store access failed: {err}");
        self.failure.replace(Some(err));
        BlockchainError::Database(message)
    }
}

impl StoreReader for SledTxn<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.tx_db.get(key) {
            Ok(value) => Ok(value.map(|v| v.to_vec())),
            Err(err) => Err(self.record(err)),
        }
    }
}

impl StoreWriter for SledTxn<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        match self.tx_db.insert(key, value) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.record(err)),
        }
    }
}

impl KvStore for SledStore {
    fn view<T>(&self, f: impl Fn(&dyn StoreReader) -> Result<T>) -> Result<T> {
        self.run(|txn| f(&*txn))
    }

    fn update<T>(&self, f: impl Fn(&mut dyn StoreWriter) -> Result<T>) -> Result<T> {
        self.run(|txn| f(txn))
    }
}
