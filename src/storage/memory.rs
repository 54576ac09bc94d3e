use crate::error::{BlockchainError, Result};
use crate::storage::{KvStore, StoreReader, StoreWriter};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-process store. Updates are staged and only merged into the map once
/// the closure succeeds.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(map) => map.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on memory store");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Snapshot<'a> {
    map: &'a HashMap<Vec<u8>, Vec<u8>>,
}

impl StoreReader for Snapshot<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }
}

struct Staged<'a> {
    base: &'a HashMap<Vec<u8>, Vec<u8>>,
    writes: HashMap<Vec<u8>, Vec<u8>>,
}

impl StoreReader for Staged<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .writes
            .get(key)
            .or_else(|| self.base.get(key))
            .cloned())
    }
}

impl StoreWriter for Staged<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.writes.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

impl KvStore for MemoryStore {
    fn view<T>(&self, f: impl Fn(&dyn StoreReader) -> Result<T>) -> Result<T> {
        let map = self.inner.read().map_err(|_| {
            BlockchainError::Database("Memory store lock poisoned".to_string())
        })?;
        f(&Snapshot { map: &*map })
    }

    fn update<T>(&self, f: impl Fn(&mut dyn StoreWriter) -> Result<T>) -> Result<T> {
        let mut map = self.inner.write().map_err(|_| {
            BlockchainError::Database("Memory store lock poisoned".to_string())
        })?;
        let (value, writes) = {
            let mut staged = Staged {
                base: &*map,
                writes: HashMap::new(),
            };
            let value = f(&mut staged)?;
            (value, staged.writes)
        };
        map.extend(writes);
        Ok(value)
    }
}
