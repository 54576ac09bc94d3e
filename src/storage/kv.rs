use crate::error::Result;

/// Read access inside a store scope.
pub trait StoreReader {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Read-write access inside an `update` scope.
pub trait StoreWriter: StoreReader {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;
}

/// Transactional key-value contract the ledger is built on.
///
/// A `view` never observes a partially applied `update`. An `update` commits
/// every `set` it performed if the closure returns `Ok`, and none of them if
/// it returns `Err`. Closures may be re-run by backends that retry on
/// conflict, so they must not have side effects outside the store.
pub trait KvStore: Send + Sync {
    fn view<T>(&self, f: impl Fn(&dyn StoreReader) -> Result<T>) -> Result<T>;

    fn update<T>(&self, f: impl Fn(&mut dyn StoreWriter) -> Result<T>) -> Result<T>;
}
