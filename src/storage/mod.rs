//! Key-value persistence for blocks
//!
//! The ledger only needs `get` and `set` inside a read-only `view` or an
//! atomically committed `update`. [`SledStore`] is the on-disk backend,
//! [`MemoryStore`] keeps everything in process memory.

pub mod kv;
pub mod memory;
pub mod sled_store;

pub use kv::{KvStore, StoreReader, StoreWriter};
pub use memory::MemoryStore;
pub use sled_store::SledStore;
