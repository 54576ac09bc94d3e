//! Helpers for tests that need a funded chain
//!
//! Temporary sled and in-memory chains at a low difficulty, throwaway
//! wallets and an integrity walk over a whole chain.

pub mod test_utils;

pub use test_utils::*;
