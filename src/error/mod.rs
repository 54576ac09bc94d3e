//! Error handling for the ledger
//!
//! Every fallible boundary (store access, codec, signing, mining) returns
//! [`BlockchainError`]. Nothing in the library aborts the process.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error types for ledger operations
#[derive(Debug, Clone, PartialEq)]
pub enum BlockchainError {
    /// Store access or commit failures
    Database(String),
    /// A key or transaction that should exist was not found
    NotFound(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Cryptographic primitive errors
    Crypto(String),
    /// Transaction validation errors
    Transaction(String),
    /// A transaction could not be signed
    Signing(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Insufficient funds for transaction
    InsufficientFunds { required: u64, available: u64 },
    /// Block failed proof-of-work or linkage checks
    InvalidBlock(String),
    /// Nonce search exhausted or cancelled
    Mining(String),
}

/// Coarse classification of [`BlockchainError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected input; chain state is unchanged
    Validation,
    /// Missing key, codec failure or commit failure
    Storage,
    /// A stored block does not satisfy proof-of-work
    Consensus,
    /// Nonce space exhausted without meeting the target
    Exhaustion,
    Other,
}

impl BlockchainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlockchainError::Transaction(_)
            | BlockchainError::Signing(_)
            | BlockchainError::InvalidAddress(_)
            | BlockchainError::InsufficientFunds { .. } => ErrorKind::Validation,
            BlockchainError::Database(_)
            | BlockchainError::NotFound(_)
            | BlockchainError::Serialization(_) => ErrorKind::Storage,
            BlockchainError::InvalidBlock(_) => ErrorKind::Consensus,
            BlockchainError::Mining(_) => ErrorKind::Exhaustion,
            BlockchainError::Crypto(_)
            | BlockchainError::Wallet(_)
            | BlockchainError::Config(_)
            | BlockchainError::Io(_) => ErrorKind::Other,
        }
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::NotFound(msg) => write!(f, "Not found: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            BlockchainError::Signing(msg) => write!(f, "Signing error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "Mining error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let insufficient = BlockchainError::InsufficientFunds {
            required: 10,
            available: 3,
        };
        assert_eq!(insufficient.kind(), ErrorKind::Validation);
        assert_eq!(
            BlockchainError::NotFound("tip".to_string()).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            BlockchainError::InvalidBlock("bad pow".to_string()).kind(),
            ErrorKind::Consensus
        );
        assert_eq!(
            BlockchainError::Mining("exhausted".to_string()).kind(),
            ErrorKind::Exhaustion
        );
    }

    #[test]
    fn test_insufficient_funds_display() {
        let err = BlockchainError::InsufficientFunds {
            required: 30,
            available: 20,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: required 30, available 20"
        );
    }
}
