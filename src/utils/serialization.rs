// Binary codec for everything the ledger persists: blocks, transactions, wallets.
use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| BlockchainError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration.
///
/// The whole payload must be consumed; trailing bytes mean the record is
/// corrupt.
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, read) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| BlockchainError::Serialization(format!("Deserialization failed: {e}")))?;
    if read != bytes.len() {
        return Err(BlockchainError::Serialization(format!(
            "Deserialization left {} trailing bytes",
            bytes.len() - read
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
    struct Record {
        key: Vec<u8>,
        index: i64,
        values: Vec<u64>,
    }

    fn sample() -> Record {
        Record {
            key: vec![7; 32],
            index: -1,
            values: vec![100, 70, 30],
        }
    }

    #[test]
    fn test_serialize_deserialize() {
        let original = sample();
        let serialized = serialize(&original).expect("Serialization should work");
        let deserialized: Record = deserialize(&serialized).expect("Deserialization should work");
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_truncated_payload_fails() {
        let serialized = serialize(&sample()).unwrap();
        let result: Result<Record> = deserialize(&serialized[..serialized.len() - 2]);
        assert!(matches!(result, Err(BlockchainError::Serialization(_))));
    }

    #[test]
    fn test_trailing_bytes_fail() {
        let mut serialized = serialize(&sample()).unwrap();
        serialized.push(0);
        let result: Result<Record> = deserialize(&serialized);
        assert!(result.is_err());
    }
}
