use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use serde::{Deserialize, Serialize};

/// Binary Merkle tree over an ordered list of byte strings.
///
/// Leaves are `SHA-256(item)`, parents are `SHA-256(left || right)`, and an
/// odd level duplicates its last node. A single item's root is its leaf hash.
/// Every level is kept so inclusion proofs can be produced.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Vec<u8>>>,
}

/// Merkle proof for transaction verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf hash being proven
    pub leaf_hash: Vec<u8>,
    /// Merkle root hash
    pub merkle_root: Vec<u8>,
    /// Sibling hashes from the leaf level up
    pub proof_path: Vec<ProofElement>,
    /// Index of the leaf in the block
    pub leaf_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofElement {
    pub hash: Vec<u8>,
    /// True if the sibling is on the right
    pub is_right: bool,
}

impl MerkleTree {
    pub fn new<T: AsRef<[u8]>>(items: &[T]) -> Result<Self> {
        if items.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "Cannot create Merkle tree from empty list".to_string(),
            ));
        }

        let leaves: Vec<Vec<u8>> = items
            .iter()
            .map(|item| sha256_digest(item.as_ref()))
            .collect();
        let mut levels = vec![leaves];

        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next_level = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => Self::hash_pair(left, right),
                    [single] => Self::hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next_level);
        }

        Ok(MerkleTree { levels })
    }

    pub fn root(&self) -> &[u8] {
        // levels is never empty and the top level holds exactly one node
        &self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn generate_proof(&self, leaf_index: usize) -> Result<MerkleProof> {
        if leaf_index >= self.leaf_count() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Leaf index {} out of bounds (max: {})",
                leaf_index,
                self.leaf_count() - 1
            )));
        }

        let mut proof_path = Vec::with_capacity(self.levels.len() - 1);
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if index % 2 == 0 {
                level.get(index + 1).unwrap_or(&level[index])
            } else {
                &level[index - 1]
            };
            proof_path.push(ProofElement {
                hash: sibling.clone(),
                is_right: index % 2 == 0,
            });
            index /= 2;
        }

        Ok(MerkleProof {
            leaf_hash: self.levels[0][leaf_index].clone(),
            merkle_root: self.root().to_vec(),
            proof_path,
            leaf_index,
        })
    }

    pub fn verify_proof(proof: &MerkleProof) -> bool {
        let computed = proof
            .proof_path
            .iter()
            .fold(proof.leaf_hash.clone(), |current, element| {
                if element.is_right {
                    Self::hash_pair(&current, &element.hash)
                } else {
                    Self::hash_pair(&element.hash, &current)
                }
            });
        computed == proof.merkle_root
    }

    /// Root over `items` without keeping the tree around.
    pub fn calculate_merkle_root<T: AsRef<[u8]>>(items: &[T]) -> Result<Vec<u8>> {
        Ok(Self::new(items)?.root().to_vec())
    }

    fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
        let mut combined = Vec::with_capacity(left.len() + right.len());
        combined.extend_from_slice(left);
        combined.extend_from_slice(right);
        sha256_digest(&combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i; 4]).collect()
    }

    #[test]
    fn test_single_item_root_is_leaf_hash() {
        let root = MerkleTree::calculate_merkle_root(&[b"coinbase".to_vec()]).unwrap();
        assert_eq!(root, sha256_digest(b"coinbase"));
        assert_eq!(root.len(), 32);
    }

    #[test]
    fn test_two_items() {
        let root = MerkleTree::calculate_merkle_root(&items(2)).unwrap();
        let expected = MerkleTree::hash_pair(&sha256_digest(&[0; 4]), &sha256_digest(&[1; 4]));
        assert_eq!(root, expected);
    }

    #[test]
    fn test_odd_level_duplicates_last_node() {
        let three = items(3);
        let mut four = items(3);
        four.push(three[2].clone());

        assert_eq!(
            MerkleTree::calculate_merkle_root(&three).unwrap(),
            MerkleTree::calculate_merkle_root(&four).unwrap()
        );
    }

    #[test]
    fn test_empty_list() {
        let empty: Vec<Vec<u8>> = vec![];
        assert!(MerkleTree::calculate_merkle_root(&empty).is_err());
    }

    #[test]
    fn test_order_sensitive() {
        for n in 2..8u8 {
            let original = items(n);
            let mut swapped = original.clone();
            swapped.swap(0, (n - 1) as usize);
            assert_ne!(
                MerkleTree::calculate_merkle_root(&original).unwrap(),
                MerkleTree::calculate_merkle_root(&swapped).unwrap(),
                "swapping first and last of {n} items must change the root"
            );
        }
    }

    #[test]
    fn test_deterministic() {
        let a = MerkleTree::calculate_merkle_root(&items(5)).unwrap();
        let b = MerkleTree::calculate_merkle_root(&items(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_leaf_has_a_valid_proof() {
        let tree = MerkleTree::new(&items(7)).unwrap();
        assert_eq!(tree.leaf_count(), 7);
        for index in 0..7 {
            let proof = tree.generate_proof(index).unwrap();
            assert_eq!(proof.merkle_root, tree.root());
            assert!(MerkleTree::verify_proof(&proof), "proof for leaf {index}");
        }
    }

    #[test]
    fn test_altered_proof_fails() {
        let tree = MerkleTree::new(&items(4)).unwrap();
        let mut proof = tree.generate_proof(1).unwrap();
        proof.leaf_hash = sha256_digest(b"forged");
        assert!(!MerkleTree::verify_proof(&proof));
        assert!(tree.generate_proof(4).is_err());
    }
}
