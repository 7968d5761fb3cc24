// Merkle root calculation for transaction lists

use crate::crypto::{sha256, Hash};

/// Calculate the merkle root from an ordered list of transaction hashes.
///
/// Binary tree built bottom-up: leaves are transaction hashes, parents are
/// `sha256(hex(left) || hex(right))`, and on an odd count the last node is
/// paired with itself. An empty list yields the all-zero root.
pub fn calculate_merkle_root(tx_hashes: &[Hash]) -> Hash {
    if tx_hashes.is_empty() {
        return Hash::zero();
    }

    let mut hashes: Vec<Hash> = tx_hashes.to_vec();

    // Single transaction pairs with itself
    if hashes.len() == 1 {
        return hash_pair(&hashes[0], &hashes[0]);
    }

    while hashes.len() > 1 {
        let mut next_level = Vec::with_capacity(hashes.len().div_ceil(2));

        for chunk in hashes.chunks(2) {
            let left = &chunk[0];
            let right = if chunk.len() == 2 { &chunk[1] } else { &chunk[0] };
            next_level.push(hash_pair(left, right));
        }

        hashes = next_level;
    }

    hashes[0].clone()
}

// Pair input is the concatenated lowercase hex of both children, matching
// the hex-string wire format of the explorer API.
fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut preimage = String::with_capacity(128);
    preimage.push_str(&left.to_hex());
    preimage.push_str(&right.to_hex());
    sha256(preimage.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256 as digest;

    #[test]
    fn empty_list_is_zero_root() {
        assert_eq!(calculate_merkle_root(&[]), Hash::zero());
    }

    #[test]
    fn single_leaf_pairs_with_itself() {
        let leaf = digest(b"tx-0");
        let expected = digest(format!("{}{}", leaf, leaf).as_bytes());
        assert_eq!(calculate_merkle_root(&[leaf]), expected);
    }

    #[test]
    fn odd_count_duplicates_last() {
        let leaves = [digest(b"tx-0"), digest(b"tx-1"), digest(b"tx-2")];
        let left = digest(format!("{}{}", leaves[0], leaves[1]).as_bytes());
        let right = digest(format!("{}{}", leaves[2], leaves[2]).as_bytes());
        let expected = digest(format!("{}{}", left, right).as_bytes());
        assert_eq!(calculate_merkle_root(&leaves), expected);
    }

    #[test]
    fn order_matters() {
        let a = digest(b"tx-0");
        let b = digest(b"tx-1");
        assert_ne!(
            calculate_merkle_root(&[a.clone(), b.clone()]),
            calculate_merkle_root(&[b, a])
        );
    }
}
