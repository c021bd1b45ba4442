//! Binary Merkle root over numeric result cells
//!
//! Leaves are keccak-256 hashes of each value's minimal big-endian bytes.
//! Internal nodes hash the concatenation of their two children. An unpaired
//! trailing node is promoted to the next level unchanged, never duplicated;
//! roots already committed on-chain depend on this rule.

use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::{H256, U256};
use sha3::{Digest, Keccak256};

fn keccak(parts: &[&[u8]]) -> H256 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    H256::from_slice(&hasher.finalize())
}

/// Minimal big-endian encoding; zero encodes to the empty string.
pub fn leaf_bytes(value: &U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let skip = buf.iter().take_while(|b| **b == 0).count();
    buf[skip..].to_vec()
}

/// Hash of a single leaf
pub fn hash_leaf(value: &U256) -> H256 {
    keccak(&[&leaf_bytes(value)])
}

/// Compute the Merkle root of `leaves`, in order.
pub fn merkle_root(leaves: &[U256]) -> SubmitterResult<H256> {
    if leaves.is_empty() {
        return Err(SubmitterError::EmptyInput {
            component: "merkle_root",
        });
    }

    let mut nodes: Vec<H256> = leaves.iter().map(hash_leaf).collect();

    while nodes.len() > 1 {
        nodes = nodes
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => keccak(&[left.as_bytes(), right.as_bytes()]),
                [odd] => *odd,
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
    }

    Ok(nodes[0])
}
