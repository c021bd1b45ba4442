//! kzg_to_versioned_hash from EIP-4844

use super::{Bytes48, BYTES_PER_COMMITMENT};
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::H256;
use sha2::{Digest, Sha256};

pub const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;

/// sha256 of the commitment with the first byte replaced by the version tag.
pub fn derive_versioned_hash(commitment: &[u8]) -> SubmitterResult<H256> {
    if commitment.len() != BYTES_PER_COMMITMENT {
        return Err(SubmitterError::InvalidCommitment {
            expected: BYTES_PER_COMMITMENT,
            actual: commitment.len(),
        });
    }

    let mut hash: [u8; 32] = Sha256::digest(commitment).into();
    hash[0] = VERSIONED_HASH_VERSION_KZG;
    Ok(H256(hash))
}

/// Derive hashes element-wise, preserving commitment order.
pub fn derive_versioned_hashes(commitments: &[Bytes48]) -> SubmitterResult<Vec<H256>> {
    commitments
        .iter()
        .map(|c| derive_versioned_hash(c))
        .collect()
}
