//! EIP-4844 transaction values and their wire encoding
//!
//! A transaction moves through [`UnsignedBlobTransaction`] →
//! [`SignedBlobTransaction`] → [`SerializedBlobTransaction`]. Signing consumes
//! the unsigned value and the signed value has no mutators, so nothing can
//! change once a signature exists.

use crate::blob::BlobSidecar;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::keccak256;
use ethers::utils::rlp::RlpStream;
use std::fmt;

/// EIP-2718 type byte of blob transactions
pub const BLOB_TX_TYPE: u8 = 0x03;

const UNSIGNED_FIELDS: usize = 11;
const SIGNED_FIELDS: usize = UNSIGNED_FIELDS + 3;

#[derive(Debug, Clone)]
pub struct UnsignedBlobTransaction {
    pub(crate) chain_id: U256,
    pub(crate) nonce: u64,
    pub(crate) max_priority_fee_per_gas: U256,
    pub(crate) max_fee_per_gas: U256,
    pub(crate) gas_limit: u64,
    pub(crate) to: Address,
    pub(crate) value: U256,
    pub(crate) data: Bytes,
    pub(crate) max_fee_per_blob_gas: U256,
    pub(crate) blob_versioned_hashes: Vec<H256>,
    pub(crate) sidecar: BlobSidecar,
}

impl UnsignedBlobTransaction {
    pub fn chain_id(&self) -> U256 {
        self.chain_id
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn blob_versioned_hashes(&self) -> &[H256] {
        &self.blob_versioned_hashes
    }

    pub fn sidecar(&self) -> &BlobSidecar {
        &self.sidecar
    }

    fn rlp_append_fields(&self, s: &mut RlpStream) {
        s.append(&self.chain_id);
        s.append(&self.nonce);
        s.append(&self.max_priority_fee_per_gas);
        s.append(&self.max_fee_per_gas);
        s.append(&self.gas_limit);
        s.append(&self.to);
        s.append(&self.value);
        s.append(&self.data.as_ref());
        // access list
        s.begin_list(0);
        s.append(&self.max_fee_per_blob_gas);
        s.begin_list(self.blob_versioned_hashes.len());
        for hash in &self.blob_versioned_hashes {
            s.append(hash);
        }
    }

    /// `0x03 ‖ rlp(fields)`, the signed preimage
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(UNSIGNED_FIELDS);
        self.rlp_append_fields(&mut s);
        type_prefixed(&s.out())
    }

    pub fn sighash(&self) -> H256 {
        H256(keccak256(self.signing_payload()))
    }
}

#[derive(Debug, Clone)]
pub struct SignedBlobTransaction {
    tx: UnsignedBlobTransaction,
    signature: Signature,
}

impl SignedBlobTransaction {
    pub(crate) fn new(tx: UnsignedBlobTransaction, signature: Signature) -> Self {
        Self { tx, signature }
    }

    pub fn tx(&self) -> &UnsignedBlobTransaction {
        &self.tx
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Parity of the signature's y coordinate (0 or 1)
    pub fn y_parity(&self) -> u64 {
        match self.signature.v {
            0 | 1 => self.signature.v,
            27 | 28 => self.signature.v - 27,
            v => v.saturating_sub(35) % 2,
        }
    }

    pub fn recover_signer(&self) -> SubmitterResult<Address> {
        self.signature
            .recover(self.tx.sighash())
            .map_err(|e| SubmitterError::Wallet(format!("Signature recovery failed: {}", e)))
    }

    fn rlp_append_signed_fields(&self, s: &mut RlpStream) {
        self.tx.rlp_append_fields(s);
        s.append(&self.y_parity());
        s.append(&self.signature.r);
        s.append(&self.signature.s);
    }

    /// `0x03 ‖ rlp([fields…, y_parity, r, s])`, the form that is hashed
    pub fn encoded_without_sidecar(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(SIGNED_FIELDS);
        self.rlp_append_signed_fields(&mut s);
        type_prefixed(&s.out())
    }

    pub fn tx_hash(&self) -> H256 {
        H256(keccak256(self.encoded_without_sidecar()))
    }

    /// Network form: `0x03 ‖ rlp([[fields…, y_parity, r, s], blobs, commitments, proofs])`
    pub fn network_encoding(&self) -> Vec<u8> {
        let sidecar = &self.tx.sidecar;

        let mut s = RlpStream::new_list(4);
        s.begin_list(SIGNED_FIELDS);
        self.rlp_append_signed_fields(&mut s);

        s.begin_list(sidecar.len());
        for blob in sidecar.blobs() {
            s.append(&blob.to_vec());
        }
        s.begin_list(sidecar.commitments().len());
        for commitment in sidecar.commitments() {
            s.append(&commitment.to_vec());
        }
        s.begin_list(sidecar.proofs().len());
        for proof in sidecar.proofs() {
            s.append(&proof.to_vec());
        }

        type_prefixed(&s.out())
    }
}

/// Signed network bytes, ready for `eth_sendRawTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedBlobTransaction {
    tx_hash: H256,
    bytes: Bytes,
}

impl SerializedBlobTransaction {
    pub(crate) fn new(tx_hash: H256, bytes: Vec<u8>) -> Self {
        Self {
            tx_hash,
            bytes: Bytes::from(bytes),
        }
    }

    pub fn tx_hash(&self) -> H256 {
        self.tx_hash
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn type_prefixed(rlp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rlp.len() + 1);
    out.push(BLOB_TX_TYPE);
    out.extend_from_slice(rlp);
    out
}

/// Lifecycle stage of a transaction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStage {
    Unsigned,
    Signed,
    Serialized,
    Accepted,
    Rejected,
}

impl TxStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxStage::Accepted | TxStage::Rejected)
    }

    /// Move one step forward; skipping or reversing a stage is an error
    pub fn advance(self, to: TxStage) -> SubmitterResult<TxStage> {
        let allowed = matches!(
            (self, to),
            (TxStage::Unsigned, TxStage::Signed)
                | (TxStage::Signed, TxStage::Serialized)
                | (TxStage::Serialized, TxStage::Accepted)
                | (TxStage::Serialized, TxStage::Rejected)
        );

        if allowed {
            Ok(to)
        } else {
            Err(SubmitterError::InvalidStateTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for TxStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxStage::Unsigned => "unsigned",
            TxStage::Signed => "signed",
            TxStage::Serialized => "serialized",
            TxStage::Accepted => "submitted-accepted",
            TxStage::Rejected => "submitted-rejected",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let stage = TxStage::Unsigned
            .advance(TxStage::Signed)
            .and_then(|s| s.advance(TxStage::Serialized))
            .and_then(|s| s.advance(TxStage::Accepted))
            .unwrap();
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_stage_cannot_skip_or_reverse() {
        assert!(TxStage::Unsigned.advance(TxStage::Serialized).is_err());
        assert!(TxStage::Signed.advance(TxStage::Accepted).is_err());
        assert!(TxStage::Serialized.advance(TxStage::Signed).is_err());
        assert!(TxStage::Accepted.advance(TxStage::Rejected).is_err());
    }
}
