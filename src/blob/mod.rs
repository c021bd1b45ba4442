//! Blob encoding, KZG sidecar construction and versioned hashes
//!
//! This module provides:
//! - Payload packing into 4096 x 32-byte field-element blobs
//! - The KZG capability interface and sidecar builder
//! - Versioned hash derivation for declared blob hashes

pub mod encoder;
pub mod kzg;
pub mod versioned_hash;

pub use encoder::BlobEncoder;
pub use kzg::{build_sidecar, KzgBackend};
pub use versioned_hash::{derive_versioned_hash, derive_versioned_hashes};

use ethers::types::H256;

pub const FIELD_ELEMENTS_PER_BLOB: usize = 4096;
pub const BYTES_PER_FIELD_ELEMENT: usize = 32;
/// Payload bytes per field element; the last byte of each slot stays zero
pub const USABLE_BYTES_PER_FIELD_ELEMENT: usize = 31;
pub const BYTES_PER_BLOB: usize = FIELD_ELEMENTS_PER_BLOB * BYTES_PER_FIELD_ELEMENT;
pub const BYTES_PER_COMMITMENT: usize = 48;
pub const BYTES_PER_PROOF: usize = 48;

pub type Blob = Box<[u8; BYTES_PER_BLOB]>;
pub type Bytes48 = [u8; 48];

/// Allocate a zeroed blob on the heap
pub fn empty_blob() -> Blob {
    vec![0u8; BYTES_PER_BLOB]
        .into_boxed_slice()
        .try_into()
        .unwrap_or_else(|_| unreachable!("vector has blob length"))
}

/// Blobs with their commitments, proofs and declared versioned hashes.
///
/// The four sequences are parallel. `TransactionAssembler::assemble` checks
/// that they agree before anything is signed.
#[derive(Debug, Clone)]
pub struct BlobSidecar {
    blobs: Vec<Blob>,
    commitments: Vec<Bytes48>,
    proofs: Vec<Bytes48>,
    versioned_hashes: Vec<H256>,
}

impl BlobSidecar {
    pub fn new(
        blobs: Vec<Blob>,
        commitments: Vec<Bytes48>,
        proofs: Vec<Bytes48>,
        versioned_hashes: Vec<H256>,
    ) -> Self {
        Self {
            blobs,
            commitments,
            proofs,
            versioned_hashes,
        }
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    pub fn commitments(&self) -> &[Bytes48] {
        &self.commitments
    }

    pub fn proofs(&self) -> &[Bytes48] {
        &self.proofs
    }

    pub fn versioned_hashes(&self) -> &[H256] {
        &self.versioned_hashes
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}
