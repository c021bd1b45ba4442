//! Blob transaction assembly, signing and serialization

use super::fees::FeeParameters;
use super::types::{SerializedBlobTransaction, SignedBlobTransaction, UnsignedBlobTransaction};
use crate::blob::{derive_versioned_hashes, BlobSidecar};
use crate::error::{SubmitterError, SubmitterResult};

use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, U256};
use tracing::debug;

/// Builds signable blob transactions from resolved parameters
#[derive(Debug, Clone)]
pub struct TransactionAssembler {
    gas_limit: u64,
}

impl TransactionAssembler {
    pub fn new(gas_limit: u64) -> Self {
        Self { gas_limit }
    }

    /// Combine fees, call and sidecar into an unsigned transaction.
    ///
    /// The sidecar's sequences must be equally long and non-empty, and its
    /// declared hashes must equal the hashes derived from its commitments in
    /// the same order.
    pub fn assemble(
        &self,
        fees: &FeeParameters,
        recipient: Address,
        value: U256,
        call_data: Bytes,
        sidecar: BlobSidecar,
    ) -> SubmitterResult<UnsignedBlobTransaction> {
        validate_sidecar(&sidecar)?;

        let tx = UnsignedBlobTransaction {
            chain_id: fees.chain_id,
            nonce: fees.nonce,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            gas_limit: self.gas_limit,
            to: recipient,
            value,
            data: call_data,
            max_fee_per_blob_gas: fees.max_fee_per_blob_gas,
            blob_versioned_hashes: sidecar.versioned_hashes().to_vec(),
            sidecar,
        };

        debug!(
            "Assembled blob tx: chain_id={} nonce={} blobs={}",
            tx.chain_id,
            tx.nonce,
            tx.blob_versioned_hashes.len()
        );

        Ok(tx)
    }

    /// Sign once; RFC 6979 makes the signature deterministic per key and message
    pub fn sign(
        &self,
        tx: UnsignedBlobTransaction,
        wallet: &LocalWallet,
    ) -> SubmitterResult<SignedBlobTransaction> {
        let signature = wallet
            .sign_hash(tx.sighash())
            .map_err(|e| SubmitterError::Wallet(format!("Failed to sign transaction: {}", e)))?;
        Ok(SignedBlobTransaction::new(tx, signature))
    }

    /// Canonical network bytes; identical output for the same signed value
    pub fn serialize(&self, tx: &SignedBlobTransaction) -> SerializedBlobTransaction {
        SerializedBlobTransaction::new(tx.tx_hash(), tx.network_encoding())
    }
}

fn validate_sidecar(sidecar: &BlobSidecar) -> SubmitterResult<()> {
    let blobs = sidecar.blobs().len();
    if blobs == 0 {
        return Err(SubmitterError::SidecarMismatch(
            "sidecar carries no blobs".to_string(),
        ));
    }

    let commitments = sidecar.commitments().len();
    let proofs = sidecar.proofs().len();
    let hashes = sidecar.versioned_hashes().len();
    if commitments != blobs || proofs != blobs || hashes != blobs {
        return Err(SubmitterError::SidecarMismatch(format!(
            "lengths differ: blobs={} commitments={} proofs={} hashes={}",
            blobs, commitments, proofs, hashes
        )));
    }

    let derived = derive_versioned_hashes(sidecar.commitments())?;
    if let Some(index) = derived
        .iter()
        .zip(sidecar.versioned_hashes())
        .position(|(derived, declared)| derived != declared)
    {
        return Err(SubmitterError::SidecarMismatch(format!(
            "declared blob hash {} does not match commitment {}",
            index, index
        )));
    }

    Ok(())
}
