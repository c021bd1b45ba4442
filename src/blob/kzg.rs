//! KZG commitment capability and sidecar construction
//!
//! The commitment scheme itself lives behind [`KzgBackend`]. With the `c-kzg`
//! feature enabled, [`CKzgBackend`] wraps the reference C implementation.

use super::{derive_versioned_hashes, Blob, BlobSidecar, Bytes48};
use crate::error::{SubmitterError, SubmitterResult};

use std::sync::Arc;
use tracing::debug;

/// Commitment and proof computation for a single blob
pub trait KzgBackend: Send + Sync {
    fn commit(&self, blob: &Blob) -> SubmitterResult<Bytes48>;

    fn prove(&self, blob: &Blob, commitment: &Bytes48) -> SubmitterResult<Bytes48>;
}

/// Commit and prove every blob in parallel, then derive the declared hashes.
///
/// Results are joined in blob order; the first failure aborts the whole
/// sidecar.
pub async fn build_sidecar(
    blobs: Vec<Blob>,
    backend: Arc<dyn KzgBackend>,
) -> SubmitterResult<BlobSidecar> {
    let handles: Vec<_> = blobs
        .into_iter()
        .enumerate()
        .map(|(blob_index, blob)| {
            let backend = backend.clone();
            tokio::task::spawn_blocking(move || {
                let commitment = backend.commit(&blob).map_err(|e| at_index(e, blob_index))?;
                let proof = backend
                    .prove(&blob, &commitment)
                    .map_err(|e| at_index(e, blob_index))?;
                Ok::<_, SubmitterError>((blob, commitment, proof))
            })
        })
        .collect();

    let joined = futures::future::join_all(handles).await;

    let mut blobs = Vec::with_capacity(joined.len());
    let mut commitments = Vec::with_capacity(joined.len());
    let mut proofs = Vec::with_capacity(joined.len());

    for result in joined {
        let (blob, commitment, proof) =
            result.map_err(|e| SubmitterError::Internal(format!("KZG task failed: {}", e)))??;
        blobs.push(blob);
        commitments.push(commitment);
        proofs.push(proof);
    }

    let versioned_hashes = derive_versioned_hashes(&commitments)?;
    debug!("Built sidecar with {} blob(s)", blobs.len());

    Ok(BlobSidecar::new(blobs, commitments, proofs, versioned_hashes))
}

fn at_index(err: SubmitterError, blob_index: usize) -> SubmitterError {
    match err {
        SubmitterError::Commitment { message, .. } => SubmitterError::Commitment {
            blob_index,
            message,
        },
        other => other,
    }
}

#[cfg(feature = "c-kzg")]
pub use native::CKzgBackend;

#[cfg(feature = "c-kzg")]
mod native {
    use super::*;
    use c_kzg::{KzgCommitment, KzgProof, KzgSettings};
    use std::path::Path;

    /// KZG backend over the c-kzg bindings
    pub struct CKzgBackend {
        settings: KzgSettings,
    }

    impl CKzgBackend {
        /// Load the trusted setup from a file in the standard text format
        pub fn load(trusted_setup: &Path) -> SubmitterResult<Self> {
            let settings = KzgSettings::load_trusted_setup_file(trusted_setup).map_err(|e| {
                SubmitterError::Config(format!(
                    "Failed to load trusted setup {:?}: {:?}",
                    trusted_setup, e
                ))
            })?;
            Ok(Self { settings })
        }

        fn to_c_blob(blob: &Blob) -> SubmitterResult<c_kzg::Blob> {
            c_kzg::Blob::from_bytes(&blob[..]).map_err(|e| SubmitterError::Commitment {
                blob_index: 0,
                message: format!("{:?}", e),
            })
        }
    }

    impl KzgBackend for CKzgBackend {
        fn commit(&self, blob: &Blob) -> SubmitterResult<Bytes48> {
            let blob = Self::to_c_blob(blob)?;
            let commitment = KzgCommitment::blob_to_kzg_commitment(&blob, &self.settings)
                .map_err(|e| SubmitterError::Commitment {
                    blob_index: 0,
                    message: format!("{:?}", e),
                })?;
            Ok(*commitment.to_bytes())
        }

        fn prove(&self, blob: &Blob, commitment: &Bytes48) -> SubmitterResult<Bytes48> {
            let blob = Self::to_c_blob(blob)?;
            let commitment =
                c_kzg::Bytes48::from_bytes(commitment).map_err(|e| SubmitterError::Commitment {
                    blob_index: 0,
                    message: format!("{:?}", e),
                })?;
            let proof = KzgProof::compute_blob_kzg_proof(&blob, &commitment, &self.settings)
                .map_err(|e| SubmitterError::Commitment {
                    blob_index: 0,
                    message: format!("{:?}", e),
                })?;
            Ok(*proof.to_bytes())
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{DigestKzg, RejectNonZero};
    use super::*;
    use crate::blob::{derive_versioned_hash, empty_blob};

    fn blob_with(first: u8) -> Blob {
        let mut blob = empty_blob();
        blob[0] = first;
        blob
    }

    #[tokio::test]
    async fn test_sidecar_is_parallel_and_ordered() {
        let blobs = vec![blob_with(0), blob_with(1), blob_with(2)];
        let sidecar = build_sidecar(blobs, Arc::new(DigestKzg)).await.unwrap();

        assert_eq!(sidecar.len(), 3);
        assert_eq!(sidecar.commitments().len(), 3);
        assert_eq!(sidecar.proofs().len(), 3);
        for (i, blob) in sidecar.blobs().iter().enumerate() {
            assert_eq!(blob[0], i as u8);
            assert_eq!(sidecar.commitments()[i], DigestKzg.commit(blob).unwrap());
            assert_eq!(
                sidecar.versioned_hashes()[i],
                derive_versioned_hash(&sidecar.commitments()[i]).unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_failure_aborts_with_blob_index() {
        let blobs = vec![blob_with(0), blob_with(0), blob_with(9)];
        let err = build_sidecar(blobs, Arc::new(RejectNonZero))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitterError::Commitment { blob_index: 2, .. }));
    }
}
