//! Payload packing into field-element blobs

use super::{
    empty_blob, Blob, BYTES_PER_FIELD_ELEMENT, FIELD_ELEMENTS_PER_BLOB,
    USABLE_BYTES_PER_FIELD_ELEMENT,
};
use crate::error::{SubmitterError, SubmitterResult};

use tracing::debug;

/// Packs bytes into blobs, 31 payload bytes per 32-byte field element
#[derive(Debug, Clone, Default)]
pub struct BlobEncoder {
    /// Optional ceiling on the number of blobs per payload
    max_blobs: Option<usize>,
}

impl BlobEncoder {
    pub fn new() -> Self {
        Self { max_blobs: None }
    }

    pub fn with_max_blobs(max_blobs: usize) -> Self {
        Self {
            max_blobs: Some(max_blobs),
        }
    }

    /// Number of blobs `encode` produces for a payload of `len` bytes.
    ///
    /// An empty payload still occupies one blob.
    pub fn blobs_required(len: usize) -> usize {
        let elements = len.div_ceil(USABLE_BYTES_PER_FIELD_ELEMENT);
        elements.div_ceil(FIELD_ELEMENTS_PER_BLOB).max(1)
    }

    /// Encode `payload` into one or more blobs, in order.
    pub fn encode(&self, payload: &[u8]) -> SubmitterResult<Vec<Blob>> {
        let required = Self::blobs_required(payload.len());
        if let Some(max_blobs) = self.max_blobs {
            if required > max_blobs {
                return Err(SubmitterError::PayloadTooLarge {
                    payload_len: payload.len(),
                    required,
                    max_blobs,
                });
            }
        }

        let mut blobs = Vec::with_capacity(required);
        blobs.push(empty_blob());

        let mut field_index = 0;
        for chunk in payload.chunks(USABLE_BYTES_PER_FIELD_ELEMENT) {
            if field_index == FIELD_ELEMENTS_PER_BLOB {
                blobs.push(empty_blob());
                field_index = 0;
            }
            let offset = field_index * BYTES_PER_FIELD_ELEMENT;
            if let Some(blob) = blobs.last_mut() {
                blob[offset..offset + chunk.len()].copy_from_slice(chunk);
            }
            field_index += 1;
        }

        debug!(
            "Encoded {} payload bytes into {} blob(s)",
            payload.len(),
            blobs.len()
        );

        Ok(blobs)
    }
}

/// Inverse of [`BlobEncoder::encode`]: concatenate the payload bytes of every
/// slot and truncate to `len`.
pub fn decode(blobs: &[Blob], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    'outer: for blob in blobs {
        for slot in blob.chunks(BYTES_PER_FIELD_ELEMENT) {
            if out.len() >= len {
                break 'outer;
            }
            out.extend_from_slice(&slot[..USABLE_BYTES_PER_FIELD_ELEMENT]);
        }
    }
    out.truncate(len);
    out
}
