//! Single-shot submission of serialized blob transactions

use super::types::{SerializedBlobTransaction, TxStage};
use crate::chain::ChainRpc;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Hands serialized bytes to the chain exactly once per call
pub struct TransactionSender {
    rpc: Arc<dyn ChainRpc>,
    send_timeout: Duration,
}

impl TransactionSender {
    pub fn new(rpc: Arc<dyn ChainRpc>, send_timeout: Duration) -> Self {
        Self { rpc, send_timeout }
    }

    /// Submit a serialized transaction. There is no internal retry.
    pub async fn submit(&self, tx: &SerializedBlobTransaction) -> SubmitterResult<H256> {
        let stage = TxStage::Serialized;
        let tx_hash = tx.tx_hash();

        let result = timeout(
            self.send_timeout,
            self.rpc.submit_raw_transaction(tx.bytes().clone()),
        )
        .await;

        match result {
            Ok(Ok(reported)) => {
                let stage = stage.advance(TxStage::Accepted)?;
                if reported != tx_hash {
                    warn!(
                        "Node reported hash {:?}, expected {:?}",
                        reported, tx_hash
                    );
                }
                info!("Transaction {:?} {} ({} bytes)", tx_hash, stage, tx.len());
                crate::metrics::record_tx_submitted();
                Ok(reported)
            }
            Ok(Err(e)) => {
                let stage = stage.advance(TxStage::Rejected)?;
                error!("Transaction {:?} {}: {}", tx_hash, stage, e);
                crate::metrics::record_tx_rejected();
                Err(SubmitterError::Submission {
                    tx_hash: format!("{:?}", tx_hash),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                // Outcome unknown: the node may still have accepted it
                warn!("Transaction {:?} send timeout, stage stays {}", tx_hash, stage);
                crate::metrics::record_tx_timed_out();
                Err(SubmitterError::Timeout {
                    operation: format!("submission of {:?}", tx_hash),
                })
            }
        }
    }

    /// Resend previously serialized bytes unchanged; never re-signs
    pub async fn resubmit(&self, tx: &SerializedBlobTransaction) -> SubmitterResult<H256> {
        info!("Resubmitting identical bytes for {:?}", tx.tx_hash());
        self.submit(tx).await
    }
}
