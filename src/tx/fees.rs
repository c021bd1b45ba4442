//! Nonce and fee resolution for blob transactions

use crate::chain::ChainRpc;
use crate::config::FeeConfig;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Resolved nonce and fee caps for one transaction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeParameters {
    pub chain_id: U256,
    pub nonce: u64,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_fee_per_blob_gas: U256,
    /// Base fee observed at resolution time
    pub base_fee: U256,
    /// Blob base fee observed at resolution time
    pub blob_base_fee: U256,
}

/// Reads chain state and applies the configured safety margins
pub struct FeeResolver {
    rpc: Arc<dyn ChainRpc>,
    priority_fee_margin: U256,
    max_fee_margin: U256,
    blob_fee_margin: U256,
    /// Bounded wait for the combined reads
    query_timeout: Duration,
}

impl FeeResolver {
    pub fn new(rpc: Arc<dyn ChainRpc>, fees: &FeeConfig, query_timeout: Duration) -> Self {
        Self {
            rpc,
            priority_fee_margin: fees.priority_fee_margin(),
            max_fee_margin: fees.max_fee_margin(),
            blob_fee_margin: fees.blob_fee_margin(),
            query_timeout,
        }
    }

    /// Resolve nonce and fees for `account`.
    ///
    /// All reads run concurrently; any failure or the timeout fails the whole
    /// resolution.
    pub async fn resolve(&self, account: Address) -> SubmitterResult<FeeParameters> {
        let reads = async {
            tokio::try_join!(
                self.rpc.pending_nonce(account),
                self.rpc.priority_fee_suggestion(),
                self.rpc.base_fee(),
                self.rpc.blob_base_fee(),
                self.rpc.chain_id(),
            )
        };

        let (nonce, suggested_tip, base_fee, blob_base_fee, chain_id) =
            timeout(self.query_timeout, reads)
                .await
                .map_err(|_| SubmitterError::ChainQuery {
                    query: "fee resolution",
                    message: format!("no response within {:?}", self.query_timeout),
                })??;

        let max_priority_fee_per_gas = checked_add(
            suggested_tip,
            self.priority_fee_margin,
            "max_priority_fee_per_gas",
        )?;
        let max_fee_per_gas = checked_add(
            checked_add(base_fee, max_priority_fee_per_gas, "max_fee_per_gas")?,
            self.max_fee_margin,
            "max_fee_per_gas",
        )?;
        let max_fee_per_blob_gas =
            checked_add(blob_base_fee, self.blob_fee_margin, "max_fee_per_blob_gas")?;

        debug!(
            "Resolved fees: nonce={} base_fee={} tip={} max_fee={} blob_base_fee={} max_blob_fee={}",
            nonce,
            base_fee,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            blob_base_fee,
            max_fee_per_blob_gas
        );

        Ok(FeeParameters {
            chain_id,
            nonce,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            max_fee_per_blob_gas,
            base_fee,
            blob_base_fee,
        })
    }
}

fn checked_add(a: U256, b: U256, field: &'static str) -> SubmitterResult<U256> {
    a.checked_add(b).ok_or(SubmitterError::FeeOverflow { field })
}
