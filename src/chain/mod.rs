//! Chain module - RPC access and contract log listening
//!
//! This module provides:
//! - The [`ChainRpc`] interface the pipeline reads chain state through
//! - Multi-RPC provider management with automatic failover
//! - Log polling that feeds parsed contract events to subscribers

pub mod listener;
pub mod provider;

pub use listener::RequestListener;
pub use provider::ChainProvider;

use crate::error::SubmitterResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Filter, Log, H256, U256};

/// Chain state reads and raw transaction submission
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Pending-block transaction count of `account`
    async fn pending_nonce(&self, account: Address) -> SubmitterResult<u64>;

    /// Base fee per gas of the latest block
    async fn base_fee(&self) -> SubmitterResult<U256>;

    /// Blob base fee of the latest block
    async fn blob_base_fee(&self) -> SubmitterResult<U256>;

    async fn priority_fee_suggestion(&self) -> SubmitterResult<U256>;

    async fn chain_id(&self) -> SubmitterResult<U256>;

    /// Broadcast signed bytes and return the node-reported hash
    async fn submit_raw_transaction(&self, raw: Bytes) -> SubmitterResult<H256>;

    async fn block_number(&self) -> SubmitterResult<u64>;

    async fn get_logs(&self, filter: &Filter) -> SubmitterResult<Vec<Log>>;

    /// Read-only contract call against the latest block
    async fn call(&self, to: Address, data: Bytes) -> SubmitterResult<Bytes>;
}
