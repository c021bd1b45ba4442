//! Chain provider with multi-RPC support and automatic failover

use super::ChainRpc;
use crate::config::ChainConfig;
use crate::error::{SubmitterError, SubmitterResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Last known block number
    last_block: RwLock<u64>,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> SubmitterResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for {}: {}", config.name, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(SubmitterError::Config(format!(
                "No valid RPC providers for {}",
                config.name
            )));
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            last_block: RwLock::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("{} failover to provider {}", self.config.name, next);
    }

    /// Last block number observed by `block_number`
    pub async fn last_block(&self) -> u64 {
        *self.last_block.read().await
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!("Health check failed for {}: {}", self.config.name, e);
                false
            }
        }
    }

    fn query_error(query: &'static str, e: impl std::fmt::Display) -> SubmitterError {
        SubmitterError::ChainQuery {
            query,
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl ChainRpc for ChainProvider {
    async fn pending_nonce(&self, account: Address) -> SubmitterResult<u64> {
        let nonce = self
            .http()
            .get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| Self::query_error("eth_getTransactionCount", e))?;

        if nonce > U256::from(u64::MAX) {
            return Err(Self::query_error(
                "eth_getTransactionCount",
                format!("nonce {} exceeds u64", nonce),
            ));
        }
        Ok(nonce.as_u64())
    }

    async fn base_fee(&self) -> SubmitterResult<U256> {
        let block = self
            .http()
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| Self::query_error("eth_getBlockByNumber", e))?
            .ok_or_else(|| Self::query_error("eth_getBlockByNumber", "No latest block"))?;

        block
            .base_fee_per_gas
            .ok_or_else(|| Self::query_error("eth_getBlockByNumber", "No base fee in block"))
    }

    async fn blob_base_fee(&self) -> SubmitterResult<U256> {
        self.http()
            .request::<_, U256>("eth_blobBaseFee", ())
            .await
            .map_err(|e| Self::query_error("eth_blobBaseFee", e))
    }

    async fn priority_fee_suggestion(&self) -> SubmitterResult<U256> {
        self.http()
            .request::<_, U256>("eth_maxPriorityFeePerGas", ())
            .await
            .map_err(|e| Self::query_error("eth_maxPriorityFeePerGas", e))
    }

    async fn chain_id(&self) -> SubmitterResult<U256> {
        self.http()
            .get_chainid()
            .await
            .map_err(|e| Self::query_error("eth_chainId", e))
    }

    async fn submit_raw_transaction(&self, raw: Bytes) -> SubmitterResult<H256> {
        // Never rotated on failure: a rejected payload is not resent elsewhere
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| Self::query_error("eth_sendRawTransaction", e))?;
        Ok(pending.tx_hash())
    }

    async fn block_number(&self) -> SubmitterResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => {
                    let block_num = block.as_u64();
                    *self.last_block.write().await = block_num;
                    return Ok(block_num);
                }
                Err(e) => {
                    warn!("Failed to get block number from {}: {}", self.config.name, e);
                    self.failover();
                }
            }
        }

        Err(Self::query_error("eth_blockNumber", "All providers failed"))
    }

    async fn get_logs(&self, filter: &Filter) -> SubmitterResult<Vec<Log>> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_logs(filter).await {
                Ok(logs) => return Ok(logs),
                Err(e) => {
                    warn!("Failed to get logs from {}: {}", self.config.name, e);
                    self.failover();
                }
            }
        }

        Err(Self::query_error("eth_getLogs", "All providers failed to get logs"))
    }

    async fn call(&self, to: Address, data: Bytes) -> SubmitterResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.http()
            .call(&tx, None)
            .await
            .map_err(|e| Self::query_error("eth_call", e))
    }
}
