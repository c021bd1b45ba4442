//! Contract log listener with HTTP polling

use super::ChainRpc;
use crate::contract::ContractInterface;
use crate::error::SubmitterResult;
use crate::events::{ContractEvent, EventParser};

use ethers::types::{Filter, Log, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// Maximum block span of a single `eth_getLogs` query
const MAX_BLOCK_RANGE: u64 = 1000;

/// Polls the rollup contract's logs and broadcasts parsed events
pub struct RequestListener {
    provider: Arc<dyn ChainRpc>,
    contract: Arc<ContractInterface>,
    event_parser: EventParser,
    event_tx: broadcast::Sender<ContractEvent>,
    /// Last processed block
    last_processed_block: RwLock<u64>,
    poll_interval: Duration,
}

impl RequestListener {
    /// Create a new listener starting after `start_block`
    pub fn new(
        provider: Arc<dyn ChainRpc>,
        contract: Arc<ContractInterface>,
        start_block: u64,
        poll_interval: Duration,
    ) -> SubmitterResult<Self> {
        let (event_tx, _) = broadcast::channel(1024);
        let event_parser = EventParser::new(contract.clone())?;

        Ok(Self {
            provider,
            contract,
            event_parser,
            event_tx,
            last_processed_block: RwLock::new(start_block),
            poll_interval,
        })
    }

    /// Subscribe to parsed contract events
    pub fn subscribe(&self) -> broadcast::Receiver<ContractEvent> {
        self.event_tx.subscribe()
    }

    pub async fn last_processed_block(&self) -> u64 {
        *self.last_processed_block.read().await
    }

    /// Request id of the most recent `NewReceipt` within `lookback` blocks
    pub async fn latest_request_id(&self, lookback: u64) -> SubmitterResult<Option<U256>> {
        Ok(self.recent_request_ids(lookback).await?.pop())
    }

    /// Every `NewReceipt` request id within `lookback` blocks, oldest first
    pub async fn recent_request_ids(&self, lookback: u64) -> SubmitterResult<Vec<U256>> {
        let current = self.provider.block_number().await?;
        let from_block = current.saturating_sub(lookback);

        let filter = Filter::new()
            .address(self.contract.address())
            .topic0(self.event_parser.new_receipt_topic())
            .from_block(from_block)
            .to_block(current);

        let logs = self.provider.get_logs(&filter).await?;

        let mut ids = Vec::with_capacity(logs.len());
        for log in &logs {
            match self.event_parser.parse_log(log) {
                Ok(event) => ids.extend(event.request_id()),
                Err(e) => warn!("Failed to unpack log data: {}", e),
            }
        }

        Ok(ids)
    }

    /// Main listening loop
    pub async fn listen(&self) -> SubmitterResult<()> {
        info!("Polling contract {:?} for events", self.contract.address());

        loop {
            if let Err(e) = self.poll_once().await {
                warn!("Log poll failed: {}", e);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Process at most one bounded block range; returns the events emitted
    pub async fn poll_once(&self) -> SubmitterResult<usize> {
        let current_block = self.provider.block_number().await?;
        let last_block = *self.last_processed_block.read().await;

        // Only process if we have new blocks
        if current_block <= last_block {
            return Ok(0);
        }

        let from_block = last_block + 1;
        let to_block = std::cmp::min(current_block, from_block + MAX_BLOCK_RANGE - 1);

        debug!("Processing blocks {} to {}", from_block, to_block);

        let filter = Filter::new()
            .address(self.contract.address())
            .from_block(from_block)
            .to_block(to_block);

        // Checkpoint only advances once the range is read
        let logs = self.provider.get_logs(&filter).await?;

        let mut emitted = 0;
        for log in logs {
            match self.process_log(&log) {
                Ok(()) => emitted += 1,
                Err(e) => error!("Failed to process log: {}", e),
            }
        }

        *self.last_processed_block.write().await = to_block;
        crate::metrics::record_blocks_processed(to_block);

        Ok(emitted)
    }

    /// Process a single log entry
    fn process_log(&self, log: &Log) -> SubmitterResult<()> {
        let event = self.event_parser.parse_log(log)?;

        debug!("Contract event: {:?}", event);
        crate::metrics::record_event(&event);

        if self.event_tx.send(event).is_err() {
            // No receivers, that's okay
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainRpc;
    use crate::contract::NEW_RECEIPT;
    use ethers::types::{Address, H256, U64};

    fn contract() -> Arc<ContractInterface> {
        Arc::new(ContractInterface::with_default_abi(Address::repeat_byte(0x33)).unwrap())
    }

    fn receipt_log(contract: &ContractInterface, request_id: u64, block: u64) -> Log {
        Log {
            address: contract.address(),
            topics: vec![
                contract.event_topic(NEW_RECEIPT).unwrap(),
                H256::from_low_u64_be(request_id),
            ],
            block_number: Some(U64::from(block)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_latest_request_id_takes_last_log() {
        let contract = contract();
        let logs = vec![
            receipt_log(&contract, 3, 90),
            receipt_log(&contract, 4, 95),
        ];

        let mut rpc = MockChainRpc::new();
        rpc.expect_block_number().returning(|| Ok(100));
        rpc.expect_get_logs()
            .returning(move |_| Ok(logs.clone()));

        let listener =
            RequestListener::new(Arc::new(rpc), contract, 0, Duration::from_millis(10)).unwrap();
        assert_eq!(
            listener.latest_request_id(50).await.unwrap(),
            Some(U256::from(4))
        );
    }

    #[tokio::test]
    async fn test_recent_request_ids_in_log_order() {
        let contract = contract();
        let logs = vec![
            receipt_log(&contract, 5, 80),
            receipt_log(&contract, 6, 81),
            receipt_log(&contract, 7, 99),
        ];

        let mut rpc = MockChainRpc::new();
        rpc.expect_block_number().returning(|| Ok(100));
        rpc.expect_get_logs()
            .returning(move |_| Ok(logs.clone()));

        let listener =
            RequestListener::new(Arc::new(rpc), contract, 0, Duration::from_millis(10)).unwrap();
        assert_eq!(
            listener.recent_request_ids(50).await.unwrap(),
            vec![U256::from(5), U256::from(6), U256::from(7)]
        );
    }

    #[tokio::test]
    async fn test_poll_once_broadcasts_and_advances() {
        let contract = contract();
        let logs = vec![receipt_log(&contract, 8, 11)];

        let mut rpc = MockChainRpc::new();
        rpc.expect_block_number().returning(|| Ok(12));
        rpc.expect_get_logs()
            .times(1)
            .returning(move |_| Ok(logs.clone()));

        let listener =
            RequestListener::new(Arc::new(rpc), contract, 10, Duration::from_millis(10)).unwrap();
        let mut rx = listener.subscribe();

        assert_eq!(listener.poll_once().await.unwrap(), 1);
        assert_eq!(listener.last_processed_block().await, 12);
        assert_eq!(rx.recv().await.unwrap().request_id(), Some(U256::from(8)));

        // Nothing new: no further log query
        assert_eq!(listener.poll_once().await.unwrap(), 0);
    }
}
