//! Request pipeline: from a contract request to a submitted blob transaction

use crate::blob::{build_sidecar, BlobEncoder, KzgBackend};
use crate::chain::{ChainRpc, RequestListener};
use crate::config::Settings;
use crate::contract::ContractInterface;
use crate::error::{SubmitterError, SubmitterResult};
use crate::events::ContractEvent;
use crate::matrix::{multiply, row_major};
use crate::merkle::merkle_root;
use crate::tx::{FeeResolver, TransactionAssembler, TransactionSender, TxStage};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{H256, U256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Blob payload: the root followed by every result cell as a 32-byte word
pub fn result_payload(root: H256, cells: &[U256]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(32 * (cells.len() + 1));
    payload.extend_from_slice(root.as_bytes());
    for cell in cells {
        let mut word = [0u8; 32];
        cell.to_big_endian(&mut word);
        payload.extend_from_slice(&word);
    }
    payload
}

/// Drives each request through multiply → commit → assemble → submit
pub struct BlobPipeline {
    rpc: Arc<dyn ChainRpc>,
    contract: Arc<ContractInterface>,
    encoder: BlobEncoder,
    kzg: Arc<dyn KzgBackend>,
    fee_resolver: FeeResolver,
    assembler: TransactionAssembler,
    sender: TransactionSender,
    wallet: LocalWallet,
    /// Window re-read for requests missed while lagging
    lookback_blocks: u64,
    /// Requests already taken by this process
    processed: RwLock<HashSet<U256>>,
    /// Shutdown flag
    shutdown: Arc<RwLock<bool>>,
}

impl BlobPipeline {
    pub fn new(
        settings: &Settings,
        rpc: Arc<dyn ChainRpc>,
        contract: Arc<ContractInterface>,
        kzg: Arc<dyn KzgBackend>,
        wallet: LocalWallet,
    ) -> Self {
        let rpc_timeout = Duration::from_millis(settings.relayer.rpc_timeout_ms);
        let encoder = match settings.blob.max_blobs {
            Some(max) => BlobEncoder::with_max_blobs(max),
            None => BlobEncoder::new(),
        };

        Self {
            fee_resolver: FeeResolver::new(rpc.clone(), &settings.fees, rpc_timeout),
            assembler: TransactionAssembler::new(settings.chain.gas_limit),
            sender: TransactionSender::new(rpc.clone(), rpc_timeout),
            rpc,
            contract,
            encoder,
            kzg,
            wallet,
            lookback_blocks: settings.relayer.lookback_blocks,
            processed: RwLock::new(HashSet::new()),
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    /// Process one request. Returns `None` if it was already taken.
    pub async fn process_request(&self, request_id: U256) -> SubmitterResult<Option<H256>> {
        if !self.processed.write().await.insert(request_id) {
            debug!("Request {} already processed, skipping", request_id);
            return Ok(None);
        }

        let attempt = Uuid::new_v4();
        let span = info_span!("request", %request_id, %attempt);
        let started = Instant::now();

        let result = self.run_attempt(request_id).instrument(span).await;
        crate::metrics::record_request_processed(result.is_ok());

        match result {
            Ok(tx_hash) => {
                crate::metrics::record_pipeline_latency(started.elapsed().as_secs_f64());
                info!("Request {} submitted as {:?}", request_id, tx_hash);
                Ok(Some(tx_hash))
            }
            Err(e) => {
                // Anything that reached the node stays taken; the rest may run again
                if !matches!(
                    e,
                    SubmitterError::Submission { .. } | SubmitterError::Timeout { .. }
                ) {
                    self.processed.write().await.remove(&request_id);
                }
                Err(e)
            }
        }
    }

    async fn run_attempt(&self, request_id: U256) -> SubmitterResult<H256> {
        let call = self.contract.encode_get_matrices(request_id)?;
        let output = self.rpc.call(self.contract.address(), call).await?;
        let [a, b] = self.contract.decode_matrices(&output)?;

        let result = multiply(&a, &b)?;
        let cells = row_major(&result);
        let root = merkle_root(&cells)?;
        debug!("Result root {:?}", root);

        let call_data = self.contract.encode_submit_result(root, &result, request_id)?;
        let blobs = self.encoder.encode(&result_payload(root, &cells))?;
        crate::metrics::record_blobs_encoded(blobs.len());

        let (sidecar, fees) = tokio::try_join!(
            build_sidecar(blobs, self.kzg.clone()),
            self.fee_resolver.resolve(self.wallet.address()),
        )?;

        let stage = TxStage::Unsigned;
        let unsigned = self.assembler.assemble(
            &fees,
            self.contract.address(),
            U256::zero(),
            call_data,
            sidecar,
        )?;
        let signed = self.assembler.sign(unsigned, &self.wallet)?;
        let stage = stage.advance(TxStage::Signed)?;
        let serialized = self.assembler.serialize(&signed);
        let stage = stage.advance(TxStage::Serialized)?;
        debug!("Transaction {:?} {}", serialized.tx_hash(), stage);

        self.sender.submit(&serialized).await
    }

    /// Main loop: handle the latest known request, then follow new events.
    ///
    /// When the receiver lags, the skipped requests are re-read from the
    /// listener's recent logs.
    pub async fn run(
        &self,
        mut event_rx: broadcast::Receiver<ContractEvent>,
        listener: Arc<RequestListener>,
        latest: Option<U256>,
    ) -> SubmitterResult<()> {
        if let Some(request_id) = latest {
            if let Err(e) = self.process_request(request_id).await {
                error!("Failed to process request {}: {}", request_id, e);
            }
        }

        let mut shutdown_check = interval(Duration::from_secs(1));
        info!("Blob pipeline started");

        loop {
            if *self.shutdown.read().await {
                break;
            }

            tokio::select! {
                received = event_rx.recv() => match received {
                    Ok(event) => self.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Pipeline lagged, {} events skipped", skipped);
                        self.catch_up(&listener).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                _ = shutdown_check.tick() => {}
            }
        }

        info!("Blob pipeline stopped");
        Ok(())
    }

    async fn catch_up(&self, listener: &RequestListener) {
        let ids = match listener.recent_request_ids(self.lookback_blocks).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to re-read requests after lag: {}", e);
                return;
            }
        };

        for request_id in ids {
            if let Err(e) = self.process_request(request_id).await {
                error!("Failed to process request {}: {}", request_id, e);
            }
        }
    }

    async fn handle_event(&self, event: ContractEvent) {
        debug!("Handling event: {:?}", event.name());

        if let Some(request_id) = event.request_id() {
            if let Err(e) = self.process_request(request_id).await {
                error!("Failed to process request {}: {}", request_id, e);
            }
        }
    }

    pub fn wallet_address(&self) -> ethers::types::Address {
        self.wallet.address()
    }

    /// Stop the pipeline
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::kzg::testing::DigestKzg;
    use crate::blob::{Blob, Bytes48};
    use crate::blob::{derive_versioned_hash, encoder::decode};
    use crate::chain::MockChainRpc;
    use crate::config::{
        BlobConfig, ChainConfig, FeeConfig, KzgConfig, MetricsConfig, RelayerConfig,
        WalletConfig,
    };
    use crate::contract::NEW_RECEIPT;
    use crate::matrix::{from_u64, Matrix};
    use ethers::abi::Token;
    use ethers::types::{Address, Bytes, Log};
    use ethers::utils::rlp::Rlp;
    use std::sync::Mutex;

    struct UnavailableKzg;

    impl KzgBackend for UnavailableKzg {
        fn commit(&self, _blob: &Blob) -> SubmitterResult<Bytes48> {
            Err(SubmitterError::Commitment {
                blob_index: 0,
                message: "trusted setup not loaded".to_string(),
            })
        }

        fn prove(&self, _blob: &Blob, _commitment: &Bytes48) -> SubmitterResult<Bytes48> {
            unreachable!("commit always fails")
        }
    }

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn settings() -> Settings {
        Settings {
            relayer: RelayerConfig {
                poll_interval_ms: 10,
                rpc_timeout_ms: 1000,
                lookback_blocks: 100,
                health_check_interval_secs: 30,
            },
            chain: ChainConfig {
                name: "test".to_string(),
                rpc_urls: vec!["http://localhost:8545".to_string()],
                contract_address: format!("{:?}", Address::repeat_byte(0x66)),
                abi_path: None,
                gas_limit: 2_500_000,
            },
            fees: FeeConfig::default(),
            blob: BlobConfig::default(),
            kzg: KzgConfig::default(),
            wallet: WalletConfig {
                private_key_env: "RELAYER_PRIVATE_KEY".to_string(),
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 0,
            },
        }
    }

    fn matrix_token(m: &Matrix) -> Token {
        Token::FixedArray(
            m.iter()
                .map(|row| Token::FixedArray(row.iter().map(|v| Token::Uint(*v)).collect()))
                .collect(),
        )
    }

    fn chain_mock(submitted: Arc<Mutex<Vec<Bytes>>>, submit_times: usize) -> MockChainRpc {
        let a = from_u64([[1, 2, 3], [4, 5, 6], [7, 8, 9]]);
        let identity = from_u64([[1, 0, 0], [0, 1, 0], [0, 0, 1]]);
        let output = ethers::abi::encode(&[Token::FixedArray(vec![
            matrix_token(&a),
            matrix_token(&identity),
        ])]);

        let mut rpc = MockChainRpc::new();
        rpc.expect_call()
            .returning(move |_, _| Ok(Bytes::from(output.clone())));
        rpc.expect_pending_nonce().returning(|_| Ok(5));
        rpc.expect_priority_fee_suggestion()
            .returning(|| Ok(U256::from(1_000_000_000u64)));
        rpc.expect_base_fee()
            .returning(|| Ok(U256::from(20_000_000_000u64)));
        rpc.expect_blob_base_fee().returning(|| Ok(U256::one()));
        rpc.expect_chain_id().returning(|| Ok(U256::from(17000)));
        rpc.expect_submit_raw_transaction()
            .times(submit_times)
            .returning(move |raw| {
                submitted.lock().unwrap().push(raw);
                Ok(H256::zero())
            });
        rpc
    }

    fn pipeline(rpc: MockChainRpc, kzg: Arc<dyn KzgBackend>) -> BlobPipeline {
        let settings = settings();
        let contract = Arc::new(
            ContractInterface::with_default_abi(settings.contract_address().unwrap()).unwrap(),
        );
        BlobPipeline::new(
            &settings,
            Arc::new(rpc),
            contract,
            kzg,
            TEST_KEY.parse().unwrap(),
        )
    }

    #[test]
    fn test_result_payload_layout() {
        let root = H256::repeat_byte(0x09);
        let payload = result_payload(root, &[U256::from(1), U256::from(258)]);
        assert_eq!(payload.len(), 96);
        assert_eq!(&payload[..32], root.as_bytes());
        assert_eq!(payload[63], 1);
        assert_eq!(&payload[94..], &[1, 2]);
    }

    #[tokio::test]
    async fn test_process_request_submits_once() {
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(chain_mock(submitted.clone(), 1), Arc::new(DigestKzg));

        let first = pipeline.process_request(U256::from(1)).await.unwrap();
        assert!(first.is_some());
        // Same request again: no second signature, no second submission
        assert!(pipeline.process_request(U256::from(1)).await.unwrap().is_none());

        let raw = submitted.lock().unwrap()[0].clone();
        assert_eq!(raw[0], 0x03);

        let outer = Rlp::new(&raw[1..]);
        let body = outer.at(0).unwrap();
        assert_eq!(body.val_at::<u64>(1).unwrap(), 5);

        let blobs: Vec<Vec<u8>> = outer.list_at(1).unwrap();
        assert_eq!(blobs.len(), 1);
        let commitments: Vec<Vec<u8>> = outer.list_at(2).unwrap();
        let hashes: Vec<H256> = body.list_at(10).unwrap();
        assert_eq!(hashes, vec![derive_versioned_hash(&commitments[0]).unwrap()]);

        // The blob carries the root and the nine cells of A * I = A
        let mut blob = crate::blob::empty_blob();
        blob.copy_from_slice(&blobs[0]);
        let payload = decode(&[blob], 32 * 10);
        let cells = row_major(&from_u64([[1, 2, 3], [4, 5, 6], [7, 8, 9]]));
        let root = merkle_root(&cells).unwrap();
        assert_eq!(payload, result_payload(root, &cells));
    }

    #[tokio::test]
    async fn test_kzg_failure_aborts_before_submission() {
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(chain_mock(submitted.clone(), 0), Arc::new(UnavailableKzg));

        let err = pipeline.process_request(U256::from(2)).await.unwrap_err();
        assert!(matches!(err, SubmitterError::Commitment { .. }));
        assert!(submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lagged_requests_recovered_from_logs() {
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(chain_mock(submitted.clone(), 2), Arc::new(DigestKzg));

        let contract = Arc::new(
            ContractInterface::with_default_abi(settings().contract_address().unwrap()).unwrap(),
        );
        let logs: Vec<Log> = [1u64, 2]
            .iter()
            .map(|id| Log {
                address: contract.address(),
                topics: vec![
                    contract.event_topic(NEW_RECEIPT).unwrap(),
                    H256::from_low_u64_be(*id),
                ],
                ..Default::default()
            })
            .collect();

        let mut listener_rpc = MockChainRpc::new();
        listener_rpc.expect_block_number().returning(|| Ok(100));
        listener_rpc
            .expect_get_logs()
            .times(1)
            .returning(move |_| Ok(logs.clone()));
        let listener = Arc::new(
            RequestListener::new(
                Arc::new(listener_rpc),
                contract,
                100,
                Duration::from_millis(10),
            )
            .unwrap(),
        );

        // Capacity one: the first event is overwritten before it is read
        let (event_tx, event_rx) = broadcast::channel(1);
        for id in [1u64, 2] {
            event_tx
                .send(ContractEvent::NewReceipt {
                    request_id: U256::from(id),
                    block_number: 90,
                    tx_hash: H256::zero(),
                })
                .unwrap();
        }
        drop(event_tx);

        pipeline.run(event_rx, listener, None).await.unwrap();

        // Both requests submitted once; the buffered event for 2 is a duplicate
        assert_eq!(submitted.lock().unwrap().len(), 2);
    }
}
