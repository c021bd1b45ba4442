//! Matrix blob relayer - commits multiplication results with blob transactions

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use matmul_blob_relayer::blob::KzgBackend;
use matmul_blob_relayer::chain::{ChainProvider, ChainRpc, RequestListener};
use matmul_blob_relayer::config::{KzgConfig, Settings};
use matmul_blob_relayer::contract::ContractInterface;
use matmul_blob_relayer::metrics::{self, MetricsServer};
use matmul_blob_relayer::pipeline::BlobPipeline;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting matrix blob relayer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!("Loaded configuration for chain {}", settings.chain.name);

    let provider = Arc::new(ChainProvider::new(settings.chain.clone())?);
    let contract = Arc::new(ContractInterface::from_config(&settings.chain)?);
    let wallet = settings.wallet.load_wallet()?;
    let kzg = load_kzg(&settings.kzg)?;

    let start_block = provider
        .block_number()
        .await
        .context("Failed to read current block")?;

    let listener = Arc::new(RequestListener::new(
        provider.clone(),
        contract.clone(),
        start_block,
        Duration::from_millis(settings.relayer.poll_interval_ms),
    )?);

    let latest = match listener
        .latest_request_id(settings.relayer.lookback_blocks)
        .await
    {
        Ok(latest) => latest,
        Err(e) => {
            warn!("Could not look up latest request: {}", e);
            None
        }
    };

    let pipeline = Arc::new(BlobPipeline::new(
        &settings,
        provider.clone(),
        contract,
        kzg,
        wallet,
    ));
    info!("Relaying from wallet {:?}", pipeline.wallet_address());

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start pipeline before the listener so no event is missed
    let pipeline_handle = tokio::spawn({
        let pipeline = pipeline.clone();
        let listener = listener.clone();
        let events = listener.subscribe();
        async move {
            if let Err(e) = pipeline.run(events, listener, latest).await {
                error!("Pipeline error: {}", e);
            }
        }
    });

    let listener_handle = tokio::spawn({
        let listener = listener.clone();
        async move {
            if let Err(e) = listener.listen().await {
                error!("Listener error: {}", e);
            }
        }
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let provider = provider.clone();
        let interval = settings.relayer.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(Duration::from_secs(interval)).await;

                let healthy = provider.health_check().await;
                metrics::record_chain_health(healthy);
                if healthy {
                    metrics::record_health_check();
                } else {
                    warn!("Chain health check failed");
                    metrics::record_health_check_failure();
                }
            }
        }
    });

    info!("Matrix blob relayer is running");
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    pipeline.stop().await;

    listener_handle.abort();
    pipeline_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Matrix blob relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,matmul_blob_relayer=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

#[cfg(feature = "c-kzg")]
fn load_kzg(config: &KzgConfig) -> Result<Arc<dyn KzgBackend>> {
    use matmul_blob_relayer::blob::kzg::CKzgBackend;

    let path = config
        .trusted_setup_path
        .as_ref()
        .context("kzg.trusted_setup_path is required")?;
    let backend = CKzgBackend::load(std::path::Path::new(path))?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "c-kzg"))]
fn load_kzg(_config: &KzgConfig) -> Result<Arc<dyn KzgBackend>> {
    anyhow::bail!("No KZG backend compiled in; rebuild with `--features c-kzg`")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
