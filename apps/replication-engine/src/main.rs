//! Replication Engine Binary
//!
//! Wires the pipeline and supervises its long-lived tasks.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin replication-engine
//! ```
//!
//! # Environment Variables
//!
//! - `REDIS_URL`: stream + idempotency backend (default: redis://127.0.0.1:6379)
//! - `DATABASE_PATH`: order record database (default: ./replication.db)
//! - `BINANCE_API_KEY` / `BINANCE_API_SECRET`: source venue credentials
//! - `BINANCE_TESTNET`: true to use the futures testnet
//! - `TARGETS`: comma-separated target venue names (default: okx,bybit)
//! - `SYMBOL`, `POSITION_RATIO`, `MAX_POSITION`: replication policy
//! - `METRICS_ADDR`: Prometheus listener address (unset disables it)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use replication_engine::config::{AppConfig, SharedSettings};
use replication_engine::executor::{ExchangeExecutor, PaperExecutor, ResilientExecutor};
use replication_engine::feed::BinanceListener;
use replication_engine::idempotency::RedisIdempotencyStore;
use replication_engine::observability::init_metrics;
use replication_engine::persistence::{OrderRecordStore, TursoOrderStore};
use replication_engine::reconcile::Reconciler;
use replication_engine::stream::{RedisSignalStream, SignalConsumer, SignalProducer, SignalStream};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file in development
    let _ = dotenvy::dotenv();

    // Static directive strings are guaranteed to parse successfully
    #[allow(clippy::unwrap_used)]
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("replication_engine=info".parse().unwrap()),
        )
        .init();

    tracing::info!("Starting replication engine");

    // Boot failures are fatal; runtime errors never are.
    let config = AppConfig::from_env()?;
    let settings = SharedSettings::new(config.sync.clone());

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
    }

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_connection_manager().await?;

    let stream = Arc::new(RedisSignalStream::new(redis_conn.clone()));
    stream.ensure_group().await?;

    let idempotency = Arc::new(RedisIdempotencyStore::new(redis_conn));
    let orders = Arc::new(TursoOrderStore::open(&config.database_path).await?);

    // Venue adapters are external collaborators; the paper venue stands
    // in behind the same contract until real adapters are plugged in.
    let targets: Vec<Arc<dyn ExchangeExecutor>> = config
        .targets
        .iter()
        .map(|name| {
            let venue: Arc<dyn ExchangeExecutor> = Arc::new(PaperExecutor::new(name.clone()));
            Arc::new(ResilientExecutor::new(venue)) as Arc<dyn ExchangeExecutor>
        })
        .collect();

    tracing::info!(
        targets = ?config.targets,
        symbol = %config.sync.symbol,
        position_ratio = %config.sync.position_ratio,
        "Configuration loaded"
    );

    let shutdown = CancellationToken::new();

    // Source listener (produces to the stream)
    let listener_handle = if config.binance.is_configured() {
        let listener = BinanceListener::new(
            config.binance.clone(),
            settings.clone(),
            Arc::clone(&stream) as Arc<dyn SignalProducer>,
            shutdown.clone(),
        );
        Some(tokio::spawn(async move { listener.run().await }))
    } else {
        tracing::warn!("Binance credentials not configured, source listener disabled");
        None
    };

    // Stream consumer (fans out to targets)
    let consumer = SignalConsumer::new(
        Arc::clone(&stream) as Arc<dyn SignalStream>,
        idempotency,
        Arc::clone(&orders) as Arc<dyn OrderRecordStore>,
        targets.clone(),
        settings.clone(),
        shutdown.child_token(),
    );
    let consumer_handle = tokio::spawn(async move { consumer.run().await });

    // Reconciler (converges order status out-of-band)
    let reconciler = Reconciler::new(
        Arc::clone(&orders) as Arc<dyn OrderRecordStore>,
        targets.clone(),
        shutdown.clone(),
    );
    let reconciler_handle = tokio::spawn(async move { reconciler.run().await });

    tracing::info!("Replication engine ready");

    shutdown_signal().await;
    tracing::info!("Shutting down");
    shutdown.cancel();

    if let Some(handle) = listener_handle {
        let _ = handle.await;
    }
    let _ = consumer_handle.await;
    let _ = reconciler_handle.await;

    for target in &targets {
        target.close().await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
