use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{timeout_at, Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vwap_engine::simulation::TickProducer;
use vwap_engine::{
    FanoutSink, TickDistributor, TickLogger, TracingSink, VwapBroadcaster, VwapConfig, VwapManager,
    VwapUpdate,
};

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vwap_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = VwapConfig::load()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: VwapConfig) -> anyhow::Result<()> {
    tracing::info!(
        instruments = ?config.instruments,
        market_places = ?config.market_places,
        interval_ms = config.update_interval_ms,
        "🚀 Starting VWAP engine"
    );

    let distributor = TickDistributor::new();
    let broadcaster = VwapBroadcaster::new();

    // One calculator per instrument, all writing to the log and the broadcaster
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(Arc::new(broadcaster.clone()));
    let manager = VwapManager::initialize(
        config.instruments.iter().cloned(),
        &distributor,
        Arc::new(sink),
    );

    let tick_logger = Arc::new(TickLogger::default());
    for instrument in manager.instruments() {
        distributor.subscribe(instrument, tick_logger.clone());
    }

    let producer = Arc::new(TickProducer::new(distributor.clone(), config.producer.clone())?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = tokio::spawn(monitor_updates(broadcaster.subscribe_all(), shutdown_rx.clone()));
    let handles = producer.spawn(
        &config.instruments,
        &config.market_places,
        Duration::from_millis(config.update_interval_ms),
        shutdown_rx,
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, stopping producers");
    let _ = shutdown_tx.send(true);

    // All producers share one grace period
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    let deadline = Instant::now() + grace;
    for handle in handles {
        let abort = handle.abort_handle();
        if timeout_at(deadline, handle).await.is_err() {
            tracing::warn!("Producer task did not stop within {:?}, aborting", grace);
            abort.abort();
        }
    }

    let monitor_abort = monitor.abort_handle();
    let received = match timeout_at(deadline, monitor).await {
        Ok(Ok(received)) => received,
        _ => {
            monitor_abort.abort();
            0
        }
    };

    let stats = distributor.get_stats();
    let producer_stats = producer.stats();
    tracing::info!(
        published = stats.total_published,
        delivered = stats.total_delivered,
        failed = stats.total_failed,
        generated = producer_stats.ticks_generated,
        generation_errors = producer_stats.errors,
        broadcast_received = received,
        "📊 Final distributor stats"
    );
    for snapshot in manager.snapshots() {
        let last_market = broadcaster
            .latest(&snapshot.instrument)
            .map(|update| update.market_place)
            .unwrap_or_default();
        tracing::info!(
            instrument = %snapshot.instrument,
            updates = snapshot.update_count,
            bid_vwap = snapshot.bid_vwap,
            ask_vwap = snapshot.ask_vwap,
            last_market = %last_market,
            "📊 Final VWAP"
        );
    }

    Ok(())
}

/// Drain the all-instruments topic until shutdown; returns updates received
async fn monitor_updates(
    mut updates: broadcast::Receiver<VwapUpdate>,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut received = 0u64;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(update) => {
                    received += 1;
                    tracing::trace!(instrument = %update.instrument, "VWAP update broadcast");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "VWAP monitor lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    received
}
