use chrono::Utc;
use paperbot::config::{Config, ReplicationBackend};
use paperbot::services::{
    DecisionLoop, EmaCrossSignal, FileOverrideSource, HttpStore, Ledger, LedgerFile, MemoryStore,
    OverrideSource, RedisStore, Replicator, StaticOverride, VersionedStore,
};
use paperbot::sources::BinanceClient;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paperbot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Starting paperbot on {} ({} bars, every {}s)",
        config.market.symbol, config.market.bar_interval, config.poll_interval_secs
    );

    let now = Utc::now().timestamp_millis();
    let mut ledger = Ledger::load(
        LedgerFile::new(&config.ledger_path),
        config.risk.clone(),
        config.trading.clone(),
        now,
    );

    // The replicated copy wins over the local file when both exist
    let mut replicator = connect_store(&config.replication.backend).await.map(Replicator::new);
    if let Some(ref mut replicator) = replicator {
        if let Some(remote) = replicator.restore().await {
            ledger.replace_state(remote);
        }
    }

    let summary = ledger.state().summary();
    info!(
        "Ledger ready: balance {:.2}, equity {:.2}, {} open, {} closed",
        summary.balance, summary.equity, summary.open_positions, summary.total_trades
    );

    let overrides: Arc<dyn OverrideSource> = match config.override_path {
        Some(ref path) => Arc::new(FileOverrideSource::new(path)),
        None => Arc::new(StaticOverride::default()),
    };

    let mut decision_loop = DecisionLoop::new(
        ledger,
        replicator,
        Arc::new(BinanceClient::new(&config.market)),
        Arc::new(EmaCrossSignal::new(config.market.ema_fast, config.market.ema_slow)),
        overrides,
        config.poll_interval_secs,
        config.replication.sync_interval_secs,
    );

    decision_loop.run().await;
    Ok(())
}

/// Build the configured replication store. Connection failures disable
/// replication rather than stopping the bot.
async fn connect_store(backend: &ReplicationBackend) -> Option<Arc<dyn VersionedStore>> {
    match backend {
        ReplicationBackend::None => {
            info!("Replication disabled, using local ledger file only");
            None
        }
        ReplicationBackend::Memory => {
            info!("Using in-memory replication store");
            Some(Arc::new(MemoryStore::new()))
        }
        ReplicationBackend::Http { url, token } => {
            info!("Replicating ledger to {}", url);
            Some(Arc::new(HttpStore::new(url.clone(), token.clone())))
        }
        ReplicationBackend::Redis { url, key } => match RedisStore::connect(url, key).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!("Failed to connect to Redis, replication disabled: {}", e);
                None
            }
        },
    }
}
