use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;
use tracker_core::config::redact;
use tracker_core::{AccountStore, TokenStore, TrackerConfig};
use tracker_db::{
    DatabaseConfig, DatabasePool, MemoryAccountStore, MemoryTokenStore, PgAccountStore,
    PgTokenStore,
};
use tracker_metrics::{MetricsConfig, MetricsServer};
use tracker_service::WalletTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("tracker_ws=info".parse()?)
                .add_directive("tracker_service=info".parse()?),
        )
        .init();

    info!("Wallet tracker starting...");

    let config = match TrackerConfig::load() {
        Ok(config) => {
            info!(
                ws_url = %redact(&config.ws.url),
                rpc_url = %redact(&config.rpc.rpc_url),
                commitment = %config.ws.commitment,
                reconnect = config.ws.reconnect.enabled,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // Postgres when DATABASE_URL is set, in-memory otherwise
    let (db_pool, accounts, tokens) = match DatabaseConfig::from_env() {
        Some(db_config) => match DatabasePool::connect(&db_config).await {
            Ok(pool) => {
                info!("Database connected");
                (
                    Some(pool.clone()),
                    Arc::new(PgAccountStore::new(pool.clone())) as Arc<dyn AccountStore>,
                    Arc::new(PgTokenStore::new(pool)) as Arc<dyn TokenStore>,
                )
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to database");
                std::process::exit(1);
            }
        },
        None => {
            warn!("DATABASE_URL not set, subscriptions will not survive a restart");
            (
                None,
                Arc::new(MemoryAccountStore::new()) as Arc<dyn AccountStore>,
                Arc::new(MemoryTokenStore::new()) as Arc<dyn TokenStore>,
            )
        }
    };

    let tracker = Arc::new(WalletTracker::from_config(&config, accounts, tokens)?);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received (Ctrl+C)");
        signal.cancel();
    });

    if let Some(metrics_config) = MetricsConfig::from_env() {
        let metrics_server = MetricsServer::new(metrics_config);
        let metrics_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics_server.run(metrics_shutdown).await {
                error!(error = %e, "Metrics server error");
            }
        });
    }

    let mut activity = tracker.activity();
    let monitor = match tracker.monitor(shutdown.clone()).await {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "Failed to start wallet monitor");
            std::process::exit(1);
        }
    };

    let reporter_shutdown = shutdown.clone();
    let reporter = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reporter_shutdown.cancelled() => break,
                received = activity.recv() => match received {
                    Ok(event) => {
                        for swap in &event.swaps {
                            info!(
                                signature = %event.signature,
                                wallet = event.wallet.as_deref().unwrap_or("unknown"),
                                sent = %format!("{} {}", swap.sent_amount, swap.sent_symbol),
                                received = %format!("{} {}", swap.received_amount, swap.received_symbol),
                                "Swap"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Activity reporter lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });

    let outcome = monitor.await;

    info!("Shutting down...");
    shutdown.cancel();
    tracker.close();
    reporter.await.ok();

    if let Some(db) = db_pool {
        db.close().await;
        info!("Database connections closed");
    }

    match outcome {
        Ok(Ok(())) => {
            info!("Wallet tracker shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Wallet monitor stopped");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Wallet monitor task panicked");
            std::process::exit(1);
        }
    }
}
