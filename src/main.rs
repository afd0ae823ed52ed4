use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tradepulse::application::handlers::{router, AppState};
use tradepulse::application::services::plan_service::PlanService;
use tradepulse::application::services::sync_service::SyncService;
use tradepulse::auth::ApiKeys;
use tradepulse::config::SyncConfig;
use tradepulse::infrastructure::broker_client::{BrokerConfig, HttpBrokerClient};
use tradepulse::persistence::{
    init_database,
    repository::{DocumentRepository, SubscriptionRepository},
};
use tradepulse::rate_limit::{create_lookup_limiter, create_rate_limiter, RateLimiterConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradepulse=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Trade aggregation service starting...");

    let config = SyncConfig::from_env();
    if config.accounts.is_empty() {
        warn!("No broker accounts configured (BROKER_ACCOUNTS), every account lookup will 404");
    }
    info!(
        accounts = config.accounts.len(),
        resync_threshold_hours = config.resync_threshold.num_hours(),
        fallback_policy = ?config.fallback_policy,
        "Configuration loaded"
    );

    let keys = ApiKeys::from_env()?;
    let pool = init_database(&config.database_url).await?;

    let broker = HttpBrokerClient::new(&BrokerConfig {
        api_base: config.broker_api_base.clone(),
        request_timeout: config.broker_request_timeout,
        connect_timeout: config.broker_connect_timeout,
    })?;

    let sync = SyncService::new(
        Arc::new(broker),
        Arc::new(DocumentRepository::new(pool.clone())),
        Some(create_lookup_limiter(config.instrument_lookups_per_minute)),
        &config,
    );
    let plans = PlanService::new(
        Arc::new(SubscriptionRepository::new(pool.clone())),
        config.plan_cache_ttl,
        config.plan_cache_capacity,
    );

    let limiter = create_rate_limiter(RateLimiterConfig {
        requests_per_minute: config.api_requests_per_minute,
    });
    let app = router(
        AppState {
            sync,
            plans: Arc::new(plans),
        },
        keys,
        limiter,
    );

    let addr: SocketAddr = config.bind_address.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Server started successfully. Press Ctrl+C to stop.");
    server.with_graceful_shutdown(shutdown_signal).await?;

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}
