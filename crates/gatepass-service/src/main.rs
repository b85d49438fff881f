use common::clock::SystemClock;
use gatepass_service::config::Config;
use gatepass_service::observability::metrics;
use gatepass_service::repositories::memory::InMemoryKeyStore;
use gatepass_service::repositories::signing_keys::PgKeyStore;
use gatepass_service::repositories::KeyStore;
use gatepass_service::services::pass_service::PassService;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatepass_service=info,gatepass=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting gate pass service");

    // Load configuration
    let mut config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        rotation_interval_secs = config.rotation.rotation_interval().as_secs(),
        grace_period_secs = config.rotation.grace_period().as_secs(),
        max_token_ttl_secs = config.rotation.max_token_ttl().as_secs(),
        persistent = config.database_url.is_some(),
        "Configuration loaded successfully"
    );

    if let Some(bind_address) = &config.metrics_bind_address {
        let addr: SocketAddr = bind_address.parse().map_err(|e| {
            error!("Invalid metrics bind address: {}", e);
            e
        })?;
        metrics::init_metrics_exporter(addr).map_err(|e| {
            error!("Failed to initialize metrics exporter: {}", e);
            e
        })?;
        info!("Metrics exporter listening on {}", addr);
    }

    let store: Arc<dyn KeyStore> = match (config.database_url.take(), config.master_key.take()) {
        (Some(database_url), Some(master_key)) => {
            info!("Connecting to database...");
            let db_pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await
                .map_err(|e| {
                    error!("Failed to connect to database: {}", e);
                    e
                })?;

            sqlx::migrate!("../../migrations")
                .run(&db_pool)
                .await
                .map_err(|e| {
                    error!("Failed to run migrations: {}", e);
                    e
                })?;

            info!("Database connection established");
            Arc::new(PgKeyStore::new(db_pool, master_key))
        }
        _ => {
            warn!("DATABASE_URL not set; signing keys are kept in memory and lost on restart");
            Arc::new(InMemoryKeyStore::new())
        }
    };

    let service = PassService::build(store, Arc::new(SystemClock), config.rotation)
        .await
        .map_err(|e| {
            error!("Failed to load signing keys: {}", e);
            e
        })?;

    // Initialize signing key if none exists
    service.initialize().await.map_err(|e| {
        error!("Failed to initialize signing key: {}", e);
        e
    })?;

    info!("Signing keys initialized");

    service.ensure_scheduler_started();

    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received");
    service.stop_scheduler().await;

    Ok(())
}
