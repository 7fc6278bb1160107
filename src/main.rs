use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::migrate::Migrator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_core::cache::Cache;
use wallet_core::config::Config;
use wallet_core::db;
use wallet_core::discount::DiscountClient;
use wallet_core::services::ledger::LedgerService;
use wallet_core::{AppState, create_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = match config.redis_url.as_deref() {
        Some(url) => Cache::connect(url)?,
        None => {
            tracing::warn!("REDIS_URL not set, running with the cache disabled");
            Cache::disabled()
        }
    };

    let discount = DiscountClient::new(
        config.discount_service_url.clone(),
        Duration::from_secs(config.discount_timeout_secs),
    );
    tracing::info!(
        "Discount client initialized with URL: {}",
        config.discount_service_url
    );

    let ledger = LedgerService::new(pool.clone(), Arc::new(discount), cache);

    let state = AppState { db: pool, ledger };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
