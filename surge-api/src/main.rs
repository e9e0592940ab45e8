use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use surge_api::{app, config::Config, AppState};
use surge_core::PricingRepository;
use surge_store::{DbClient, InMemoryPricingRepository, PgPricingRepository};
use surge_strategy::{PricingService, StrategyCache};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "surge_api=debug,surge_strategy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Surge pricing API on port {}", config.server.port);

    let repo: Arc<dyn PricingRepository> = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            if config.database.run_migrations {
                db.migrate().await.context("Failed to run migrations")?;
            }
            Arc::new(PgPricingRepository::new(db.pool.clone()))
        }
        None => {
            tracing::warn!("No database url configured, using in-memory repository");
            Arc::new(InMemoryPricingRepository::new())
        }
    };

    let mut service = PricingService::new(repo)
        .with_factor_policy(config.pricing.clone())
        .with_policy(config.service.clone());

    if config.cache.enabled {
        let cache = StrategyCache::new().with_max_age(config.cache.max_age_secs);
        service = service.with_cache(Arc::new(cache));
        let loaded = service
            .reload_cache()
            .await
            .context("Failed to warm strategy cache")?;
        tracing::info!("Strategy cache warmed with {} entries", loaded);
    }

    let app = app(AppState::new(service));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
