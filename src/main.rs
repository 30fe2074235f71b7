mod admin;
mod cache;
mod config;
mod error;
mod evaluation;
mod flags;
mod routes;
mod state;
mod store;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::admin::FlagAdminService;
use crate::cache::{FlagCache, SystemClock};
use crate::store::{FlagStore, InMemoryFlagStore, PgFlagStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env()?;

    let store: Arc<dyn FlagStore> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new()
                .acquire_timeout(config.store_timeout)
                .connect(url)
                .await
                .context("Error connecting DB")?;
            sqlx::migrate!("./migrations")
                .run(&db)
                .await
                .context("Error running migrations")?;
            Arc::new(PgFlagStore::new(db))
        }
        None => {
            warn!("DATABASE_URL not set, flags are kept in memory only");
            Arc::new(InMemoryFlagStore::new())
        }
    };

    let cache = Arc::new(FlagCache::new(
        store.clone(),
        Arc::new(SystemClock),
        config.cache_ttl,
        config.store_timeout,
    ));
    // Warm-up; a failure here is retried by the first read.
    if let Ok(snapshot) = cache.refresh().await {
        info!(flags = snapshot.flags().len(), "Initial flag snapshot loaded");
    }

    let admin = Arc::new(FlagAdminService::new(
        store,
        cache.clone(),
        config.store_timeout,
    ));

    let state = state::AppState {
        cache,
        admin,
        api_key: Arc::from(config.admin_api_key.as_str()),
    };

    let app = routes::routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("Error binding {}", config.addr()))?;

    info!("server is listening at http://{}", config.addr());

    axum::serve(listener, app).await?;
    Ok(())
}
