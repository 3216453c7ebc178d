use anyhow::{Context, Result};
use realtor_cma::api::{self, AppState};
use realtor_cma::cma::report::CmaService;
use realtor_cma::config::Config;
use realtor_cma::store::{PgCmaStore, PgSalesHistory, MIGRATOR};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("🏠 Starting CMA API server...");

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!("📦 Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("✅ Database connected and migrated");

    let history = Arc::new(PgSalesHistory::new(pool.clone()));
    let service = Arc::new(CmaService::new(
        Arc::new(PgCmaStore::new(pool)),
        history.clone(),
        history,
        config.source_timeout,
    ));

    spawn_reaper(service.clone(), &config);

    let app = api::router(AppState { service })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🚀 Server running on http://{}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Fail reports left in `processing` by a crashed or abandoned request.
/// The first tick fires immediately, covering reports orphaned by a restart.
fn spawn_reaper(service: Arc<CmaService>, config: &Config) {
    let max_age = config.stale_report_age;
    let mut ticker = tokio::time::interval(config.reap_interval);

    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            if let Err(e) = service.reap_stalled(max_age).await {
                error!("Stalled report reaper failed: {}", e);
            }
        }
    });
}
