//! Data ingestion orchestrator - loads a recorded-sales export into sales history

use anyhow::{Context, Result};
use chrono::Utc;
use realtor_cma::ingestion::{enrich, fetch, parse, write, SalesSource, WriteStats};
use realtor_cma::store::MIGRATOR;
use sqlx::PgPool;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    info!("Starting sales ingestion pipeline");

    dotenvy::dotenv().ok();
    let config = IngestionConfig::from_env()?;
    info!("Configuration loaded");

    let db = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    MIGRATOR.run(&db).await.context("Failed to run database migrations")?;
    info!("Database connected");

    match run_sales(&config, &db).await {
        Ok(stats) => {
            info!("✓ {} completed: {}", config.source_id, stats);
            Ok(())
        }
        Err(e) => {
            error!("✗ {} failed: {}", config.source_id, e);
            Err(e)
        }
    }
}

async fn run_sales(config: &IngestionConfig, db: &PgPool) -> Result<WriteStats> {
    info!("=== Sales Pipeline ===");

    info!("Step 1/4: Fetching data...");
    let raw_data = fetch::fetch_sales(&config.source, &config.temp_dir, config.fetch_timeout).await?;
    info!("✓ Fetch complete");

    info!("Step 2/4: Parsing data...");
    let records = parse::parse_sales_csv(&raw_data, &config.source_id)?;
    info!("✓ Parsed {} records", records.len());

    let records = if config.limit_records > 0 {
        let limit = config.limit_records.min(records.len());
        warn!("Limiting to first {} records (testing mode)", limit);
        records.into_iter().take(limit).collect()
    } else {
        records
    };

    info!("Step 3/4: Enriching data...");
    let enriched = enrich::enrich_all(records, Utc::now().date_naive());
    info!("✓ Enriched {} records", enriched.len());

    info!("Step 4/4: Writing to database...");
    let stats = write::write_sales(db, enriched).await?;
    info!("✓ Write complete");

    Ok(stats)
}

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
struct IngestionConfig {
    database_url: String,
    source: SalesSource,
    /// Recorded as `data_source` on every inserted sale
    source_id: String,
    temp_dir: PathBuf,
    fetch_timeout: Duration,
    limit_records: usize, // 0 = no limit
}

impl IngestionConfig {
    fn from_env() -> Result<Self> {
        let source = match (env::var("SALES_CSV_PATH"), env::var("SALES_CSV_URL")) {
            (Ok(path), _) => SalesSource::Path(path.into()),
            (Err(_), Ok(url)) => SalesSource::Url(url),
            _ => anyhow::bail!("Set SALES_CSV_PATH or SALES_CSV_URL"),
        };

        let fetch_timeout_secs = match env::var("FETCH_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("Invalid FETCH_TIMEOUT_SECS: {:?}", raw))?,
            Err(_) => 300,
        };

        Ok(IngestionConfig {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,

            source,

            source_id: env::var("SALES_SOURCE_ID").unwrap_or_else(|_| "sales_csv".to_string()),

            temp_dir: env::var("TEMP_DIR")
                .unwrap_or_else(|_| "/tmp/cma_sales_ingestion".to_string())
                .into(),

            fetch_timeout: Duration::from_secs(fetch_timeout_secs),

            limit_records: env::var("LIMIT_RECORDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        })
    }
}
