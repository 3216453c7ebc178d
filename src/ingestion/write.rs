//! Write functions - persist recorded sales to PostgreSQL

use crate::ingestion::types::{SaleRecord, WriteStats};
use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, info, warn};

/// Insert sales into `sales_history`. A sale already recorded with the same
/// address, zip, date and price is skipped.
pub async fn write_sales(db: &PgPool, records: Vec<SaleRecord>) -> Result<WriteStats> {
    info!("Writing {} sales to database", records.len());

    let mut stats = WriteStats::default();

    for record in records {
        match insert_sale(db, &record).await {
            Ok(true) => stats.inserted += 1,
            Ok(false) => {
                debug!("Skipped existing sale: {} ({})", record.address, record.sale_date);
                stats.skipped += 1;
            }
            Err(e) => {
                warn!("Failed to write sale {}: {}", record.address, e);
                stats.errors += 1;
            }
        }
    }

    info!("Write complete: {}", stats);

    Ok(stats)
}

/// Returns true if inserted, false if the sale already exists
async fn insert_sale(db: &PgPool, record: &SaleRecord) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO sales_history (
            address, city, state, zip_code, property_type, bedrooms, bathrooms, sqft,
            year_built, lot_size, sale_price, sale_date, days_on_market, latitude, longitude,
            image_url, data_source
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
        )
        ON CONFLICT (address, zip_code, sale_date, sale_price) DO NOTHING
        "#,
    )
    .bind(&record.address)
    .bind(&record.city)
    .bind(&record.state)
    .bind(&record.zip_code)
    .bind(record.property_type)
    .bind(record.bedrooms)
    .bind(record.bathrooms)
    .bind(record.sqft)
    .bind(record.year_built)
    .bind(record.lot_size)
    .bind(record.sale_price)
    .bind(record.sale_date)
    .bind(record.days_on_market)
    .bind(record.latitude)
    .bind(record.longitude)
    .bind(&record.image_url)
    .bind(&record.data_source)
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}
