//! Enrichment functions - clean parsed sales and drop implausible ones

use crate::calculate_price_per_sqft;
use crate::cma::types::PropertyType;
use crate::ingestion::types::SaleRecord;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, info};

const MIN_PRICE_PER_SQFT: f64 = 10.0;
const MAX_PRICE_PER_SQFT: f64 = 10_000.0;
const MAX_ROOMS: i32 = 50;
const COORDINATE_SCALE: u32 = 6;

/// Round coordinates to the stored precision and drop ones out of range.
/// Pure function - no side effects
pub fn normalize_coordinates(record: SaleRecord) -> SaleRecord {
    let latitude = record
        .latitude
        .map(|v| v.round_dp(COORDINATE_SCALE))
        .filter(|v| v.abs() <= Decimal::from(90));
    let longitude = record
        .longitude
        .map(|v| v.round_dp(COORDINATE_SCALE))
        .filter(|v| v.abs() <= Decimal::from(180));

    // a lone coordinate is useless for distance
    let (latitude, longitude) = match (latitude, longitude) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => (None, None),
    };

    SaleRecord {
        latitude,
        longitude,
        ..record
    }
}

/// Reason a sale is excluded from sales history, if any
pub fn implausibility(record: &SaleRecord, as_of: NaiveDate) -> Option<&'static str> {
    if record.address.is_empty() {
        return Some("missing address");
    }
    if record.sale_date > as_of {
        return Some("sale date in the future");
    }
    if !(0..=MAX_ROOMS).contains(&record.bedrooms) || !(0..=MAX_ROOMS).contains(&record.bathrooms) {
        return Some("room count out of range");
    }
    if record.property_type != PropertyType::Land && record.bedrooms == 0 && record.bathrooms == 0 {
        return Some("no rooms on a building");
    }

    match calculate_price_per_sqft(record.sale_price, record.sqft) {
        None => Some("no usable price per sqft"),
        Some(ppsf) if !(MIN_PRICE_PER_SQFT..=MAX_PRICE_PER_SQFT).contains(&ppsf) => {
            Some("price per sqft out of range")
        }
        Some(_) => None,
    }
}

/// Run all enrichment steps and drop duplicates within the batch
pub fn enrich_all(records: Vec<SaleRecord>, as_of: NaiveDate) -> Vec<SaleRecord> {
    info!("Enriching {} records", records.len());

    let total = records.len();
    let mut seen = HashSet::new();
    let mut enriched = Vec::with_capacity(total);

    for record in records {
        let record = normalize_coordinates(record);

        if let Some(reason) = implausibility(&record, as_of) {
            debug!("Dropping sale {} ({})", record.address, reason);
            continue;
        }

        let key = (
            record.address.to_lowercase(),
            record.zip_code.clone(),
            record.sale_date,
            record.sale_price,
        );
        if !seen.insert(key) {
            debug!("Dropping duplicate sale {}", record.address);
            continue;
        }

        enriched.push(record);
    }

    info!(
        "Enrichment complete: {} records kept, {} dropped",
        enriched.len(),
        total - enriched.len()
    );

    enriched
}
