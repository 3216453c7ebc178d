//! Parse functions - transform a raw sales CSV into SaleRecord structs

use crate::cma::types::PropertyType;
use crate::ingestion::types::{RawData, SaleRecord};
use crate::ingestion::utils::{non_empty, normalize_zip, parse_price, parse_sale_date};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use tracing::{info, warn};

const MAX_LOGGED_ERRORS: usize = 10;

/// One row of a recorded-sales export. Numeric cells are read as text so a
/// single malformed cell rejects only its own row.
#[derive(Debug, Deserialize)]
struct SalesCsvRow {
    address: String,
    city: String,
    state: String,
    #[serde(alias = "zip", alias = "postal_code")]
    zip_code: String,
    property_type: String,
    #[serde(alias = "beds")]
    bedrooms: Option<String>,
    #[serde(alias = "baths")]
    bathrooms: Option<String>,
    #[serde(alias = "living_area")]
    sqft: Option<String>,
    year_built: Option<String>,
    lot_size: Option<String>,
    #[serde(alias = "sold_price", alias = "price")]
    sale_price: String,
    #[serde(alias = "sold_date", alias = "close_date")]
    sale_date: String,
    days_on_market: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    image_url: Option<String>,
}

/// Parse a sales CSV into SaleRecord structs. Rows that fail to parse are
/// counted and skipped.
pub fn parse_sales_csv(raw: &RawData, source_id: &str) -> Result<Vec<SaleRecord>> {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true).trim(csv::Trim::All).flexible(true);

    match raw {
        RawData::File(path) => {
            info!("Parsing sales CSV from {:?}", path);
            let reader = builder
                .from_path(path)
                .with_context(|| format!("Failed to open {:?}", path))?;
            parse_rows(reader, source_id)
        }
        RawData::Bytes(bytes) => {
            info!("Parsing sales CSV ({} bytes)", bytes.len());
            parse_rows(builder.from_reader(bytes.as_slice()), source_id)
        }
    }
}

fn parse_rows<R: Read>(mut reader: csv::Reader<R>, source_id: &str) -> Result<Vec<SaleRecord>> {
    let mut records = Vec::new();
    let mut parse_errors = 0;

    for (idx, result) in reader.deserialize::<SalesCsvRow>().enumerate() {
        let parsed = result
            .map_err(anyhow::Error::from)
            .and_then(|row| parse_sales_row(row, source_id));

        match parsed {
            Ok(record) => records.push(record),
            Err(e) => {
                parse_errors += 1;
                if parse_errors <= MAX_LOGGED_ERRORS {
                    // +2: header line and 1-based numbering
                    warn!("Failed to parse row {}: {}", idx + 2, e);
                }
            }
        }
    }

    info!(
        "Parsed {} records from sales CSV ({} errors)",
        records.len(),
        parse_errors
    );

    Ok(records)
}

fn parse_sales_row(row: SalesCsvRow, source_id: &str) -> Result<SaleRecord> {
    let zip_code = normalize_zip(&row.zip_code)
        .ok_or_else(|| anyhow::anyhow!("Invalid zip code: {:?}", row.zip_code))?;
    let property_type: PropertyType = row.property_type.parse()?;

    let sale_price = parse_price(&row.sale_price)
        .ok_or_else(|| anyhow::anyhow!("Invalid sale price: {:?}", row.sale_price))?;
    let sale_date = parse_sale_date(&row.sale_date)
        .ok_or_else(|| anyhow::anyhow!("Invalid sale date: {:?}", row.sale_date))?;

    let bedrooms = required_count(row.bedrooms, "bedrooms")?;
    let bathrooms = required_count(row.bathrooms, "bathrooms")?;
    let sqft = required_count(row.sqft, "sqft")?;

    Ok(SaleRecord {
        address: row.address.trim().to_string(),
        city: row.city.trim().to_string(),
        state: row.state.trim().to_uppercase(),
        zip_code,
        property_type,
        bedrooms,
        bathrooms,
        sqft,
        year_built: optional_count(row.year_built),
        lot_size: optional_count(row.lot_size),
        sale_price,
        sale_date,
        days_on_market: optional_count(row.days_on_market),
        latitude: optional_decimal(row.latitude),
        longitude: optional_decimal(row.longitude),
        image_url: non_empty(row.image_url),
        data_source: source_id.to_string(),
    })
}

/// Whole-number cell; fractional values such as 2.5 baths round down
fn parse_count(raw: &str) -> Option<i32> {
    let clean = raw.replace(',', "");
    clean
        .parse::<i32>()
        .ok()
        .or_else(|| clean.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.floor() as i32))
}

fn required_count(raw: Option<String>, field: &str) -> Result<i32> {
    non_empty(raw)
        .as_deref()
        .and_then(parse_count)
        .ok_or_else(|| anyhow::anyhow!("Missing or invalid {}", field))
}

fn optional_count(raw: Option<String>) -> Option<i32> {
    non_empty(raw).as_deref().and_then(parse_count)
}

fn optional_decimal(raw: Option<String>) -> Option<Decimal> {
    non_empty(raw).and_then(|v| v.parse::<Decimal>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const HEADER: &str = "address,city,state,zip_code,property_type,bedrooms,bathrooms,sqft,\
year_built,lot_size,sale_price,sale_date,days_on_market,latitude,longitude,image_url";

    fn row() -> SalesCsvRow {
        SalesCsvRow {
            address: " 10 Elm Street ".to_string(),
            city: "Austin".to_string(),
            state: "tx".to_string(),
            zip_code: "78701-2210".to_string(),
            property_type: "Single Family".to_string(),
            bedrooms: Some("3".to_string()),
            bathrooms: Some("2.5".to_string()),
            sqft: Some("1,850".to_string()),
            year_built: Some("1998".to_string()),
            lot_size: Some("".to_string()),
            sale_price: "$512,000".to_string(),
            sale_date: "06/15/2024".to_string(),
            days_on_market: None,
            latitude: Some("30.2672".to_string()),
            longitude: Some("-97.7431".to_string()),
            image_url: Some(" ".to_string()),
        }
    }

    #[test]
    fn test_parse_sales_row() {
        let record = parse_sales_row(row(), "county_export").unwrap();

        assert_eq!(record.address, "10 Elm Street");
        assert_eq!(record.state, "TX");
        assert_eq!(record.zip_code, "78701");
        assert_eq!(record.property_type, PropertyType::SingleFamilyHome);
        assert_eq!(record.bathrooms, 2);
        assert_eq!(record.sqft, 1850);
        assert_eq!(record.lot_size, None);
        assert_eq!(record.sale_price, 512_000);
        assert_eq!(record.sale_date, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
        assert_eq!(record.latitude, Some(Decimal::new(302672, 4)));
        assert_eq!(record.image_url, None);
        assert_eq!(record.data_source, "county_export");
    }

    #[test]
    fn test_row_without_sqft_is_rejected() {
        let mut missing = row();
        missing.sqft = None;
        assert!(parse_sales_row(missing, "test").is_err());
    }

    #[test]
    fn test_unknown_property_type_is_rejected() {
        let mut castle = row();
        castle.property_type = "Castle".to_string();
        assert!(parse_sales_row(castle, "test").is_err());
    }

    #[test]
    fn test_parse_csv_bytes_skips_bad_rows() {
        let csv = format!(
            "{HEADER}\n\
             1 Oak St,Austin,TX,78701,Condo,2,2,1100,2010,,\"$410,000\",2024-05-01,21,,,\n\
             2 Oak St,Austin,TX,78701,Condo,2,2,1100,2010,,not a price,2024-05-01,21,,,\n\
             3 Oak St,Austin,TX,78701,Townhouse,3,2,1600,,,455000,2024-04-11,,,,https://img/3.jpg\n"
        );

        let records = parse_sales_csv(&RawData::Bytes(csv.into_bytes()), "test").unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sale_price, 410_000);
        assert_eq!(records[0].days_on_market, Some(21));
        assert_eq!(records[1].property_type, PropertyType::Townhouse);
        assert_eq!(records[1].image_url.as_deref(), Some("https://img/3.jpg"));
    }

    #[test]
    fn test_parse_csv_file_with_aliased_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        std::fs::write(
            &path,
            "address,city,state,zip,property_type,beds,baths,living_area,sold_price,sold_date\n\
             9 Pine Rd,Boston,MA,2134,Condo,1,1,700,650000,2024-02-02\n",
        )
        .unwrap();

        let records = parse_sales_csv(&RawData::File(path), "test").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].zip_code, "02134");
        assert_eq!(records[0].sqft, 700);
    }
}
