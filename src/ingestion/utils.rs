//! Utility functions for common operations

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Download a file via HTTP
pub async fn http_get(url: &str, timeout: Duration) -> Result<Vec<u8>> {
    info!("Downloading from {}", url);
    let client = Client::builder().timeout(timeout).build()?;

    let response = client.get(url).send().await?;
    let status = response.status();

    if !status.is_success() {
        return Err(anyhow::anyhow!("HTTP request failed: {}", status));
    }

    let bytes = response.bytes().await?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Extract the first CSV file from a ZIP archive into `output_dir`
pub fn extract_csv_from_zip(zip_path: &Path, output_dir: &Path) -> Result<PathBuf> {
    info!("Extracting CSV from {:?}", zip_path);

    let file = fs::File::open(zip_path)
        .with_context(|| format!("Failed to open {:?}", zip_path))?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.name().to_lowercase().ends_with(".csv") {
            continue;
        }

        // enclosed_name rejects entries that would escape output_dir
        let name = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(PathBuf::from))
            .ok_or_else(|| anyhow::anyhow!("Unsafe entry name in archive: {}", entry.name()))?;
        info!("Found CSV file: {}", name.display());

        let output_path = output_dir.join(name);
        let mut output_file = fs::File::create(&output_path)?;
        io::copy(&mut entry, &mut output_file)?;

        info!("Extracted to {:?}", output_path);
        return Ok(output_path);
    }

    Err(anyhow::anyhow!("No CSV file found in ZIP archive"))
}

/// Parse a sale price such as "$750,000" or "412500.00" into whole dollars
pub fn parse_price(raw: &str) -> Option<i64> {
    let clean: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if clean.is_empty() {
        return None;
    }

    let value = clean.parse::<f64>().ok()?;
    if value.is_finite() && value > 0.0 {
        Some(value.round() as i64)
    } else {
        None
    }
}

/// Accepts ISO dates (2024-03-15) and US dates (03/15/2024)
pub fn parse_sale_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

/// Five-digit zip from "02134", "2134" (leading zero lost in a spreadsheet)
/// or "02134-1234"
pub fn normalize_zip(raw: &str) -> Option<String> {
    let base = raw.trim().split('-').next().unwrap_or_default();
    if base.is_empty() || !base.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    match base.len() {
        3..=5 => Some(format!("{:0>5}", base)),
        _ => None,
    }
}

/// Empty and whitespace-only CSV cells count as missing
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
