//! Fetch functions - retrieve a raw sales export from a URL or local file

use crate::ingestion::types::{RawData, SalesSource};
use crate::ingestion::utils::{extract_csv_from_zip, http_get, is_zip};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Fetch a sales export. ZIP archives are unpacked into `temp_dir` and the
/// first CSV inside is used.
pub async fn fetch_sales(source: &SalesSource, temp_dir: &Path, timeout: Duration) -> Result<RawData> {
    info!("Fetching sales data from {}", source);

    match source {
        SalesSource::Url(url) => {
            let bytes = http_get(url, timeout).await?;
            if !is_zip(&bytes) {
                return Ok(RawData::Bytes(bytes));
            }

            fs::create_dir_all(temp_dir)
                .with_context(|| format!("Failed to create {:?}", temp_dir))?;
            let zip_path = temp_dir.join("sales_export.zip");
            fs::write(&zip_path, bytes)?;
            info!("Saved ZIP to {:?}", zip_path);

            Ok(RawData::File(extract_csv_from_zip(&zip_path, temp_dir)?))
        }
        SalesSource::Path(path) => {
            let is_archive = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("zip"))
                .unwrap_or(false);

            if is_archive {
                fs::create_dir_all(temp_dir)
                    .with_context(|| format!("Failed to create {:?}", temp_dir))?;
                Ok(RawData::File(extract_csv_from_zip(path, temp_dir)?))
            } else if path.exists() {
                Ok(RawData::File(path.clone()))
            } else {
                Err(anyhow::anyhow!("Sales file not found: {:?}", path))
            }
        }
    }
}
