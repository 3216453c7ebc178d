//! Data types for the sales ingestion pipeline

use std::path::PathBuf;

pub use crate::cma::types::SaleRecord;

/// Where the sales export comes from
#[derive(Debug, Clone, PartialEq)]
pub enum SalesSource {
    Url(String),
    Path(PathBuf),
}

impl std::fmt::Display for SalesSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SalesSource::Url(url) => write!(f, "{}", url),
            SalesSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fetched but unparsed sales data
#[derive(Debug)]
pub enum RawData {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// Write operation statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WriteStats {
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for WriteStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inserted: {}, skipped: {}, errors: {}",
            self.inserted, self.skipped, self.errors
        )
    }
}
