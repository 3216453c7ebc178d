use thiserror::Error;

use crate::store::StoreError;

/// Failures of the external sales-history data source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("sales history query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("sales history query timed out after {0} ms")]
    Timeout(u128),
    #[error("sales history unavailable: {0}")]
    Unavailable(String),
}

/// Comparable data the aggregator cannot value
#[derive(Debug, Error, PartialEq)]
pub enum ValuationError {
    #[error("malformed comparable {address}: {reason}")]
    MalformedComparable { address: String, reason: String },
    #[error("valuation produced a non-finite estimate")]
    NonFinite,
}

#[derive(Debug, Error)]
pub enum CmaError {
    #[error("report {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Valuation(#[from] ValuationError),
}
