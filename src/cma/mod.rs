//! Comparative market analysis engine

pub mod comparables;
pub mod error;
pub mod insights;
pub mod report;
pub mod similarity;
pub mod types;
pub mod valuation;

pub use comparables::{ComparableQuery, ComparableSalesProvider, SalesHistorySource};
pub use error::{CmaError, SourceError, ValuationError};
pub use insights::{MarketInsightSummarizer, MarketStatsSource};
pub use report::CmaService;
pub use types::*;
