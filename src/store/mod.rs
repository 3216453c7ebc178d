//! Persistence for CMA reports and their child records, plus the
//! sales-history sources the engine reads from

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use thiserror::Error;

use crate::cma::types::{
    CmaReport, ComparableSale, MarketInsight, NewCmaReport, PricingAdjustmentRule, ReportStatus,
    Valuation,
};

pub mod memory;
pub mod postgres;
pub mod sales;

pub use memory::InMemoryCmaStore;
pub use postgres::PgCmaStore;
pub use sales::{InMemorySalesHistory, PgSalesHistory};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("report {0} not found")]
    NotFound(i64),
    #[error("invalid report transition from {from} to {to}")]
    InvalidTransition { from: ReportStatus, to: ReportStatus },
    #[error("decode error: {0}")]
    Decode(String),
}

/// A report exclusively owns its comparables, insights and adjustments;
/// deleting the report deletes all three.
#[async_trait]
pub trait CmaStore: Send + Sync {
    /// Insert a `processing` report with placeholder value and confidence
    async fn insert_report(&self, report: &NewCmaReport) -> Result<CmaReport, StoreError>;

    /// Set value, confidence and `generated` in one write. Only valid from
    /// `processing`.
    async fn complete_report(&self, id: i64, valuation: &Valuation)
        -> Result<CmaReport, StoreError>;

    /// Move a `processing` report to `error`
    async fn fail_report(&self, id: i64) -> Result<CmaReport, StoreError>;

    async fn find_report(&self, id: i64) -> Result<Option<CmaReport>, StoreError>;

    /// Returns false when the report does not exist
    async fn delete_report(&self, id: i64) -> Result<bool, StoreError>;

    /// Fail every `processing` report created before `cutoff`
    async fn reap_stalled(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn insert_comparables(
        &self,
        report_id: i64,
        sales: &[ComparableSale],
    ) -> Result<(), StoreError>;

    async fn list_comparables(&self, report_id: i64) -> Result<Vec<ComparableSale>, StoreError>;

    async fn insert_insights(
        &self,
        report_id: i64,
        insights: &[MarketInsight],
    ) -> Result<(), StoreError>;

    async fn list_insights(&self, report_id: i64) -> Result<Vec<MarketInsight>, StoreError>;

    async fn insert_adjustments(
        &self,
        report_id: i64,
        rules: &[PricingAdjustmentRule],
    ) -> Result<(), StoreError>;

    async fn list_adjustments(
        &self,
        report_id: i64,
    ) -> Result<Vec<PricingAdjustmentRule>, StoreError>;
}
