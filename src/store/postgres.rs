//! PostgreSQL-backed report store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::cma::types::{
    CmaReport, ComparableSale, MarketInsight, NewCmaReport, PricingAdjustmentRule, ReportStatus,
    Valuation,
};

use super::{CmaStore, StoreError};

const REPORT_COLUMNS: &str = "id, user_id, property_id, zip_code, property_type, bedrooms, \
     bathrooms, sqft, year_built, lot_size, latitude, longitude, estimated_value, \
     confidence_score, status, pricing_tier, report_date, last_updated";

#[derive(Clone)]
pub struct PgCmaStore {
    db: PgPool,
}

impl PgCmaStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Conditional status update. When no row matches, tells a missing
    /// report apart from one that is already terminal.
    async fn transition(
        &self,
        id: i64,
        to: ReportStatus,
        valuation: Option<&Valuation>,
    ) -> Result<CmaReport, StoreError> {
        let sql = format!(
            r#"
            UPDATE cma_reports SET
                status = $2,
                estimated_value = COALESCE($3, estimated_value),
                confidence_score = COALESCE($4, confidence_score),
                last_updated = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING {REPORT_COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, CmaReport>(&sql)
            .bind(id)
            .bind(to)
            .bind(valuation.map(|v| v.estimated_value))
            .bind(valuation.map(|v| v.confidence_score))
            .fetch_optional(&self.db)
            .await?;

        match updated {
            Some(report) => Ok(report),
            None => match self.find_report(id).await? {
                Some(existing) => Err(StoreError::InvalidTransition {
                    from: existing.status,
                    to,
                }),
                None => Err(StoreError::NotFound(id)),
            },
        }
    }
}

#[async_trait]
impl CmaStore for PgCmaStore {
    async fn insert_report(&self, report: &NewCmaReport) -> Result<CmaReport, StoreError> {
        let criteria = &report.criteria;
        let sql = format!(
            r#"
            INSERT INTO cma_reports (
                user_id, property_id, zip_code, property_type, bedrooms, bathrooms, sqft,
                year_built, lot_size, latitude, longitude, estimated_value, confidence_score,
                status, pricing_tier, report_date, last_updated
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, 0, 'processing', $12, NOW(), NOW()
            )
            RETURNING {REPORT_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, CmaReport>(&sql)
            .bind(&report.user_id)
            .bind(report.property_id)
            .bind(&criteria.zip_code)
            .bind(criteria.property_type)
            .bind(criteria.bedrooms)
            .bind(criteria.bathrooms)
            .bind(criteria.sqft)
            .bind(criteria.year_built)
            .bind(criteria.lot_size)
            .bind(criteria.latitude)
            .bind(criteria.longitude)
            .bind(report.pricing_tier)
            .fetch_one(&self.db)
            .await?;

        debug!(report_id = row.id, "Inserted CMA report");
        Ok(row)
    }

    async fn complete_report(
        &self,
        id: i64,
        valuation: &Valuation,
    ) -> Result<CmaReport, StoreError> {
        self.transition(id, ReportStatus::Generated, Some(valuation))
            .await
    }

    async fn fail_report(&self, id: i64) -> Result<CmaReport, StoreError> {
        self.transition(id, ReportStatus::Error, None).await
    }

    async fn find_report(&self, id: i64) -> Result<Option<CmaReport>, StoreError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM cma_reports WHERE id = $1");
        let row = sqlx::query_as::<_, CmaReport>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn delete_report(&self, id: i64) -> Result<bool, StoreError> {
        // children go with the report through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM cma_reports WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reap_stalled(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE cma_reports SET status = 'error', last_updated = NOW()
            WHERE status = 'processing' AND report_date < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_comparables(
        &self,
        report_id: i64,
        sales: &[ComparableSale],
    ) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        for sale in sales {
            sqlx::query(
                r#"
                INSERT INTO comparable_sales (
                    cma_report_id, address, city, state, zip_code, sale_price, sale_date,
                    bedrooms, bathrooms, sqft, price_per_sqft, year_built, lot_size,
                    distance_from_subject, adjusted_price, similarity, image_url
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
                )
                "#,
            )
            .bind(report_id)
            .bind(&sale.address)
            .bind(&sale.city)
            .bind(&sale.state)
            .bind(&sale.zip_code)
            .bind(sale.sale_price)
            .bind(sale.sale_date)
            .bind(sale.bedrooms)
            .bind(sale.bathrooms)
            .bind(sale.sqft)
            .bind(sale.price_per_sqft)
            .bind(sale.year_built)
            .bind(sale.lot_size)
            .bind(sale.distance_from_subject)
            .bind(sale.adjusted_price)
            .bind(sale.similarity)
            .bind(&sale.image_url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_comparables(&self, report_id: i64) -> Result<Vec<ComparableSale>, StoreError> {
        let rows = sqlx::query_as::<_, ComparableSale>(
            r#"
            SELECT address, city, state, zip_code, sale_price, sale_date, bedrooms, bathrooms,
                   sqft, price_per_sqft, year_built, lot_size, distance_from_subject,
                   adjusted_price, similarity, image_url
            FROM comparable_sales
            WHERE cma_report_id = $1
            ORDER BY id
            "#,
        )
        .bind(report_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_insights(
        &self,
        report_id: i64,
        insights: &[MarketInsight],
    ) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        for insight in insights {
            sqlx::query(
                r#"
                INSERT INTO market_insights (
                    cma_report_id, insight_type, title, description, data, importance
                ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(report_id)
            .bind(insight.insight_type)
            .bind(&insight.title)
            .bind(&insight.description)
            .bind(&insight.data)
            .bind(insight.importance)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_insights(&self, report_id: i64) -> Result<Vec<MarketInsight>, StoreError> {
        let rows = sqlx::query_as::<_, MarketInsight>(
            r#"
            SELECT cma_report_id, insight_type, title, description, data, importance
            FROM market_insights
            WHERE cma_report_id = $1
            ORDER BY importance DESC, id
            "#,
        )
        .bind(report_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_adjustments(
        &self,
        report_id: i64,
        rules: &[PricingAdjustmentRule],
    ) -> Result<(), StoreError> {
        let mut tx = self.db.begin().await?;

        for rule in rules {
            sqlx::query(
                r#"
                INSERT INTO pricing_adjustments (
                    cma_report_id, factor, per_unit_value, direction, description
                ) VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(report_id)
            .bind(rule.factor)
            .bind(rule.per_unit_value)
            .bind(rule.direction)
            .bind(&rule.description)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_adjustments(
        &self,
        report_id: i64,
    ) -> Result<Vec<PricingAdjustmentRule>, StoreError> {
        let rows = sqlx::query_as::<_, PricingAdjustmentRule>(
            r#"
            SELECT factor, per_unit_value, direction, description
            FROM pricing_adjustments
            WHERE cma_report_id = $1
            ORDER BY id
            "#,
        )
        .bind(report_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
