//! CMA report orchestrator - runs comparables, valuation and insights for one
//! request and owns the report lifecycle

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cma::comparables::{ComparableSalesProvider, SalesHistorySource};
use crate::cma::error::CmaError;
use crate::cma::insights::{or_default_insights, MarketInsightSummarizer, MarketStatsSource};
use crate::cma::types::{
    CmaReport, ComparableSale, CompleteCmaReport, MarketInsight, NewCmaReport,
    PricingAdjustmentRule, SubjectPropertyCriteria, Valuation,
};
use crate::cma::valuation;
use crate::store::CmaStore;

pub struct CmaService {
    store: Arc<dyn CmaStore>,
    comparables: ComparableSalesProvider,
    insights: MarketInsightSummarizer,
}

impl CmaService {
    /// Wire the engine to injected collaborators. Their lifecycle (connect,
    /// close) stays with the caller.
    pub fn new(
        store: Arc<dyn CmaStore>,
        sales: Arc<dyn SalesHistorySource>,
        stats: Arc<dyn MarketStatsSource>,
        source_timeout: Duration,
    ) -> Self {
        Self {
            comparables: ComparableSalesProvider::new(sales, store.clone(), source_timeout),
            insights: MarketInsightSummarizer::new(stats, source_timeout),
            store,
        }
    }

    /// Generate a report: `processing` row first, then `generated` with the
    /// final value, or `error` if comparables or valuation fail.
    pub async fn generate(
        &self,
        request: NewCmaReport,
        max_comparables: usize,
    ) -> Result<CmaReport, CmaError> {
        let as_of = Utc::now().date_naive();
        let report = self.store.insert_report(&request).await?;
        info!(
            report_id = report.id,
            user_id = %report.user_id,
            "CMA report processing for {} {}",
            report.zip_code,
            report.property_type
        );

        let criteria = request.criteria;
        let (valuation, insights) = tokio::join!(
            self.value_subject(report.id, &criteria, max_comparables, as_of),
            self.insights.summarize(report.id, &criteria, as_of),
        );
        let insights = or_default_insights(insights, report.id, &criteria);

        let outcome = async {
            let valuation = valuation?;
            self.store.insert_insights(report.id, &insights).await?;
            let generated = self.store.complete_report(report.id, &valuation).await?;
            Ok::<_, CmaError>(generated)
        }
        .await;

        match outcome {
            Ok(generated) => {
                info!(
                    report_id = generated.id,
                    "CMA report generated: estimated value {} (confidence {:.2})",
                    generated.estimated_value,
                    generated.confidence_score
                );
                Ok(generated)
            }
            Err(e) => {
                error!(report_id = report.id, "CMA report generation failed: {}", e);
                if let Err(mark) = self.store.fail_report(report.id).await {
                    warn!(report_id = report.id, "Failed to mark report as error: {}", mark);
                }
                Err(e)
            }
        }
    }

    async fn value_subject(
        &self,
        report_id: i64,
        criteria: &SubjectPropertyCriteria,
        max_comparables: usize,
        as_of: NaiveDate,
    ) -> Result<Valuation, CmaError> {
        let set = self
            .comparables
            .find_comparables(report_id, criteria, max_comparables, as_of)
            .await?;

        let valuation = valuation::estimate(criteria, &set.sales, set.quality, as_of)?;

        let rules = valuation::pricing_adjustments(&set.sales);
        self.store.insert_adjustments(report_id, &rules).await?;

        Ok(valuation)
    }

    pub async fn report(&self, id: i64) -> Result<CmaReport, CmaError> {
        self.store
            .find_report(id)
            .await?
            .ok_or(CmaError::NotFound(id))
    }

    pub async fn comparables(&self, id: i64) -> Result<Vec<ComparableSale>, CmaError> {
        self.report(id).await?;
        Ok(self.store.list_comparables(id).await?)
    }

    pub async fn insights(&self, id: i64) -> Result<Vec<MarketInsight>, CmaError> {
        self.report(id).await?;
        Ok(self.store.list_insights(id).await?)
    }

    pub async fn adjustments(&self, id: i64) -> Result<Vec<PricingAdjustmentRule>, CmaError> {
        self.report(id).await?;
        Ok(self.store.list_adjustments(id).await?)
    }

    pub async fn complete(&self, id: i64) -> Result<CompleteCmaReport, CmaError> {
        let report = self.report(id).await?;
        Ok(CompleteCmaReport {
            report,
            comparables: self.store.list_comparables(id).await?,
            insights: self.store.list_insights(id).await?,
            adjustments: self.store.list_adjustments(id).await?,
        })
    }

    /// Delete a report together with its comparables, insights and adjustments
    pub async fn delete(&self, id: i64) -> Result<(), CmaError> {
        if self.store.delete_report(id).await? {
            info!(report_id = id, "CMA report deleted");
            Ok(())
        } else {
            Err(CmaError::NotFound(id))
        }
    }

    /// Move reports stuck in `processing` longer than `max_age` to `error`
    pub async fn reap_stalled(&self, max_age: chrono::Duration) -> Result<u64, CmaError> {
        let cutoff = Utc::now() - max_age;
        let reaped = self.store.reap_stalled(cutoff).await?;
        if reaped > 0 {
            warn!("Marked {} stalled CMA reports as error", reaped);
        }
        Ok(reaped)
    }
}
