use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::cma::types::{
    CmaReport, ComparableSale, MarketInsight, NewCmaReport, PricingAdjustmentRule, ReportStatus,
    Valuation,
};

use super::{CmaStore, StoreError};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    reports: HashMap<i64, CmaReport>,
    comparables: HashMap<i64, Vec<ComparableSale>>,
    insights: HashMap<i64, Vec<MarketInsight>>,
    adjustments: HashMap<i64, Vec<PricingAdjustmentRule>>,
}

impl MemoryState {
    fn transition(&mut self, id: i64, to: ReportStatus) -> Result<&mut CmaReport, StoreError> {
        let report = self.reports.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !report.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                from: report.status,
                to,
            });
        }
        report.status = to;
        report.last_updated = Utc::now();
        Ok(report)
    }

    fn require_report(&self, id: i64) -> Result<(), StoreError> {
        if self.reports.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(id))
        }
    }
}

/// Process-local store with the same lifecycle rules as the Postgres store
#[derive(Default)]
pub struct InMemoryCmaStore {
    state: RwLock<MemoryState>,
}

#[async_trait::async_trait]
impl CmaStore for InMemoryCmaStore {
    async fn insert_report(&self, report: &NewCmaReport) -> Result<CmaReport, StoreError> {
        let mut state = self.state.write().await;
        state.next_id += 1;

        let now = Utc::now();
        let criteria = &report.criteria;
        let row = CmaReport {
            id: state.next_id,
            user_id: report.user_id.clone(),
            property_id: report.property_id,
            zip_code: criteria.zip_code.clone(),
            property_type: criteria.property_type,
            bedrooms: criteria.bedrooms,
            bathrooms: criteria.bathrooms,
            sqft: criteria.sqft,
            year_built: criteria.year_built,
            lot_size: criteria.lot_size,
            latitude: criteria.latitude,
            longitude: criteria.longitude,
            estimated_value: 0,
            confidence_score: 0.0,
            status: ReportStatus::Processing,
            pricing_tier: report.pricing_tier,
            report_date: now,
            last_updated: now,
        };

        state.reports.insert(row.id, row.clone());
        Ok(row)
    }

    async fn complete_report(
        &self,
        id: i64,
        valuation: &Valuation,
    ) -> Result<CmaReport, StoreError> {
        let mut state = self.state.write().await;
        let report = state.transition(id, ReportStatus::Generated)?;
        report.estimated_value = valuation.estimated_value;
        report.confidence_score = valuation.confidence_score;
        Ok(report.clone())
    }

    async fn fail_report(&self, id: i64) -> Result<CmaReport, StoreError> {
        let mut state = self.state.write().await;
        let report = state.transition(id, ReportStatus::Error)?;
        Ok(report.clone())
    }

    async fn find_report(&self, id: i64) -> Result<Option<CmaReport>, StoreError> {
        let state = self.state.read().await;
        Ok(state.reports.get(&id).cloned())
    }

    async fn delete_report(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let existed = state.reports.remove(&id).is_some();
        state.comparables.remove(&id);
        state.insights.remove(&id);
        state.adjustments.remove(&id);
        Ok(existed)
    }

    async fn reap_stalled(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut reaped = 0;

        for report in state.reports.values_mut() {
            if report.status == ReportStatus::Processing && report.report_date < cutoff {
                report.status = ReportStatus::Error;
                report.last_updated = now;
                reaped += 1;
            }
        }

        Ok(reaped)
    }

    async fn insert_comparables(
        &self,
        report_id: i64,
        sales: &[ComparableSale],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.require_report(report_id)?;
        state
            .comparables
            .entry(report_id)
            .or_default()
            .extend_from_slice(sales);
        Ok(())
    }

    async fn list_comparables(&self, report_id: i64) -> Result<Vec<ComparableSale>, StoreError> {
        let state = self.state.read().await;
        Ok(state.comparables.get(&report_id).cloned().unwrap_or_default())
    }

    async fn insert_insights(
        &self,
        report_id: i64,
        insights: &[MarketInsight],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.require_report(report_id)?;
        state
            .insights
            .entry(report_id)
            .or_default()
            .extend_from_slice(insights);
        Ok(())
    }

    async fn list_insights(&self, report_id: i64) -> Result<Vec<MarketInsight>, StoreError> {
        let state = self.state.read().await;
        let mut insights = state.insights.get(&report_id).cloned().unwrap_or_default();
        insights.sort_by(|a, b| b.importance.cmp(&a.importance));
        Ok(insights)
    }

    async fn insert_adjustments(
        &self,
        report_id: i64,
        rules: &[PricingAdjustmentRule],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.require_report(report_id)?;
        state
            .adjustments
            .entry(report_id)
            .or_default()
            .extend_from_slice(rules);
        Ok(())
    }

    async fn list_adjustments(
        &self,
        report_id: i64,
    ) -> Result<Vec<PricingAdjustmentRule>, StoreError> {
        let state = self.state.read().await;
        Ok(state.adjustments.get(&report_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cma::types::{PricingTier, PropertyType, SubjectPropertyCriteria};

    fn new_report() -> NewCmaReport {
        NewCmaReport {
            user_id: "user-1".to_string(),
            property_id: None,
            criteria: SubjectPropertyCriteria {
                zip_code: "30301".to_string(),
                property_type: PropertyType::Townhouse,
                bedrooms: 2,
                bathrooms: 2,
                sqft: 1400,
                year_built: Some(2005),
                lot_size: None,
                latitude: None,
                longitude: None,
            },
            pricing_tier: PricingTier::Basic,
        }
    }

    #[tokio::test]
    async fn inserted_report_is_processing_with_placeholders() {
        let store = InMemoryCmaStore::default();
        let report = store.insert_report(&new_report()).await.unwrap();

        assert_eq!(report.id, 1);
        assert_eq!(report.status, ReportStatus::Processing);
        assert_eq!(report.estimated_value, 0);
        assert_eq!(report.confidence_score, 0.0);
        assert_eq!(report.criteria(), new_report().criteria);
    }

    #[tokio::test]
    async fn complete_sets_value_and_status_together() {
        let store = InMemoryCmaStore::default();
        let report = store.insert_report(&new_report()).await.unwrap();

        let valuation = Valuation {
            estimated_value: 412_000,
            confidence_score: 0.72,
        };
        let done = store.complete_report(report.id, &valuation).await.unwrap();

        assert_eq!(done.status, ReportStatus::Generated);
        assert_eq!(done.estimated_value, 412_000);
        assert_eq!(done.confidence_score, 0.72);
    }

    #[tokio::test]
    async fn terminal_reports_never_transition_again() {
        let store = InMemoryCmaStore::default();
        let report = store.insert_report(&new_report()).await.unwrap();
        store.fail_report(report.id).await.unwrap();

        let valuation = Valuation {
            estimated_value: 1,
            confidence_score: 0.5,
        };
        let err = store.complete_report(report.id, &valuation).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ReportStatus::Error,
                to: ReportStatus::Generated
            }
        ));

        let stored = store.find_report(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Error);
        assert_eq!(stored.estimated_value, 0);
    }

    #[tokio::test]
    async fn children_require_an_existing_report() {
        let store = InMemoryCmaStore::default();
        let err = store.insert_comparables(5, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(5)));
    }

    #[tokio::test]
    async fn missing_report_transitions_are_not_found() {
        let store = InMemoryCmaStore::default();
        assert!(matches!(store.fail_report(3).await, Err(StoreError::NotFound(3))));
        assert!(!store.delete_report(3).await.unwrap());
    }
}
