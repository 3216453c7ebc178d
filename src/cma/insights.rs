//! Market insight summarizer - quarterly sales statistics into trend narratives
//! and chartable series

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Months, NaiveDate};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cma::error::SourceError;
use crate::cma::types::{
    InsightType, MarketInsight, PropertyType, QuarterlySales, SubjectPropertyCriteria,
};

const HISTORY_MONTHS: u32 = 36;
const STEADY_PACE_PERCENT: f64 = 5.0;

/// Read-only quarterly aggregates over recorded sales
#[async_trait]
pub trait MarketStatsSource: Send + Sync {
    async fn quarterly_sales(
        &self,
        zip_code: &str,
        property_type: PropertyType,
        since: NaiveDate,
    ) -> Result<Vec<QuarterlySales>, SourceError>;
}

/// Activity of the most recent quarters relative to the period mean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketActivity {
    HighlyActive,
    ModeratelyActive,
    Neutral,
    SlightlyBelowAverage,
    SlowerThanAverage,
}

impl MarketActivity {
    /// Classify a recent-to-mean volume ratio
    pub fn classify(ratio: f64) -> Self {
        if ratio > 1.20 {
            MarketActivity::HighlyActive
        } else if ratio > 1.05 {
            MarketActivity::ModeratelyActive
        } else if ratio >= 0.95 {
            MarketActivity::Neutral
        } else if ratio >= 0.80 {
            MarketActivity::SlightlyBelowAverage
        } else {
            MarketActivity::SlowerThanAverage
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MarketActivity::HighlyActive => "highly active",
            MarketActivity::ModeratelyActive => "moderately active",
            MarketActivity::Neutral => "neutral",
            MarketActivity::SlightlyBelowAverage => "slightly below average",
            MarketActivity::SlowerThanAverage => "slower than average",
        }
    }
}

pub struct MarketInsightSummarizer {
    source: Arc<dyn MarketStatsSource>,
    query_timeout: Duration,
}

impl MarketInsightSummarizer {
    pub fn new(source: Arc<dyn MarketStatsSource>, query_timeout: Duration) -> Self {
        Self {
            source,
            query_timeout,
        }
    }

    /// Insights for the trailing 36 months of the subject's market. Never
    /// empty on success; source failures are returned for the caller to
    /// replace with `default_insights`.
    pub async fn summarize(
        &self,
        report_id: i64,
        criteria: &SubjectPropertyCriteria,
        as_of: NaiveDate,
    ) -> Result<Vec<MarketInsight>, SourceError> {
        let since = as_of
            .checked_sub_months(Months::new(HISTORY_MONTHS))
            .unwrap_or(as_of - ChronoDuration::days(3 * 365));

        let buckets = timeout(
            self.query_timeout,
            self.source
                .quarterly_sales(&criteria.zip_code, criteria.property_type, since),
        )
        .await
        .map_err(|_| SourceError::Timeout(self.query_timeout.as_millis()))??;

        if buckets.is_empty() {
            debug!(report_id, "No quarterly sales history, using default insights");
            return Ok(default_insights(report_id, criteria));
        }

        Ok(build_insights(report_id, criteria, &buckets))
    }
}

/// Generic regional insights when no history is available
pub fn default_insights(report_id: i64, criteria: &SubjectPropertyCriteria) -> Vec<MarketInsight> {
    vec![
        MarketInsight {
            cma_report_id: report_id,
            insight_type: InsightType::MarketConditions,
            title: "Regional Market Conditions".to_string(),
            description: format!(
                "Recent sales data for {} properties in {} is limited. Regional markets have \
                 generally seen steady demand, so this estimate leans on broader pricing trends.",
                criteria.property_type, criteria.zip_code
            ),
            data: None,
            importance: 3,
        },
        MarketInsight {
            cma_report_id: report_id,
            insight_type: InsightType::PriceTrend,
            title: "Regional Price Trends".to_string(),
            description: "Home values across the region have moved gradually over the past \
                          year. Review recent neighborhood sales with your agent before pricing."
                .to_string(),
            data: None,
            importance: 4,
        },
    ]
}

/// Exactly three insights (price trend, sales volume, days on market) from
/// non-empty quarterly buckets
pub fn build_insights(
    report_id: i64,
    criteria: &SubjectPropertyCriteria,
    buckets: &[QuarterlySales],
) -> Vec<MarketInsight> {
    let mut buckets = buckets.to_vec();
    buckets.sort_by_key(|b| (b.year, b.quarter));

    vec![
        price_trend(report_id, criteria, &buckets),
        sales_volume(report_id, &buckets),
        days_on_market(report_id, &buckets),
    ]
}

fn price_trend(
    report_id: i64,
    criteria: &SubjectPropertyCriteria,
    buckets: &[QuarterlySales],
) -> MarketInsight {
    let data: Vec<_> = buckets
        .iter()
        .map(|b| {
            json!({
                "period": b.period(),
                "avgPrice": b.avg_price.round(),
                "medianPrice": b.median_price.round(),
            })
        })
        .collect();

    let description = match buckets.last() {
        Some(current) => {
            let last_year = buckets
                .iter()
                .rev()
                .find(|b| b.year == current.year - 1 && b.quarter == current.quarter)
                .filter(|b| b.avg_price > 0.0);

            match last_year {
                Some(previous) => {
                    let change = (current.avg_price - previous.avg_price) / previous.avg_price * 100.0;
                    let direction = if change >= 0.0 { "increased" } else { "decreased" };
                    format!(
                        "Average sale prices for {} properties in {} have {} by {:.1}% compared \
                         to the same quarter last year ({} in {} vs {} in {}).",
                        criteria.property_type,
                        criteria.zip_code,
                        direction,
                        change.abs(),
                        format_currency(previous.avg_price),
                        previous.period(),
                        format_currency(current.avg_price),
                        current.period()
                    )
                }
                None => format!(
                    "The latest median sale price for {} properties in {} is {} ({}).",
                    criteria.property_type,
                    criteria.zip_code,
                    format_currency(current.median_price),
                    current.period()
                ),
            }
        }
        None => String::new(),
    };

    MarketInsight {
        cma_report_id: report_id,
        insight_type: InsightType::PriceTrend,
        title: "Price Trends".to_string(),
        description,
        data: Some(json!(data)),
        importance: 5,
    }
}

fn sales_volume(report_id: i64, buckets: &[QuarterlySales]) -> MarketInsight {
    let data: Vec<_> = buckets
        .iter()
        .map(|b| json!({ "period": b.period(), "salesVolume": b.sales_volume }))
        .collect();

    let mean = buckets.iter().map(|b| b.sales_volume as f64).sum::<f64>() / buckets.len().max(1) as f64;
    let recent: Vec<_> = buckets.iter().rev().take(2).collect();
    let recent_mean =
        recent.iter().map(|b| b.sales_volume as f64).sum::<f64>() / recent.len().max(1) as f64;

    let ratio = if mean > 0.0 { recent_mean / mean } else { 1.0 };
    let activity = MarketActivity::classify(ratio);

    let description = format!(
        "Market activity is {}: the last {} averaged {:.1} sales per quarter, {:.0}% of the \
         {:.1}-sale quarterly average over the past three years.",
        activity.label(),
        if recent.len() == 1 { "quarter" } else { "two quarters" },
        recent_mean,
        ratio * 100.0,
        mean
    );

    MarketInsight {
        cma_report_id: report_id,
        insight_type: InsightType::SalesVolume,
        title: "Sales Volume".to_string(),
        description,
        data: Some(json!(data)),
        importance: 4,
    }
}

fn days_on_market(report_id: i64, buckets: &[QuarterlySales]) -> MarketInsight {
    let data: Vec<_> = buckets
        .iter()
        .map(|b| {
            json!({
                "period": b.period(),
                "avgDaysOnMarket": b.avg_days_on_market.map(f64::round),
            })
        })
        .collect();

    let latest = buckets.last();
    let prior = buckets.len().checked_sub(2).and_then(|i| buckets.get(i));

    let description = match latest.and_then(|b| b.avg_days_on_market.map(|d| (b, d))) {
        None => "Days-on-market data is not available for the latest quarter.".to_string(),
        Some((bucket, latest_days)) => {
            match prior.and_then(|p| p.avg_days_on_market).filter(|d| *d > 0.0) {
                None => format!(
                    "Homes are selling in an average of {:.0} days ({}).",
                    latest_days,
                    bucket.period()
                ),
                Some(prior_days) => {
                    let change = (latest_days - prior_days) / prior_days * 100.0;
                    if change.abs() < STEADY_PACE_PERCENT {
                        format!(
                            "Homes are selling at about the same pace as the previous quarter, \
                             averaging {:.0} days on market.",
                            latest_days
                        )
                    } else {
                        let pace = if change < 0.0 { "faster" } else { "slower" };
                        format!(
                            "Homes are selling {:.1}% {} than the previous quarter, averaging \
                             {:.0} days on market.",
                            change.abs(),
                            pace,
                            latest_days
                        )
                    }
                }
            }
        }
    };

    MarketInsight {
        cma_report_id: report_id,
        insight_type: InsightType::DaysOnMarket,
        title: "Days on Market".to_string(),
        description,
        data: Some(json!(data)),
        importance: 3,
    }
}

/// Whole-dollar currency with thousands separators, e.g. $1,250,000
pub fn format_currency(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded < 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// Log-and-replace helper for callers that must not fail on insights
pub fn or_default_insights(
    result: Result<Vec<MarketInsight>, SourceError>,
    report_id: i64,
    criteria: &SubjectPropertyCriteria,
) -> Vec<MarketInsight> {
    match result {
        Ok(insights) => insights,
        Err(e) => {
            warn!(report_id, "Insight generation failed, using default insights: {}", e);
            default_insights(report_id, criteria)
        }
    }
}
