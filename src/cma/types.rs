//! Core data types for the CMA engine
//! Pure data structures; the scoring and valuation rules live in their own modules

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::str::FromStr;

/// Property types accepted for a subject property and recorded in sales history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "property_type_enum", rename_all = "snake_case")]
pub enum PropertyType {
    #[serde(rename = "Single Family Home")]
    SingleFamilyHome,
    #[serde(rename = "Condo")]
    Condo,
    #[serde(rename = "Townhouse")]
    Townhouse,
    #[serde(rename = "Multi-Family")]
    MultiFamily,
    #[serde(rename = "Land")]
    Land,
    #[serde(rename = "Other")]
    Other,
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyType::SingleFamilyHome => write!(f, "Single Family Home"),
            PropertyType::Condo => write!(f, "Condo"),
            PropertyType::Townhouse => write!(f, "Townhouse"),
            PropertyType::MultiFamily => write!(f, "Multi-Family"),
            PropertyType::Land => write!(f, "Land"),
            PropertyType::Other => write!(f, "Other"),
        }
    }
}

impl FromStr for PropertyType {
    type Err = anyhow::Error;

    /// Accepts display labels and snake_case names, ignoring case and punctuation
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match key.as_str() {
            "singlefamilyhome" | "singlefamily" | "house" => Ok(PropertyType::SingleFamilyHome),
            "condo" | "condominium" | "apartment" => Ok(PropertyType::Condo),
            "townhouse" | "townhome" => Ok(PropertyType::Townhouse),
            "multifamily" => Ok(PropertyType::MultiFamily),
            "land" | "vacantland" | "lot" => Ok(PropertyType::Land),
            "other" => Ok(PropertyType::Other),
            _ => Err(anyhow::anyhow!("Invalid property type: {}", s)),
        }
    }
}

/// Report lifecycle. `Generated` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "report_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Processing,
    Generated,
    Error,
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Processing)
    }

    /// Only `processing -> generated` and `processing -> error` are allowed
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        !self.is_terminal() && next.is_terminal()
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Processing => write!(f, "processing"),
            ReportStatus::Generated => write!(f, "generated"),
            ReportStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "pricing_tier_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PricingTier {
    #[default]
    Basic,
    Premium,
    Enterprise,
}

impl std::fmt::Display for PricingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingTier::Basic => write!(f, "basic"),
            PricingTier::Premium => write!(f, "premium"),
            PricingTier::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl FromStr for PricingTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(PricingTier::Basic),
            "premium" => Ok(PricingTier::Premium),
            "enterprise" => Ok(PricingTier::Enterprise),
            _ => Err(anyhow::anyhow!("Invalid pricing tier: {}", s)),
        }
    }
}

/// Where a comparable set came from. Internal to the engine: it is never
/// attached to a `ComparableSale`, it only bounds the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataQuality {
    Recorded,
    Synthetic,
}

/// Subject property characteristics, supplied once per report request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPropertyCriteria {
    pub zip_code: String,
    pub property_type: PropertyType,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub sqft: i32,
    pub year_built: Option<i32>,
    pub lot_size: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A recently-sold property scored and adjusted against a subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ComparableSale {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub sale_price: i64,
    pub sale_date: NaiveDate,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub sqft: i32,
    pub price_per_sqft: f64,
    pub year_built: Option<i32>,
    pub lot_size: Option<i32>,
    pub distance_from_subject: f64,
    pub adjusted_price: i64,
    pub similarity: f64,
    pub image_url: Option<String>,
}

/// Comparables produced for one report, with their provenance
#[derive(Debug, Clone)]
pub struct ComparableSet {
    pub sales: Vec<ComparableSale>,
    pub quality: DataQuality,
}

/// A recorded sale from the sales-history dataset
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SaleRecord {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub property_type: PropertyType,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub sqft: i32,
    pub year_built: Option<i32>,
    pub lot_size: Option<i32>,
    pub sale_price: i64,
    pub sale_date: NaiveDate,
    pub days_on_market: Option<i32>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub image_url: Option<String>,
    pub data_source: String,
}

/// Sales aggregated by calendar quarter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QuarterlySales {
    pub year: i32,
    pub quarter: i32,
    pub avg_price: f64,
    pub median_price: f64,
    pub sales_volume: i64,
    pub avg_days_on_market: Option<f64>,
}

impl QuarterlySales {
    /// Chart label, e.g. "2024 Q3"
    pub fn period(&self) -> String {
        format!("{} Q{}", self.year, self.quarter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "insight_type_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    PriceTrend,
    SalesVolume,
    DaysOnMarket,
    MarketConditions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MarketInsight {
    pub cma_report_id: i64,
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub data: Option<serde_json::Value>,
    /// Display ordering only, 1-5
    pub importance: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "adjustment_factor_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentFactor {
    Bedroom,
    Bathroom,
    Sqft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "adjustment_direction_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    Positive,
    Negative,
}

/// Explains the per-unit adjustments used for a report. Never read back
/// into the valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PricingAdjustmentRule {
    pub factor: AdjustmentFactor,
    pub per_unit_value: i64,
    pub direction: AdjustmentDirection,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Valuation {
    pub estimated_value: i64,
    pub confidence_score: f64,
}

/// Input for creating a report row
#[derive(Debug, Clone)]
pub struct NewCmaReport {
    pub user_id: String,
    pub property_id: Option<i64>,
    pub criteria: SubjectPropertyCriteria,
    pub pricing_tier: PricingTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CmaReport {
    pub id: i64,
    pub user_id: String,
    pub property_id: Option<i64>,
    pub zip_code: String,
    pub property_type: PropertyType,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub sqft: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub estimated_value: i64,
    pub confidence_score: f64,
    pub status: ReportStatus,
    pub pricing_tier: PricingTier,
    pub report_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl CmaReport {
    /// Snapshot of the subject criteria the report was requested with
    pub fn criteria(&self) -> SubjectPropertyCriteria {
        SubjectPropertyCriteria {
            zip_code: self.zip_code.clone(),
            property_type: self.property_type,
            bedrooms: self.bedrooms,
            bathrooms: self.bathrooms,
            sqft: self.sqft,
            year_built: self.year_built,
            lot_size: self.lot_size,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Report bundled with its three child collections
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteCmaReport {
    pub report: CmaReport,
    pub comparables: Vec<ComparableSale>,
    pub insights: Vec<MarketInsight>,
    pub adjustments: Vec<PricingAdjustmentRule>,
}
