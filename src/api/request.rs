//! CMA request body and field validation

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::cma::comparables::DEFAULT_MAX_COMPARABLES;
use crate::cma::types::{NewCmaReport, PricingTier, PropertyType, SubjectPropertyCriteria};

const MIN_ZIP_LEN: usize = 5;
const MAX_ROOMS: i32 = 50;
const MIN_SQFT: i32 = 100;
const MAX_SQFT: i32 = 100_000;
const MIN_COMPARABLES: i64 = 3;
const MAX_COMPARABLES: i64 = 10;

/// Raw request as posted. Every field is optional here so that missing and
/// out-of-range values are reported together.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmaRequest {
    pub property_id: Option<i64>,
    pub zip_code: Option<String>,
    pub property_type: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub sqft: Option<i32>,
    pub year_built: Option<i32>,
    pub lot_size: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pricing_tier: Option<String>,
    pub max_comparables: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub report: NewCmaReport,
    pub max_comparables: usize,
}

impl CmaRequest {
    pub fn validate(self, user_id: &str) -> Result<ValidatedRequest, Vec<FieldViolation>> {
        let mut violations = Vec::new();

        let zip_code = match self.zip_code.as_deref().map(str::trim) {
            Some(zip) if zip.len() >= MIN_ZIP_LEN => Some(zip.to_string()),
            Some(_) => {
                violations.push(FieldViolation::new("zipCode", "must be at least 5 characters"));
                None
            }
            None => {
                violations.push(FieldViolation::new("zipCode", "is required"));
                None
            }
        };

        let property_type = match self.property_type.as_deref() {
            Some(raw) => match raw.parse::<PropertyType>() {
                Ok(pt) => Some(pt),
                Err(_) => {
                    violations.push(FieldViolation::new("propertyType", "is not a known property type"));
                    None
                }
            },
            None => {
                violations.push(FieldViolation::new("propertyType", "is required"));
                None
            }
        };

        let bedrooms = required_in_range(&mut violations, "bedrooms", self.bedrooms, 1, MAX_ROOMS);
        let bathrooms = required_in_range(&mut violations, "bathrooms", self.bathrooms, 1, MAX_ROOMS);
        let sqft = required_in_range(&mut violations, "sqft", self.sqft, MIN_SQFT, MAX_SQFT);

        let latest_year = Utc::now().year() + 1;
        match self.year_built {
            Some(year) if year <= 0 => {
                violations.push(FieldViolation::new("yearBuilt", "must be a positive year"));
            }
            Some(year) if year > latest_year => {
                violations.push(FieldViolation::new(
                    "yearBuilt",
                    &format!("must not be later than {}", latest_year),
                ));
            }
            _ => {}
        }
        if matches!(self.lot_size, Some(lot) if lot < 0) {
            violations.push(FieldViolation::new("lotSize", "must not be negative"));
        }

        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    violations.push(FieldViolation::new("latitude", "must be between -90 and 90"));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    violations.push(FieldViolation::new("longitude", "must be between -180 and 180"));
                }
            }
            (None, None) => {}
            (Some(_), None) => {
                violations.push(FieldViolation::new("longitude", "is required with latitude"));
            }
            (None, Some(_)) => {
                violations.push(FieldViolation::new("latitude", "is required with longitude"));
            }
        }

        let pricing_tier = match self.pricing_tier.as_deref() {
            None => PricingTier::default(),
            Some(raw) => raw.parse::<PricingTier>().unwrap_or_else(|_| {
                violations.push(FieldViolation::new(
                    "pricingTier",
                    "must be one of basic, premium, enterprise",
                ));
                PricingTier::default()
            }),
        };

        let max_comparables = match self.max_comparables {
            None => DEFAULT_MAX_COMPARABLES,
            Some(n) if (MIN_COMPARABLES..=MAX_COMPARABLES).contains(&n) => n as usize,
            Some(_) => {
                violations.push(FieldViolation::new("maxComparables", "must be between 3 and 10"));
                DEFAULT_MAX_COMPARABLES
            }
        };

        match (zip_code, property_type, bedrooms, bathrooms, sqft) {
            (Some(zip_code), Some(property_type), Some(bedrooms), Some(bathrooms), Some(sqft))
                if violations.is_empty() =>
            {
                Ok(ValidatedRequest {
                    report: NewCmaReport {
                        user_id: user_id.to_string(),
                        property_id: self.property_id,
                        criteria: SubjectPropertyCriteria {
                            zip_code,
                            property_type,
                            bedrooms,
                            bathrooms,
                            sqft,
                            year_built: self.year_built,
                            lot_size: self.lot_size,
                            latitude: self.latitude,
                            longitude: self.longitude,
                        },
                        pricing_tier,
                    },
                    max_comparables,
                })
            }
            _ => Err(violations),
        }
    }
}

fn required_in_range(
    violations: &mut Vec<FieldViolation>,
    field: &str,
    value: Option<i32>,
    min: i32,
    max: i32,
) -> Option<i32> {
    match value {
        Some(v) if (min..=max).contains(&v) => Some(v),
        Some(v) if v < min => {
            violations.push(FieldViolation::new(field, &format!("must be at least {}", min)));
            None
        }
        Some(_) => {
            violations.push(FieldViolation::new(field, &format!("must be at most {}", max)));
            None
        }
        None => {
            violations.push(FieldViolation::new(field, "is required"));
            None
        }
    }
}
