//! Valuation aggregator - similarity-weighted estimate and confidence score
//! Pure functions - no I/O, deterministic for identical inputs

use chrono::NaiveDate;

use crate::cma::error::ValuationError;
use crate::cma::similarity::{BATHROOM_VALUE, BEDROOM_VALUE};
use crate::cma::types::{
    AdjustmentDirection, AdjustmentFactor, ComparableSale, DataQuality, PricingAdjustmentRule,
    SubjectPropertyCriteria, Valuation,
};

/// Fallback market rate used when no comparable evidence exists
pub const BASE_PRICE_PER_SQFT: f64 = 200.0;

/// Confidence reported for a base-rate estimate with no comparables
pub const EMPTY_CONFIDENCE: f64 = 0.1;

/// Synthetic comparables never justify more than this
pub const SYNTHETIC_CONFIDENCE_CEILING: f64 = 0.4;

const BASE_CONFIDENCE: f64 = 0.5;
const PER_COMPARABLE_BONUS: f64 = 0.05;
const MAX_COUNT_BONUS: f64 = 0.3;
const SIMILARITY_WEIGHT: f64 = 0.2;
const PER_MONTH_AGE_PENALTY: f64 = 0.01;
const MAX_AGE_PENALTY: f64 = 0.2;
const DAYS_PER_MONTH: f64 = 30.4375;

/// Base-rate value for a property of the given size
pub fn base_rate_value(sqft: i32) -> i64 {
    (sqft as f64 * BASE_PRICE_PER_SQFT).round() as i64
}

/// Combine scored comparables into an estimated value and confidence
pub fn estimate(
    subject: &SubjectPropertyCriteria,
    comparables: &[ComparableSale],
    quality: DataQuality,
    as_of: NaiveDate,
) -> Result<Valuation, ValuationError> {
    if comparables.is_empty() {
        return Ok(Valuation {
            estimated_value: base_rate_value(subject.sqft),
            confidence_score: EMPTY_CONFIDENCE,
        });
    }

    for comp in comparables {
        check_comparable(comp)?;
    }

    let total_weight: f64 = comparables.iter().map(|c| c.similarity).sum();
    let estimated_value = if total_weight > 0.0 {
        let weighted: f64 = comparables
            .iter()
            .map(|c| c.adjusted_price as f64 * c.similarity)
            .sum();
        let value = (weighted / total_weight).round();
        if !value.is_finite() {
            return Err(ValuationError::NonFinite);
        }
        value as i64
    } else {
        // every comparable carries zero weight
        base_rate_value(subject.sqft)
    };

    let count = comparables.len() as f64;
    let mean_similarity = total_weight / count;
    let mean_age_months = comparables
        .iter()
        .map(|c| age_in_months(c.sale_date, as_of))
        .sum::<f64>()
        / count;

    let mut confidence = BASE_CONFIDENCE;
    confidence += (count * PER_COMPARABLE_BONUS).min(MAX_COUNT_BONUS);
    confidence += mean_similarity * SIMILARITY_WEIGHT;
    confidence -= (mean_age_months * PER_MONTH_AGE_PENALTY).min(MAX_AGE_PENALTY);
    let mut confidence = confidence.clamp(0.0, 1.0);

    if quality == DataQuality::Synthetic {
        confidence = confidence.min(SYNTHETIC_CONFIDENCE_CEILING);
    }

    Ok(Valuation {
        estimated_value,
        confidence_score: confidence,
    })
}

/// Months elapsed between a sale and the valuation date, never negative
pub fn age_in_months(sale_date: NaiveDate, as_of: NaiveDate) -> f64 {
    let days = (as_of - sale_date).num_days().max(0);
    days as f64 / DAYS_PER_MONTH
}

fn check_comparable(comp: &ComparableSale) -> Result<(), ValuationError> {
    let reason = if comp.sale_price <= 0 {
        Some(format!("sale price {} is not positive", comp.sale_price))
    } else if comp.sqft <= 0 {
        Some(format!("sqft {} is not positive", comp.sqft))
    } else if !comp.similarity.is_finite() || !(0.0..=1.0).contains(&comp.similarity) {
        Some(format!("similarity {} is outside [0, 1]", comp.similarity))
    } else if !comp.price_per_sqft.is_finite() {
        Some("price per sqft is not finite".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ValuationError::MalformedComparable {
            address: comp.address.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Explain the per-unit adjustments applied to this report's comparables
pub fn pricing_adjustments(comparables: &[ComparableSale]) -> Vec<PricingAdjustmentRule> {
    let sqft_rate = if comparables.is_empty() {
        BASE_PRICE_PER_SQFT
    } else {
        comparables.iter().map(|c| c.price_per_sqft).sum::<f64>() / comparables.len() as f64
    };
    let sqft_rate = sqft_rate.round() as i64;

    vec![
        rule(
            AdjustmentFactor::Bedroom,
            BEDROOM_VALUE,
            format!("${} per bedroom of difference from the subject", BEDROOM_VALUE),
        ),
        rule(
            AdjustmentFactor::Bathroom,
            BATHROOM_VALUE,
            format!("${} per bathroom of difference from the subject", BATHROOM_VALUE),
        ),
        rule(
            AdjustmentFactor::Sqft,
            sqft_rate,
            format!("${} per square foot of size difference", sqft_rate),
        ),
    ]
}

fn rule(factor: AdjustmentFactor, per_unit_value: i64, description: String) -> PricingAdjustmentRule {
    let direction = if per_unit_value >= 0 {
        AdjustmentDirection::Positive
    } else {
        AdjustmentDirection::Negative
    };

    PricingAdjustmentRule {
        factor,
        per_unit_value,
        direction,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cma::types::PropertyType;
    use proptest::prelude::*;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn subject() -> SubjectPropertyCriteria {
        SubjectPropertyCriteria {
            zip_code: "90210".to_string(),
            property_type: PropertyType::SingleFamilyHome,
            bedrooms: 3,
            bathrooms: 2,
            sqft: 2000,
            year_built: None,
            lot_size: None,
            latitude: None,
            longitude: None,
        }
    }

    fn comp(adjusted_price: i64, similarity: f64, sale_date: NaiveDate) -> ComparableSale {
        ComparableSale {
            address: format!("{} Oak Ave", adjusted_price / 1000),
            city: "Beverly Hills".to_string(),
            state: "CA".to_string(),
            zip_code: "90210".to_string(),
            sale_price: 500_000,
            sale_date,
            bedrooms: 3,
            bathrooms: 2,
            sqft: 2000,
            price_per_sqft: 250.0,
            year_built: None,
            lot_size: None,
            distance_from_subject: 0.5,
            adjusted_price,
            similarity,
            image_url: None,
        }
    }

    #[test]
    fn test_empty_comparables_use_base_rate() {
        let valuation = estimate(&subject(), &[], DataQuality::Recorded, as_of()).unwrap();
        assert_eq!(valuation.estimated_value, 400_000);
        assert_eq!(valuation.confidence_score, 0.1);

        let valuation = estimate(&subject(), &[], DataQuality::Synthetic, as_of()).unwrap();
        assert_eq!(valuation.confidence_score, 0.1);
    }

    #[test]
    fn test_identical_comparables_value_exactly() {
        let comps = vec![comp(500_000, 1.0, as_of()), comp(500_000, 1.0, as_of())];
        let valuation = estimate(&subject(), &comps, DataQuality::Recorded, as_of()).unwrap();
        assert_eq!(valuation.estimated_value, 500_000);
        // 0.5 + 0.1 + 0.2 - 0.0
        assert!((valuation.confidence_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_equal_similarity_is_arithmetic_mean() {
        let comps = vec![
            comp(480_000, 0.7, as_of()),
            comp(510_000, 0.7, as_of()),
            comp(540_000, 0.7, as_of()),
        ];
        let valuation = estimate(&subject(), &comps, DataQuality::Recorded, as_of()).unwrap();
        assert_eq!(valuation.estimated_value, 510_000);
    }

    #[test]
    fn test_similarity_weighting() {
        // (400k * 0.25 + 600k * 0.75) / 1.0
        let comps = vec![comp(400_000, 0.25, as_of()), comp(600_000, 0.75, as_of())];
        let valuation = estimate(&subject(), &comps, DataQuality::Recorded, as_of()).unwrap();
        assert_eq!(valuation.estimated_value, 550_000);
    }

    #[test]
    fn test_zero_similarity_does_not_influence_value() {
        let kept = vec![comp(480_000, 0.8, as_of()), comp(520_000, 0.6, as_of())];
        let mut with_outlier = kept.clone();
        with_outlier.push(comp(9_000_000, 0.0, as_of()));

        let without = estimate(&subject(), &kept, DataQuality::Recorded, as_of()).unwrap();
        let with = estimate(&subject(), &with_outlier, DataQuality::Recorded, as_of()).unwrap();
        assert_eq!(without.estimated_value, with.estimated_value);
    }

    #[test]
    fn test_all_zero_similarity_falls_back_to_base_rate() {
        let comps = vec![comp(900_000, 0.0, as_of())];
        let valuation = estimate(&subject(), &comps, DataQuality::Recorded, as_of()).unwrap();
        assert_eq!(valuation.estimated_value, base_rate_value(2000));
    }

    #[test]
    fn test_older_sales_reduce_confidence() {
        let fresh = vec![comp(500_000, 1.0, as_of())];
        let stale_date = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();
        let stale = vec![comp(500_000, 1.0, stale_date)];

        let fresh = estimate(&subject(), &fresh, DataQuality::Recorded, as_of()).unwrap();
        let stale = estimate(&subject(), &stale, DataQuality::Recorded, as_of()).unwrap();
        assert!(stale.confidence_score < fresh.confidence_score);
        // 366 days is just over 12 months: 0.12 penalty
        assert!((fresh.confidence_score - stale.confidence_score - 0.12).abs() < 0.005);
    }

    #[test]
    fn test_count_bonus_is_capped() {
        let comps: Vec<_> = (0..10).map(|_| comp(500_000, 1.0, as_of())).collect();
        let valuation = estimate(&subject(), &comps, DataQuality::Recorded, as_of()).unwrap();
        // 0.5 + 0.3 (capped) + 0.2
        assert!((valuation.confidence_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_synthetic_quality_caps_confidence() {
        let comps: Vec<_> = (0..6).map(|_| comp(500_000, 1.0, as_of())).collect();
        let valuation = estimate(&subject(), &comps, DataQuality::Synthetic, as_of()).unwrap();
        assert_eq!(valuation.confidence_score, SYNTHETIC_CONFIDENCE_CEILING);
    }

    #[test]
    fn test_malformed_comparable_is_rejected() {
        let mut bad = comp(500_000, 1.0, as_of());
        bad.sqft = 0;
        let result = estimate(&subject(), &[bad], DataQuality::Recorded, as_of());
        assert!(matches!(
            result,
            Err(ValuationError::MalformedComparable { .. })
        ));
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let comps = vec![
            comp(480_000, 0.8, NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
            comp(505_000, 0.65, NaiveDate::from_ymd_opt(2023, 11, 2).unwrap()),
            comp(530_000, 0.9, NaiveDate::from_ymd_opt(2024, 4, 18).unwrap()),
        ];
        let first = estimate(&subject(), &comps, DataQuality::Recorded, as_of()).unwrap();
        let second = estimate(&subject(), &comps, DataQuality::Recorded, as_of()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_age_in_months() {
        let sale = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert!((age_in_months(sale, as_of()) - 91.0 / 30.4375).abs() < 1e-9);
        // future-dated sales do not add confidence
        let future = NaiveDate::from_ymd_opt(2024, 7, 30).unwrap();
        assert_eq!(age_in_months(future, as_of()), 0.0);
    }

    #[test]
    fn test_pricing_adjustments_use_mean_price_per_sqft() {
        let mut a = comp(500_000, 1.0, as_of());
        a.price_per_sqft = 240.0;
        let mut b = comp(500_000, 1.0, as_of());
        b.price_per_sqft = 260.0;

        let rules = pricing_adjustments(&[a, b]);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].factor, AdjustmentFactor::Bedroom);
        assert_eq!(rules[0].per_unit_value, 10_000);
        assert_eq!(rules[1].per_unit_value, 7_500);
        assert_eq!(rules[2].factor, AdjustmentFactor::Sqft);
        assert_eq!(rules[2].per_unit_value, 250);
        assert!(rules
            .iter()
            .all(|r| r.direction == AdjustmentDirection::Positive));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn confidence_is_always_in_unit_interval(
            entries in proptest::collection::vec((10_000i64..5_000_000, 0.0f64..=1.0, 0i64..2000), 0..12),
            synthetic in any::<bool>(),
        ) {
            let comps: Vec<_> = entries
                .iter()
                .map(|(price, similarity, age_days)| {
                    comp(*price, *similarity, as_of() - chrono::Duration::days(*age_days))
                })
                .collect();
            let quality = if synthetic { DataQuality::Synthetic } else { DataQuality::Recorded };

            let valuation = estimate(&subject(), &comps, quality, as_of()).unwrap();
            prop_assert!((0.0..=1.0).contains(&valuation.confidence_score));
        }
    }
}
