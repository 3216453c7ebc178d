//! Comparable sales provider - recorded sales first, seeded synthetic fallback otherwise

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Months, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::calculate_price_per_sqft;
use crate::cma::error::SourceError;
use crate::cma::similarity;
use crate::cma::types::{
    ComparableSale, ComparableSet, DataQuality, PropertyType, SaleRecord, SubjectPropertyCriteria,
};
use crate::cma::valuation::BASE_PRICE_PER_SQFT;
use crate::store::{CmaStore, StoreError};

pub const DEFAULT_MAX_COMPARABLES: usize = 6;

const SEARCH_WINDOW_MONTHS: u32 = 12;
const SQFT_TOLERANCE: f64 = 0.2;
const PRICE_JITTER: f64 = 0.15;
const EARTH_RADIUS_MILES: f64 = 3958.8;

const SYNTHETIC_STREETS: &[&str] = &[
    "Maple Ave",
    "Oak St",
    "Cedar Ln",
    "Pine Dr",
    "Elm St",
    "Willow Way",
    "Birch Rd",
    "Sunset Blvd",
    "Park Pl",
    "Lakeview Dr",
];

/// Read-only access to recorded sales. Implementations must be safe for
/// concurrent queries.
#[async_trait]
pub trait SalesHistorySource: Send + Sync {
    async fn recent_sales(&self, query: &ComparableQuery) -> Result<Vec<SaleRecord>, SourceError>;
}

/// Filter for candidate comparables around a subject property
#[derive(Debug, Clone, PartialEq)]
pub struct ComparableQuery {
    pub zip_code: String,
    pub property_type: PropertyType,
    pub min_bedrooms: i32,
    pub max_bedrooms: i32,
    pub min_bathrooms: i32,
    pub max_bathrooms: i32,
    pub min_sqft: i32,
    pub max_sqft: i32,
    pub subject_sqft: i32,
    pub sold_after: NaiveDate,
    pub limit: usize,
}

impl ComparableQuery {
    pub fn from_criteria(criteria: &SubjectPropertyCriteria, as_of: NaiveDate, limit: usize) -> Self {
        let sqft = criteria.sqft as f64;
        let sold_after = as_of
            .checked_sub_months(Months::new(SEARCH_WINDOW_MONTHS))
            .unwrap_or(as_of - ChronoDuration::days(365));

        ComparableQuery {
            zip_code: criteria.zip_code.clone(),
            property_type: criteria.property_type,
            min_bedrooms: criteria.bedrooms.saturating_sub(1),
            max_bedrooms: criteria.bedrooms.saturating_add(1),
            min_bathrooms: criteria.bathrooms.saturating_sub(1),
            max_bathrooms: criteria.bathrooms.saturating_add(1),
            min_sqft: (sqft * (1.0 - SQFT_TOLERANCE)).ceil() as i32,
            max_sqft: (sqft * (1.0 + SQFT_TOLERANCE)).floor() as i32,
            subject_sqft: criteria.sqft,
            sold_after,
            limit,
        }
    }

    pub fn matches(&self, sale: &SaleRecord) -> bool {
        sale.zip_code == self.zip_code
            && sale.property_type == self.property_type
            && (self.min_bedrooms..=self.max_bedrooms).contains(&sale.bedrooms)
            && (self.min_bathrooms..=self.max_bathrooms).contains(&sale.bathrooms)
            && (self.min_sqft..=self.max_sqft).contains(&sale.sqft)
            && sale.sale_date >= self.sold_after
    }
}

pub struct ComparableSalesProvider {
    source: Arc<dyn SalesHistorySource>,
    store: Arc<dyn CmaStore>,
    query_timeout: Duration,
}

impl ComparableSalesProvider {
    pub fn new(
        source: Arc<dyn SalesHistorySource>,
        store: Arc<dyn CmaStore>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            source,
            store,
            query_timeout,
        }
    }

    /// Find up to `max_count` scored comparables and persist them under the
    /// report. Source failures fall back to synthetic comparables; only
    /// persistence errors are returned.
    pub async fn find_comparables(
        &self,
        report_id: i64,
        criteria: &SubjectPropertyCriteria,
        max_count: usize,
        as_of: NaiveDate,
    ) -> Result<ComparableSet, StoreError> {
        let query = ComparableQuery::from_criteria(criteria, as_of, max_count);

        let recorded = match timeout(self.query_timeout, self.source.recent_sales(&query)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                warn!(report_id, "Sales history unavailable, using synthetic comparables: {}", e);
                Vec::new()
            }
            Err(_) => {
                let e = SourceError::Timeout(self.query_timeout.as_millis());
                warn!(report_id, "Sales history unavailable, using synthetic comparables: {}", e);
                Vec::new()
            }
        };

        let scored: Vec<ComparableSale> = rank_recorded(&query, recorded, max_count)
            .iter()
            .filter_map(|sale| to_comparable(criteria, sale))
            .collect();

        let set = if scored.is_empty() {
            info!(
                report_id,
                "No usable recorded sales for {} {} - generating {} synthetic comparables",
                criteria.zip_code,
                criteria.property_type,
                max_count
            );
            let mut rng = StdRng::seed_from_u64(seed_for(criteria));
            ComparableSet {
                sales: synthesize_comparables(criteria, max_count, as_of, &mut rng),
                quality: DataQuality::Synthetic,
            }
        } else {
            ComparableSet {
                sales: scored,
                quality: DataQuality::Recorded,
            }
        };

        self.store.insert_comparables(report_id, &set.sales).await?;
        debug!(report_id, "Stored {} comparables", set.sales.len());

        Ok(set)
    }
}

/// Keep matching sales, most recent first, closer size breaking ties
pub fn rank_recorded(
    query: &ComparableQuery,
    sales: Vec<SaleRecord>,
    max_count: usize,
) -> Vec<SaleRecord> {
    let mut matching: Vec<SaleRecord> = sales.into_iter().filter(|s| query.matches(s)).collect();

    matching.sort_by(|a, b| {
        b.sale_date.cmp(&a.sale_date).then_with(|| {
            let gap_a = a.sqft.abs_diff(query.subject_sqft);
            let gap_b = b.sqft.abs_diff(query.subject_sqft);
            gap_a.cmp(&gap_b)
        })
    });
    matching.truncate(max_count);

    matching
}

/// Score a recorded sale against the subject. Rows without a usable price
/// per sqft are dropped.
pub fn to_comparable(criteria: &SubjectPropertyCriteria, sale: &SaleRecord) -> Option<ComparableSale> {
    let price_per_sqft = match calculate_price_per_sqft(sale.sale_price, sale.sqft) {
        Some(ppsf) => ppsf,
        None => {
            debug!("Skipping sale {} without a usable price per sqft", sale.address);
            return None;
        }
    };

    let distance = match (criteria.latitude, criteria.longitude, &sale.latitude, &sale.longitude) {
        (Some(lat), Some(lon), Some(sale_lat), Some(sale_lon)) => {
            match (sale_lat.to_f64(), sale_lon.to_f64()) {
                (Some(sale_lat), Some(sale_lon)) => distance_miles(lat, lon, sale_lat, sale_lon),
                _ => 0.0,
            }
        }
        _ => 0.0,
    };

    let comparable = ComparableSale {
        address: sale.address.clone(),
        city: sale.city.clone(),
        state: sale.state.clone(),
        zip_code: sale.zip_code.clone(),
        sale_price: sale.sale_price,
        sale_date: sale.sale_date,
        bedrooms: sale.bedrooms,
        bathrooms: sale.bathrooms,
        sqft: sale.sqft,
        price_per_sqft,
        year_built: sale.year_built,
        lot_size: sale.lot_size,
        distance_from_subject: distance,
        adjusted_price: 0,
        similarity: 0.0,
        image_url: sale.image_url.clone(),
    };

    Some(similarity::apply(criteria, comparable))
}

/// Plausible comparables perturbed around the subject: bedrooms and
/// bathrooms within one, sqft within 20%, price within 15% of base rate.
pub fn synthesize_comparables<R: Rng>(
    criteria: &SubjectPropertyCriteria,
    count: usize,
    as_of: NaiveDate,
    rng: &mut R,
) -> Vec<ComparableSale> {
    let mut sales: Vec<ComparableSale> = (0..count)
        .map(|_| {
            let bedrooms = criteria.bedrooms.saturating_add(rng.gen_range(-1..=1)).max(1);
            let bathrooms = criteria.bathrooms.saturating_add(rng.gen_range(-1..=1)).max(1);
            let sqft_factor = rng.gen_range((1.0 - SQFT_TOLERANCE)..=(1.0 + SQFT_TOLERANCE));
            let sqft = ((criteria.sqft as f64 * sqft_factor).round() as i32).max(1);

            let price_factor = rng.gen_range((1.0 - PRICE_JITTER)..=(1.0 + PRICE_JITTER));
            let sale_price = (sqft as f64 * BASE_PRICE_PER_SQFT * price_factor).round() as i64;
            let sale_date = as_of - ChronoDuration::days(rng.gen_range(7..=365));

            let year_built = criteria.year_built.map(|y| y.saturating_add(rng.gen_range(-10..=10)));
            let lot_size = criteria
                .lot_size
                .map(|l| (l as f64 * rng.gen_range(0.8..=1.2)).round() as i32);

            let street = SYNTHETIC_STREETS[rng.gen_range(0..SYNTHETIC_STREETS.len())];
            let address = format!("{} {}", rng.gen_range(100..10_000), street);
            let distance = (rng.gen_range(0.2..=3.0_f64) * 10.0).round() / 10.0;

            let comparable = ComparableSale {
                address,
                city: "Unknown".to_string(),
                state: "Unknown".to_string(),
                zip_code: criteria.zip_code.clone(),
                sale_price,
                sale_date,
                bedrooms,
                bathrooms,
                sqft,
                price_per_sqft: sale_price as f64 / sqft as f64,
                year_built,
                lot_size,
                distance_from_subject: distance,
                adjusted_price: 0,
                similarity: 0.0,
                image_url: None,
            };

            similarity::apply(criteria, comparable)
        })
        .collect();

    sales.sort_by(|a, b| {
        b.sale_date.cmp(&a.sale_date).then_with(|| {
            let gap_a = a.sqft.abs_diff(criteria.sqft);
            let gap_b = b.sqft.abs_diff(criteria.sqft);
            gap_a.cmp(&gap_b)
        })
    });

    sales
}

/// Stable seed derived from the subject criteria
pub fn seed_for(criteria: &SubjectPropertyCriteria) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(criteria.zip_code.as_bytes());
    hasher.update(criteria.property_type.to_string().as_bytes());
    hasher.update(criteria.bedrooms.to_le_bytes());
    hasher.update(criteria.bathrooms.to_le_bytes());
    hasher.update(criteria.sqft.to_le_bytes());
    hasher.update(criteria.year_built.unwrap_or(0).to_le_bytes());
    hasher.update(criteria.lot_size.unwrap_or(0).to_le_bytes());
    let digest = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}

/// Great-circle distance in miles, rounded to one decimal
pub fn distance_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let miles = 2.0 * EARTH_RADIUS_MILES * a.sqrt().asin();

    (miles * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cma::valuation;
    use crate::store::{InMemoryCmaStore, InMemorySalesHistory};
    use crate::cma::types::{NewCmaReport, PricingTier};
    use rust_decimal::Decimal;

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

    fn sale(address: &str, sqft: i32, sale_date: NaiveDate) -> SaleRecord {
        SaleRecord {
            address: address.to_string(),
            city: "Beverly Hills".to_string(),
            state: "CA".to_string(),
            zip_code: "90210".to_string(),
            property_type: PropertyType::SingleFamilyHome,
            bedrooms: 3,
            bathrooms: 2,
            sqft,
            year_built: Some(1995),
            lot_size: None,
            sale_price: sqft as i64 * 250,
            sale_date,
            days_on_market: Some(30),
            latitude: None,
            longitude: None,
            image_url: None,
            data_source: "test".to_string(),
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SalesHistorySource for FailingSource {
        async fn recent_sales(&self, _query: &ComparableQuery) -> Result<Vec<SaleRecord>, SourceError> {
            Err(SourceError::Unavailable("connection refused".to_string()))
        }
    }

    struct HangingSource;

    #[async_trait]
    impl SalesHistorySource for HangingSource {
        async fn recent_sales(&self, _query: &ComparableQuery) -> Result<Vec<SaleRecord>, SourceError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    async fn new_report(store: &InMemoryCmaStore) -> i64 {
        store
            .insert_report(&NewCmaReport {
                user_id: "user-1".to_string(),
                property_id: None,
                criteria: subject(),
                pricing_tier: PricingTier::Basic,
            })
            .await
            .unwrap()
            .id
    }

    #[test]
    fn test_query_bounds() {
        let query = ComparableQuery::from_criteria(&subject(), as_of(), 6);
        assert_eq!((query.min_bedrooms, query.max_bedrooms), (2, 4));
        assert_eq!((query.min_bathrooms, query.max_bathrooms), (1, 3));
        assert_eq!((query.min_sqft, query.max_sqft), (1600, 2400));
        assert_eq!(query.sold_after, NaiveDate::from_ymd_opt(2023, 6, 30).unwrap());
    }

    #[test]
    fn test_query_filters_out_of_range_sales() {
        let query = ComparableQuery::from_criteria(&subject(), as_of(), 6);
        let recent = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert!(query.matches(&sale("1 A St", 2000, recent)));
        assert!(!query.matches(&sale("2 A St", 2500, recent)));
        assert!(!query.matches(&sale("3 A St", 2000, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())));

        let mut other_zip = sale("4 A St", 2000, recent);
        other_zip.zip_code = "90211".to_string();
        assert!(!query.matches(&other_zip));

        let mut condo = sale("5 A St", 2000, recent);
        condo.property_type = PropertyType::Condo;
        assert!(!query.matches(&condo));

        let mut big = sale("6 A St", 2000, recent);
        big.bedrooms = 5;
        assert!(!query.matches(&big));
    }

    #[test]
    fn test_rank_by_recency_then_size_gap() {
        let query = ComparableQuery::from_criteria(&subject(), as_of(), 6);
        let may = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let april = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();

        let ranked = rank_recorded(
            &query,
            vec![
                sale("older", 2000, april),
                sale("far size", 2300, may),
                sale("near size", 2050, may),
            ],
            2,
        );

        let addresses: Vec<_> = ranked.iter().map(|s| s.address.as_str()).collect();
        assert_eq!(addresses, vec!["near size", "far size"]);
    }

    #[test]
    fn test_to_comparable_scores_and_measures_distance() {
        let mut criteria = subject();
        criteria.latitude = Some(34.0736);
        criteria.longitude = Some(-118.4004);

        let mut recorded = sale("9 Palm Dr", 1800, as_of());
        recorded.latitude = Some(Decimal::new(340901, 4));
        recorded.longitude = Some(Decimal::new(-1184065, 4));

        let comp = to_comparable(&criteria, &recorded).unwrap();
        assert_eq!(comp.price_per_sqft, 250.0);
        assert_eq!(comp.adjusted_price, 450_000 + 200 * 250);
        assert!((comp.similarity - 0.95).abs() < 1e-9);
        assert!(comp.distance_from_subject > 1.0 && comp.distance_from_subject < 1.5);
    }

    #[test]
    fn test_synthetic_comparables_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(seed_for(&subject()));
        let comps = synthesize_comparables(&subject(), 6, as_of(), &mut rng);

        assert_eq!(comps.len(), 6);
        for comp in &comps {
            assert!((2..=4).contains(&comp.bedrooms));
            assert!((1..=3).contains(&comp.bathrooms));
            assert!((1600..=2400).contains(&comp.sqft));
            assert!(comp.sale_price > 0);
            let rate = comp.sale_price as f64 / comp.sqft as f64;
            assert!(rate >= 169.9 && rate <= 230.1);
            assert!((0.0..=1.0).contains(&comp.similarity));
            assert!(comp.sale_date < as_of());
        }
    }

    #[test]
    fn test_synthetic_comparables_are_reproducible() {
        let mut first_rng = StdRng::seed_from_u64(seed_for(&subject()));
        let mut second_rng = StdRng::seed_from_u64(seed_for(&subject()));

        let first = synthesize_comparables(&subject(), 6, as_of(), &mut first_rng);
        let second = synthesize_comparables(&subject(), 6, as_of(), &mut second_rng);
        assert_eq!(first, second);
    }

    #[test]
    fn test_seed_depends_on_criteria() {
        let mut other = subject();
        other.sqft = 2100;
        assert_eq!(seed_for(&subject()), seed_for(&subject()));
        assert_ne!(seed_for(&subject()), seed_for(&other));
    }

    #[test]
    fn test_distance_miles() {
        assert_eq!(distance_miles(34.0, -118.0, 34.0, -118.0), 0.0);
        // one degree of latitude is roughly 69 miles
        let miles = distance_miles(34.0, -118.0, 35.0, -118.0);
        assert!((miles - 69.1).abs() < 0.2);
    }

    #[tokio::test]
    async fn test_recorded_sales_are_used_and_persisted() {
        let store = Arc::new(InMemoryCmaStore::default());
        let recent = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let source = Arc::new(InMemorySalesHistory::new(vec![
            sale("1 Canon Dr", 1950, recent),
            sale("2 Canon Dr", 2100, recent),
        ]));
        let provider = ComparableSalesProvider::new(source, store.clone(), Duration::from_secs(1));

        let report_id = new_report(&store).await;
        let set = provider
            .find_comparables(report_id, &subject(), 6, as_of())
            .await
            .unwrap();

        assert_eq!(set.quality, DataQuality::Recorded);
        assert_eq!(set.sales.len(), 2);
        assert_eq!(set.sales[0].address, "1 Canon Dr");
        assert_eq!(store.list_comparables(report_id).await.unwrap(), set.sales);
    }

    #[tokio::test]
    async fn test_sparse_zip_falls_back_to_synthetic() {
        let store = Arc::new(InMemoryCmaStore::default());
        let source = Arc::new(InMemorySalesHistory::new(Vec::new()));
        let provider = ComparableSalesProvider::new(source, store.clone(), Duration::from_secs(1));

        let report_id = new_report(&store).await;
        let set = provider
            .find_comparables(report_id, &subject(), 6, as_of())
            .await
            .unwrap();

        assert_eq!(set.quality, DataQuality::Synthetic);
        assert_eq!(set.sales.len(), 6);
        for comp in &set.sales {
            assert!((2..=4).contains(&comp.bedrooms));
            assert!((1..=3).contains(&comp.bathrooms));
            assert!((1600..=2400).contains(&comp.sqft));
        }

        let valuation = valuation::estimate(&subject(), &set.sales, set.quality, as_of()).unwrap();
        assert!(valuation.estimated_value > 0);
        assert!(valuation.confidence_score < 0.5);
        assert_eq!(store.list_comparables(report_id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_unreachable_source_falls_back_to_synthetic() {
        let store = Arc::new(InMemoryCmaStore::default());
        let provider =
            ComparableSalesProvider::new(Arc::new(FailingSource), store.clone(), Duration::from_secs(1));

        let report_id = new_report(&store).await;
        let set = provider
            .find_comparables(report_id, &subject(), 4, as_of())
            .await
            .unwrap();

        assert_eq!(set.quality, DataQuality::Synthetic);
        assert_eq!(set.sales.len(), 4);
    }

    #[test]
    fn test_query_bounds_saturate_at_extremes() {
        let mut criteria = subject();
        criteria.bedrooms = i32::MAX;
        criteria.bathrooms = i32::MAX;

        let query = ComparableQuery::from_criteria(&criteria, as_of(), 6);
        assert_eq!((query.min_bedrooms, query.max_bedrooms), (i32::MAX - 1, i32::MAX));
        assert_eq!((query.min_bathrooms, query.max_bathrooms), (i32::MAX - 1, i32::MAX));
    }

    #[test]
    fn test_synthetic_comparables_saturate_at_extremes() {
        let mut criteria = subject();
        criteria.bedrooms = i32::MAX;
        criteria.bathrooms = i32::MAX;
        criteria.year_built = Some(i32::MAX);

        let mut rng = StdRng::seed_from_u64(seed_for(&criteria));
        let comps = synthesize_comparables(&criteria, 6, as_of(), &mut rng);

        assert_eq!(comps.len(), 6);
        for comp in &comps {
            assert!(comp.bedrooms >= i32::MAX - 1);
            assert!(comp.year_built.unwrap() >= i32::MAX - 10);
            assert!((0.0..=1.0).contains(&comp.similarity));
        }
    }

    #[tokio::test]
    async fn test_unusable_recorded_sales_fall_back_to_synthetic() {
        let store = Arc::new(InMemoryCmaStore::default());
        let mut unpriced = sale("1 Canon Dr", 2000, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        unpriced.sale_price = 0;
        let source = Arc::new(InMemorySalesHistory::new(vec![unpriced]));
        let provider = ComparableSalesProvider::new(source, store.clone(), Duration::from_secs(1));

        let report_id = new_report(&store).await;
        let set = provider
            .find_comparables(report_id, &subject(), 6, as_of())
            .await
            .unwrap();

        assert_eq!(set.quality, DataQuality::Synthetic);
        assert_eq!(set.sales.len(), 6);
        assert!(set.sales.iter().all(|c| c.sale_price > 0));
        assert_eq!(store.list_comparables(report_id).await.unwrap().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out_to_synthetic() {
        let store = Arc::new(InMemoryCmaStore::default());
        let provider = ComparableSalesProvider::new(
            Arc::new(HangingSource),
            store.clone(),
            Duration::from_millis(50),
        );

        let report_id = new_report(&store).await;
        let set = provider
            .find_comparables(report_id, &subject(), 6, as_of())
            .await
            .unwrap();

        assert_eq!(set.quality, DataQuality::Synthetic);
    }
}
