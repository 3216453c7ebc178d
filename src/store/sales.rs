//! Sales-history sources: recorded sales for comparables and quarterly
//! aggregates for market insights

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::cma::comparables::{rank_recorded, ComparableQuery, SalesHistorySource};
use crate::cma::error::SourceError;
use crate::cma::insights::MarketStatsSource;
use crate::cma::types::{PropertyType, QuarterlySales, SaleRecord};

const SALE_COLUMNS: &str = "address, city, state, zip_code, property_type, bedrooms, bathrooms, \
     sqft, year_built, lot_size, sale_price, sale_date, days_on_market, latitude, longitude, \
     image_url, data_source";

/// Reads the `sales_history` table filled by the ingestion pipeline
#[derive(Clone)]
pub struct PgSalesHistory {
    db: PgPool,
}

impl PgSalesHistory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SalesHistorySource for PgSalesHistory {
    async fn recent_sales(&self, query: &ComparableQuery) -> Result<Vec<SaleRecord>, SourceError> {
        let sql = format!(
            r#"
            SELECT {SALE_COLUMNS}
            FROM sales_history
            WHERE zip_code = $1
              AND property_type = $2
              AND bedrooms BETWEEN $3 AND $4
              AND bathrooms BETWEEN $5 AND $6
              AND sqft BETWEEN $7 AND $8
              AND sale_date >= $9
            ORDER BY sale_date DESC, ABS(sqft - $10) ASC
            LIMIT $11
            "#
        );

        let rows = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(&query.zip_code)
            .bind(query.property_type)
            .bind(query.min_bedrooms)
            .bind(query.max_bedrooms)
            .bind(query.min_bathrooms)
            .bind(query.max_bathrooms)
            .bind(query.min_sqft)
            .bind(query.max_sqft)
            .bind(query.sold_after)
            .bind(query.subject_sqft)
            .bind(query.limit as i64)
            .fetch_all(&self.db)
            .await?;

        Ok(rows)
    }
}

#[async_trait]
impl MarketStatsSource for PgSalesHistory {
    async fn quarterly_sales(
        &self,
        zip_code: &str,
        property_type: PropertyType,
        since: NaiveDate,
    ) -> Result<Vec<QuarterlySales>, SourceError> {
        let rows = sqlx::query_as::<_, QuarterlySales>(
            r#"
            SELECT
                EXTRACT(YEAR FROM sale_date)::INT AS year,
                EXTRACT(QUARTER FROM sale_date)::INT AS quarter,
                AVG(sale_price)::FLOAT8 AS avg_price,
                PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY sale_price)::FLOAT8 AS median_price,
                COUNT(*) AS sales_volume,
                AVG(days_on_market)::FLOAT8 AS avg_days_on_market
            FROM sales_history
            WHERE zip_code = $1
              AND property_type = $2
              AND sale_date >= $3
            GROUP BY 1, 2
            ORDER BY 1, 2
            "#,
        )
        .bind(zip_code)
        .bind(property_type)
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}

/// Fixed set of sales held in memory, for tests and local runs without a
/// database
#[derive(Debug, Clone, Default)]
pub struct InMemorySalesHistory {
    sales: Vec<SaleRecord>,
}

impl InMemorySalesHistory {
    pub fn new(sales: Vec<SaleRecord>) -> Self {
        Self { sales }
    }
}

#[async_trait]
impl SalesHistorySource for InMemorySalesHistory {
    async fn recent_sales(&self, query: &ComparableQuery) -> Result<Vec<SaleRecord>, SourceError> {
        Ok(rank_recorded(query, self.sales.clone(), query.limit))
    }
}

#[async_trait]
impl MarketStatsSource for InMemorySalesHistory {
    async fn quarterly_sales(
        &self,
        zip_code: &str,
        property_type: PropertyType,
        since: NaiveDate,
    ) -> Result<Vec<QuarterlySales>, SourceError> {
        let mut buckets: BTreeMap<(i32, i32), Vec<&SaleRecord>> = BTreeMap::new();
        for sale in self.sales.iter().filter(|s| {
            s.zip_code == zip_code && s.property_type == property_type && s.sale_date >= since
        }) {
            let quarter = (sale.sale_date.month0() / 3 + 1) as i32;
            buckets
                .entry((sale.sale_date.year(), quarter))
                .or_default()
                .push(sale);
        }

        Ok(buckets
            .into_iter()
            .map(|((year, quarter), sales)| aggregate(year, quarter, &sales))
            .collect())
    }
}

fn aggregate(year: i32, quarter: i32, sales: &[&SaleRecord]) -> QuarterlySales {
    let mut prices: Vec<f64> = sales.iter().map(|s| s.sale_price as f64).collect();
    prices.sort_by(|a, b| a.total_cmp(b));

    let avg_price = prices.iter().sum::<f64>() / prices.len() as f64;
    let mid = prices.len() / 2;
    let median_price = if prices.len() % 2 == 0 {
        (prices[mid - 1] + prices[mid]) / 2.0
    } else {
        prices[mid]
    };

    let dom: Vec<f64> = sales
        .iter()
        .filter_map(|s| s.days_on_market.map(f64::from))
        .collect();
    let avg_days_on_market = if dom.is_empty() {
        None
    } else {
        Some(dom.iter().sum::<f64>() / dom.len() as f64)
    };

    QuarterlySales {
        year,
        quarter,
        avg_price,
        median_price,
        sales_volume: sales.len() as i64,
        avg_days_on_market,
    }
}
