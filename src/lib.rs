// Library module for testable functions

pub mod api;
pub mod cma;
pub mod config;
pub mod ingestion;
pub mod store;

/// Calculate price per square foot
/// Formula: sale_price / sqft
pub fn calculate_price_per_sqft(sale_price: i64, sqft: i32) -> Option<f64> {
    if sale_price <= 0 || sqft <= 0 {
        return None;
    }
    Some(sale_price as f64 / sqft as f64)
}
