//! Similarity scoring and feature adjustment of a comparable against the subject
//! Pure functions - no side effects

use crate::cma::types::{ComparableSale, SubjectPropertyCriteria};

/// Dollar value of one bedroom of difference
pub const BEDROOM_VALUE: i64 = 10_000;
/// Dollar value of one bathroom of difference
pub const BATHROOM_VALUE: i64 = 7_500;

const ROOM_PENALTY: f64 = 0.1;
const SQFT_PENALTY: f64 = 0.5;
const DECADE_PENALTY: f64 = 0.05;

/// Score how closely a comparable matches the subject, in [0, 1]
pub fn score(subject: &SubjectPropertyCriteria, comparable: &ComparableSale) -> f64 {
    let mut similarity = 1.0;

    similarity -= ROOM_PENALTY * subject.bedrooms.abs_diff(comparable.bedrooms) as f64;
    similarity -= ROOM_PENALTY * subject.bathrooms.abs_diff(comparable.bathrooms) as f64;

    if subject.sqft > 0 {
        let sqft_gap = subject.sqft.abs_diff(comparable.sqft) as f64;
        similarity -= SQFT_PENALTY * (sqft_gap / subject.sqft as f64);
    }

    if let (Some(subject_year), Some(comp_year)) = (subject.year_built, comparable.year_built) {
        let decades = subject_year.abs_diff(comp_year) as f64 / 10.0;
        similarity -= DECADE_PENALTY * decades;
    }

    similarity.clamp(0.0, 1.0)
}

/// What the comparable would have sold for with the subject's bedroom,
/// bathroom and sqft profile. Not clamped.
pub fn adjust(subject: &SubjectPropertyCriteria, comparable: &ComparableSale) -> i64 {
    let bedroom_delta = (subject.bedrooms as i64 - comparable.bedrooms as i64) * BEDROOM_VALUE;
    let bathroom_delta = (subject.bathrooms as i64 - comparable.bathrooms as i64) * BATHROOM_VALUE;
    let sqft_delta = (subject.sqft as i64 - comparable.sqft as i64) as f64 * comparable.price_per_sqft;

    (comparable.sale_price as f64 + bedroom_delta as f64 + bathroom_delta as f64 + sqft_delta)
        .round() as i64
}

/// Fill in the derived similarity and adjusted price
pub fn apply(subject: &SubjectPropertyCriteria, comparable: ComparableSale) -> ComparableSale {
    let similarity = score(subject, &comparable);
    let adjusted_price = adjust(subject, &comparable);

    ComparableSale {
        similarity,
        adjusted_price,
        ..comparable
    }
}
