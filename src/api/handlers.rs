use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::request::CmaRequest;
use crate::api::AppState;
use crate::cma::types::{
    CmaReport, ComparableSale, CompleteCmaReport, MarketInsight, PricingAdjustmentRule,
};

pub const USER_ID_HEADER: &str = "x-user-id";
const ANONYMOUS_USER: &str = "anonymous";

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub message: String,
    pub status: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "CMA API is running!".to_string(),
        status: "ok".to_string(),
    })
}

pub async fn create_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CmaRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CmaReport>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::MalformedBody(e.body_text()))?;

    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_USER);

    let validated = request.validate(user_id).map_err(ApiError::Validation)?;
    let report = state
        .service
        .generate(validated.report, validated.max_comparables)
        .await?;

    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CmaReport>, ApiError> {
    Ok(Json(state.service.report(id).await?))
}

pub async fn get_comparables(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ComparableSale>>, ApiError> {
    Ok(Json(state.service.comparables(id).await?))
}

pub async fn get_insights(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<MarketInsight>>, ApiError> {
    Ok(Json(state.service.insights(id).await?))
}

pub async fn get_adjustments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PricingAdjustmentRule>>, ApiError> {
    Ok(Json(state.service.adjustments(id).await?))
}

pub async fn get_complete_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CompleteCmaReport>, ApiError> {
    Ok(Json(state.service.complete(id).await?))
}

pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
