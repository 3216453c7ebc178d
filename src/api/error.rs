//! HTTP error mapping for the CMA API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::api::request::FieldViolation;
use crate::cma::error::CmaError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request validation failed")]
    Validation(Vec<FieldViolation>),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("CMA report not found: {0}")]
    NotFound(i64),

    #[error("Report generation failed: {0}")]
    Generation(CmaError),
}

impl From<CmaError> for ApiError {
    fn from(err: CmaError) -> Self {
        match err {
            CmaError::NotFound(id) => ApiError::NotFound(id),
            other => ApiError::Generation(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, violations) = match self {
            ApiError::Validation(violations) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Request validation failed".to_string(),
                Some(violations),
            ),
            ApiError::MalformedBody(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("CMA report not found: {}", id),
                None,
            ),
            ApiError::Generation(e) => {
                tracing::error!("CMA request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "error": message,
            "status": status.as_u16(),
        });
        if let Some(violations) = violations {
            body["violations"] = json!(violations);
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_status_codes() {
        let validation = ApiError::Validation(vec![FieldViolation::new("sqft", "must be at least 100")]);
        assert_eq!(validation.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let missing: ApiError = CmaError::NotFound(9).into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let store: ApiError = CmaError::Store(StoreError::Decode("bad row".to_string())).into();
        assert_eq!(store.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
