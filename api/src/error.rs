use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use portfolio::PortfolioError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Healthy service, but the upstream data it depends on is not there yet.
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Serialize)]
struct PanicBody {
    message: &'static str,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Upstream(_) => {
                error!(status = status.as_u16(), error = %self, "request failed")
            }
            ApiError::Unavailable(_) => warn!(error = %self, "market data unavailable"),
            ApiError::Validation(_) | ApiError::NotFound(_) => {}
        }
        let body = Json(ErrorBody {
            detail: self.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<PortfolioError> for ApiError {
    fn from(err: PortfolioError) -> Self {
        match err {
            PortfolioError::Validation(_) => ApiError::Validation(err.to_string()),
            PortfolioError::NotFound(_) => ApiError::NotFound("Portfolio item not found".into()),
        }
    }
}

/// Last-resort boundary for handler panics: log, answer with a generic 500,
/// keep serving.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "unhandled panic while serving request");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(PanicBody {
            message: "An internal server error occurred.",
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn maps_variants_to_status_codes() {
        let cases = [
            (ApiError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::Upstream("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn portfolio_errors_convert() {
        let not_found: ApiError = PortfolioError::NotFound(Uuid::new_v4()).into();
        assert!(matches!(not_found, ApiError::NotFound(_)));
        let invalid: ApiError = PortfolioError::Validation("quantity".into()).into();
        assert!(matches!(invalid, ApiError::Validation(msg) if msg.contains("quantity")));
    }

    #[test]
    fn panic_payload_becomes_generic_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
