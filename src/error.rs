// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::currency::ConversionError;
use crate::service::{ServiceError, SubmitError};
use crate::storage::StoreError;
use crate::validation::Violation;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub violations: Vec<Violation>,
}

/// Error response body.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<Violation>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            violations: Vec::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            violations: self.violations,
        });
        (self.status, body).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(result) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "donation failed validation".to_string(),
                violations: result.violations,
            },
            SubmitError::Routing(e) => Self::unprocessable(e.to_string()),
            e @ (SubmitError::AlreadyInFlight(_) | SubmitError::Duplicate { .. }) => {
                Self::conflict(e.to_string())
            }
            e => {
                error!(error = %e, "Donation submission failed");
                Self::internal(e.to_string())
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            e @ ServiceError::NotFound(_) => Self::not_found(e.to_string()),
            e @ (ServiceError::NotCancellable { .. } | ServiceError::InFlight(_)) => {
                Self::conflict(e.to_string())
            }
            e => {
                error!(error = %e, "Donation operation failed");
                Self::internal(e.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!(error = %err, "Storage failure");
        Self::internal(format!("storage error: {err}"))
    }
}

impl From<ConversionError> for ApiError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::MissingRate(_) => Self::unprocessable(err.to_string()),
            _ => Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::lifecycle::DonationStatus;
    use crate::validation::ValidationResult;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let conflict = ApiError::conflict("busy");
        assert_eq!(conflict.status, StatusCode::CONFLICT);
    }

    #[test]
    fn submit_errors_map_to_status() {
        let in_flight: ApiError = SubmitError::AlreadyInFlight("d1".into()).into();
        assert_eq!(in_flight.status, StatusCode::CONFLICT);

        let duplicate: ApiError = SubmitError::Duplicate {
            id: "d1".into(),
            status: DonationStatus::PendingSync,
        }
        .into();
        assert_eq!(duplicate.status, StatusCode::CONFLICT);

        let not_cancellable: ApiError = ServiceError::NotCancellable {
            id: "d1".into(),
            status: DonationStatus::Completed,
        }
        .into();
        assert_eq!(not_cancellable.status, StatusCode::CONFLICT);

        let stale: ApiError = ConversionError::RefreshFailed("down".into()).into();
        assert_eq!(stale.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }

    #[tokio::test]
    async fn validation_errors_list_violations() {
        let err: ApiError = SubmitError::Validation(ValidationResult {
            violations: vec![Violation::UnsupportedCurrency {
                currency: Currency::Chf,
            }],
        })
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["violations"][0]["code"], "unsupported_currency");
        assert_eq!(body["violations"][0]["currency"], "CHF");
    }
}
