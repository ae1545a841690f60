//! API error responses
//!
//! Maps subsystem errors onto HTTP statuses. The firewall's denial paths
//! are explicit variants so nothing can fall through to a protected
//! handler by accident, and blocked tenants always receive a structured
//! 402 instead of a raw 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use pickpoint_billing::{BillingError, Entitlement};
use pickpoint_shared::TenantId;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request (bad signature, missing header, bad payload).
    /// Permanent: webhook deliveries answered this way are not retried.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No tenant identity could be resolved for the request.
    #[error("tenant not resolved")]
    TenantNotResolved,

    /// The entitlement check denied access to a gated route.
    #[error("payment required")]
    PaymentRequired {
        tenant_id: TenantId,
        entitlement: Entitlement,
    },

    /// Unexpected failure; retryable from the caller's point of view.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidSignature => {
                ApiError::BadRequest("Invalid webhook signature".to_string())
            }
            BillingError::MalformedEvent(msg) => ApiError::BadRequest(msg),
            BillingError::UnresolvedTenant(_) => ApiError::TenantNotResolved,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "BAD_REQUEST", "message": message}),
            ),
            ApiError::TenantNotResolved => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "TENANT_NOT_RESOLVED"}),
            ),
            ApiError::PaymentRequired {
                tenant_id,
                entitlement,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": "PAYMENT_REQUIRED",
                    "reason": entitlement.reason,
                    "entitlement": entitlement,
                    "tenant_id": tenant_id,
                }),
            ),
            ApiError::Internal(message) => {
                // Detail stays in the logs; the caller gets a generic 500.
                tracing::error!(error = %message, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "INTERNAL"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
