//! Billing routes: webhook ingress and the entitlement read surface

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde::Serialize;

use pickpoint_billing::{Entitlement, IngestOutcome, PlanSummary};
use pickpoint_shared::TenantId;

use crate::error::{ApiError, ApiResult};
use crate::firewall::RequestContext;
use crate::state::AppState;

/// Handle provider webhook events.
///
/// 200 acknowledges processed, duplicate, and ignored deliveries; 400
/// rejects bad signatures permanently; anything else surfaces as a 5xx so
/// the provider redelivers.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<StatusCode> {
    tracing::info!(body_len = body.len(), "Provider webhook received");

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Provider webhook missing signature header");
            ApiError::BadRequest("Missing signature header".to_string())
        })?;

    let outcome = state
        .billing
        .webhooks
        .ingest(&body, signature)
        .await
        .map_err(|e| {
            if e.is_retryable() {
                tracing::error!(error = %e, "Webhook processing failed, provider will retry");
            } else {
                tracing::warn!(error = %e, "Webhook delivery rejected");
            }
            ApiError::from(e)
        })?;

    match outcome {
        IngestOutcome::Processed => tracing::info!("Provider webhook processed"),
        IngestOutcome::Duplicate => tracing::info!("Provider webhook acknowledged as duplicate"),
        IngestOutcome::Ignored => tracing::info!("Provider webhook ignored"),
    }

    Ok(StatusCode::OK)
}

/// Entitlement read surface. Auth-only: blocked tenants still read their
/// entitlement so the frontend can route to the right screen.
pub async fn entitlement(Extension(ctx): Extension<RequestContext>) -> Json<Entitlement> {
    Json(ctx.entitlement)
}

/// Tenant profile response for the gated sample surface.
#[derive(Debug, Serialize)]
pub struct TenantProfile {
    pub tenant_id: TenantId,
    pub slug: String,
    pub billing_email: String,
    pub subscription_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSummary>,
}

/// Gated route: runs only for tenants that passed the entitlement check,
/// consuming the context the firewall attached.
pub async fn tenant_profile(Extension(ctx): Extension<RequestContext>) -> Json<TenantProfile> {
    Json(TenantProfile {
        tenant_id: ctx.tenant.id,
        slug: ctx.tenant.slug,
        billing_email: ctx.tenant.billing_email,
        subscription_active: ctx.entitlement.subscription_active,
        provider_subscription_id: ctx
            .subscription
            .map(|s| s.provider_subscription_id),
        plan: ctx.entitlement.plan,
    })
}
