//! Entitlement-gating middleware
//!
//! Classifies every inbound request as public, auth-only, or gated from
//! static configuration, resolves the tenant for the non-public classes,
//! and denies gated requests whose entitlement check fails. On any error
//! the request is rejected; there is no path that falls through to a
//! protected handler.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use pickpoint_billing::{compute_entitlement, Entitlement, SubscriptionStore};
use pickpoint_shared::{SubscriptionProjection, Tenant};

use crate::error::ApiError;
use crate::state::AppState;
use crate::tenancy::ResolveError;

/// Routes served without any identity or entitlement checks.
const PUBLIC_ROUTES: &[&str] = &["/health", "/v1/billing/webhook"];

/// Routes that need a resolved tenant but are served to blocked tenants,
/// so the frontend can render the reactivation screen.
const AUTH_ONLY_ROUTES: &[&str] = &["/v1/billing/entitlement"];

/// Static access classification of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    AuthOnly,
    Gated,
}

impl RouteClass {
    /// Classification is static configuration keyed on the request path;
    /// everything not listed is gated.
    pub fn classify(path: &str) -> Self {
        if PUBLIC_ROUTES.contains(&path) {
            RouteClass::Public
        } else if AUTH_ONLY_ROUTES.contains(&path) {
            RouteClass::AuthOnly
        } else {
            RouteClass::Gated
        }
    }
}

/// Immutable per-request context built by the firewall and handed to
/// downstream handlers as an extension.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant: Tenant,
    pub subscription: Option<SubscriptionProjection>,
    pub entitlement: Entitlement,
}

/// Firewall middleware applied to the whole router.
pub async fn firewall(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let class = RouteClass::classify(&path);

    match class {
        RouteClass::Public => next.run(request).await,
        RouteClass::AuthOnly | RouteClass::Gated => {
            let ctx = match build_context(&state, request.headers()).await {
                Ok(ctx) => ctx,
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "Firewall denied request");
                    return err.into_response();
                }
            };

            if class == RouteClass::Gated && !ctx.entitlement.can_use_app {
                tracing::info!(
                    path = %path,
                    tenant_id = %ctx.tenant.id,
                    reason = ?ctx.entitlement.reason,
                    "Gated request blocked by entitlement"
                );
                return ApiError::PaymentRequired {
                    tenant_id: ctx.tenant.id,
                    entitlement: ctx.entitlement,
                }
                .into_response();
            }

            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
    }
}

/// Resolve the tenant and compute its entitlement. Every failure maps to a
/// denial; resolution failures are client errors, store failures are
/// server errors.
async fn build_context(state: &AppState, headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let tenant_id = state
        .tenant_resolver
        .resolve(headers)
        .await
        .map_err(|e| match e {
            ResolveError::Unresolved => ApiError::TenantNotResolved,
            ResolveError::Unavailable(msg) => ApiError::Internal(msg),
        })?;

    let tenant = state.billing.directory.require(tenant_id).await?;

    let subscription = state
        .billing
        .subscriptions
        .current_for_tenant(tenant.id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let plan = match subscription.as_ref().and_then(|s| s.plan_id) {
        Some(plan_id) => state
            .billing
            .catalog
            .find(plan_id)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        None => None,
    };

    let entitlement = compute_entitlement(&tenant, subscription.as_ref(), plan.as_ref());

    Ok(RequestContext {
        tenant,
        subscription,
        entitlement,
    })
}
