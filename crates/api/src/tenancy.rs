//! Tenant identity resolution
//!
//! The rest of the platform resolves tenants from subdomains and session
//! tokens; this subsystem consumes that as a black box behind
//! `TenantResolver`. The shipped implementation resolves the tenant slug
//! header against the tenant store; tests substitute their own resolvers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use thiserror::Error;

use pickpoint_billing::TenantStore;
use pickpoint_shared::TenantId;

/// Header carrying the tenant slug set by the edge router.
pub const TENANT_SLUG_HEADER: &str = "x-tenant-slug";

#[derive(Debug, Error)]
pub enum ResolveError {
    /// No identity in the request, or it matches no tenant. Client error;
    /// not retried.
    #[error("tenant not resolved")]
    Unresolved,

    /// The identity backend failed; the request must be denied with a
    /// server error.
    #[error("identity backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TenantResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<TenantId, ResolveError>;
}

/// Resolves the tenant slug header through the tenant store.
pub struct SlugHeaderResolver {
    tenants: Arc<dyn TenantStore>,
}

impl SlugHeaderResolver {
    pub fn new(tenants: Arc<dyn TenantStore>) -> Self {
        Self { tenants }
    }
}

#[async_trait]
impl TenantResolver for SlugHeaderResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<TenantId, ResolveError> {
        let slug = headers
            .get(TENANT_SLUG_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ResolveError::Unresolved)?;

        let tenant = self
            .tenants
            .find_by_slug(slug)
            .await
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        tenant.map(|t| t.id).ok_or(ResolveError::Unresolved)
    }
}
