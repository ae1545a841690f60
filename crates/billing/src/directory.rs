//! Tenant directory
//!
//! Find-or-create of tenant records by billing email, slug assignment, and
//! reconciliation of the provider customer id. The billing email is the
//! identity key and is matched case-insensitively; creation races are
//! resolved by retrying the lookup after a uniqueness conflict.

use std::sync::Arc;

use uuid::Uuid;

use pickpoint_shared::{Tenant, TenantId};

use crate::error::{BillingError, BillingResult};
use crate::store::{NewTenant, StoreError, TenantStore};

/// Attempts at finding a free slug before falling back to a full random
/// suffix.
const SLUG_ATTEMPTS: usize = 4;

#[derive(Clone)]
pub struct TenantDirectory {
    tenants: Arc<dyn TenantStore>,
}

impl TenantDirectory {
    pub fn new(tenants: Arc<dyn TenantStore>) -> Self {
        Self { tenants }
    }

    /// Load a tenant that must exist.
    pub async fn require(&self, id: TenantId) -> BillingResult<Tenant> {
        self.tenants
            .find_by_id(id)
            .await?
            .ok_or_else(|| BillingError::UnresolvedTenant(id.to_string()))
    }

    pub async fn find_by_id(&self, id: TenantId) -> BillingResult<Option<Tenant>> {
        Ok(self.tenants.find_by_id(id).await?)
    }

    pub async fn find_by_provider_customer_id(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<Tenant>> {
        Ok(self.tenants.find_by_provider_customer_id(customer_id).await?)
    }

    /// Find a tenant by billing email, creating one with trial defaults if
    /// absent. A concurrent creation of the same email loses the insert
    /// race and picks up the winner's row.
    pub async fn find_or_create_by_email(&self, email: &str) -> BillingResult<Tenant> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(BillingError::UnresolvedTenant(
                "empty billing email".to_string(),
            ));
        }

        if let Some(tenant) = self.tenants.find_by_email(&email).await? {
            return Ok(tenant);
        }

        let slug = self.unique_slug(&email).await?;
        match self
            .tenants
            .insert(NewTenant {
                slug,
                billing_email: email.clone(),
                provider_customer_id: None,
            })
            .await
        {
            Ok(tenant) => {
                tracing::info!(
                    tenant_id = %tenant.id,
                    slug = %tenant.slug,
                    "Tenant created from billing contact"
                );
                Ok(tenant)
            }
            Err(StoreError::Conflict(_)) => self
                .tenants
                .find_by_email(&email)
                .await?
                .ok_or_else(|| BillingError::UnresolvedTenant(email)),
            Err(e) => Err(e.into()),
        }
    }

    /// Make the stored provider customer id equal the one carried by the
    /// event being processed. Absent ids are backfilled; a differing id is
    /// replaced and logged, since the event is the fresher source.
    pub async fn reconcile_provider_customer(
        &self,
        tenant: &Tenant,
        customer_id: &str,
    ) -> BillingResult<()> {
        match tenant.provider_customer_id.as_deref() {
            Some(stored) if stored == customer_id => Ok(()),
            stored => {
                if let Some(previous) = stored {
                    tracing::warn!(
                        tenant_id = %tenant.id,
                        previous = %previous,
                        customer_id = %customer_id,
                        "Provider customer id changed, reconciling to event value"
                    );
                }
                self.tenants
                    .set_provider_customer_id(tenant.id, customer_id)
                    .await?;
                Ok(())
            }
        }
    }

    async fn unique_slug(&self, email: &str) -> BillingResult<String> {
        let base = slugify(email.split('@').next().unwrap_or(email));
        for attempt in 0..SLUG_ATTEMPTS {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, random_suffix(4))
            };
            if self.tenants.find_by_slug(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Ok(format!("{}-{}", base, random_suffix(10)))
    }
}

/// Lowercase, alphanumerics kept, everything else collapsed into single
/// dashes.
fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "tenant".to_string()
    } else {
        slug
    }
}

fn random_suffix(len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..len.min(hex.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("depot.nord+billing"), "depot-nord-billing");
        assert_eq!(slugify("Depot Nord"), "depot-nord");
        assert_eq!(slugify("--..--"), "tenant");
        assert_eq!(slugify("a"), "a");
    }

    #[test]
    fn test_random_suffix_length() {
        assert_eq!(random_suffix(4).len(), 4);
        assert_eq!(random_suffix(10).len(), 10);
    }
}
