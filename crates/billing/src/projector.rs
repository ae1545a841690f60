//! Subscription projector
//!
//! Turns provider subscription snapshots into the local projection row
//! keyed by (provider, provider_subscription_id). Tenant and plan foreign
//! keys are resolved through explicit ordered strategy lists; a snapshot
//! that cannot resolve one of them is stored with the corresponding null
//! id rather than dropped.

use std::sync::Arc;

use pickpoint_shared::{SubscriptionProjection, Tenant, TenantId};

use crate::catalog::PlanCatalog;
use crate::directory::TenantDirectory;
use crate::error::{BillingError, BillingResult};
use crate::provider::{SubscriptionSnapshot, PROVIDER_STRIPE};
use crate::store::{ProjectionUpsert, StoreError, SubscriptionStore};

/// One way of resolving the owning tenant, tried in order.
#[derive(Debug, Clone)]
enum TenantSource {
    /// The projection row for this subscription id already carries one.
    ExistingProjection(TenantId),
    /// Explicit link from the originating checkout metadata.
    CheckoutHint(TenantId),
    /// A tenant already stores this provider customer id.
    ProviderCustomer(String),
    /// Find-or-create by billing email.
    BillingEmail(String),
}

#[derive(Clone)]
pub struct SubscriptionProjector {
    directory: TenantDirectory,
    catalog: PlanCatalog,
    subscriptions: Arc<dyn SubscriptionStore>,
}

impl SubscriptionProjector {
    pub fn new(
        directory: TenantDirectory,
        catalog: PlanCatalog,
        subscriptions: Arc<dyn SubscriptionStore>,
    ) -> Self {
        Self {
            directory,
            catalog,
            subscriptions,
        }
    }

    /// Upsert the projection for a snapshot. Idempotent: reapplying the
    /// same snapshot leaves the stored content unchanged, and a snapshot
    /// whose provider event timestamp is older than the stored one is
    /// skipped by the store's guard.
    pub async fn apply(
        &self,
        snapshot: SubscriptionSnapshot,
    ) -> BillingResult<SubscriptionProjection> {
        let existing = self
            .subscriptions
            .find_by_provider_id(PROVIDER_STRIPE, &snapshot.provider_subscription_id)
            .await?;

        let tenant = self
            .resolve_tenant(&snapshot, existing.as_ref())
            .await?;

        match (&tenant, &snapshot.provider_customer_id) {
            (Some(tenant), Some(customer_id)) => {
                self.directory
                    .reconcile_provider_customer(tenant, customer_id)
                    .await?;
            }
            (None, _) => {
                tracing::warn!(
                    subscription_id = %snapshot.provider_subscription_id,
                    "No tenant resolved for subscription, storing unlinked projection"
                );
            }
            _ => {}
        }

        let plan = self
            .catalog
            .resolve(snapshot.plan_code.as_deref(), snapshot.price_id.as_deref())
            .await?;
        if plan.is_none() && (snapshot.plan_code.is_some() || snapshot.price_id.is_some()) {
            tracing::warn!(
                subscription_id = %snapshot.provider_subscription_id,
                plan_code = ?snapshot.plan_code,
                price_id = ?snapshot.price_id,
                "Plan not resolved, storing projection with null plan"
            );
        }

        let upsert = ProjectionUpsert {
            provider: PROVIDER_STRIPE.to_string(),
            provider_subscription_id: snapshot.provider_subscription_id.clone(),
            tenant_id: tenant.as_ref().map(|t| t.id),
            plan_id: plan.as_ref().map(|p| p.id),
            provider_customer_id: snapshot.provider_customer_id.clone(),
            status: snapshot.status,
            trial_end: snapshot.trial_end,
            current_period_start: snapshot.current_period_start,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            last_event_at: snapshot.event_created_at,
        };
        self.subscriptions.upsert(&upsert).await?;

        tracing::info!(
            subscription_id = %snapshot.provider_subscription_id,
            tenant_id = ?upsert.tenant_id,
            plan_id = ?upsert.plan_id,
            status = %snapshot.status,
            "Subscription projection updated"
        );

        self.subscriptions
            .find_by_provider_id(PROVIDER_STRIPE, &snapshot.provider_subscription_id)
            .await?
            .ok_or_else(|| {
                BillingError::Store(StoreError::Unavailable(
                    "projection missing after upsert".to_string(),
                ))
            })
    }

    /// Create a minimal projection for a checkout-completed session whose
    /// subscription lifecycle events have not arrived yet. An existing row
    /// is never touched beyond backfilling a missing tenant link; the
    /// lifecycle events own the status.
    pub async fn ensure_from_checkout(
        &self,
        snapshot: SubscriptionSnapshot,
        tenant_id: Option<TenantId>,
    ) -> BillingResult<()> {
        let upsert = ProjectionUpsert {
            provider: PROVIDER_STRIPE.to_string(),
            provider_subscription_id: snapshot.provider_subscription_id.clone(),
            tenant_id,
            plan_id: self
                .catalog
                .resolve(snapshot.plan_code.as_deref(), snapshot.price_id.as_deref())
                .await?
                .map(|p| p.id),
            provider_customer_id: snapshot.provider_customer_id.clone(),
            status: snapshot.status,
            trial_end: snapshot.trial_end,
            current_period_start: snapshot.current_period_start,
            current_period_end: snapshot.current_period_end,
            cancel_at_period_end: snapshot.cancel_at_period_end,
            last_event_at: snapshot.event_created_at,
        };

        let created = self.subscriptions.insert_if_absent(&upsert).await?;
        if created {
            tracing::info!(
                subscription_id = %upsert.provider_subscription_id,
                tenant_id = ?tenant_id,
                "Projection stub created from checkout completion"
            );
        } else if let Some(tenant_id) = tenant_id {
            self.subscriptions
                .link_tenant_if_missing(
                    PROVIDER_STRIPE,
                    &upsert.provider_subscription_id,
                    tenant_id,
                )
                .await?;
        }
        Ok(())
    }

    async fn resolve_tenant(
        &self,
        snapshot: &SubscriptionSnapshot,
        existing: Option<&SubscriptionProjection>,
    ) -> BillingResult<Option<Tenant>> {
        let mut strategies: Vec<TenantSource> = Vec::new();
        if let Some(tenant_id) = existing.and_then(|p| p.tenant_id) {
            strategies.push(TenantSource::ExistingProjection(tenant_id));
        }
        if let Some(hint) = snapshot.tenant_hint {
            strategies.push(TenantSource::CheckoutHint(hint));
        }
        if let Some(customer_id) = &snapshot.provider_customer_id {
            strategies.push(TenantSource::ProviderCustomer(customer_id.clone()));
        }
        if let Some(email) = &snapshot.email_hint {
            strategies.push(TenantSource::BillingEmail(email.clone()));
        }

        for strategy in strategies {
            let found = match &strategy {
                TenantSource::ExistingProjection(id) | TenantSource::CheckoutHint(id) => {
                    self.directory.find_by_id(*id).await?
                }
                TenantSource::ProviderCustomer(customer_id) => {
                    self.directory
                        .find_by_provider_customer_id(customer_id)
                        .await?
                }
                TenantSource::BillingEmail(email) => {
                    Some(self.directory.find_or_create_by_email(email).await?)
                }
            };
            match found {
                Some(tenant) => return Ok(Some(tenant)),
                None => {
                    tracing::debug!(strategy = ?strategy, "Tenant resolution strategy missed");
                }
            }
        }

        Ok(None)
    }
}
