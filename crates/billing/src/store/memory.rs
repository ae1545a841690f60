//! In-memory implementation of the storage interfaces
//!
//! Behaviourally equivalent to the Postgres store (claim/reclaim rules,
//! upsert guard, COALESCE semantics) so tests exercise the same contract
//! without a database. Also usable as a throwaway backend for local
//! experiments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use pickpoint_shared::{
    Plan, PlanId, SubscriptionProjection, Tenant, TenantId, DEFAULT_TRIAL_QUOTA,
};

use super::{
    ClaimOutcome, EventLedgerStore, NewLedgerEvent, NewTenant, PlanStore, ProjectionUpsert,
    StoreError, SubscriptionStore, TenantStore, STUCK_PROCESSING_MINUTES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LedgerState {
    Processing,
    Processed,
    Failed,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    event_type: String,
    payload: serde_json::Value,
    state: LedgerState,
    last_error: Option<String>,
    received_at: OffsetDateTime,
}

#[derive(Default)]
struct Inner {
    tenants: Vec<Tenant>,
    plans: Vec<Plan>,
    events: HashMap<String, LedgerEntry>,
    projections: Vec<SubscriptionProjection>,
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreError::Unavailable`, for
    /// exercising deny-by-default and retry paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed a plan row.
    pub fn add_plan(&self, plan: Plan) {
        self.lock().plans.push(plan);
    }

    /// Seed a tenant row.
    pub fn add_tenant(&self, tenant: Tenant) {
        self.lock().tenants.push(tenant);
    }

    /// Snapshot a tenant by id (test inspection).
    pub fn get_tenant(&self, id: TenantId) -> Option<Tenant> {
        self.lock().tenants.iter().find(|t| t.id == id).cloned()
    }

    /// Snapshot a projection by key (test inspection).
    pub fn get_projection(
        &self,
        provider: &str,
        provider_subscription_id: &str,
    ) -> Option<SubscriptionProjection> {
        self.lock()
            .projections
            .iter()
            .find(|p| {
                p.provider == provider && p.provider_subscription_id == provider_subscription_id
            })
            .cloned()
    }

    /// Number of ledger rows (test inspection).
    pub fn event_count(&self) -> usize {
        self.lock().events.len()
    }

    /// Processing state of a ledger row (test inspection).
    pub fn event_state(&self, provider_event_id: &str) -> Option<&'static str> {
        self.lock()
            .events
            .get(provider_event_id)
            .map(|e| match e.state {
                LedgerState::Processing => "processing",
                LedgerState::Processed => "processed",
                LedgerState::Failed => "failed",
            })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        self.check_available()?;
        Ok(self.lock().tenants.iter().find(|t| t.id == id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StoreError> {
        self.check_available()?;
        Ok(self.lock().tenants.iter().find(|t| t.slug == slug).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Tenant>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .tenants
            .iter()
            .find(|t| t.billing_email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_provider_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Tenant>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .tenants
            .iter()
            .find(|t| t.provider_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn insert(&self, tenant: NewTenant) -> Result<Tenant, StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        if inner
            .tenants
            .iter()
            .any(|t| t.billing_email.eq_ignore_ascii_case(&tenant.billing_email))
        {
            return Err(StoreError::Conflict(format!(
                "billing_email taken: {}",
                tenant.billing_email
            )));
        }
        if inner.tenants.iter().any(|t| t.slug == tenant.slug) {
            return Err(StoreError::Conflict(format!("slug taken: {}", tenant.slug)));
        }
        let now = OffsetDateTime::now_utc();
        let created = Tenant {
            id: TenantId::new(),
            slug: tenant.slug,
            billing_email: tenant.billing_email,
            provider_customer_id: tenant.provider_customer_id,
            trial_active: true,
            trial_quota: DEFAULT_TRIAL_QUOTA,
            trial_used: 0,
            soft_blocked: false,
            created_at: now,
            updated_at: now,
        };
        inner.tenants.push(created.clone());
        Ok(created)
    }

    async fn set_provider_customer_id(
        &self,
        id: TenantId,
        customer_id: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        if let Some(tenant) = inner.tenants.iter_mut().find(|t| t.id == id) {
            tenant.provider_customer_id = Some(customer_id.to_string());
            tenant.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn find_by_id(&self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        self.check_available()?;
        Ok(self.lock().plans.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Plan>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .plans
            .iter()
            .find(|p| p.code == code && p.active)
            .cloned())
    }

    async fn find_by_price_id(
        &self,
        provider_price_id: &str,
    ) -> Result<Option<Plan>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .plans
            .iter()
            .find(|p| p.provider_price_id == provider_price_id && p.active)
            .cloned())
    }
}

#[async_trait]
impl EventLedgerStore for MemoryStore {
    async fn claim(&self, event: &NewLedgerEvent) -> Result<ClaimOutcome, StoreError> {
        use std::collections::hash_map::Entry;

        self.check_available()?;
        let mut inner = self.lock();
        let now = OffsetDateTime::now_utc();
        match inner.events.entry(event.provider_event_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(LedgerEntry {
                    event_type: event.event_type.clone(),
                    payload: event.payload.clone(),
                    state: LedgerState::Processing,
                    last_error: None,
                    received_at: now,
                });
                Ok(ClaimOutcome::Claimed)
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                let stuck = entry.state == LedgerState::Processing
                    && entry.received_at < now - Duration::minutes(STUCK_PROCESSING_MINUTES);
                if entry.state == LedgerState::Failed || stuck {
                    entry.state = LedgerState::Processing;
                    entry.last_error = None;
                    entry.received_at = now;
                    Ok(ClaimOutcome::Claimed)
                } else {
                    Ok(ClaimOutcome::AlreadySeen)
                }
            }
        }
    }

    async fn mark_processed(&self, provider_event_id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(entry) = self.lock().events.get_mut(provider_event_id) {
            entry.state = LedgerState::Processed;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        provider_event_id: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(entry) = self.lock().events.get_mut(provider_event_id) {
            entry.state = LedgerState::Failed;
            entry.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find_by_provider_id(
        &self,
        provider: &str,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionProjection>, StoreError> {
        self.check_available()?;
        Ok(self.get_projection(provider, provider_subscription_id))
    }

    async fn current_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<SubscriptionProjection>, StoreError> {
        self.check_available()?;
        let inner = self.lock();
        let mut rows: Vec<&SubscriptionProjection> = inner
            .projections
            .iter()
            .filter(|p| p.tenant_id == Some(tenant_id))
            .collect();
        rows.sort_by_key(|p| (std::cmp::Reverse(p.status.is_active()), std::cmp::Reverse(p.updated_at)));
        Ok(rows.first().map(|p| (*p).clone()))
    }

    async fn upsert(&self, row: &ProjectionUpsert) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        let now = OffsetDateTime::now_utc();
        let position = inner.projections.iter().position(|p| {
            p.provider == row.provider
                && p.provider_subscription_id == row.provider_subscription_id
        });
        match position {
            Some(index) => {
                let existing = &mut inner.projections[index];
                // Same guard as the SQL conflict clause: skip snapshots
                // strictly older than the stored one.
                if let (Some(stored), Some(incoming)) =
                    (existing.last_event_at, row.last_event_at)
                {
                    if incoming < stored {
                        return Ok(());
                    }
                }
                existing.tenant_id = row.tenant_id.or(existing.tenant_id);
                existing.plan_id = row.plan_id.or(existing.plan_id);
                if row.provider_customer_id.is_some() {
                    existing.provider_customer_id = row.provider_customer_id.clone();
                }
                existing.status = row.status;
                existing.trial_end = row.trial_end;
                existing.current_period_start = row.current_period_start;
                existing.current_period_end = row.current_period_end;
                existing.cancel_at_period_end = row.cancel_at_period_end;
                existing.last_event_at = row.last_event_at;
                existing.updated_at = now;
            }
            None => {
                inner.projections.push(projection_from(row, now));
            }
        }
        Ok(())
    }

    async fn insert_if_absent(&self, row: &ProjectionUpsert) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        let exists = inner.projections.iter().any(|p| {
            p.provider == row.provider
                && p.provider_subscription_id == row.provider_subscription_id
        });
        if exists {
            return Ok(false);
        }
        let now = OffsetDateTime::now_utc();
        inner.projections.push(projection_from(row, now));
        Ok(true)
    }

    async fn link_tenant_if_missing(
        &self,
        provider: &str,
        provider_subscription_id: &str,
        tenant_id: TenantId,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut inner = self.lock();
        if let Some(projection) = inner.projections.iter_mut().find(|p| {
            p.provider == provider
                && p.provider_subscription_id == provider_subscription_id
                && p.tenant_id.is_none()
        }) {
            projection.tenant_id = Some(tenant_id);
            projection.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }
}

fn projection_from(row: &ProjectionUpsert, now: OffsetDateTime) -> SubscriptionProjection {
    SubscriptionProjection {
        id: Uuid::new_v4(),
        tenant_id: row.tenant_id,
        plan_id: row.plan_id,
        provider: row.provider.clone(),
        provider_customer_id: row.provider_customer_id.clone(),
        provider_subscription_id: row.provider_subscription_id.clone(),
        status: row.status,
        trial_end: row.trial_end,
        current_period_start: row.current_period_start,
        current_period_end: row.current_period_end,
        cancel_at_period_end: row.cancel_at_period_end,
        last_event_at: row.last_event_at,
        updated_at: now,
    }
}
