//! Storage interfaces
//!
//! Every component takes the repository it needs as an `Arc<dyn Trait>`
//! instead of sharing a global client, so tests can substitute the
//! in-memory implementation. The Postgres implementation is the only
//! writer of subscription projections and ledger rows; both writes go
//! through keyed upserts so the store's conflict resolution, not
//! application-level check-then-write, is the concurrency primitive.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use pickpoint_shared::{Plan, PlanId, SubscriptionProjection, SubscriptionStatus, Tenant, TenantId};

/// How long a claimed event may sit in `processing` before another
/// delivery is allowed to reclaim it.
pub const STUCK_PROCESSING_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the operation failed transiently.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Fields for a tenant created by first billing contact.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub slug: String,
    pub billing_email: String,
    pub provider_customer_id: Option<String>,
}

/// An inbound provider event about to be claimed for processing.
#[derive(Debug, Clone)]
pub struct NewLedgerEvent {
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Result of attempting to claim an event id for exclusive processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This delivery holds exclusive processing rights.
    Claimed,
    /// The event id was already processed (or is being processed);
    /// the delivery must be acknowledged without side effects.
    AlreadySeen,
}

/// Full set of mutable projection fields, keyed by
/// (provider, provider_subscription_id).
#[derive(Debug, Clone)]
pub struct ProjectionUpsert {
    pub provider: String,
    pub provider_subscription_id: String,
    pub tenant_id: Option<TenantId>,
    pub plan_id: Option<PlanId>,
    pub provider_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub trial_end: Option<OffsetDateTime>,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    /// Provider event timestamp; the upsert refuses snapshots strictly
    /// older than what the row already holds (when both are known).
    pub last_event_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, StoreError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StoreError>;
    /// Case-insensitive lookup by billing email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Tenant>, StoreError>;
    async fn find_by_provider_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Tenant>, StoreError>;
    async fn insert(&self, tenant: NewTenant) -> Result<Tenant, StoreError>;
    async fn set_provider_customer_id(
        &self,
        id: TenantId,
        customer_id: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn find_by_id(&self, id: PlanId) -> Result<Option<Plan>, StoreError>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Plan>, StoreError>;
    async fn find_by_price_id(&self, provider_price_id: &str)
        -> Result<Option<Plan>, StoreError>;
}

#[async_trait]
pub trait EventLedgerStore: Send + Sync {
    /// Atomically claim an event id. The first delivery of a new id wins;
    /// redelivery of a `failed` attempt or of a `processing` row older
    /// than [`STUCK_PROCESSING_MINUTES`] wins again; everything else is
    /// `AlreadySeen`. The event's type and raw payload are written on
    /// first claim and never rewritten.
    async fn claim(&self, event: &NewLedgerEvent) -> Result<ClaimOutcome, StoreError>;
    async fn mark_processed(&self, provider_event_id: &str) -> Result<(), StoreError>;
    async fn mark_failed(&self, provider_event_id: &str, error: &str)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_provider_id(
        &self,
        provider: &str,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionProjection>, StoreError>;

    /// The tenant's current projection: a live one
    /// (active/trialing/past_due) if any, otherwise the most recently
    /// updated row.
    async fn current_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<SubscriptionProjection>, StoreError>;

    /// Conflict-free replace of all mutable fields keyed by
    /// (provider, provider_subscription_id), guarded by `last_event_at`.
    /// Resolved tenant/plan/customer ids are never nulled out by a later
    /// snapshot that lacks them.
    async fn upsert(&self, row: &ProjectionUpsert) -> Result<(), StoreError>;

    /// Create the projection only if no row exists for the key; an
    /// existing row is left untouched. Returns whether a row was created.
    async fn insert_if_absent(&self, row: &ProjectionUpsert) -> Result<bool, StoreError>;

    /// Backfill the tenant link on a projection that does not have one.
    async fn link_tenant_if_missing(
        &self,
        provider: &str,
        provider_subscription_id: &str,
        tenant_id: TenantId,
    ) -> Result<(), StoreError>;
}
