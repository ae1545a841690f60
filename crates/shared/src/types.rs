//! Common types used across Pickpoint

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Free-usage allowance granted to a tenant created by first billing contact.
pub const DEFAULT_TRIAL_QUOTA: i32 = 20;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Tenant ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Plan ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for PlanId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Subscription status
// =============================================================================

/// Internal subscription status, mirrored from the payment provider.
///
/// `from_provider` is total: every provider string maps to exactly one
/// variant, and anything unrecognized maps to `Incomplete` so a new provider
/// status can never be mistaken for an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// Map a provider status string to the internal enum.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "trialing" => Self::Trialing,
            "active" => Self::Active,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "unpaid" => Self::Unpaid,
            "paused" => Self::Paused,
            _ => Self::Incomplete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
        }
    }

    /// Whether this status counts as a live subscription for entitlement
    /// purposes. `past_due` is a grace period, not an immediate cutoff.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::PastDue)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Rows
// =============================================================================

/// One customer business account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub slug: String,
    pub billing_email: String,
    pub provider_customer_id: Option<String>,
    pub trial_active: bool,
    pub trial_quota: i32,
    pub trial_used: i32,
    pub soft_blocked: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Tenant {
    /// Trial usage still available; never negative.
    pub fn trial_remaining(&self) -> i32 {
        (self.trial_quota - self.trial_used).max(0)
    }
}

/// One sellable price tier. Read-only lookup data at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub code: String,
    pub name: String,
    pub provider_price_id: String,
    pub billing_interval: String,
    pub currency: String,
    pub unit_amount_cents: i32,
    pub active: bool,
}

/// Locally stored mirror of the provider's subscription state, keyed by
/// (provider, provider_subscription_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionProjection {
    pub id: Uuid,
    pub tenant_id: Option<TenantId>,
    pub plan_id: Option<PlanId>,
    pub provider: String,
    pub provider_customer_id: Option<String>,
    pub provider_subscription_id: String,
    pub status: SubscriptionStatus,
    pub trial_end: Option<OffsetDateTime>,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    /// Provider event timestamp of the snapshot that last wrote this row.
    pub last_event_at: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}

// Manual FromRow impls: status is stored as TEXT and converted through the
// total mapping, so a bad row can never decode to an active subscription.

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for Tenant {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            id: TenantId(row.try_get("id")?),
            slug: row.try_get("slug")?,
            billing_email: row.try_get("billing_email")?,
            provider_customer_id: row.try_get("provider_customer_id")?,
            trial_active: row.try_get("trial_active")?,
            trial_quota: row.try_get("trial_quota")?,
            trial_used: row.try_get("trial_used")?,
            soft_blocked: row.try_get("soft_blocked")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for Plan {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            id: PlanId(row.try_get("id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            provider_price_id: row.try_get("provider_price_id")?,
            billing_interval: row.try_get("billing_interval")?,
            currency: row.try_get("currency")?,
            unit_amount_cents: row.try_get("unit_amount_cents")?,
            active: row.try_get("active")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for SubscriptionProjection {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get::<Option<Uuid>, _>("tenant_id")?.map(TenantId),
            plan_id: row.try_get::<Option<Uuid>, _>("plan_id")?.map(PlanId),
            provider: row.try_get("provider")?,
            provider_customer_id: row.try_get("provider_customer_id")?,
            provider_subscription_id: row.try_get("provider_subscription_id")?,
            status: SubscriptionStatus::from_provider(&status),
            trial_end: row.try_get("trial_end")?,
            current_period_start: row.try_get("current_period_start")?,
            current_period_end: row.try_get("current_period_end")?,
            cancel_at_period_end: row.try_get("cancel_at_period_end")?,
            last_event_at: row.try_get("last_event_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
