//! Entitlement calculator
//!
//! Pure function from (tenant trial counters, subscription projection,
//! plan) to an access decision. No I/O, total over every input
//! combination including an absent subscription, and cheap enough to run
//! on every request.
//!
//! Precedence for the human-readable reason (first match wins):
//! 1. no live subscription, trial active but exhausted -> `trial_exhausted`
//! 2. no live subscription and no active trial -> `inactive`
//! 3. status `past_due` -> `past_due`
//! 4. cancellation scheduled -> `cancel_at_period_end`
//! 5. status `canceled` -> `canceled`
//! 6. status `incomplete` / `incomplete_expired` -> that status name
//! 7. otherwise none

use serde::{Deserialize, Serialize};

use pickpoint_shared::{Plan, SubscriptionProjection, SubscriptionStatus, Tenant};

/// Machine-readable denial/diagnostic reason for the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementReason {
    TrialExhausted,
    Inactive,
    PastDue,
    CancelAtPeriodEnd,
    Canceled,
    Incomplete,
    IncompleteExpired,
}

impl std::fmt::Display for EntitlementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntitlementReason::TrialExhausted => "trial_exhausted",
            EntitlementReason::Inactive => "inactive",
            EntitlementReason::PastDue => "past_due",
            EntitlementReason::CancelAtPeriodEnd => "cancel_at_period_end",
            EntitlementReason::Canceled => "canceled",
            EntitlementReason::Incomplete => "incomplete",
            EntitlementReason::IncompleteExpired => "incomplete_expired",
        };
        f.write_str(s)
    }
}

/// Trial counters as exposed on the read surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSnapshot {
    pub active: bool,
    pub quota: i32,
    pub used: i32,
    pub remaining: i32,
}

/// Plan + subscription summary for the frontend; only present when both a
/// projection and a resolved plan exist. Period timestamps are unix
/// seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub name: String,
    pub interval: String,
    pub currency: String,
    pub unit_amount: i32,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub current_period_end: Option<i64>,
    pub trial_end: Option<i64>,
}

/// The computed access decision. Not persisted; recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub can_use_app: bool,
    pub can_create_package: bool,
    pub subscription_active: bool,
    pub reason: Option<EntitlementReason>,
    pub trial: TrialSnapshot,
    pub plan: Option<PlanSummary>,
}

/// Compute the entitlement for a tenant. `projection`/`plan` are the
/// current subscription projection and its resolved plan, when they exist.
pub fn compute_entitlement(
    tenant: &Tenant,
    projection: Option<&SubscriptionProjection>,
    plan: Option<&Plan>,
) -> Entitlement {
    let subscription_active = projection.map(|p| p.status.is_active()).unwrap_or(false);

    let trial = TrialSnapshot {
        active: tenant.trial_active,
        quota: tenant.trial_quota,
        used: tenant.trial_used,
        remaining: tenant.trial_remaining(),
    };

    let can_use_app = subscription_active || (trial.active && !tenant.soft_blocked);
    let can_create_package = subscription_active || (trial.active && trial.remaining > 0);

    let status = projection.map(|p| p.status);
    let cancel_at_period_end = projection.map(|p| p.cancel_at_period_end).unwrap_or(false);

    let reason = if !subscription_active && trial.active && trial.remaining == 0 {
        Some(EntitlementReason::TrialExhausted)
    } else if !subscription_active && !trial.active {
        Some(EntitlementReason::Inactive)
    } else if status == Some(SubscriptionStatus::PastDue) {
        Some(EntitlementReason::PastDue)
    } else if cancel_at_period_end {
        Some(EntitlementReason::CancelAtPeriodEnd)
    } else if status == Some(SubscriptionStatus::Canceled) {
        Some(EntitlementReason::Canceled)
    } else if status == Some(SubscriptionStatus::Incomplete) {
        Some(EntitlementReason::Incomplete)
    } else if status == Some(SubscriptionStatus::IncompleteExpired) {
        Some(EntitlementReason::IncompleteExpired)
    } else {
        None
    };

    let plan_summary = match (projection, plan) {
        (Some(projection), Some(plan)) => Some(PlanSummary {
            name: plan.name.clone(),
            interval: plan.billing_interval.clone(),
            currency: plan.currency.clone(),
            unit_amount: plan.unit_amount_cents,
            status: projection.status,
            cancel_at_period_end: projection.cancel_at_period_end,
            current_period_end: projection.current_period_end.map(|t| t.unix_timestamp()),
            trial_end: projection.trial_end.map(|t| t.unix_timestamp()),
        }),
        _ => None,
    };

    Entitlement {
        can_use_app,
        can_create_package,
        subscription_active,
        reason,
        trial,
        plan: plan_summary,
    }
}
