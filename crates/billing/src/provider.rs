//! Payment provider wire types
//!
//! Hand-rolled serde views of the provider's webhook JSON. Only the fields
//! this subsystem consumes are modeled; everything else is ignored so new
//! provider fields never break parsing. Timestamps that are absent or out
//! of range degrade to `None`, and expandable references are accepted as
//! either a bare id string or an object carrying an `id`.

use std::collections::HashMap;

use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use pickpoint_shared::{SubscriptionStatus, TenantId};

/// Provider name recorded on projections.
pub const PROVIDER_STRIPE: &str = "stripe";

/// Metadata key carrying an internal plan code.
pub const METADATA_PLAN_CODE: &str = "plan_code";
/// Metadata key carrying an explicit tenant link from checkout.
pub const METADATA_TENANT_ID: &str = "tenant_id";

/// Outer event envelope: id, type, creation time, payload object.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl EventEnvelope {
    /// Provider-side creation time of this event, if present and valid.
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        unix_timestamp(self.created)
    }
}

/// Subscription object as delivered inside subscription lifecycle events.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cancel_at_period_end: Option<bool>,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub items: Option<ItemList>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemList {
    #[serde(default)]
    pub data: Vec<LineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub price: Option<PriceRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceRef {
    pub id: String,
    #[serde(default)]
    pub recurring: Option<Recurring>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recurring {
    #[serde(default)]
    pub usage_type: Option<String>,
}

impl SubscriptionObject {
    /// Price id of the primary (non-metered) line item.
    pub fn primary_price_id(&self) -> Option<String> {
        self.items.as_ref().and_then(|items| {
            items
                .data
                .iter()
                .filter_map(|item| item.price.as_ref())
                .find(|price| {
                    price
                        .recurring
                        .as_ref()
                        .and_then(|r| r.usage_type.as_deref())
                        != Some("metered")
                })
                .map(|price| price.id.clone())
        })
    }

    fn metadata_value(&self, key: &str) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .filter(|v| !v.is_empty())
            .cloned()
    }

    /// Normalize into the snapshot the projector consumes.
    pub fn into_snapshot(self, event_created_at: Option<OffsetDateTime>) -> SubscriptionSnapshot {
        let tenant_hint = self
            .metadata_value(METADATA_TENANT_ID)
            .and_then(|v| Uuid::parse_str(&v).ok())
            .map(TenantId);
        SubscriptionSnapshot {
            provider_subscription_id: self.id.clone(),
            provider_customer_id: self.customer.as_ref().and_then(expandable_id),
            status: SubscriptionStatus::from_provider(self.status.as_deref().unwrap_or("")),
            trial_end: unix_timestamp(self.trial_end),
            current_period_start: unix_timestamp(self.current_period_start),
            current_period_end: unix_timestamp(self.current_period_end),
            cancel_at_period_end: self.cancel_at_period_end.unwrap_or(false),
            price_id: self.primary_price_id(),
            plan_code: self.metadata_value(METADATA_PLAN_CODE),
            tenant_hint,
            email_hint: None,
            event_created_at,
        }
    }
}

/// Checkout session object as delivered in `checkout.session.completed`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<serde_json::Value>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub subscription: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

impl CheckoutSessionObject {
    pub fn customer_id(&self) -> Option<String> {
        self.customer.as_ref().and_then(expandable_id)
    }

    pub fn subscription_id(&self) -> Option<String> {
        self.subscription.as_ref().and_then(expandable_id)
    }

    /// Billing email: the session-level email wins over customer details.
    pub fn email(&self) -> Option<&str> {
        self.customer_email
            .as_deref()
            .or_else(|| self.customer_details.as_ref().and_then(|d| d.email.as_deref()))
            .filter(|e| !e.is_empty())
    }

    pub fn tenant_hint(&self) -> Option<TenantId> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(METADATA_TENANT_ID))
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(TenantId)
    }

    pub fn plan_code(&self) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(METADATA_PLAN_CODE))
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

/// Normalized provider subscription snapshot handed to the projector.
#[derive(Debug, Clone)]
pub struct SubscriptionSnapshot {
    pub provider_subscription_id: String,
    pub provider_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub trial_end: Option<OffsetDateTime>,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    pub price_id: Option<String>,
    pub plan_code: Option<String>,
    pub tenant_hint: Option<TenantId>,
    pub email_hint: Option<String>,
    pub event_created_at: Option<OffsetDateTime>,
}

/// Accept an expandable reference as a bare id string or an `{id: ...}`
/// object.
pub fn expandable_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => {
            map.get("id").and_then(|v| v.as_str()).map(String::from)
        }
        _ => None,
    }
}

fn unix_timestamp(secs: Option<i64>) -> Option<OffsetDateTime> {
    secs.and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
}
