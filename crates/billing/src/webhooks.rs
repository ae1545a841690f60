//! Provider webhook handling
//!
//! Verifies transport authenticity of inbound events, claims the event id
//! in the ledger for deduplication, and routes accepted events to the
//! projector. The ledger claim is the single source of truth for "already
//! processed"; handlers carry no dedup logic of their own.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use time::OffsetDateTime;

use pickpoint_shared::SubscriptionStatus;

use crate::directory::TenantDirectory;
use crate::error::{BillingError, BillingResult};
use crate::projector::SubscriptionProjector;
use crate::provider::{
    CheckoutSessionObject, EventEnvelope, SubscriptionObject, SubscriptionSnapshot,
};
use crate::store::{ClaimOutcome, EventLedgerStore, NewLedgerEvent};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed payload, in seconds.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Result of ingesting one delivery. Every variant is acknowledged with
/// 200 to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Accepted and processed to completion.
    Processed,
    /// The event id was already seen; no side effects were run.
    Duplicate,
    /// Unknown event type; recorded and skipped for forward compatibility.
    Ignored,
}

/// Webhook handler for provider events
pub struct WebhookHandler {
    webhook_secret: String,
    ledger: Arc<dyn EventLedgerStore>,
    directory: TenantDirectory,
    projector: SubscriptionProjector,
}

impl WebhookHandler {
    pub fn new(
        webhook_secret: String,
        ledger: Arc<dyn EventLedgerStore>,
        directory: TenantDirectory,
        projector: SubscriptionProjector,
    ) -> Self {
        Self {
            webhook_secret,
            ledger,
            directory,
            projector,
        }
    }

    /// Verify, deduplicate, and process one raw delivery.
    ///
    /// `InvalidSignature`/`MalformedEvent` are permanent rejections (the
    /// endpoint answers 400); `Store` errors are retryable (5xx) and leave
    /// the ledger row in `failed` so redelivery reprocesses the event.
    pub async fn ingest(&self, payload: &str, signature: &str) -> BillingResult<IngestOutcome> {
        self.verify_signature(payload, signature)?;

        let raw: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;
        let envelope: EventEnvelope = serde_json::from_value(raw.clone())
            .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

        self.process(envelope, raw).await
    }

    /// Verify the `t=...,v1=...` signature header against the shared
    /// signing secret.
    pub fn verify_signature(&self, payload: &str, signature: &str) -> BillingResult<()> {
        self.verify_signature_at(
            payload,
            signature,
            OffsetDateTime::now_utc().unix_timestamp(),
        )
    }

    pub(crate) fn verify_signature_at(
        &self,
        payload: &str,
        signature: &str,
        now_unix: i64,
    ) -> BillingResult<()> {
        // Parse the signature header: t=timestamp,v1=signature
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<String> = None;

        for part in signature.split(',') {
            let kv: Vec<&str> = part.splitn(2, '=').collect();
            if kv.len() == 2 {
                match kv[0] {
                    "t" => timestamp = kv[1].parse().ok(),
                    "v1" => v1_signature = Some(kv[1].to_string()),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::warn!("Missing timestamp in signature header");
            BillingError::InvalidSignature
        })?;

        let v1_signature = v1_signature.ok_or_else(|| {
            tracing::warn!("Missing v1 signature in signature header");
            BillingError::InvalidSignature
        })?;

        if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(
                timestamp = timestamp,
                now = now_unix,
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::InvalidSignature);
        }

        // The secret carries a "whsec_" prefix when copied from the
        // provider dashboard.
        let secret_key = self
            .webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(&self.webhook_secret);
        let signed_payload = format!("{}.{}", timestamp, payload);

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| {
            tracing::error!("Invalid webhook secret key");
            BillingError::InvalidSignature
        })?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::warn!("Webhook signature mismatch");
            return Err(BillingError::InvalidSignature);
        }

        Ok(())
    }

    /// Claim the event id, run the matching handler, and record the result
    /// on the ledger row.
    async fn process(
        &self,
        envelope: EventEnvelope,
        raw: serde_json::Value,
    ) -> BillingResult<IngestOutcome> {
        let event = NewLedgerEvent {
            provider_event_id: envelope.id.clone(),
            event_type: envelope.event_type.clone(),
            payload: raw,
        };

        match self.ledger.claim(&event).await? {
            ClaimOutcome::AlreadySeen => {
                tracing::info!(
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    "Duplicate webhook event, acknowledged without reprocessing"
                );
                return Ok(IngestOutcome::Duplicate);
            }
            ClaimOutcome::Claimed => {}
        }

        tracing::info!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            "Processing webhook event"
        );

        match self.dispatch(&envelope).await {
            Ok(outcome) => {
                self.ledger.mark_processed(&envelope.id).await?;
                Ok(outcome)
            }
            Err(e) => {
                // The failed state keeps the id reclaimable so the
                // provider's redelivery is not short-circuited as a
                // duplicate.
                if let Err(mark_err) =
                    self.ledger.mark_failed(&envelope.id, &e.to_string()).await
                {
                    tracing::error!(
                        event_id = %envelope.id,
                        error = %mark_err,
                        "Failed to record processing failure on ledger row"
                    );
                }
                tracing::error!(
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    error = %e,
                    "Webhook event processing failed"
                );
                Err(e)
            }
        }
    }

    async fn dispatch(&self, envelope: &EventEnvelope) -> BillingResult<IngestOutcome> {
        match envelope.event_type.as_str() {
            "checkout.session.completed" => {
                self.handle_checkout_completed(envelope).await?;
                Ok(IngestOutcome::Processed)
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.handle_subscription_event(envelope, None).await?;
                Ok(IngestOutcome::Processed)
            }
            "customer.subscription.deleted" => {
                self.handle_subscription_event(envelope, Some(SubscriptionStatus::Canceled))
                    .await?;
                Ok(IngestOutcome::Processed)
            }
            _ => {
                tracing::info!(
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    "Unhandled webhook event type, acknowledged and ignored"
                );
                Ok(IngestOutcome::Ignored)
            }
        }
    }

    async fn handle_subscription_event(
        &self,
        envelope: &EventEnvelope,
        force_status: Option<SubscriptionStatus>,
    ) -> BillingResult<()> {
        let subscription: SubscriptionObject =
            serde_json::from_value(envelope.data.object.clone())
                .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

        let mut snapshot = subscription.into_snapshot(envelope.created_at());
        if let Some(status) = force_status {
            snapshot.status = status;
        }

        self.projector.apply(snapshot).await?;
        Ok(())
    }

    /// Checkout completion links tenant and customer and creates a stub
    /// projection when the subscription lifecycle events have not arrived
    /// yet. Statuses of existing projections are left to those events.
    async fn handle_checkout_completed(&self, envelope: &EventEnvelope) -> BillingResult<()> {
        let session: CheckoutSessionObject =
            serde_json::from_value(envelope.data.object.clone())
                .map_err(|e| BillingError::MalformedEvent(e.to_string()))?;

        let tenant = match session.tenant_hint() {
            Some(hint) => self.directory.find_by_id(hint).await?,
            None => None,
        };
        let tenant = match tenant {
            Some(tenant) => Some(tenant),
            None => match session.email() {
                Some(email) => Some(self.directory.find_or_create_by_email(email).await?),
                None => None,
            },
        };

        match (&tenant, session.customer_id()) {
            (Some(tenant), Some(customer_id)) => {
                self.directory
                    .reconcile_provider_customer(tenant, &customer_id)
                    .await?;
            }
            (None, _) => {
                tracing::warn!(
                    session_id = %session.id,
                    "Checkout completed without resolvable tenant"
                );
            }
            _ => {}
        }

        if let Some(subscription_id) = session.subscription_id() {
            let snapshot = SubscriptionSnapshot {
                provider_subscription_id: subscription_id,
                provider_customer_id: session.customer_id(),
                // Unknown until the subscription lifecycle event arrives;
                // incomplete is the fail-safe placeholder.
                status: SubscriptionStatus::Incomplete,
                trial_end: None,
                current_period_start: None,
                current_period_end: None,
                cancel_at_period_end: false,
                price_id: None,
                plan_code: session.plan_code(),
                tenant_hint: None,
                email_hint: None,
                event_created_at: envelope.created_at(),
            };
            self.projector
                .ensure_from_checkout(snapshot, tenant.as_ref().map(|t| t.id))
                .await?;
        }

        Ok(())
    }
}
