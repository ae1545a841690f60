// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing Subsystem
//!
//! Tests critical boundary conditions and race conditions in:
//! - Webhook ingress and deduplication (BILL-W01 to BILL-W09)
//! - Subscription projection (BILL-P01 to BILL-P08)
//! - Tenant directory (BILL-T01 to BILL-T04)

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::store::MemoryStore;
use crate::{BillingService, ProviderConfig};

const TEST_WEBHOOK_SECRET: &str = "whsec_testsecret";

fn test_service() -> (BillingService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = ProviderConfig {
        secret_key: "sk_test_123".to_string(),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
    };
    let service = BillingService::with_stores(
        config,
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    );
    (service, store)
}

/// Sign a payload the way the provider does: HMAC-SHA256 of
/// "{timestamp}.{payload}" with the (prefix-stripped) secret.
fn sign(payload: &str) -> String {
    sign_at(payload, OffsetDateTime::now_utc().unix_timestamp())
}

fn sign_at(payload: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(b"testsecret").unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={signature}")
}

fn seed_plan(store: &MemoryStore) -> pickpoint_shared::Plan {
    let plan = pickpoint_shared::Plan {
        id: pickpoint_shared::PlanId::new(),
        code: "depot-basic".to_string(),
        name: "Depot Basic".to_string(),
        provider_price_id: "price_basic".to_string(),
        billing_interval: "month".to_string(),
        currency: "eur".to_string(),
        unit_amount_cents: 2900,
        active: true,
    };
    store.add_plan(plan.clone());
    plan
}

fn subscription_event(
    event_id: &str,
    subscription_id: &str,
    status: &str,
    event_created: i64,
) -> String {
    json!({
        "id": event_id,
        "type": "customer.subscription.created",
        "created": event_created,
        "data": {"object": {
            "id": subscription_id,
            "customer": "cus_42",
            "status": status,
            "cancel_at_period_end": false,
            "current_period_start": event_created - 100,
            "current_period_end": event_created + 2_592_000,
            "items": {"data": [
                {"price": {"id": "price_basic", "recurring": {"usage_type": "licensed"}}}
            ]},
            "metadata": {}
        }}
    })
    .to_string()
}

// =============================================================================
// Webhook ingress
// =============================================================================
mod webhook_tests {
    use super::*;
    use crate::webhooks::IngestOutcome;
    use crate::{BillingError, PROVIDER_STRIPE};
    use pickpoint_shared::SubscriptionStatus;

    // =========================================================================
    // BILL-W01: Valid delivery is verified, recorded, and projected
    // =========================================================================
    #[tokio::test]
    async fn test_valid_delivery_processed() {
        let (service, store) = test_service();
        seed_plan(&store);

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let payload = subscription_event("evt_1", "sub_1", "active", now);
        let outcome = service
            .webhooks
            .ingest(&payload, &sign(&payload))
            .await
            .unwrap();

        assert_eq!(outcome, IngestOutcome::Processed);
        assert_eq!(store.event_state("evt_1"), Some("processed"));

        let projection = store.get_projection(PROVIDER_STRIPE, "sub_1").unwrap();
        assert_eq!(projection.status, SubscriptionStatus::Active);
        assert!(projection.plan_id.is_some());
        assert_eq!(projection.provider_customer_id.as_deref(), Some("cus_42"));
    }

    // =========================================================================
    // BILL-W02: Tampered payload is rejected with no side effects
    // =========================================================================
    #[tokio::test]
    async fn test_tampered_payload_rejected() {
        let (service, store) = test_service();

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let payload = subscription_event("evt_1", "sub_1", "active", now);
        let signature = sign(&payload);
        let tampered = payload.replace("active", "paused");

        let err = service.webhooks.ingest(&tampered, &signature).await;
        assert!(matches!(err, Err(BillingError::InvalidSignature)));
        assert_eq!(store.event_count(), 0, "no ledger row for rejected delivery");
    }

    // =========================================================================
    // BILL-W03: Signature timestamp outside tolerance is rejected
    // =========================================================================
    #[tokio::test]
    async fn test_stale_signature_rejected() {
        let (service, _store) = test_service();

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let payload = subscription_event("evt_1", "sub_1", "active", now);
        let stale = sign_at(&payload, now - 301);

        let result = service.webhooks.verify_signature_at(&payload, &stale, now);
        assert!(matches!(result, Err(BillingError::InvalidSignature)));

        let fresh = sign_at(&payload, now - 299);
        assert!(service
            .webhooks
            .verify_signature_at(&payload, &fresh, now)
            .is_ok());
    }

    // =========================================================================
    // BILL-W04: Same event id delivered twice with a different payload -
    // the second delivery is a no-op and the first delivery's content wins
    // =========================================================================
    #[tokio::test]
    async fn test_duplicate_event_id_is_noop() {
        let (service, store) = test_service();
        seed_plan(&store);

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let first = subscription_event("evt_dup", "sub_1", "active", now);
        let outcome = service.webhooks.ingest(&first, &sign(&first)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Processed);

        // Retry with "enriched" data under the same event id.
        let second = subscription_event("evt_dup", "sub_1", "canceled", now + 50);
        let outcome = service
            .webhooks
            .ingest(&second, &sign(&second))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Duplicate);

        assert_eq!(store.event_count(), 1);
        let projection = store.get_projection(PROVIDER_STRIPE, "sub_1").unwrap();
        assert_eq!(
            projection.status,
            SubscriptionStatus::Active,
            "duplicate delivery must not re-run handlers"
        );
    }

    // =========================================================================
    // BILL-W05: Unknown event types are acknowledged and ignored
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_event_type_ignored() {
        let (service, store) = test_service();

        let payload = json!({
            "id": "evt_unknown",
            "type": "invoice.finalization_failed",
            "created": OffsetDateTime::now_utc().unix_timestamp(),
            "data": {"object": {"id": "in_1"}}
        })
        .to_string();

        let outcome = service
            .webhooks
            .ingest(&payload, &sign(&payload))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored);
        assert_eq!(store.event_state("evt_unknown"), Some("processed"));
    }

    // =========================================================================
    // BILL-W06: A failed attempt does not mark the event as seen; the
    // provider's redelivery gets reprocessed
    // =========================================================================
    #[tokio::test]
    async fn test_failed_attempt_is_reclaimable() {
        let (service, store) = test_service();
        seed_plan(&store);

        let now = OffsetDateTime::now_utc().unix_timestamp();
        // data.object is missing the subscription id, so dispatch fails
        // after the claim.
        let broken = json!({
            "id": "evt_retry",
            "type": "customer.subscription.updated",
            "created": now,
            "data": {"object": {"status": "active"}}
        })
        .to_string();

        let err = service.webhooks.ingest(&broken, &sign(&broken)).await;
        assert!(err.is_err());
        assert_eq!(store.event_state("evt_retry"), Some("failed"));

        // Redelivery of the same event id with a complete payload must not
        // short-circuit as a duplicate.
        let fixed = subscription_event("evt_retry", "sub_1", "active", now);
        let outcome = service.webhooks.ingest(&fixed, &sign(&fixed)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Processed);
        assert_eq!(store.event_state("evt_retry"), Some("processed"));
    }

    // =========================================================================
    // BILL-W07: Two concurrent deliveries of one event id - exactly one
    // claims processing rights
    // =========================================================================
    #[tokio::test]
    async fn test_concurrent_duplicate_deliveries() {
        use tokio::sync::Barrier;

        let (service, store) = test_service();
        seed_plan(&store);
        let service = Arc::new(service);

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let payload = subscription_event("evt_race", "sub_1", "active", now);
        let signature = sign(&payload);

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = vec![];
        for _ in 0..2 {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let payload = payload.clone();
            let signature = signature.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                service.webhooks.ingest(&payload, &signature).await.unwrap()
            }));
        }

        let mut outcomes = vec![];
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        let processed = outcomes
            .iter()
            .filter(|o| **o == IngestOutcome::Processed)
            .count();
        let duplicates = outcomes
            .iter()
            .filter(|o| **o == IngestOutcome::Duplicate)
            .count();
        assert_eq!(processed, 1, "exactly one delivery wins the claim");
        assert_eq!(duplicates, 1);
        assert_eq!(store.event_count(), 1);
    }

    // =========================================================================
    // BILL-W08: Checkout completion creates the tenant, reconciles the
    // customer id, and leaves a stub projection for the lifecycle events
    // =========================================================================
    #[tokio::test]
    async fn test_checkout_completed_bootstraps_tenant() {
        let (service, store) = test_service();
        seed_plan(&store);

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let checkout = json!({
            "id": "evt_co",
            "type": "checkout.session.completed",
            "created": now,
            "data": {"object": {
                "id": "cs_1",
                "customer": "cus_42",
                "customer_email": "owner@depot-nord.example",
                "subscription": "sub_1",
                "metadata": {"plan_code": "depot-basic"}
            }}
        })
        .to_string();

        service
            .webhooks
            .ingest(&checkout, &sign(&checkout))
            .await
            .unwrap();

        let stub = store.get_projection(crate::PROVIDER_STRIPE, "sub_1").unwrap();
        assert_eq!(stub.status, SubscriptionStatus::Incomplete);
        assert!(stub.plan_id.is_some(), "plan resolved from metadata code");
        let tenant_id = stub.tenant_id.expect("tenant linked from checkout");

        let tenant = store.get_tenant(tenant_id).unwrap();
        assert_eq!(tenant.billing_email, "owner@depot-nord.example");
        assert_eq!(tenant.provider_customer_id.as_deref(), Some("cus_42"));
        assert!(tenant.trial_active);

        // The subscription.created that follows upgrades the stub and
        // keeps the tenant link.
        let created = subscription_event("evt_sub", "sub_1", "active", now + 1);
        service
            .webhooks
            .ingest(&created, &sign(&created))
            .await
            .unwrap();
        let projection = store.get_projection(crate::PROVIDER_STRIPE, "sub_1").unwrap();
        assert_eq!(projection.status, SubscriptionStatus::Active);
        assert_eq!(projection.tenant_id, Some(tenant_id));
    }

    // =========================================================================
    // BILL-W09: Checkout arriving after the lifecycle event never
    // downgrades the projection status
    // =========================================================================
    #[tokio::test]
    async fn test_late_checkout_does_not_downgrade_status() {
        let (service, store) = test_service();
        seed_plan(&store);

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let created = subscription_event("evt_sub", "sub_1", "active", now);
        service
            .webhooks
            .ingest(&created, &sign(&created))
            .await
            .unwrap();

        let checkout = json!({
            "id": "evt_co_late",
            "type": "checkout.session.completed",
            "created": now + 5,
            "data": {"object": {
                "id": "cs_1",
                "customer": "cus_42",
                "customer_email": "owner@depot-nord.example",
                "subscription": "sub_1"
            }}
        })
        .to_string();
        service
            .webhooks
            .ingest(&checkout, &sign(&checkout))
            .await
            .unwrap();

        let projection = store.get_projection(crate::PROVIDER_STRIPE, "sub_1").unwrap();
        assert_eq!(
            projection.status,
            SubscriptionStatus::Active,
            "late checkout stub must not replace lifecycle status"
        );
        assert!(
            projection.tenant_id.is_some(),
            "late checkout still backfills the tenant link"
        );
    }

    // =========================================================================
    // Subscription deletion projects a canceled row even if the payload
    // status says otherwise
    // =========================================================================
    #[tokio::test]
    async fn test_subscription_deleted_maps_to_canceled() {
        let (service, store) = test_service();
        seed_plan(&store);

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let created = subscription_event("evt_1", "sub_1", "active", now);
        service
            .webhooks
            .ingest(&created, &sign(&created))
            .await
            .unwrap();

        let deleted = json!({
            "id": "evt_2",
            "type": "customer.subscription.deleted",
            "created": now + 10,
            "data": {"object": {
                "id": "sub_1",
                "customer": "cus_42",
                "status": "active",
                "current_period_end": now + 1000
            }}
        })
        .to_string();
        service
            .webhooks
            .ingest(&deleted, &sign(&deleted))
            .await
            .unwrap();

        let projection = store.get_projection(crate::PROVIDER_STRIPE, "sub_1").unwrap();
        assert_eq!(projection.status, SubscriptionStatus::Canceled);
    }
}

// =============================================================================
// Subscription projector
// =============================================================================
mod projector_tests {
    use super::*;
    use crate::provider::{SubscriptionSnapshot, PROVIDER_STRIPE};
    use pickpoint_shared::SubscriptionStatus;

    fn snapshot(subscription_id: &str, status: SubscriptionStatus) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            provider_subscription_id: subscription_id.to_string(),
            provider_customer_id: Some("cus_42".to_string()),
            status,
            trial_end: None,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            price_id: Some("price_basic".to_string()),
            plan_code: None,
            tenant_hint: None,
            email_hint: None,
            event_created_at: None,
        }
    }

    fn at(unix: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(unix).unwrap()
    }

    // =========================================================================
    // BILL-P01: Two snapshots for one subscription id leave exactly one
    // row holding the later-processed snapshot's fields
    // =========================================================================
    #[tokio::test]
    async fn test_upsert_last_write_wins_by_arrival() {
        let (service, store) = test_service();
        seed_plan(&store);

        service
            .projector
            .apply(snapshot("sub_1", SubscriptionStatus::Trialing))
            .await
            .unwrap();
        service
            .projector
            .apply(snapshot("sub_1", SubscriptionStatus::Active))
            .await
            .unwrap();

        let projection = store.get_projection(PROVIDER_STRIPE, "sub_1").unwrap();
        assert_eq!(projection.status, SubscriptionStatus::Active);
    }

    // =========================================================================
    // BILL-P02: Reapplying an identical snapshot does not change content
    // =========================================================================
    #[tokio::test]
    async fn test_upsert_idempotent() {
        let (service, store) = test_service();
        seed_plan(&store);

        let mut snap = snapshot("sub_1", SubscriptionStatus::Active);
        snap.current_period_end = Some(at(1_700_000_000));
        snap.event_created_at = Some(at(1_699_999_000));

        service.projector.apply(snap.clone()).await.unwrap();
        let first = store.get_projection(PROVIDER_STRIPE, "sub_1").unwrap();

        service.projector.apply(snap).await.unwrap();
        let second = store.get_projection(PROVIDER_STRIPE, "sub_1").unwrap();

        assert_eq!(first.id, second.id, "still exactly one row");
        assert_eq!(first.status, second.status);
        assert_eq!(first.plan_id, second.plan_id);
        assert_eq!(first.tenant_id, second.tenant_id);
        assert_eq!(first.current_period_end, second.current_period_end);
        assert_eq!(first.last_event_at, second.last_event_at);
    }

    // =========================================================================
    // BILL-P03: A snapshot older than the stored one (by provider event
    // timestamp) is skipped
    // =========================================================================
    #[tokio::test]
    async fn test_stale_snapshot_skipped() {
        let (service, store) = test_service();
        seed_plan(&store);

        let mut newer = snapshot("sub_1", SubscriptionStatus::Canceled);
        newer.event_created_at = Some(at(2_000));
        service.projector.apply(newer).await.unwrap();

        let mut older = snapshot("sub_1", SubscriptionStatus::Active);
        older.event_created_at = Some(at(1_000));
        service.projector.apply(older).await.unwrap();

        let projection = store.get_projection(PROVIDER_STRIPE, "sub_1").unwrap();
        assert_eq!(
            projection.status,
            SubscriptionStatus::Canceled,
            "out-of-order snapshot must not resurrect the subscription"
        );
    }

    // =========================================================================
    // BILL-P04: Without event timestamps the behaviour stays last-write-
    // wins by arrival order
    // =========================================================================
    #[tokio::test]
    async fn test_no_timestamps_last_write_wins() {
        let (service, store) = test_service();
        seed_plan(&store);

        service
            .projector
            .apply(snapshot("sub_1", SubscriptionStatus::Canceled))
            .await
            .unwrap();
        service
            .projector
            .apply(snapshot("sub_1", SubscriptionStatus::Active))
            .await
            .unwrap();

        let projection = store.get_projection(PROVIDER_STRIPE, "sub_1").unwrap();
        assert_eq!(projection.status, SubscriptionStatus::Active);
    }

    // =========================================================================
    // BILL-P05: Plan resolution order - metadata code wins, price id is
    // the fallback, both missing degrades to a null plan
    // =========================================================================
    #[tokio::test]
    async fn test_plan_resolution_order() {
        let (service, store) = test_service();
        let basic = seed_plan(&store);
        let premium = pickpoint_shared::Plan {
            id: pickpoint_shared::PlanId::new(),
            code: "depot-premium".to_string(),
            name: "Depot Premium".to_string(),
            provider_price_id: "price_premium".to_string(),
            billing_interval: "month".to_string(),
            currency: "eur".to_string(),
            unit_amount_cents: 5900,
            active: true,
        };
        store.add_plan(premium.clone());

        // Metadata code beats the attached price id.
        let mut snap = snapshot("sub_1", SubscriptionStatus::Active);
        snap.plan_code = Some("depot-premium".to_string());
        snap.price_id = Some("price_basic".to_string());
        let projection = service.projector.apply(snap).await.unwrap();
        assert_eq!(projection.plan_id, Some(premium.id));

        // Unknown code falls back to the price id.
        let mut snap = snapshot("sub_2", SubscriptionStatus::Active);
        snap.plan_code = Some("no-such-code".to_string());
        snap.price_id = Some("price_basic".to_string());
        let projection = service.projector.apply(snap).await.unwrap();
        assert_eq!(projection.plan_id, Some(basic.id));

        // Nothing resolvable stores a null plan instead of failing.
        let mut snap = snapshot("sub_3", SubscriptionStatus::Active);
        snap.plan_code = None;
        snap.price_id = Some("price_unknown".to_string());
        let projection = service.projector.apply(snap).await.unwrap();
        assert_eq!(projection.plan_id, None);
    }

    // =========================================================================
    // BILL-P06: Tenant resolution order - existing projection link wins,
    // then checkout hint, then provider customer id
    // =========================================================================
    #[tokio::test]
    async fn test_tenant_resolution_order() {
        let (service, store) = test_service();
        seed_plan(&store);

        // Customer-id path: a tenant already carries cus_42.
        let by_customer = service
            .directory
            .find_or_create_by_email("first@depot.example")
            .await
            .unwrap();
        service
            .directory
            .reconcile_provider_customer(&by_customer, "cus_42")
            .await
            .unwrap();

        let projection = service
            .projector
            .apply(snapshot("sub_1", SubscriptionStatus::Active))
            .await
            .unwrap();
        assert_eq!(projection.tenant_id, Some(by_customer.id));

        // Hint path: an explicit tenant hint beats the customer match.
        let hinted = service
            .directory
            .find_or_create_by_email("second@depot.example")
            .await
            .unwrap();
        let mut snap = snapshot("sub_2", SubscriptionStatus::Active);
        snap.tenant_hint = Some(hinted.id);
        let projection = service.projector.apply(snap).await.unwrap();
        assert_eq!(projection.tenant_id, Some(hinted.id));

        // Existing-projection path: later snapshots without hints keep the
        // established link.
        let mut snap = snapshot("sub_2", SubscriptionStatus::PastDue);
        snap.provider_customer_id = None;
        let projection = service.projector.apply(snap).await.unwrap();
        assert_eq!(projection.tenant_id, Some(hinted.id));
    }

    // =========================================================================
    // BILL-P07: Unresolvable tenant stores an unlinked projection rather
    // than dropping the event
    // =========================================================================
    #[tokio::test]
    async fn test_unresolved_tenant_stores_unlinked_row() {
        let (service, store) = test_service();
        seed_plan(&store);

        let projection = service
            .projector
            .apply(snapshot("sub_orphan", SubscriptionStatus::Active))
            .await
            .unwrap();
        assert_eq!(projection.tenant_id, None);
        assert!(store.get_projection(PROVIDER_STRIPE, "sub_orphan").is_some());
    }

    // =========================================================================
    // BILL-P08: Provider customer id is backfilled and reconciled on the
    // tenant record
    // =========================================================================
    #[tokio::test]
    async fn test_customer_id_backfill_and_reconcile() {
        let (service, store) = test_service();
        seed_plan(&store);

        let tenant = service
            .directory
            .find_or_create_by_email("owner@depot.example")
            .await
            .unwrap();
        assert_eq!(tenant.provider_customer_id, None);

        let mut snap = snapshot("sub_1", SubscriptionStatus::Active);
        snap.tenant_hint = Some(tenant.id);
        service.projector.apply(snap).await.unwrap();
        let tenant = store.get_tenant(tenant.id).unwrap();
        assert_eq!(tenant.provider_customer_id.as_deref(), Some("cus_42"));

        // A newer event carrying a different customer id wins.
        let mut snap = snapshot("sub_1", SubscriptionStatus::Active);
        snap.provider_customer_id = Some("cus_43".to_string());
        service.projector.apply(snap).await.unwrap();
        let tenant = store.get_tenant(tenant.id).unwrap();
        assert_eq!(tenant.provider_customer_id.as_deref(), Some("cus_43"));
    }

    // =========================================================================
    // current_for_tenant prefers the live projection over dead history
    // =========================================================================
    #[tokio::test]
    async fn test_current_projection_prefers_live_row() {
        use crate::store::SubscriptionStore;

        let (service, store) = test_service();
        seed_plan(&store);

        let tenant = service
            .directory
            .find_or_create_by_email("owner@depot.example")
            .await
            .unwrap();

        let mut old = snapshot("sub_old", SubscriptionStatus::Canceled);
        old.tenant_hint = Some(tenant.id);
        service.projector.apply(old).await.unwrap();

        let mut live = snapshot("sub_live", SubscriptionStatus::Active);
        live.tenant_hint = Some(tenant.id);
        service.projector.apply(live).await.unwrap();

        let current = store.current_for_tenant(tenant.id).await.unwrap().unwrap();
        assert_eq!(current.provider_subscription_id, "sub_live");
    }
}

// =============================================================================
// Tenant directory
// =============================================================================
mod directory_tests {
    use super::*;

    // =========================================================================
    // BILL-T01: Billing email matching is case-insensitive
    // =========================================================================
    #[tokio::test]
    async fn test_find_or_create_case_insensitive() {
        let (service, _store) = test_service();

        let first = service
            .directory
            .find_or_create_by_email("Owner@Depot-Nord.example")
            .await
            .unwrap();
        let second = service
            .directory
            .find_or_create_by_email("owner@depot-nord.EXAMPLE")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.billing_email, "owner@depot-nord.example");
    }

    // =========================================================================
    // BILL-T02: New tenants get trial defaults
    // =========================================================================
    #[tokio::test]
    async fn test_new_tenant_trial_defaults() {
        let (service, _store) = test_service();

        let tenant = service
            .directory
            .find_or_create_by_email("fresh@depot.example")
            .await
            .unwrap();
        assert!(tenant.trial_active);
        assert_eq!(tenant.trial_quota, pickpoint_shared::DEFAULT_TRIAL_QUOTA);
        assert_eq!(tenant.trial_used, 0);
        assert!(!tenant.soft_blocked);
        assert_eq!(tenant.slug, "fresh");
    }

    // =========================================================================
    // BILL-T03: Slug collisions get a suffix
    // =========================================================================
    #[tokio::test]
    async fn test_slug_collision_suffixed() {
        let (service, _store) = test_service();

        let first = service
            .directory
            .find_or_create_by_email("owner@depot-a.example")
            .await
            .unwrap();
        let second = service
            .directory
            .find_or_create_by_email("owner@depot-b.example")
            .await
            .unwrap();

        assert_eq!(first.slug, "owner");
        assert_ne!(second.slug, first.slug);
        assert!(second.slug.starts_with("owner-"));
    }

    // =========================================================================
    // BILL-T04: Empty billing email cannot resolve a tenant
    // =========================================================================
    #[tokio::test]
    async fn test_empty_email_rejected() {
        let (service, _store) = test_service();
        let result = service.directory.find_or_create_by_email("  ").await;
        assert!(matches!(
            result,
            Err(crate::BillingError::UnresolvedTenant(_))
        ));
    }
}
