// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pickpoint Billing Module
//!
//! Reconciles asynchronous payment-provider events into a local
//! subscription projection per tenant and computes the entitlement that
//! gates every other API call.
//!
//! ## Features
//!
//! - **Webhook Ingress**: signature verification, ledger-backed
//!   deduplication, event routing
//! - **Subscription Projector**: idempotent keyed upserts with an
//!   out-of-order guard
//! - **Tenant Directory**: find-or-create by billing email, provider
//!   customer reconciliation
//! - **Plan Catalog**: provider price / internal code resolution
//! - **Entitlement Calculator**: pure access decisions from trial and
//!   subscription state

pub mod catalog;
pub mod directory;
pub mod entitlement;
pub mod error;
pub mod projector;
pub mod provider;
pub mod store;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Catalog
pub use catalog::PlanCatalog;

// Directory
pub use directory::TenantDirectory;

// Entitlement
pub use entitlement::{
    compute_entitlement, Entitlement, EntitlementReason, PlanSummary, TrialSnapshot,
};

// Error
pub use error::{BillingError, BillingResult};

// Projector
pub use projector::SubscriptionProjector;

// Provider wire types
pub use provider::{
    CheckoutSessionObject, EventEnvelope, SubscriptionObject, SubscriptionSnapshot,
    PROVIDER_STRIPE,
};

// Store
pub use store::{
    ClaimOutcome, EventLedgerStore, MemoryStore, NewLedgerEvent, NewTenant, PgStore, PlanStore,
    ProjectionUpsert, StoreError, SubscriptionStore, TenantStore,
};

// Webhooks
pub use webhooks::{IngestOutcome, WebhookHandler};

use std::sync::Arc;

use sqlx::PgPool;

/// Provider-facing configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider API key. Held as part of the configuration surface; this
    /// subsystem itself performs no outbound provider calls.
    pub secret_key: String,
    /// Shared secret for webhook signature verification.
    pub webhook_secret: String,
}

impl ProviderConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?;
        Ok(Self {
            secret_key,
            webhook_secret,
        })
    }
}

/// Main billing service that combines the subsystem's components.
pub struct BillingService {
    pub directory: TenantDirectory,
    pub catalog: PlanCatalog,
    pub projector: SubscriptionProjector,
    pub webhooks: WebhookHandler,
    /// Read handle for the firewall's projection lookup.
    pub subscriptions: Arc<dyn SubscriptionStore>,
}

impl BillingService {
    /// Create a billing service over Postgres from environment variables.
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let config = ProviderConfig::from_env()?;
        Ok(Self::new(config, Arc::new(PgStore::new(pool))))
    }

    /// Create a billing service over the Postgres store.
    pub fn new(config: ProviderConfig, store: Arc<PgStore>) -> Self {
        Self::with_stores(
            config,
            store.clone(),
            store.clone(),
            store.clone(),
            store,
        )
    }

    /// Create a billing service with explicit repositories. Tests inject
    /// the in-memory store here.
    pub fn with_stores(
        config: ProviderConfig,
        tenants: Arc<dyn TenantStore>,
        plans: Arc<dyn PlanStore>,
        ledger: Arc<dyn EventLedgerStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
    ) -> Self {
        let directory = TenantDirectory::new(tenants);
        let catalog = PlanCatalog::new(plans);
        let projector =
            SubscriptionProjector::new(directory.clone(), catalog.clone(), subscriptions.clone());
        let webhooks = WebhookHandler::new(
            config.webhook_secret,
            ledger,
            directory.clone(),
            projector.clone(),
        );

        Self {
            directory,
            catalog,
            projector,
            webhooks,
            subscriptions,
        }
    }
}
