//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use pickpoint_billing::{BillingService, PgStore, ProviderConfig};

use crate::config::Config;
use crate::tenancy::{SlugHeaderResolver, TenantResolver};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub billing: Arc<BillingService>,
    pub tenant_resolver: Arc<dyn TenantResolver>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> anyhow::Result<Self> {
        let provider_config = ProviderConfig::from_env()?;
        if !provider_config.secret_key.is_empty() {
            tracing::info!("Provider API key configured");
        }

        let store = Arc::new(PgStore::new(pool));
        let billing = Arc::new(BillingService::new(provider_config, store.clone()));
        tracing::info!("Billing service initialized");

        let tenant_resolver: Arc<dyn TenantResolver> =
            Arc::new(SlugHeaderResolver::new(store));
        tracing::info!("Tenant slug resolver initialized");

        Ok(Self {
            config,
            billing,
            tenant_resolver,
        })
    }
}
