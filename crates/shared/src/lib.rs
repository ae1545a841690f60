// Shared crate clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Pickpoint shared types
//!
//! Domain types used by both the API server and the billing crate, plus
//! database pool and migration helpers.

pub mod db;
pub mod types;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use types::{
    Plan, PlanId, SubscriptionProjection, SubscriptionStatus, Tenant, TenantId,
    DEFAULT_TRIAL_QUOTA,
};
