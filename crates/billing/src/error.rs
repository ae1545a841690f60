//! Billing error types
//!
//! One variant per failure class in the webhook/projection pipeline.
//! Duplicate deliveries and unknown event types are *not* errors; they are
//! successful no-op outcomes (`IngestOutcome`), so "deny by default" and
//! "retry on failure" decisions can be made on the type alone.

use thiserror::Error;

use crate::store::StoreError;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    /// Transport authenticity check failed. Permanent: the provider must
    /// not retry this delivery.
    #[error("webhook signature invalid")]
    InvalidSignature,

    /// The payload did not parse as a provider event envelope. Permanent.
    #[error("malformed provider event: {0}")]
    MalformedEvent(String),

    /// A tenant was required but could not be resolved.
    #[error("tenant not resolved: {0}")]
    UnresolvedTenant(String),

    /// Missing or invalid environment configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The persistent store failed. Transient: surfaces as retryable to
    /// the provider and as a 5xx to firewall callers.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BillingError {
    /// Whether the provider should redeliver the event that caused this
    /// error. Signature and parse failures are permanent rejections.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::Store(_))
    }
}
