//! Plan catalog
//!
//! Read-only resolution from provider price ids and internal plan codes to
//! plan rows. Resolution is an explicit ordered strategy list; each step
//! returns a definite found/not-found, and exhausting the list degrades to
//! "no plan" rather than failing the caller.

use std::sync::Arc;

use pickpoint_shared::{Plan, PlanId};

use crate::error::BillingResult;
use crate::store::PlanStore;

/// One way of locating a plan, tried in order.
#[derive(Debug, Clone, Copy)]
enum PlanLookup<'a> {
    /// Explicit internal plan code carried in event metadata.
    MetadataCode(&'a str),
    /// Provider price id of the subscription's primary line item.
    PrimaryPriceId(&'a str),
}

#[derive(Clone)]
pub struct PlanCatalog {
    plans: Arc<dyn PlanStore>,
}

impl PlanCatalog {
    pub fn new(plans: Arc<dyn PlanStore>) -> Self {
        Self { plans }
    }

    pub async fn find(&self, id: PlanId) -> BillingResult<Option<Plan>> {
        Ok(self.plans.find_by_id(id).await?)
    }

    /// Resolve a plan from the hints a subscription snapshot carries.
    /// `None` means no strategy matched; the projection is stored with a
    /// null plan id in that case.
    pub async fn resolve(
        &self,
        plan_code: Option<&str>,
        price_id: Option<&str>,
    ) -> BillingResult<Option<Plan>> {
        let strategies: Vec<PlanLookup<'_>> = plan_code
            .map(PlanLookup::MetadataCode)
            .into_iter()
            .chain(price_id.map(PlanLookup::PrimaryPriceId))
            .collect();

        for strategy in strategies {
            let found = match strategy {
                PlanLookup::MetadataCode(code) => self.plans.find_by_code(code).await?,
                PlanLookup::PrimaryPriceId(price) => {
                    self.plans.find_by_price_id(price).await?
                }
            };
            match found {
                Some(plan) => return Ok(Some(plan)),
                None => {
                    tracing::debug!(strategy = ?strategy, "Plan lookup strategy missed");
                }
            }
        }

        Ok(None)
    }
}
