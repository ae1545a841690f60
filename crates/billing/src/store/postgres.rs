//! Postgres implementation of the storage interfaces

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use pickpoint_shared::{
    Plan, PlanId, SubscriptionProjection, Tenant, TenantId, DEFAULT_TRIAL_QUOTA,
};

use super::{
    ClaimOutcome, EventLedgerStore, NewLedgerEvent, NewTenant, PlanStore, ProjectionUpsert,
    StoreError, SubscriptionStore, TenantStore, STUCK_PROCESSING_MINUTES,
};

/// Postgres-backed store. One instance implements every repository trait;
/// components receive it as separate `Arc<dyn Trait>` handles.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgStore {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, StoreError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Tenant>, StoreError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE LOWER(billing_email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tenant)
    }

    async fn find_by_provider_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Tenant>, StoreError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT * FROM tenants WHERE provider_customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tenant)
    }

    async fn insert(&self, tenant: NewTenant) -> Result<Tenant, StoreError> {
        let created = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (
                id, slug, billing_email, provider_customer_id,
                trial_active, trial_quota, trial_used, soft_blocked,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, TRUE, $5, 0, FALSE, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&tenant.slug)
        .bind(&tenant.billing_email)
        .bind(&tenant.provider_customer_id)
        .bind(DEFAULT_TRIAL_QUOTA)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn set_provider_customer_id(
        &self,
        id: TenantId,
        customer_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tenants SET provider_customer_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.0)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PlanStore for PgStore {
    async fn find_by_id(&self, id: PlanId) -> Result<Option<Plan>, StoreError> {
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Plan>, StoreError> {
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE code = $1 AND active")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    async fn find_by_price_id(
        &self,
        provider_price_id: &str,
    ) -> Result<Option<Plan>, StoreError> {
        let plan = sqlx::query_as::<_, Plan>(
            "SELECT * FROM plans WHERE provider_price_id = $1 AND active",
        )
        .bind(provider_price_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plan)
    }
}

#[async_trait]
impl EventLedgerStore for PgStore {
    /// Atomic claim via INSERT...ON CONFLICT...RETURNING, so two concurrent
    /// deliveries of the same event id cannot both win. A `failed` row is
    /// reclaimable (the provider redelivers after our 5xx), as is a
    /// `processing` row stuck past the timeout.
    async fn claim(&self, event: &NewLedgerEvent) -> Result<ClaimOutcome, StoreError> {
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO provider_events
                (provider_event_id, event_type, payload, processing_state, received_at)
            VALUES ($1, $2, $3::jsonb, 'processing', NOW())
            ON CONFLICT (provider_event_id) DO UPDATE SET
                processing_state = 'processing',
                last_error = NULL,
                received_at = NOW()
            WHERE provider_events.processing_state = 'failed'
               OR (provider_events.processing_state = 'processing'
                   AND provider_events.received_at < NOW() - ($4 || ' minutes')::INTERVAL)
            RETURNING id
            "#,
        )
        .bind(&event.provider_event_id)
        .bind(&event.event_type)
        .bind(event.payload.to_string())
        .bind(STUCK_PROCESSING_MINUTES)
        .fetch_optional(&self.pool)
        .await?;

        Ok(if claimed.is_some() {
            ClaimOutcome::Claimed
        } else {
            ClaimOutcome::AlreadySeen
        })
    }

    async fn mark_processed(&self, provider_event_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE provider_events SET processing_state = 'processed' WHERE provider_event_id = $1",
        )
        .bind(provider_event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        provider_event_id: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE provider_events
            SET processing_state = 'failed', last_error = $2
            WHERE provider_event_id = $1
            "#,
        )
        .bind(provider_event_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    async fn find_by_provider_id(
        &self,
        provider: &str,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionProjection>, StoreError> {
        let projection = sqlx::query_as::<_, SubscriptionProjection>(
            r#"
            SELECT * FROM subscription_projections
            WHERE provider = $1 AND provider_subscription_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(projection)
    }

    async fn current_for_tenant(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<SubscriptionProjection>, StoreError> {
        let projection = sqlx::query_as::<_, SubscriptionProjection>(
            r#"
            SELECT * FROM subscription_projections
            WHERE tenant_id = $1
            ORDER BY (status IN ('active', 'trialing', 'past_due')) DESC, updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(projection)
    }

    async fn upsert(&self, row: &ProjectionUpsert) -> Result<(), StoreError> {
        // The WHERE clause on the conflict action is the out-of-order
        // guard: a snapshot strictly older than the stored one (both
        // event timestamps known) leaves the row untouched. Resolved
        // tenant/plan/customer ids survive later snapshots without them.
        sqlx::query(
            r#"
            INSERT INTO subscription_projections (
                id, tenant_id, plan_id, provider, provider_customer_id,
                provider_subscription_id, status, trial_end,
                current_period_start, current_period_end,
                cancel_at_period_end, last_event_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            ON CONFLICT (provider, provider_subscription_id) DO UPDATE SET
                tenant_id = COALESCE(EXCLUDED.tenant_id, subscription_projections.tenant_id),
                plan_id = COALESCE(EXCLUDED.plan_id, subscription_projections.plan_id),
                provider_customer_id = COALESCE(
                    EXCLUDED.provider_customer_id, subscription_projections.provider_customer_id),
                status = EXCLUDED.status,
                trial_end = EXCLUDED.trial_end,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                last_event_at = EXCLUDED.last_event_at,
                updated_at = NOW()
            WHERE subscription_projections.last_event_at IS NULL
               OR EXCLUDED.last_event_at IS NULL
               OR EXCLUDED.last_event_at >= subscription_projections.last_event_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.tenant_id.map(|t| t.0))
        .bind(row.plan_id.map(|p| p.0))
        .bind(&row.provider)
        .bind(&row.provider_customer_id)
        .bind(&row.provider_subscription_id)
        .bind(row.status.as_str())
        .bind(row.trial_end)
        .bind(row.current_period_start)
        .bind(row.current_period_end)
        .bind(row.cancel_at_period_end)
        .bind(row.last_event_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_if_absent(&self, row: &ProjectionUpsert) -> Result<bool, StoreError> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO subscription_projections (
                id, tenant_id, plan_id, provider, provider_customer_id,
                provider_subscription_id, status, trial_end,
                current_period_start, current_period_end,
                cancel_at_period_end, last_event_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            ON CONFLICT (provider, provider_subscription_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.tenant_id.map(|t| t.0))
        .bind(row.plan_id.map(|p| p.0))
        .bind(&row.provider)
        .bind(&row.provider_customer_id)
        .bind(&row.provider_subscription_id)
        .bind(row.status.as_str())
        .bind(row.trial_end)
        .bind(row.current_period_start)
        .bind(row.current_period_end)
        .bind(row.cancel_at_period_end)
        .bind(row.last_event_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }

    async fn link_tenant_if_missing(
        &self,
        provider: &str,
        provider_subscription_id: &str,
        tenant_id: TenantId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE subscription_projections
            SET tenant_id = $3, updated_at = NOW()
            WHERE provider = $1 AND provider_subscription_id = $2 AND tenant_id IS NULL
            "#,
        )
        .bind(provider)
        .bind(provider_subscription_id)
        .bind(tenant_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
