use crate::errors::{AppError, ResultExt};
use crate::models::{AutomationRule, Client, DistributionStatus, Lead, NewLead, Signup, SignupStatus};
use crate::store::{LeadStore, RuleStore, SignupStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const SIGNUP_COLUMNS: &str = r#"
    id, email, full_name, business_name, plan, status, verification_token,
    token_expires_at, verified, verified_at, activation_claimed_at,
    payment_method_id, stripe_customer_id, stripe_subscription_id,
    payment_error, created_at, updated_at
"#;

/// Postgres-backed storage for leads, rules and signups.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        let inserted = sqlx::query_as::<_, Lead>(
            r#"
            INSERT INTO leads
                (first_name, last_name, email, phone, company_name, job_title, website, source, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, first_name, last_name, email, phone, company_name, job_title,
                      website, source, metadata, created_at
            "#,
        )
        .bind(&lead.first_name)
        .bind(&lead.last_name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.company_name)
        .bind(&lead.job_title)
        .bind(&lead.website)
        .bind(&lead.source)
        .bind(&lead.metadata)
        .fetch_one(&self.pool)
        .await
        .context("inserting lead")?;

        tracing::debug!("Stored lead {}", inserted.id);
        Ok(inserted)
    }

    async fn active_clients(&self) -> Result<Vec<Client>, AppError> {
        let clients = sqlx::query_as::<_, Client>(
            "SELECT id, name, email, is_active, created_at FROM clients WHERE is_active = true",
        )
        .fetch_all(&self.pool)
        .await
        .context("loading active clients")?;

        Ok(clients)
    }

    async fn insert_distributions(
        &self,
        lead_id: Uuid,
        client_ids: &[Uuid],
    ) -> Result<usize, AppError> {
        if client_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO lead_distribution (lead_id, client_id, status)
            SELECT $1, client_id, $3
            FROM UNNEST($2::uuid[]) AS t(client_id)
            ON CONFLICT (lead_id, client_id) DO NOTHING
            "#,
        )
        .bind(lead_id)
        .bind(client_ids)
        .bind(DistributionStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .context("inserting lead distribution rows")?;

        Ok(result.rows_affected() as usize)
    }

    async fn set_distribution_status(
        &self,
        lead_id: Uuid,
        status: DistributionStatus,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE lead_distribution
            SET status = $2, updated_at = now()
            WHERE lead_id = $1
            "#,
        )
        .bind(lead_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .context("updating distribution status")?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RuleStore for PgStore {
    async fn active_rules(&self) -> Result<Vec<AutomationRule>, AppError> {
        let rules = sqlx::query_as::<_, AutomationRule>(
            r#"
            SELECT id, name, priority, is_active, conditions, actions, stop_on_match, created_at
            FROM automation_rules
            WHERE is_active = true
            ORDER BY priority DESC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("loading automation rules")?;

        Ok(rules)
    }
}

#[async_trait]
impl SignupStore for PgStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<Signup>, AppError> {
        let signup = sqlx::query_as::<_, Signup>(&format!(
            "SELECT {} FROM signups WHERE verification_token = $1",
            SIGNUP_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("looking up signup by token")?;

        Ok(signup)
    }

    async fn find_billable_by_email(&self, email: &str) -> Result<Option<Signup>, AppError> {
        let signup = sqlx::query_as::<_, Signup>(&format!(
            r#"
            SELECT {} FROM signups
            WHERE lower(email) = lower($1)
              AND verified = true
              AND stripe_customer_id IS NOT NULL
            ORDER BY verified_at DESC NULLS LAST
            LIMIT 1
            "#,
            SIGNUP_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("looking up billable signup")?;

        Ok(signup)
    }

    async fn activate_trial(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE signups
            SET verified = true, status = $2, verified_at = $3, updated_at = now()
            WHERE id = $1 AND verified = false AND status = $4
            "#,
        )
        .bind(id)
        .bind(SignupStatus::TrialActive.as_str())
        .bind(at)
        .bind(SignupStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .context("activating trial")?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_activation(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE signups
            SET activation_claimed_at = $2, updated_at = now()
            WHERE id = $1
              AND verified = false
              AND status = $3
              AND activation_claimed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(SignupStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .context("claiming signup activation")?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE signups
            SET activation_claimed_at = NULL, updated_at = now()
            WHERE id = $1 AND verified = false AND status = $2
            "#,
        )
        .bind(id)
        .bind(SignupStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .context("releasing activation claim")?;

        Ok(())
    }

    async fn set_customer_id(&self, id: Uuid, customer_id: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE signups SET stripe_customer_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .context("storing billing customer id")?;

        Ok(())
    }

    async fn mark_active(
        &self,
        id: Uuid,
        customer_id: &str,
        subscription_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE signups
            SET verified = true,
                status = $2,
                stripe_customer_id = $3,
                stripe_subscription_id = $4,
                payment_error = NULL,
                verified_at = $5,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(SignupStatus::Active.as_str())
        .bind(customer_id)
        .bind(subscription_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .context("marking signup active")?;

        Ok(())
    }

    async fn mark_payment_failed(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE signups
            SET status = $2, payment_error = $3, updated_at = now()
            WHERE id = $1 AND verified = false
            "#,
        )
        .bind(id)
        .bind(SignupStatus::PaymentFailed.as_str())
        .bind(error)
        .execute(&self.pool)
        .await
        .context("marking signup payment failed")?;

        Ok(())
    }

    async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE signups
            SET status = $1, updated_at = now()
            WHERE status = $2 AND verified = false AND created_at < $3
            "#,
        )
        .bind(SignupStatus::Expired.as_str())
        .bind(SignupStatus::Pending.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("expiring stale signups")?;

        Ok(result.rows_affected())
    }

    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Signup>, i64), AppError> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);

        let items = sqlx::query_as::<_, Signup>(&format!(
            "SELECT {} FROM signups ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            SIGNUP_COLUMNS
        ))
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("listing signups")?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM signups")
            .fetch_one(&self.pool)
            .await
            .context("counting signups")?;

        Ok((items, total))
    }
}
