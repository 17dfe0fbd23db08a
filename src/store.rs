//! Storage capabilities used by the pipeline.
//!
//! `db_storage` provides the Postgres implementations; tests substitute
//! in-memory ones.

use crate::errors::AppError;
use crate::models::{AutomationRule, Client, DistributionStatus, Lead, NewLead, Signup};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError>;

    /// Clients whose activity flag is set right now.
    async fn active_clients(&self) -> Result<Vec<Client>, AppError>;

    /// Inserts one `pending` row per client in a single write.
    ///
    /// Pairs that already exist are skipped; returns the number inserted.
    async fn insert_distributions(
        &self,
        lead_id: Uuid,
        client_ids: &[Uuid],
    ) -> Result<usize, AppError>;

    /// Updates every distribution row of a lead; returns rows affected.
    async fn set_distribution_status(
        &self,
        lead_id: Uuid,
        status: DistributionStatus,
    ) -> Result<u64, AppError>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active rules, highest priority first.
    async fn active_rules(&self) -> Result<Vec<AutomationRule>, AppError>;
}

/// Signup persistence.
///
/// The activation methods are conditional updates: each returns `false`
/// when the row was no longer in the state the caller observed, which is how
/// concurrent redemptions of the same token are serialized.
#[async_trait]
pub trait SignupStore: Send + Sync {
    async fn find_by_token(&self, token: &str) -> Result<Option<Signup>, AppError>;

    /// Most recent verified signup with a billing customer for this email.
    async fn find_billable_by_email(&self, email: &str) -> Result<Option<Signup>, AppError>;

    /// `pending` + unverified → `trial_active` + verified.
    async fn activate_trial(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Reserves a `pending` + unverified signup for one paid activation.
    async fn claim_activation(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Clears a claim whose activation did not reach a terminal state, so
    /// the token can be redeemed again.
    async fn release_claim(&self, id: Uuid) -> Result<(), AppError>;

    async fn set_customer_id(&self, id: Uuid, customer_id: &str) -> Result<(), AppError>;

    async fn mark_active(
        &self,
        id: Uuid,
        customer_id: &str,
        subscription_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn mark_payment_failed(&self, id: Uuid, error: &str) -> Result<(), AppError>;

    /// Moves every unverified `pending` signup created before `cutoff` to
    /// `expired`; returns how many moved.
    async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    /// Page of signups, newest first, plus the total count.
    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Signup>, i64), AppError>;
}
