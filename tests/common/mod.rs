//! In-memory fakes shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use riva_leads::billing::{BillingProvider, PriceInfo};
use riva_leads::errors::AppError;
use riva_leads::mailer::{EmailSender, OutgoingEmail};
use riva_leads::models::{
    AutomationRule, Client, DistributionStatus, Lead, NewLead, Plan, Signup, SignupStatus,
};
use riva_leads::store::{LeadStore, RuleStore, SignupStore};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DistributionRow {
    pub lead_id: Uuid,
    pub client_id: Uuid,
    pub status: DistributionStatus,
}

#[derive(Default)]
pub struct MemoryStore {
    pub leads: Mutex<Vec<Lead>>,
    pub clients: Mutex<Vec<Client>>,
    pub distributions: Mutex<Vec<DistributionRow>>,
    pub rules: Mutex<Vec<AutomationRule>>,
    pub signups: Mutex<Vec<Signup>>,
    pub fail_distribution: AtomicBool,
    /// The next `mark_active` call fails.
    pub fail_mark_active_once: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&self, name: &str, is_active: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.clients.lock().unwrap().push(Client {
            id,
            name: name.to_string(),
            email: None,
            is_active,
            created_at: Utc::now(),
        });
        id
    }

    pub fn set_client_active(&self, id: Uuid, is_active: bool) {
        let mut clients = self.clients.lock().unwrap();
        if let Some(client) = clients.iter_mut().find(|c| c.id == id) {
            client.is_active = is_active;
        }
    }

    pub fn add_rule(&self, name: &str, priority: i32, conditions: Value, actions: Value, stop_on_match: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.rules.lock().unwrap().push(AutomationRule {
            id,
            name: name.to_string(),
            priority,
            is_active: true,
            conditions,
            actions,
            stop_on_match,
            created_at: Utc::now(),
        });
        id
    }

    pub fn distributions_for(&self, lead_id: Uuid) -> Vec<DistributionRow> {
        self.distributions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.lead_id == lead_id)
            .cloned()
            .collect()
    }

    pub fn insert_signup(&self, signup: Signup) {
        self.signups.lock().unwrap().push(signup);
    }

    pub fn signup(&self, id: Uuid) -> Signup {
        self.signups
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .expect("signup exists")
    }
}

/// Pending signup with a one-day verification token.
pub fn pending_signup(plan: Plan, token: &str) -> Signup {
    let now = Utc::now();
    Signup {
        id: Uuid::new_v4(),
        email: "owner@clinic.io".to_string(),
        full_name: Some("Dana Owner".to_string()),
        business_name: Some("Clinic".to_string()),
        plan,
        status: SignupStatus::Pending,
        verification_token: Some(token.to_string()),
        token_expires_at: Some(now + Duration::days(1)),
        verified: false,
        verified_at: None,
        activation_claimed_at: None,
        payment_method_id: plan.is_paid().then(|| "pm_card_visa".to_string()),
        stripe_customer_id: None,
        stripe_subscription_id: None,
        payment_error: None,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        let stored = Lead {
            id: Uuid::new_v4(),
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            company_name: lead.company_name.clone(),
            job_title: lead.job_title.clone(),
            website: lead.website.clone(),
            source: lead.source.clone(),
            metadata: lead.metadata.clone(),
            created_at: Utc::now(),
        };
        self.leads.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn active_clients(&self) -> Result<Vec<Client>, AppError> {
        Ok(self
            .clients
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn insert_distributions(&self, lead_id: Uuid, client_ids: &[Uuid]) -> Result<usize, AppError> {
        if self.fail_distribution.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }

        let mut rows = self.distributions.lock().unwrap();
        let mut inserted = 0;
        for client_id in client_ids {
            if !rows.iter().any(|r| r.lead_id == lead_id && r.client_id == *client_id) {
                rows.push(DistributionRow {
                    lead_id,
                    client_id: *client_id,
                    status: DistributionStatus::Pending,
                });
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn set_distribution_status(&self, lead_id: Uuid, status: DistributionStatus) -> Result<u64, AppError> {
        let mut rows = self.distributions.lock().unwrap();
        let mut updated = 0;
        for row in rows.iter_mut().filter(|r| r.lead_id == lead_id) {
            row.status = status;
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn active_rules(&self) -> Result<Vec<AutomationRule>, AppError> {
        let mut rules: Vec<AutomationRule> = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }
}

#[async_trait]
impl SignupStore for MemoryStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<Signup>, AppError> {
        Ok(self
            .signups
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_billable_by_email(&self, email: &str) -> Result<Option<Signup>, AppError> {
        Ok(self
            .signups
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.email.eq_ignore_ascii_case(email))
            .filter(|s| s.verified && s.stripe_customer_id.is_some())
            .max_by_key(|s| s.verified_at)
            .cloned())
    }

    async fn activate_trial(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut signups = self.signups.lock().unwrap();
        match signups
            .iter_mut()
            .find(|s| s.id == id && !s.verified && s.status == SignupStatus::Pending)
        {
            Some(s) => {
                s.verified = true;
                s.status = SignupStatus::TrialActive;
                s.verified_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn claim_activation(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut signups = self.signups.lock().unwrap();
        match signups.iter_mut().find(|s| {
            s.id == id
                && !s.verified
                && s.status == SignupStatus::Pending
                && s.activation_claimed_at.is_none()
        }) {
            Some(s) => {
                s.activation_claimed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_claim(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(s) = self
            .signups
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.id == id && !s.verified && s.status == SignupStatus::Pending)
        {
            s.activation_claimed_at = None;
        }
        Ok(())
    }

    async fn set_customer_id(&self, id: Uuid, customer_id: &str) -> Result<(), AppError> {
        if let Some(s) = self.signups.lock().unwrap().iter_mut().find(|s| s.id == id) {
            s.stripe_customer_id = Some(customer_id.to_string());
        }
        Ok(())
    }

    async fn mark_active(&self, id: Uuid, customer_id: &str, subscription_id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        if self.fail_mark_active_once.swap(false, Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        if let Some(s) = self.signups.lock().unwrap().iter_mut().find(|s| s.id == id) {
            s.verified = true;
            s.status = SignupStatus::Active;
            s.stripe_customer_id = Some(customer_id.to_string());
            s.stripe_subscription_id = Some(subscription_id.to_string());
            s.payment_error = None;
            s.verified_at = Some(at);
        }
        Ok(())
    }

    async fn mark_payment_failed(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        if let Some(s) = self
            .signups
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.id == id && !s.verified)
        {
            s.status = SignupStatus::PaymentFailed;
            s.payment_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn expire_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut expired = 0;
        for s in self.signups.lock().unwrap().iter_mut() {
            if s.status == SignupStatus::Pending && !s.verified && s.created_at < cutoff {
                s.status = SignupStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Signup>, i64), AppError> {
        let mut all = self.signups.lock().unwrap().clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as i64;
        let items = all
            .into_iter()
            .skip(((page.max(1) - 1) * per_page) as usize)
            .take(per_page as usize)
            .collect();
        Ok((items, total))
    }
}

/// Billing fake that counts calls and can be told to decline.
#[derive(Default)]
pub struct FakeBilling {
    pub customers_created: AtomicUsize,
    pub subscriptions_created: AtomicUsize,
    pub attach_calls: AtomicUsize,
    pub decline: AtomicBool,
}

impl FakeBilling {
    pub fn total_calls(&self) -> usize {
        self.customers_created.load(Ordering::SeqCst)
            + self.subscriptions_created.load(Ordering::SeqCst)
            + self.attach_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingProvider for FakeBilling {
    async fn create_customer(&self, _email: &str, _name: Option<&str>, _idempotency_key: &str) -> Result<String, AppError> {
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cus_{}", n + 1))
    }

    async fn attach_payment_method(&self, _payment_method_id: &str, _customer_id: &str) -> Result<(), AppError> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        if self.decline.load(Ordering::SeqCst) {
            return Err(AppError::ExternalApiError("Your card was declined.".to_string()));
        }
        Ok(())
    }

    async fn set_default_payment_method(&self, _customer_id: &str, _payment_method_id: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn create_subscription(&self, _customer_id: &str, _price_id: &str, _idempotency_key: &str) -> Result<String, AppError> {
        let n = self.subscriptions_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("sub_{}", n + 1))
    }

    async fn retrieve_price(&self, price_id: &str) -> Result<PriceInfo, AppError> {
        Ok(PriceInfo {
            id: price_id.to_string(),
            currency: "usd".to_string(),
            unit_amount: Some(4900),
            recurring_interval: Some("month".to_string()),
            product: None,
            nickname: None,
        })
    }

    async fn create_portal_session(&self, customer_id: &str, _return_url: &str) -> Result<String, AppError> {
        Ok(format!("https://billing.example.com/session/{}", customer_id))
    }
}

/// Mailer fake that records every message and can be told to fail.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub attempts: AtomicUsize,
    pub fail: AtomicBool,
}

impl RecordingMailer {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|e| e.subject.clone()).collect()
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::ExternalApiError("smtp unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
