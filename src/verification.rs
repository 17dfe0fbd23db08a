//! Email verification and account activation.
//!
//! A signup is created `pending` with a verification token. Redeeming the
//! token moves it to exactly one terminal state:
//!
//! ```text
//! pending ──trial──────────────▶ trial_active
//!    │    ──paid, billed ok────▶ active
//!    │    ──paid, billing err──▶ payment_failed
//!    └────older than retention─▶ expired   (sweep)
//! ```
//!
//! Paid activation first claims the row with a conditional update, so two
//! concurrent redemptions can never both reach the billing provider.

use crate::billing::{BillingProvider, PriceInfo};
use crate::errors::{AppError, ResultExt};
use crate::mailer::{send_best_effort, EmailSender, OutgoingEmail};
use crate::models::{Plan, Signup, SignupPage, SignupStatus};
use crate::pages;
use crate::store::SignupStore;
use crate::validation::fingerprint;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

pub const MAX_PAGE_SIZE: u32 = 100;

/// Result of a token redemption that reached a state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    TrialActivated,
    Activated {
        customer_id: String,
        subscription_id: String,
    },
    AlreadyVerified,
    PaymentFailed {
        reason: String,
    },
}

/// Configured billing price per paid plan.
#[derive(Debug, Clone)]
pub struct PlanPrices {
    pub subscription: String,
    pub pay_per_lead: String,
}

impl PlanPrices {
    pub fn for_plan(&self, plan: Plan) -> Option<&str> {
        match plan {
            Plan::Trial => None,
            Plan::Subscription => Some(&self.subscription),
            Plan::PayPerLead => Some(&self.pay_per_lead),
        }
    }
}

#[derive(Clone)]
pub struct VerificationService {
    signups: Arc<dyn SignupStore>,
    billing: Arc<dyn BillingProvider>,
    mailer: Arc<dyn EmailSender>,
    prices: PlanPrices,
    retention: Duration,
    public_base_url: String,
}

impl VerificationService {
    pub fn new(
        signups: Arc<dyn SignupStore>,
        billing: Arc<dyn BillingProvider>,
        mailer: Arc<dyn EmailSender>,
        prices: PlanPrices,
        retention_days: i64,
        public_base_url: String,
    ) -> Self {
        Self {
            signups,
            billing,
            mailer,
            prices,
            retention: Duration::days(retention_days),
            public_base_url,
        }
    }

    pub async fn verify(&self, token: &str) -> Result<VerificationOutcome, AppError> {
        self.verify_at(token, Utc::now()).await
    }

    /// Redeems a verification token as of `now`.
    ///
    /// # Errors
    ///
    /// * `InvalidToken` when no signup carries the token.
    /// * `Expired` when the token's expiry has passed; the signup is untouched.
    /// * Store failures. Billing failures are not errors: they produce
    ///   `PaymentFailed`.
    pub async fn verify_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::InvalidToken);
        }

        let signup = self
            .signups
            .find_by_token(token)
            .await
            .context("Failed to look up verification token")?
            .ok_or(AppError::InvalidToken)?;

        if signup.token_expires_at.is_some_and(|expires| expires < now) {
            tracing::info!("Expired verification link used for signup {}", signup.id);
            return Err(AppError::Expired(
                "This verification link has expired".to_string(),
            ));
        }

        if signup.verified {
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        match signup.status {
            SignupStatus::Pending => {}
            SignupStatus::PaymentFailed => {
                return Ok(VerificationOutcome::PaymentFailed {
                    reason: signup
                        .payment_error
                        .unwrap_or_else(|| "payment failed".to_string()),
                })
            }
            SignupStatus::Expired => {
                return Err(AppError::Expired("This signup has expired".to_string()))
            }
            SignupStatus::TrialActive | SignupStatus::Active => {
                return Ok(VerificationOutcome::AlreadyVerified)
            }
        }

        if signup.plan.is_paid() {
            self.activate_paid(signup, now).await
        } else {
            self.activate_trial(&signup, now).await
        }
    }

    async fn activate_trial(
        &self,
        signup: &Signup,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, AppError> {
        let updated = self
            .signups
            .activate_trial(signup.id, now)
            .await
            .context("Failed to activate trial")?;

        if !updated {
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        tracing::info!("✓ Trial activated for signup {}", signup.id);
        Ok(VerificationOutcome::TrialActivated)
    }

    async fn activate_paid(
        &self,
        mut signup: Signup,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, AppError> {
        let claimed = self
            .signups
            .claim_activation(signup.id, now)
            .await
            .context("Failed to claim signup for activation")?;

        if !claimed {
            tracing::info!("Signup {} already claimed by another redemption", signup.id);
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        let result = self.settle_paid(&mut signup, now).await;
        if result.is_err() {
            if let Err(e) = self.signups.release_claim(signup.id).await {
                tracing::error!("Failed to release activation claim for signup {}: {}", signup.id, e);
            }
        }
        result
    }

    /// Bills a claimed signup and records the terminal state.
    async fn settle_paid(
        &self,
        signup: &mut Signup,
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome, AppError> {
        match self.bill(signup).await {
            Ok((customer_id, subscription_id)) => {
                self.signups
                    .mark_active(signup.id, &customer_id, &subscription_id, now)
                    .await
                    .context("Failed to mark signup active")?;

                tracing::info!(
                    "✓ Signup {} activated on plan {} (subscription {})",
                    signup.id,
                    signup.plan,
                    subscription_id
                );

                if signup.plan == Plan::PayPerLead {
                    send_best_effort(self.mailer.as_ref(), &self.confirmation_email(signup))
                        .await;
                }

                Ok(VerificationOutcome::Activated {
                    customer_id,
                    subscription_id,
                })
            }
            Err(e) if e.is_storage() => Err(e),
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!("Billing failed for signup {}: {}", signup.id, reason);

                self.signups
                    .mark_payment_failed(signup.id, &reason)
                    .await
                    .context("Failed to record payment failure")?;

                send_best_effort(self.mailer.as_ref(), &self.failure_email(signup)).await;

                Ok(VerificationOutcome::PaymentFailed { reason })
            }
        }
    }

    /// Customer, payment method, subscription. Each creation call carries an
    /// idempotency key derived from the signup id.
    async fn bill(&self, signup: &mut Signup) -> Result<(String, String), AppError> {
        let price_id = self
            .prices
            .for_plan(signup.plan)
            .ok_or_else(|| AppError::InternalError(format!("no price for plan {}", signup.plan)))?
            .to_string();

        let payment_method = signup
            .payment_method_id
            .clone()
            .filter(|pm| !pm.trim().is_empty())
            .ok_or_else(|| AppError::ValidationError("no payment method on file".to_string()))?;

        let customer_id = match signup.stripe_customer_id.clone() {
            Some(id) => id,
            None => {
                let id = self
                    .billing
                    .create_customer(
                        &signup.email,
                        signup.full_name.as_deref(),
                        &format!("signup-{}-customer", signup.id),
                    )
                    .await?;
                self.signups
                    .set_customer_id(signup.id, &id)
                    .await
                    .context("Failed to store billing customer")?;
                signup.stripe_customer_id = Some(id.clone());
                id
            }
        };

        self.billing
            .attach_payment_method(&payment_method, &customer_id)
            .await?;
        self.billing
            .set_default_payment_method(&customer_id, &payment_method)
            .await?;

        let subscription_id = self
            .billing
            .create_subscription(
                &customer_id,
                &price_id,
                &format!("signup-{}-subscription", signup.id),
            )
            .await?;

        Ok((customer_id, subscription_id))
    }

    fn confirmation_email(&self, signup: &Signup) -> OutgoingEmail {
        let dashboard = format!("{}/dashboard", self.public_base_url);
        OutgoingEmail {
            to: signup.email.clone(),
            to_name: signup.full_name.clone(),
            subject: "Your Riva pay-per-lead account is active".to_string(),
            html: pages::email_body(
                "You're all set",
                "Your email is verified and billing is active. You'll be charged only for the leads you receive.",
                Some(("Open your dashboard", &dashboard)),
            ),
        }
    }

    fn failure_email(&self, signup: &Signup) -> OutgoingEmail {
        let signup_url = format!("{}/signup", self.public_base_url);
        OutgoingEmail {
            to: signup.email.clone(),
            to_name: signup.full_name.clone(),
            subject: "We couldn't activate your Riva account".to_string(),
            html: pages::email_body(
                "Payment could not be processed",
                "Your email is confirmed, but we couldn't charge your payment method. Please sign up again with a different card.",
                Some(("Try again", &signup_url)),
            ),
        }
    }

    pub async fn expire_stale(&self) -> Result<u64, AppError> {
        self.expire_stale_at(Utc::now()).await
    }

    /// Expires every unverified pending signup older than the retention window.
    pub async fn expire_stale_at(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let cutoff = now - self.retention;
        let expired = self
            .signups
            .expire_stale(cutoff)
            .await
            .context("Failed to expire stale signups")?;

        if expired > 0 {
            tracing::info!("Expired {} stale signups (cutoff {})", expired, cutoff);
        } else {
            tracing::debug!("No stale signups to expire");
        }

        Ok(expired)
    }

    pub async fn list_submissions(&self, page: u32, per_page: u32) -> Result<SignupPage, AppError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);

        let (items, total) = self
            .signups
            .list(page, per_page)
            .await
            .context("Failed to list submissions")?;

        Ok(SignupPage {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Price metadata for a paid plan.
    pub async fn plan_price(&self, plan: Plan) -> Result<PriceInfo, AppError> {
        let price_id = self.prices.for_plan(plan).ok_or_else(|| {
            AppError::ValidationError(format!("plan '{}' has no price", plan))
        })?;
        self.billing.retrieve_price(price_id).await
    }

    /// Emails a billing-portal link to the verified account registered
    /// under `email`.
    ///
    /// The link only ever goes to the address on file. Returns whether a
    /// link was sent; callers must not reveal that to the requester.
    pub async fn send_portal_link(
        &self,
        email: &str,
        return_url: Option<&str>,
    ) -> Result<bool, AppError> {
        let email = email.trim().to_lowercase();
        let Some(signup) = self
            .signups
            .find_billable_by_email(&email)
            .await
            .context("Failed to look up billing account")?
        else {
            tracing::info!("Portal link requested for unknown account {}", fingerprint(&email));
            return Ok(false);
        };

        let Some(customer_id) = signup.stripe_customer_id.as_deref() else {
            return Ok(false);
        };

        let default_return = format!("{}/dashboard", self.public_base_url);
        let url = match self
            .billing
            .create_portal_session(customer_id, return_url.unwrap_or(&default_return))
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Billing portal session failed for signup {}: {}", signup.id, e);
                return Ok(false);
            }
        };

        let message = OutgoingEmail {
            to: signup.email.clone(),
            to_name: signup.full_name.clone(),
            subject: "Manage your Riva billing".to_string(),
            html: pages::email_body(
                "Your billing portal",
                "Use the link below to view invoices or update your payment method. It expires shortly.",
                Some(("Open billing portal", &url)),
            ),
        };

        let sent = send_best_effort(self.mailer.as_ref(), &message).await;
        if sent {
            tracing::info!("Billing portal link sent to {}", fingerprint(&email));
        }
        Ok(sent)
    }
}
