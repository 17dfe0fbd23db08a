use crate::circuit_breaker::{create_provider_circuit_breaker, ProviderCircuitBreaker};
use crate::errors::AppError;
use crate::validation::fingerprint;
use async_trait::async_trait;
use failsafe::futures::CircuitBreaker;
use serde_json::json;
use std::time::Duration;

/// A transactional email.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
}

/// Transactional email capability.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError>;
}

/// Sends and swallows any failure. Email must never fail the caller's
/// primary operation.
pub async fn send_best_effort(mailer: &dyn EmailSender, email: &OutgoingEmail) -> bool {
    match mailer.send(email).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                "Email '{}' to {} not sent: {}",
                email.subject,
                fingerprint(&email.to),
                e
            );
            false
        }
    }
}

/// Client for the Brevo transactional email API.
pub struct BrevoClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    sender_email: String,
    sender_name: String,
    breaker: ProviderCircuitBreaker,
}

impl BrevoClient {
    /// Creates a new `BrevoClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Brevo API origin, e.g. `https://api.brevo.com`.
    /// * `api_key` - Value for the `api-key` header.
    /// * `sender_email` / `sender_name` - The `From` identity.
    /// * `timeout` - Per-request timeout.
    pub fn new(
        base_url: String,
        api_key: String,
        sender_email: String,
        sender_name: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Brevo client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            sender_email,
            sender_name,
            breaker: create_provider_circuit_breaker(),
        })
    }

    async fn post_email(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        let url = format!("{}/v3/smtp/email", self.base_url);

        let mut recipient = json!({ "email": email.to });
        if let Some(name) = &email.to_name {
            recipient["name"] = json!(name);
        }

        let body = json!({
            "sender": { "email": self.sender_email, "name": self.sender_name },
            "to": [recipient],
            "subject": email.subject,
            "htmlContent": email.html,
        });

        let response = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Brevo request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Brevo returned {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl EmailSender for BrevoClient {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        match self.breaker.call(self.post_email(email)).await {
            Ok(()) => {
                tracing::info!("✓ Email '{}' sent to {}", email.subject, fingerprint(&email.to));
                Ok(())
            }
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::ExternalApiError(
                "Email provider circuit is open".to_string(),
            )),
        }
    }
}

/// Fallback used when no email provider is configured.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AppError> {
        tracing::info!(
            "[email disabled] '{}' to {} ({} bytes)",
            email.subject,
            fingerprint(&email.to),
            email.html.len()
        );
        Ok(())
    }
}
