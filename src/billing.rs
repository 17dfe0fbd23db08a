use crate::errors::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Price metadata shown on the signup page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    pub id: String,
    pub currency: String,
    /// Amount in the currency's minor unit.
    pub unit_amount: Option<i64>,
    pub recurring_interval: Option<String>,
    pub product: Option<String>,
    pub nickname: Option<String>,
}

/// Billing provider capability.
///
/// Creation calls take an idempotency key so a repeated activation for the
/// same signup cannot create a second customer or subscription.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        idempotency_key: &str,
    ) -> Result<String, AppError>;

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<(), AppError>;

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), AppError>;

    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        idempotency_key: &str,
    ) -> Result<String, AppError>;

    async fn retrieve_price(&self, price_id: &str) -> Result<PriceInfo, AppError>;

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, AppError>;
}

/// Client for the Stripe REST API (form-encoded requests, bearer auth).
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    /// Creates a new `StripeClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API origin, normally `https://api.stripe.com`.
    /// * `secret_key` - Stripe secret key.
    /// * `timeout` - Per-request timeout.
    pub fn new(base_url: String, secret_key: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Stripe client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            secret_key,
        })
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(&str, &str)],
        idempotency_key: Option<&str>,
    ) -> Result<Value, AppError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("Stripe POST {}", path);

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(params);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Stripe request failed: {}", e)))?;

        Self::read_body(path, response).await
    }

    /// GETs are safe to repeat, so one retry is made on transport errors and
    /// 5xx responses.
    async fn get_json(&self, path: &str) -> Result<Value, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = self
                .client
                .get(&url)
                .bearer_auth(&self.secret_key)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_server_error() && attempt < 2 => {
                    tracing::warn!("Stripe GET {} returned {}, retrying", path, response.status());
                }
                Ok(response) => return Self::read_body(path, response).await,
                Err(e) if attempt < 2 => {
                    tracing::warn!("Stripe GET {} failed ({}), retrying", path, e);
                }
                Err(e) => {
                    return Err(AppError::ExternalApiError(format!(
                        "Stripe request failed: {}",
                        e
                    )))
                }
            }
        }
    }

    async fn read_body(path: &str, response: reqwest::Response) -> Result<Value, AppError> {
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Stripe response: {}", e))
        })?;

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            return Err(AppError::ExternalApiError(format!(
                "Stripe {} returned {}: {}",
                path, status, message
            )));
        }

        Ok(body)
    }

    fn string_field(body: &Value, field: &str) -> Result<String, AppError> {
        body.get(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::ExternalApiError(format!("Stripe response missing '{}' field", field))
            })
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        idempotency_key: &str,
    ) -> Result<String, AppError> {
        let mut params = vec![("email", email), ("metadata[source]", "riva-signup")];
        if let Some(name) = name {
            params.push(("name", name));
        }

        let body = self
            .post_form("/v1/customers", &params, Some(idempotency_key))
            .await?;
        let id = Self::string_field(&body, "id")?;
        tracing::info!("✓ Stripe customer created: {}", id);
        Ok(id)
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<(), AppError> {
        let path = format!("/v1/payment_methods/{}/attach", payment_method_id);
        self.post_form(&path, &[("customer", customer_id)], None)
            .await?;
        Ok(())
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), AppError> {
        let path = format!("/v1/customers/{}", customer_id);
        self.post_form(
            &path,
            &[("invoice_settings[default_payment_method]", payment_method_id)],
            None,
        )
        .await?;
        Ok(())
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        price_id: &str,
        idempotency_key: &str,
    ) -> Result<String, AppError> {
        let body = self
            .post_form(
                "/v1/subscriptions",
                &[
                    ("customer", customer_id),
                    ("items[0][price]", price_id),
                    ("payment_behavior", "error_if_incomplete"),
                ],
                Some(idempotency_key),
            )
            .await?;
        let id = Self::string_field(&body, "id")?;
        tracing::info!("✓ Stripe subscription created: {}", id);
        Ok(id)
    }

    async fn retrieve_price(&self, price_id: &str) -> Result<PriceInfo, AppError> {
        let body = self.get_json(&format!("/v1/prices/{}", price_id)).await?;

        Ok(PriceInfo {
            id: Self::string_field(&body, "id")?,
            currency: Self::string_field(&body, "currency")?,
            unit_amount: body.get("unit_amount").and_then(|v| v.as_i64()),
            recurring_interval: body
                .get("recurring")
                .and_then(|r| r.get("interval"))
                .and_then(|v| v.as_str())
                .map(str::to_string),
            product: body
                .get("product")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            nickname: body
                .get("nickname")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, AppError> {
        let body = self
            .post_form(
                "/v1/billing_portal/sessions",
                &[("customer", customer_id), ("return_url", return_url)],
                None,
            )
            .await?;
        Self::string_field(&body, "url")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = StripeClient::new(
            "https://api.stripe.com".to_string(),
            "sk_test".to_string(),
            Duration::from_secs(10),
        );
        assert!(client.is_ok());
    }

    #[test]
    fn test_string_field_missing() {
        let body = serde_json::json!({"object": "customer"});
        assert!(StripeClient::string_field(&body, "id").is_err());
    }
}
