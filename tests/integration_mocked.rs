/// Integration tests with mocked external APIs
/// Exercises the Stripe and Brevo clients without hitting real services
use riva_leads::billing::{BillingProvider, StripeClient};
use riva_leads::errors::AppError;
use riva_leads::mailer::{BrevoClient, EmailSender, OutgoingEmail};
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stripe(server: &MockServer) -> StripeClient {
    StripeClient::new(server.uri(), "sk_test_123".to_string(), Duration::from_secs(5)).unwrap()
}

fn brevo(server: &MockServer) -> BrevoClient {
    BrevoClient::new(
        server.uri(),
        "brevo-key".to_string(),
        "hello@riva.io".to_string(),
        "Riva".to_string(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn email() -> OutgoingEmail {
    OutgoingEmail {
        to: "owner@clinic.io".to_string(),
        to_name: Some("Dana".to_string()),
        subject: "Welcome".to_string(),
        html: "<p>hi</p>".to_string(),
    }
}

#[tokio::test]
async fn test_stripe_create_customer_sends_idempotency_key() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/customers"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(header("idempotency-key", "signup-1-customer"))
        .and(body_string_contains("email=owner%40clinic.io"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "cus_42"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let id = stripe(&server)
        .create_customer("owner@clinic.io", Some("Dana"), "signup-1-customer")
        .await
        .unwrap();
    assert_eq!(id, "cus_42");
}

#[tokio::test]
async fn test_stripe_subscription_requires_complete_payment() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/subscriptions"))
        .and(body_string_contains("payment_behavior=error_if_incomplete"))
        .and(body_string_contains("customer=cus_42"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "sub_7"})),
        )
        .mount(&server)
        .await;

    let id = stripe(&server)
        .create_subscription("cus_42", "price_sub", "signup-1-subscription")
        .await
        .unwrap();
    assert_eq!(id, "sub_7");
}

#[tokio::test]
async fn test_stripe_error_message_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/payment_methods/pm_bad/attach"))
        .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
            "error": {"type": "card_error", "message": "Your card was declined."}
        })))
        .mount(&server)
        .await;

    let err = stripe(&server)
        .attach_payment_method("pm_bad", "cus_42")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ExternalApiError(_)));
    assert!(err.to_string().contains("Your card was declined."));
}

#[tokio::test]
async fn test_stripe_price_lookup_retries_once_on_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/prices/price_sub"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/prices/price_sub"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "price_sub",
            "currency": "usd",
            "unit_amount": 4900,
            "recurring": {"interval": "month"},
            "product": "prod_1",
            "nickname": "Monthly"
        })))
        .mount(&server)
        .await;

    let price = stripe(&server).retrieve_price("price_sub").await.unwrap();
    assert_eq!(price.unit_amount, Some(4900));
    assert_eq!(price.recurring_interval.as_deref(), Some("month"));
    assert_eq!(price.nickname.as_deref(), Some("Monthly"));
}

#[tokio::test]
async fn test_stripe_posts_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/billing_portal/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": {"message": "boom"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = stripe(&server)
        .create_portal_session("cus_42", "https://riva.test/dashboard")
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_brevo_sends_transactional_email() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .and(header("api-key", "brevo-key"))
        .and(body_string_contains("\"htmlContent\":\"<p>hi</p>\""))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"messageId": "m-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    brevo(&server).send(&email()).await.unwrap();
}

#[tokio::test]
async fn test_brevo_circuit_opens_after_repeated_failures() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .respond_with(ResponseTemplate::new(500).set_body_string("unavailable"))
        .expect(5)
        .mount(&server)
        .await;

    let client = brevo(&server);
    for _ in 0..5 {
        let err = client.send(&email()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    // Sixth call is rejected locally without reaching the server.
    let err = client.send(&email()).await.unwrap_err();
    assert!(err.to_string().contains("circuit is open"));
}
