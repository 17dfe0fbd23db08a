use crate::assets::AssetStore;
use crate::auth::require_bearer;
use crate::automation::AutomationQueue;
use crate::billing::PriceInfo;
use crate::config::Config;
use crate::download_tokens::DownloadTokenTracker;
use crate::errors::AppError;
use crate::intake::LeadIntake;
use crate::mailer::{send_best_effort, EmailSender, OutgoingEmail};
use crate::models::{LeadRequest, LeadResponse, Plan, SignupPage};
use crate::pages;
use crate::rate_limiter::{Decision, RateLimiter, RequestKind};
use crate::validation::{fingerprint, is_same_origin, normalize_email};
use crate::verification::{VerificationOutcome, VerificationService};
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Per-identity limits for the lead-magnet endpoints.
    pub rate_limiter: RateLimiter,
    pub download_tokens: Arc<DownloadTokenTracker>,
    pub intake: LeadIntake,
    pub verification: VerificationService,
    pub assets: Arc<dyn AssetStore>,
    pub mailer: Arc<dyn EmailSender>,
    /// Absent when automation is disabled.
    pub automation: Option<AutomationQueue>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "riva-leads",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Rate-limit identity.
///
/// With `trust_proxy` set, the rightmost `X-Forwarded-For` hop (the one our
/// proxy appended) wins, then `X-Real-IP`. Otherwise, or when neither header
/// is present, the socket peer address is used.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let forwarded = trust_proxy
        .then(|| {
            header_value("x-forwarded-for")
                .and_then(|v| v.rsplit(',').map(str::trim).find(|hop| !hop.is_empty()))
                .or_else(|| header_value("x-real-ip"))
        })
        .flatten();

    match (forwarded, peer) {
        (Some(hop), _) => hop.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

async fn enforce_limit(
    state: &AppState,
    identity: &str,
    kind: RequestKind,
) -> Result<(), AppError> {
    match state.rate_limiter.check(identity, kind).await {
        Decision::Allowed => Ok(()),
        Decision::Limited { retry_after_secs } => {
            tracing::warn!("Rate limited {:?} request from {}", kind, identity);
            Err(AppError::RateLimited { retry_after_secs })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LeadMagnetRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// POST /api/v1/lead-magnet
///
/// Issues a one-hour download link for the lead-magnet PDF. A new link is
/// also emailed in the background.
pub async fn lead_magnet_request(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LeadMagnetRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let email = payload
        .email
        .as_deref()
        .ok_or_else(|| AppError::ValidationError("email is required".to_string()))
        .and_then(normalize_email)?;

    let identity = client_identity(&headers, Some(peer), state.config.trust_proxy_headers);
    enforce_limit(&state, &identity, RequestKind::Email).await?;

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    let issued = state
        .download_tokens
        .issue(&email, &identity, user_agent)
        .await;

    let download_url = format!(
        "{}/api/v1/lead-magnet/download?token={}",
        state.config.public_base_url, issued.token
    );

    tracing::info!(
        "Lead magnet requested by {} (new token: {})",
        fingerprint(&email),
        issued.is_new
    );

    if issued.is_new {
        let mailer = state.mailer.clone();
        let message = OutgoingEmail {
            to: email.clone(),
            to_name: None,
            subject: "Your Riva guide is ready".to_string(),
            html: pages::email_body(
                "Here's your download",
                "Thanks for your interest in Riva. The link below is valid for one hour.",
                Some(("Download the guide", &download_url)),
            ),
        };
        tokio::spawn(async move {
            send_best_effort(mailer.as_ref(), &message).await;
        });
    }

    Ok(Json(json!({
        "success": true,
        "download_url": download_url,
        "is_new": issued.is_new,
    })))
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// GET /api/v1/lead-magnet/download?token=
pub async fn lead_magnet_download(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Response, AppError> {
    let identity = client_identity(&headers, Some(peer), state.config.trust_proxy_headers);
    enforce_limit(&state, &identity, RequestKind::Download).await?;

    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::ValidationError("token is required".to_string()))?;

    let record = state.download_tokens.redeem(token).await?;
    let bytes = state.assets.read(&state.config.lead_magnet_file).await?;

    tracing::info!(
        "Lead magnet downloaded by {} (download #{})",
        fingerprint(&record.email),
        record.downloads
    );

    let disposition = format!(
        "attachment; filename=\"{}\"",
        state.config.lead_magnet_file.replace('"', "")
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// POST /api/v1/leads
///
/// Persists the lead and fans it out to active clients. Distribution
/// problems come back as `warning`; automation runs after the response.
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LeadRequest>,
) -> Result<(StatusCode, Json<LeadResponse>), AppError> {
    let outcome = state.intake.submit(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(LeadResponse {
            success: true,
            lead_id: outcome.lead_id,
            distributed: outcome.distributed,
            warning: outcome.warning,
        }),
    ))
}

/// GET /verify?token=
///
/// Always answers with an HTML page: 200 on activation (or a repeat visit),
/// 400 for invalid, expired or unpaid signups.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> (StatusCode, Html<String>) {
    let token = query.token.unwrap_or_default();

    match state.verification.verify(&token).await {
        Ok(VerificationOutcome::TrialActivated) => (
            StatusCode::OK,
            Html(pages::result_page(
                "Email verified",
                "Your free trial is now active. Welcome to Riva!",
                true,
            )),
        ),
        Ok(VerificationOutcome::Activated { .. }) => (
            StatusCode::OK,
            Html(pages::result_page(
                "Account activated",
                "Your email is verified and your subscription is active.",
                true,
            )),
        ),
        Ok(VerificationOutcome::AlreadyVerified) => (
            StatusCode::OK,
            Html(pages::result_page(
                "Already verified",
                "This email address has already been verified.",
                true,
            )),
        ),
        Ok(VerificationOutcome::PaymentFailed { .. }) => (
            StatusCode::BAD_REQUEST,
            Html(pages::result_page(
                "Payment failed",
                "We verified your email but could not process your payment. Please sign up again with a different payment method.",
                false,
            )),
        ),
        Err(e) => {
            let (status, title, message) = match e.root() {
                AppError::InvalidToken => (
                    StatusCode::BAD_REQUEST,
                    "Invalid link",
                    "This verification link is invalid. Please check the link in your email.",
                ),
                AppError::Expired(_) => (
                    StatusCode::BAD_REQUEST,
                    "Link expired",
                    "This verification link has expired. Please sign up again.",
                ),
                _ => {
                    tracing::error!("Verification failed: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Something went wrong",
                        "We couldn't verify your email right now. Please try again later.",
                    )
                }
            };
            (status, Html(pages::result_page(title, message, false)))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /api/v1/admin/submissions?page=&per_page=
pub async fn admin_submissions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<SignupPage>, AppError> {
    require_bearer(&headers, &state.config.admin_secret, "admin")?;

    let page = state
        .verification
        .list_submissions(query.page.unwrap_or(1), query.per_page.unwrap_or(20))
        .await?;

    Ok(Json(page))
}

/// POST /api/v1/cron/cleanup
///
/// Runs the signup expiry sweep on demand.
pub async fn cron_cleanup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_bearer(&headers, &state.config.cron_secret, "cron")?;

    let expired = state.verification.expire_stale().await?;

    Ok(Json(json!({
        "success": true,
        "expired": expired,
    })))
}

/// GET /api/v1/automation/stats
pub async fn automation_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_bearer(&headers, &state.config.admin_secret, "admin")?;

    let stats = state
        .automation
        .as_ref()
        .map(AutomationQueue::stats)
        .unwrap_or_default();

    Ok(Json(json!({
        "enabled": state.automation.is_some(),
        "stats": stats,
    })))
}

/// GET /api/v1/billing/price/{plan}
pub async fn billing_price(
    State(state): State<Arc<AppState>>,
    Path(plan): Path<String>,
) -> Result<Json<PriceInfo>, AppError> {
    let plan: Plan = plan
        .parse()
        .map_err(|e| AppError::ValidationError(format!("{}", e)))?;

    let price = state.verification.plan_price(plan).await?;
    Ok(Json(price))
}

#[derive(Debug, Deserialize)]
pub struct PortalRequest {
    pub email: Option<String>,
    pub return_url: Option<String>,
}

/// POST /api/v1/billing/portal
///
/// Emails a portal link to the account on file. The response is the same
/// whether or not an account exists.
pub async fn billing_portal(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PortalRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let email = payload
        .email
        .as_deref()
        .ok_or_else(|| AppError::ValidationError("email is required".to_string()))
        .and_then(normalize_email)?;

    let return_url = payload
        .return_url
        .filter(|url| is_same_origin(url, &state.config.public_base_url));

    state
        .verification
        .send_portal_link(&email, return_url.as_deref())
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": "If a billing account exists for this email, a portal link has been sent to it.",
        })),
    ))
}
