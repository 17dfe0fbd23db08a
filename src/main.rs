use axum::{
    routing::{get, post},
    Router,
};
use riva_leads::{
    assets::FsAssetStore,
    automation::{actions::ActionRegistry, AutomationEngine, AutomationQueue},
    billing::StripeClient,
    config::Config,
    db::Database,
    db_storage::PgStore,
    download_tokens::{DownloadTokenTracker, DEFAULT_CAPACITY},
    handlers::{self, AppState},
    intake::LeadIntake,
    mailer::{BrevoClient, EmailSender, LogMailer},
    rate_limiter::RateLimiter,
    verification::{PlanPrices, VerificationService},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, provider clients,
/// the automation worker and the hourly signup expiry sweep, then serves the
/// HTTP routes.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "riva_leads=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    if config.run_migrations {
        db.migrate().await?;
        tracing::info!("Database migrations applied");
    }

    let store = Arc::new(PgStore::new(db.pool.clone()));
    let timeout = Duration::from_secs(config.http_timeout_secs);

    let mailer: Arc<dyn EmailSender> = match &config.brevo_api_key {
        Some(api_key) => {
            let client = BrevoClient::new(
                config.brevo_api_base.clone(),
                api_key.clone(),
                config.email_sender.clone(),
                config.email_sender_name.clone(),
                timeout,
            )?;
            tracing::info!("✓ Brevo email client initialized: {}", config.brevo_api_base);
            Arc::new(client)
        }
        None => {
            tracing::warn!("BREVO_API_KEY not set, outgoing email will only be logged");
            Arc::new(LogMailer)
        }
    };

    let billing = Arc::new(StripeClient::new(
        config.stripe_api_base.clone(),
        config.stripe_secret_key.clone(),
        timeout,
    )?);
    tracing::info!("✓ Stripe client initialized: {}", config.stripe_api_base);

    // Automation worker
    let webhook_client = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let registry = ActionRegistry::with_defaults(store.clone(), mailer.clone(), webhook_client);
    let engine = Arc::new(AutomationEngine::new(store.clone(), registry));
    let (automation, _worker) = AutomationQueue::start(engine, config.automation_queue_capacity);

    let verification = VerificationService::new(
        store.clone(),
        billing,
        mailer.clone(),
        PlanPrices {
            subscription: config.stripe_price_subscription.clone(),
            pay_per_lead: config.stripe_price_pay_per_lead.clone(),
        },
        config.signup_retention_days,
        config.public_base_url.clone(),
    );

    // Hourly signup expiry sweep
    let sweeper = verification.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            if let Err(e) = sweeper.expire_stale().await {
                tracing::error!("Signup expiry sweep failed: {}", e);
            }
        }
    });

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        rate_limiter: RateLimiter::new(),
        download_tokens: Arc::new(DownloadTokenTracker::new(DEFAULT_CAPACITY)),
        intake: LeadIntake::new(store.clone(), Some(automation.clone())),
        verification,
        assets: Arc::new(FsAssetStore::new(&config.lead_magnet_dir)),
        mailer,
        automation: Some(automation),
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    // Public routes get the body limit and the coarse per-IP limiter
    let public_routes = Router::new()
        .route("/api/v1/lead-magnet", post(handlers::lead_magnet_request))
        .route(
            "/api/v1/lead-magnet/download",
            get(handlers::lead_magnet_download),
        )
        .route("/api/v1/leads", post(handlers::create_lead))
        .route("/verify", get(handlers::verify))
        .route("/api/v1/billing/price/:plan", get(handlers::billing_price))
        .route("/api/v1/billing/portal", post(handlers::billing_portal))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 64KB max payload
                .layer(RequestBodyLimitLayer::new(64 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    let secured_routes = Router::new()
        .route(
            "/api/v1/admin/submissions",
            get(handlers::admin_submissions),
        )
        .route(
            "/api/v1/cron/cleanup",
            post(handlers::cron_cleanup).get(handlers::cron_cleanup),
        )
        .route("/api/v1/automation/stats", get(handlers::automation_stats));

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(public_routes)
        .merge(secured_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Peer address is the governor's fallback key when no proxy headers exist
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
