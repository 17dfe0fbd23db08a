use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Absolute origin used to build download and verification links.
    pub public_base_url: String,
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    pub stripe_price_subscription: String,
    pub stripe_price_pay_per_lead: String,
    /// When absent, outbound email is written to the log instead of sent.
    pub brevo_api_key: Option<String>,
    pub brevo_api_base: String,
    pub email_sender: String,
    pub email_sender_name: String,
    pub admin_secret: String,
    pub cron_secret: String,
    pub lead_magnet_dir: String,
    pub lead_magnet_file: String,
    pub http_timeout_secs: u64,
    pub automation_queue_capacity: usize,
    pub signup_retention_days: i64,
    pub run_migrations: bool,
    /// Read the client address from proxy headers. Only safe behind a proxy
    /// that appends to `X-Forwarded-For` and overwrites `X-Real-IP`.
    pub trust_proxy_headers: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            public_base_url: required_url("PUBLIC_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_api_base: optional_url("STRIPE_API_BASE", "https://api.stripe.com")?,
            stripe_price_subscription: required("STRIPE_PRICE_SUBSCRIPTION")?,
            stripe_price_pay_per_lead: required("STRIPE_PRICE_PAY_PER_LEAD")?,
            brevo_api_key: std::env::var("BREVO_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            brevo_api_base: optional_url("BREVO_API_BASE", "https://api.brevo.com")?,
            email_sender: std::env::var("EMAIL_SENDER")
                .unwrap_or_else(|_| "hello@riva.agency".to_string()),
            email_sender_name: std::env::var("EMAIL_SENDER_NAME")
                .unwrap_or_else(|_| "Riva".to_string()),
            admin_secret: required("ADMIN_SECRET")?,
            cron_secret: required("CRON_SECRET")?,
            lead_magnet_dir: std::env::var("LEAD_MAGNET_DIR")
                .unwrap_or_else(|_| "./assets".to_string()),
            lead_magnet_file: std::env::var("LEAD_MAGNET_FILE")
                .unwrap_or_else(|_| "lead-magnet.pdf".to_string()),
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 10)?,
            automation_queue_capacity: parse_or("AUTOMATION_QUEUE_CAPACITY", 1000)?,
            signup_retention_days: parse_or("SIGNUP_RETENTION_DAYS", 7)?,
            run_migrations: std::env::var("RUN_MIGRATIONS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            trust_proxy_headers: std::env::var("TRUST_PROXY_HEADERS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Public base URL: {}", config.public_base_url);
        tracing::debug!("Stripe API base: {}", config.stripe_api_base);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    Ok(value)
}

fn required_url(name: &str) -> anyhow::Result<String> {
    let value = required(name)?;
    check_http_url(name, value)
}

fn optional_url(name: &str, default: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    check_http_url(name, value)
}

fn check_http_url(name: &str, value: String) -> anyhow::Result<String> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_http_url_strips_trailing_slash() {
        let url = check_http_url("X", "https://riva.agency/".to_string()).unwrap();
        assert_eq!(url, "https://riva.agency");
    }

    #[test]
    fn test_check_http_url_rejects_other_schemes() {
        assert!(check_http_url("X", "ftp://riva.agency".to_string()).is_err());
    }
}
