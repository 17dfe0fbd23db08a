//! Rule actions and the registry that dispatches them by type.
//!
//! A rule's `actions` column is a JSON array of objects tagged by `type`;
//! the remaining keys are that action's parameters:
//!
//! ```json
//! [
//!   {"type": "set_distribution_status", "status": "delivered"},
//!   {"type": "send_email", "to": "sales@riva.io", "subject": "New lead: {{company_name}}",
//!    "body": "{{first_name}} from {{company_name}} ({{email}})"},
//!   {"type": "webhook", "url": "https://hooks.example.com/leads"},
//!   {"type": "log", "message": "vip lead"}
//! ]
//! ```

use super::condition::field_value;
use crate::mailer::{EmailSender, OutgoingEmail};
use crate::models::{DistributionStatus, Lead};
use crate::pages::escape_html;
use crate::store::LeadStore;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-z_][a-z0-9_.]*)\s*\}\}").expect("valid regex"));

/// One action as stored on a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ActionSpec {
    fn str_param(&self, name: &str) -> Result<&str> {
        self.params
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("action '{}' requires string parameter '{}'", self.kind, name))
    }
}

/// Parses a rule's `actions` column. `null` means no actions.
pub fn parse_actions(raw: &Value) -> Result<Vec<ActionSpec>> {
    match raw {
        Value::Null => Ok(Vec::new()),
        other => serde_json::from_value(other.clone()).context("invalid rule actions"),
    }
}

/// Replaces `{{field}}` placeholders with the lead's values. Missing fields
/// render empty; unknown field names are an error.
pub fn render_template(template: &str, lead: &Lead, escape: bool) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER_REGEX.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);

        let value = match field_value(lead, name.as_str())? {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        if escape {
            out.push_str(&escape_html(&value));
        } else {
            out.push_str(&value);
        }
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Executes one kind of action for a lead.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, action: &ActionSpec, lead: &Lead) -> Result<()>;
}

/// Registry of action handlers keyed by action type.
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every built-in action.
    pub fn with_defaults(
        store: Arc<dyn LeadStore>,
        mailer: Arc<dyn EmailSender>,
        http_client: reqwest::Client,
    ) -> Self {
        Self::new()
            .register("send_email", Arc::new(SendEmailAction::new(mailer)))
            .register(
                "set_distribution_status",
                Arc::new(SetDistributionStatusAction::new(store)),
            )
            .register("webhook", Arc::new(WebhookAction::new(http_client)))
            .register("log", Arc::new(LogAction))
    }

    pub fn register(mut self, kind: &str, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(kind.to_string(), handler);
        self
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub async fn execute(&self, action: &ActionSpec, lead: &Lead) -> Result<()> {
        let handler = self
            .handlers
            .get(&action.kind)
            .ok_or_else(|| anyhow!("unknown action type '{}'", action.kind))?;

        handler.execute(action, lead).await
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SendEmailAction {
    mailer: Arc<dyn EmailSender>,
}

impl SendEmailAction {
    pub fn new(mailer: Arc<dyn EmailSender>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl ActionHandler for SendEmailAction {
    async fn execute(&self, action: &ActionSpec, lead: &Lead) -> Result<()> {
        // `to` may itself be a placeholder such as "{{email}}".
        let to = render_template(action.str_param("to")?, lead, false)?;
        if to.trim().is_empty() {
            bail!("send_email recipient resolved to an empty address");
        }

        let subject = render_template(action.str_param("subject")?, lead, false)?;
        let body = render_template(action.str_param("body")?, lead, true)?;

        let email = OutgoingEmail {
            to,
            to_name: None,
            subject,
            html: format!("<div style=\"font-family:system-ui,sans-serif\">{}</div>", body),
        };

        self.mailer
            .send(&email)
            .await
            .map_err(|e| anyhow!("send_email failed: {}", e))
    }
}

pub struct SetDistributionStatusAction {
    store: Arc<dyn LeadStore>,
}

impl SetDistributionStatusAction {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for SetDistributionStatusAction {
    async fn execute(&self, action: &ActionSpec, lead: &Lead) -> Result<()> {
        let status: DistributionStatus = action.str_param("status")?.parse()?;

        let updated = self
            .store
            .set_distribution_status(lead.id, status)
            .await
            .map_err(|e| anyhow!("set_distribution_status failed: {}", e))?;

        tracing::debug!(
            "Lead {} distribution rows set to {} ({} rows)",
            lead.id,
            status,
            updated
        );
        Ok(())
    }
}

/// POSTs the lead as JSON. Any non-2xx response is a failure.
pub struct WebhookAction {
    http_client: reqwest::Client,
}

impl WebhookAction {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ActionHandler for WebhookAction {
    async fn execute(&self, action: &ActionSpec, lead: &Lead) -> Result<()> {
        let url = url::Url::parse(action.str_param("url")?).context("invalid webhook url")?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("webhook url must be http or https");
        }

        let response = self
            .http_client
            .post(url.as_str())
            .json(&serde_json::json!({ "event": "lead.created", "lead": lead }))
            .send()
            .await
            .with_context(|| format!("webhook to {} failed", url.host_str().unwrap_or("?")))?;

        let status = response.status();
        if !status.is_success() {
            bail!("webhook returned {}", status);
        }

        Ok(())
    }
}

pub struct LogAction;

#[async_trait]
impl ActionHandler for LogAction {
    async fn execute(&self, action: &ActionSpec, lead: &Lead) -> Result<()> {
        let message = match action.params.get("message").and_then(Value::as_str) {
            Some(template) => render_template(template, lead, false)?,
            None => String::new(),
        };
        tracing::info!("[automation] lead {}: {}", lead.id, message);
        Ok(())
    }
}
