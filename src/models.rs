use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when a stored text column holds an unknown enum value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Declares a text-backed enum with `as_str`, `FromStr` and `TryFrom<String>`.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

// ============ Leads & Distribution ============

/// A prospective customer's contact submission. Immutable after insert.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub website: Option<String>,
    /// Originating source tag (form name, campaign, partner).
    pub source: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Validated and sanitized lead, ready to insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewLead {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub website: Option<String>,
    pub source: Option<String>,
    pub metadata: Value,
}

/// Inbound lead payload as posted by the marketing site.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadRequest {
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "companyName", alias = "company")]
    pub company_name: Option<String>,
    #[serde(default, alias = "jobTitle")]
    pub job_title: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Response body for a created lead.
#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub success: bool,
    pub lead_id: Uuid,
    pub distributed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Subscriber account that receives leads.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

text_enum!(
    /// Lifecycle of a lead offered to one client.
    DistributionStatus, "distribution status", {
        Pending => "pending",
        Delivered => "delivered",
        Accepted => "accepted",
        Rejected => "rejected",
    }
);

/// Offer of one lead to one client.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LeadDistribution {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub client_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: DistributionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============ Automation ============

/// Admin-managed automation rule. Conditions and actions are stored as JSON
/// and parsed by the engine on each run.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    /// Higher runs first.
    pub priority: i32,
    pub is_active: bool,
    pub conditions: Value,
    pub actions: Value,
    pub stop_on_match: bool,
    pub created_at: DateTime<Utc>,
}

// ============ Signups ============

text_enum!(
    /// Product tier chosen at signup.
    Plan, "plan", {
        Trial => "trial",
        Subscription => "subscription",
        PayPerLead => "pay_per_lead",
    }
);

impl Plan {
    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Trial)
    }
}

text_enum!(
    /// Signup state. Everything except `Pending` is terminal.
    SignupStatus, "signup status", {
        Pending => "pending",
        TrialActive => "trial_active",
        Active => "active",
        PaymentFailed => "payment_failed",
        Expired => "expired",
    }
);

/// Prospective paying account moving through email verification.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Signup {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub business_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub plan: Plan,
    #[sqlx(try_from = "String")]
    pub status: SignupStatus,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub activation_claimed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub payment_method_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub payment_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of signups for the admin listing.
#[derive(Debug, Serialize)]
pub struct SignupPage {
    pub items: Vec<Signup>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
