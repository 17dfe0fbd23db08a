//! Rule conditions: a small JSON expression language evaluated against a lead.
//!
//! ```json
//! {"op": "all", "conditions": [
//!     {"op": "eq", "field": "source", "value": "pricing-page"},
//!     {"op": "not", "condition": {"op": "ends_with", "field": "email", "value": "@gmail.com"}}
//! ]}
//! ```
//!
//! String comparisons are case-insensitive. A missing field never equals,
//! contains, or is `in` anything, and always satisfies `neq` and `missing`.

use crate::models::Lead;
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Always,
    Eq { field: String, value: Value },
    Neq { field: String, value: Value },
    Contains { field: String, value: String },
    StartsWith { field: String, value: String },
    EndsWith { field: String, value: String },
    Exists { field: String },
    Missing { field: String },
    In { field: String, values: Vec<Value> },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
}

impl Condition {
    /// Parses a stored condition; `null` and `{}` mean `always`.
    pub fn from_json(raw: &Value) -> Result<Self> {
        match raw {
            Value::Null => Ok(Condition::Always),
            Value::Object(map) if map.is_empty() => Ok(Condition::Always),
            other => serde_json::from_value(other.clone())
                .map_err(|e| anyhow!("invalid rule condition: {}", e)),
        }
    }

    pub fn evaluate(&self, lead: &Lead) -> Result<bool> {
        Ok(match self {
            Condition::Always => true,
            Condition::Eq { field, value } => match field_value(lead, field)? {
                Some(actual) => values_equal(&actual, value),
                None => false,
            },
            Condition::Neq { field, value } => match field_value(lead, field)? {
                Some(actual) => !values_equal(&actual, value),
                None => true,
            },
            Condition::Contains { field, value } => {
                text_of(lead, field)?.is_some_and(|t| t.contains(&value.to_lowercase()))
            }
            Condition::StartsWith { field, value } => {
                text_of(lead, field)?.is_some_and(|t| t.starts_with(&value.to_lowercase()))
            }
            Condition::EndsWith { field, value } => {
                text_of(lead, field)?.is_some_and(|t| t.ends_with(&value.to_lowercase()))
            }
            Condition::Exists { field } => field_value(lead, field)?.is_some(),
            Condition::Missing { field } => field_value(lead, field)?.is_none(),
            Condition::In { field, values } => match field_value(lead, field)? {
                Some(actual) => values.iter().any(|v| values_equal(&actual, v)),
                None => false,
            },
            Condition::All { conditions } => {
                for condition in conditions {
                    if !condition.evaluate(lead)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Any { conditions } => {
                for condition in conditions {
                    if condition.evaluate(lead)? {
                        return Ok(true);
                    }
                }
                false
            }
            Condition::Not { condition } => !condition.evaluate(lead)?,
        })
    }
}

/// Resolves a field name against a lead. Unknown names are errors so a typo
/// in a rule surfaces instead of silently never matching.
pub fn field_value(lead: &Lead, field: &str) -> Result<Option<Value>> {
    let text = |v: &Option<String>| v.clone().map(Value::String);

    let value = match field {
        "first_name" => text(&lead.first_name),
        "last_name" => text(&lead.last_name),
        "email" => text(&lead.email),
        "email_domain" => lead
            .email
            .as_deref()
            .and_then(|e| e.rsplit_once('@'))
            .map(|(_, domain)| Value::String(domain.to_string())),
        "phone" => text(&lead.phone),
        "company_name" => text(&lead.company_name),
        "job_title" => text(&lead.job_title),
        "website" => text(&lead.website),
        "source" => text(&lead.source),
        other => match other.strip_prefix("metadata.") {
            Some(path) if !path.is_empty() => path
                .split('.')
                .try_fold(&lead.metadata, |node, key| node.get(key))
                .filter(|v| !v.is_null())
                .cloned(),
            _ => bail!("unknown condition field '{}'", other),
        },
    };

    Ok(value)
}

fn text_of(lead: &Lead, field: &str) -> Result<Option<String>> {
    Ok(field_value(lead, field)?.map(|v| match v {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    }))
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => a.to_lowercase() == b.to_lowercase(),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        // Form data arrives as strings; let "42" match 42.
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            a.trim().parse::<f64>().ok() == b.as_f64()
        }
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn lead() -> Lead {
        Lead {
            id: Uuid::new_v4(),
            first_name: Some("Ana".into()),
            last_name: None,
            email: Some("ana@acme.io".into()),
            phone: None,
            company_name: Some("Acme Dental".into()),
            job_title: None,
            website: None,
            source: Some("pricing-page".into()),
            metadata: json!({"budget": 5000, "utm": {"campaign": "Spring"}}),
            created_at: Utc::now(),
        }
    }

    fn eval(raw: Value) -> bool {
        Condition::from_json(&raw).unwrap().evaluate(&lead()).unwrap()
    }

    #[test]
    fn test_empty_condition_always_matches() {
        assert!(eval(Value::Null));
        assert!(eval(json!({})));
        assert!(eval(json!({"op": "always"})));
    }

    #[test]
    fn test_comparisons() {
        assert!(eval(json!({"op": "eq", "field": "source", "value": "PRICING-PAGE"})));
        assert!(eval(json!({"op": "neq", "field": "phone", "value": "x"})));
        assert!(eval(json!({"op": "contains", "field": "company_name", "value": "dental"})));
        assert!(eval(json!({"op": "ends_with", "field": "email", "value": "@ACME.io"})));
        assert!(eval(json!({"op": "eq", "field": "email_domain", "value": "acme.io"})));
        assert!(!eval(json!({"op": "starts_with", "field": "phone", "value": "+1"})));
    }

    #[test]
    fn test_metadata_paths_and_numbers() {
        assert!(eval(json!({"op": "eq", "field": "metadata.budget", "value": 5000})));
        assert!(eval(json!({"op": "eq", "field": "metadata.budget", "value": "5000"})));
        assert!(eval(json!({"op": "eq", "field": "metadata.utm.campaign", "value": "spring"})));
        assert!(eval(json!({"op": "missing", "field": "metadata.utm.medium"})));
        assert!(eval(json!({"op": "in", "field": "metadata.budget", "values": [1000, 5000]})));
    }

    #[test]
    fn test_combinators() {
        assert!(eval(json!({"op": "all", "conditions": [
            {"op": "exists", "field": "email"},
            {"op": "not", "condition": {"op": "exists", "field": "phone"}}
        ]})));
        assert!(eval(json!({"op": "any", "conditions": [
            {"op": "exists", "field": "phone"},
            {"op": "eq", "field": "first_name", "value": "ana"}
        ]})));
        assert!(!eval(json!({"op": "all", "conditions": [
            {"op": "always"},
            {"op": "exists", "field": "job_title"}
        ]})));
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let condition =
            Condition::from_json(&json!({"op": "exists", "field": "salary"})).unwrap();
        assert!(condition.evaluate(&lead()).is_err());
    }

    #[test]
    fn test_malformed_condition_is_rejected() {
        assert!(Condition::from_json(&json!({"op": "matches_regex"})).is_err());
        assert!(Condition::from_json(&json!({"op": "eq", "field": "email"})).is_err());
    }
}
