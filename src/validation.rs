//! Validation and sanitization of inbound lead and email payloads.
//!
//! Every free-text field goes through `sanitize_text` (control bytes removed,
//! whitespace trimmed, length capped). Contact fields get format checks:
//! emails against a simplified RFC 5322 pattern, phones through
//! `phonenumber`, websites through `url`.

use crate::errors::AppError;
use crate::models::{LeadRequest, NewLead};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_ORG_LEN: usize = 200;
pub const MAX_WEBSITE_LEN: usize = 500;
pub const MAX_SOURCE_LEN: usize = 64;
pub const MAX_METADATA_BYTES: usize = 8 * 1024;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("email regex is valid")
});

/// Strips control characters, trims, and caps the length in characters.
///
/// Returns `None` when nothing printable is left.
pub fn sanitize_text(raw: &str, max_len: usize) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_len).collect::<String>().trim_end().to_string())
}

/// Validate email address format
///
/// Checks for:
/// - Length bounds
/// - local@domain.tld structure with at least one dot in the domain
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || email.len() > MAX_EMAIL_LEN {
        return false;
    }

    if !EMAIL_REGEX.is_match(email) {
        tracing::debug!("Invalid email format ({})", fingerprint(email));
        return false;
    }

    true
}

/// Trims and case-folds an email, then validates it.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = sanitize_text(raw, MAX_EMAIL_LEN + 1)
        .ok_or_else(|| AppError::ValidationError("Email is required".to_string()))?
        .to_lowercase();

    if !is_valid_email(&email) {
        return Err(AppError::ValidationError(
            "Please provide a valid email address".to_string(),
        ));
    }

    Ok(email)
}

/// Validate and normalize a phone number to E.164.
///
/// Numbers without a `+` country prefix are parsed as US numbers.
pub fn normalize_phone(raw: &str) -> Result<String, AppError> {
    let invalid = || AppError::ValidationError("Please provide a valid phone number".to_string());

    let trimmed = sanitize_text(raw, 32).ok_or_else(invalid)?;
    let digits = trimmed.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 7 {
        return Err(invalid());
    }

    match phonenumber::parse(Some(CountryId::US), &trimmed) {
        Ok(number) if phonenumber::is_valid(&number) => {
            Ok(number.format().mode(Mode::E164).to_string())
        }
        Ok(_) => {
            tracing::debug!("Rejected phone number with {} digits", digits);
            Err(invalid())
        }
        Err(e) => {
            tracing::debug!("Failed to parse phone number: {:?}", e);
            Err(invalid())
        }
    }
}

/// Normalizes a website to an absolute http(s) URL.
pub fn normalize_website(raw: &str) -> Result<String, AppError> {
    let invalid = || AppError::ValidationError("Please provide a valid website".to_string());

    let trimmed = sanitize_text(raw, MAX_WEBSITE_LEN).ok_or_else(invalid)?;
    let candidate = if trimmed.contains("://") {
        trimmed
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = url::Url::parse(&candidate).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid());
    }

    Ok(parsed.to_string())
}

/// True when `candidate` parses to the same scheme, host and port as `base`.
pub fn is_same_origin(candidate: &str, base: &str) -> bool {
    match (url::Url::parse(candidate), url::Url::parse(base)) {
        (Ok(c), Ok(b)) => c.origin() == b.origin() && c.origin().is_tuple(),
        _ => false,
    }
}

/// Metadata must be a JSON object of bounded size; `null` becomes `{}`.
pub fn validate_metadata(metadata: Option<Value>) -> Result<Value, AppError> {
    let value = match metadata {
        None | Some(Value::Null) => return Ok(Value::Object(Default::default())),
        Some(v) => v,
    };

    if !value.is_object() {
        return Err(AppError::ValidationError(
            "metadata must be a JSON object".to_string(),
        ));
    }

    let size = serde_json::to_vec(&value)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX);
    if size > MAX_METADATA_BYTES {
        return Err(AppError::ValidationError(format!(
            "metadata exceeds {} bytes",
            MAX_METADATA_BYTES
        )));
    }

    Ok(value)
}

/// Turns a raw lead payload into a `NewLead`.
///
/// At least one of email or phone must survive sanitization.
pub fn validate_lead(request: LeadRequest) -> Result<NewLead, AppError> {
    let email = request
        .email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .map(normalize_email)
        .transpose()?;

    let phone = request
        .phone
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(normalize_phone)
        .transpose()?;

    if email.is_none() && phone.is_none() {
        return Err(AppError::ValidationError(
            "Either email or phone is required".to_string(),
        ));
    }

    let website = request
        .website
        .as_deref()
        .filter(|w| !w.trim().is_empty())
        .map(normalize_website)
        .transpose()?;

    Ok(NewLead {
        first_name: request
            .first_name
            .as_deref()
            .and_then(|v| sanitize_text(v, MAX_NAME_LEN)),
        last_name: request
            .last_name
            .as_deref()
            .and_then(|v| sanitize_text(v, MAX_NAME_LEN)),
        email,
        phone,
        company_name: request
            .company_name
            .as_deref()
            .and_then(|v| sanitize_text(v, MAX_ORG_LEN)),
        job_title: request
            .job_title
            .as_deref()
            .and_then(|v| sanitize_text(v, MAX_ORG_LEN)),
        website,
        source: request
            .source
            .as_deref()
            .and_then(|v| sanitize_text(v, MAX_SOURCE_LEN))
            .map(|s| s.to_lowercase()),
        metadata: validate_metadata(request.metadata)?,
    })
}

/// Short, non-reversible tag for an email address, safe to put in logs.
pub fn fingerprint(value: &str) -> String {
    let digest = Sha256::digest(value.trim().to_lowercase().as_bytes());
    hex::encode(&digest[..6])
}
