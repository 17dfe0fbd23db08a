use crate::errors::AppError;
use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

/// Checks `Authorization: Bearer <secret>` against the expected secret.
pub fn require_bearer(headers: &HeaderMap, expected: &str, scope: &str) -> Result<(), AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized(format!("Missing bearer token for {}", scope)))?;

    if !constant_time_compare(token, expected) {
        return Err(AppError::Unauthorized(format!("Invalid bearer token for {}", scope)));
    }

    Ok(())
}

/// Compares SHA-256 digests so neither the length nor the content of the
/// secret leaks through timing.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if b.is_empty() {
        return false;
    }

    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
