//! Single-email download tokens for the lead-magnet PDF.
//!
//! Tokens live in a fixed-capacity, most-recent-first buffer held by the
//! process. Issuing is idempotent per (case-folded) email while the token is
//! still valid; the oldest entry is evicted once the buffer is full.

use crate::errors::AppError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct DownloadRecord {
    pub email: String,
    pub token: String,
    pub ip: String,
    pub user_agent: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub downloads: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// False when an existing valid token was returned.
    pub is_new: bool,
}

pub struct DownloadTokenTracker {
    records: Mutex<VecDeque<DownloadRecord>>,
    capacity: usize,
    validity: ChronoDuration,
}

impl Default for DownloadTokenTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DownloadTokenTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            validity: ChronoDuration::hours(1),
        }
    }

    pub async fn issue(&self, email: &str, ip: &str, user_agent: Option<&str>) -> IssuedToken {
        self.issue_at(email, ip, user_agent, Utc::now()).await
    }

    pub async fn issue_at(
        &self,
        email: &str,
        ip: &str,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> IssuedToken {
        let email = email.trim().to_lowercase();
        let mut records = self.records.lock().await;

        if let Some(pos) = records.iter().position(|r| r.email == email) {
            if !self.is_expired(&records[pos], now) {
                return IssuedToken {
                    token: records[pos].token.clone(),
                    is_new: false,
                };
            }
            // A dead link is worse than a new one.
            records.remove(pos);
        }

        let token = Uuid::new_v4().simple().to_string();
        records.push_front(DownloadRecord {
            email,
            token: token.clone(),
            ip: ip.to_string(),
            user_agent: user_agent.map(str::to_string),
            issued_at: now,
            downloads: 0,
        });
        records.truncate(self.capacity);

        IssuedToken {
            token,
            is_new: true,
        }
    }

    pub async fn redeem(&self, token: &str) -> Result<DownloadRecord, AppError> {
        self.redeem_at(token, Utc::now()).await
    }

    /// Looks up a token and counts the download.
    ///
    /// Fails with `NotFound` for an unknown token and `Expired` once more than
    /// an hour has passed since issuance.
    pub async fn redeem_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<DownloadRecord, AppError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.token == token)
            .ok_or_else(|| AppError::NotFound("Download link not found".to_string()))?;

        if now - record.issued_at > self.validity {
            return Err(AppError::Expired(
                "Download link has expired. Please request a new one.".to_string(),
            ));
        }

        record.downloads += 1;
        Ok(record.clone())
    }

    fn is_expired(&self, record: &DownloadRecord, now: DateTime<Utc>) -> bool {
        now - record.issued_at > self.validity
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}
