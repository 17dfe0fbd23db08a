//! Sliding-window request limiter keyed by client identity.
//!
//! Each identity keeps the timestamps of its admitted requests per kind.
//! On every call the timestamps older than the kind's window are discarded
//! and the request is admitted only while the remaining count is below the
//! cap. Rejected requests are not recorded.
//!
//! State is process-local: a restart resets every counter and several
//! instances do not share budgets. Swapping the backing store keeps the
//! `allow` contract unchanged.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use moka::future::Cache;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Request category with its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Lead-magnet email submissions: 5 per 15 minutes.
    Email,
    /// Lead-magnet file downloads: 3 per hour.
    Download,
}

impl RequestKind {
    pub fn window(&self) -> ChronoDuration {
        match self {
            RequestKind::Email => ChronoDuration::minutes(15),
            RequestKind::Download => ChronoDuration::hours(1),
        }
    }

    pub fn max_requests(&self) -> usize {
        match self {
            RequestKind::Email => 5,
            RequestKind::Download => 3,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Seconds until the oldest counted request leaves the window.
    Limited { retry_after_secs: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

type Timestamps = Arc<Mutex<VecDeque<DateTime<Utc>>>>;

#[derive(Clone)]
pub struct RateLimiter {
    email: Cache<String, Timestamps>,
    download: Cache<String, Timestamps>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            email: Self::build_cache(RequestKind::Email),
            download: Self::build_cache(RequestKind::Download),
        }
    }

    // Identities idle for a whole window hold no countable timestamps,
    // so they can be dropped.
    fn build_cache(kind: RequestKind) -> Cache<String, Timestamps> {
        let idle = kind
            .window()
            .to_std()
            .unwrap_or(Duration::from_secs(3600));
        Cache::builder()
            .time_to_idle(idle)
            .max_capacity(100_000)
            .build()
    }

    fn cache(&self, kind: RequestKind) -> &Cache<String, Timestamps> {
        match kind {
            RequestKind::Email => &self.email,
            RequestKind::Download => &self.download,
        }
    }

    /// Returns true when the request is admitted.
    pub async fn allow(&self, identity: &str, kind: RequestKind) -> bool {
        self.check_at(identity, kind, Utc::now()).await.is_allowed()
    }

    /// Same as `allow`, evaluated at an explicit instant.
    pub async fn allow_at(&self, identity: &str, kind: RequestKind, now: DateTime<Utc>) -> bool {
        self.check_at(identity, kind, now).await.is_allowed()
    }

    /// Full decision at the current instant, including the retry hint.
    pub async fn check(&self, identity: &str, kind: RequestKind) -> Decision {
        self.check_at(identity, kind, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        identity: &str,
        kind: RequestKind,
        now: DateTime<Utc>,
    ) -> Decision {
        let entry = self
            .cache(kind)
            .get_with(identity.to_string(), async {
                Arc::new(Mutex::new(VecDeque::new()))
            })
            .await;

        let window = kind.window();
        let cutoff = now - window;
        let mut timestamps = entry.lock().await;

        // Entries exactly one window old still count.
        while timestamps.front().is_some_and(|t| *t < cutoff) {
            timestamps.pop_front();
        }

        if timestamps.len() >= kind.max_requests() {
            let retry_after_secs = timestamps
                .front()
                .map(|oldest| (*oldest + window - now).num_seconds().max(1) as u64)
                .unwrap_or(1);
            tracing::debug!(
                ?kind,
                count = timestamps.len(),
                retry_after_secs,
                "Rate limit exceeded"
            );
            return Decision::Limited { retry_after_secs };
        }

        timestamps.push_back(now);
        Decision::Allowed
    }
}
