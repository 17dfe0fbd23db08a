//! Background automation worker.
//!
//! Intake hands each persisted lead to a bounded channel and returns to the
//! caller immediately. A single task drains the channel and runs the engine
//! per lead, so rule side effects land after the HTTP response and in
//! arrival order. When the channel is full the lead is dropped from
//! automation (never from storage) and counted.

use super::engine::AutomationEngine;
use crate::models::Lead;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct AutomationStats {
    enqueued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    rule_failures: AtomicU64,
}

/// Point-in-time copy of the worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutomationStatsSnapshot {
    pub enqueued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
    pub rule_failures: u64,
}

impl AutomationStats {
    pub fn snapshot(&self) -> AutomationStatsSnapshot {
        AutomationStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rule_failures: self.rule_failures.load(Ordering::Relaxed),
        }
    }
}

/// Producer handle for the automation worker. Cheap to clone.
#[derive(Clone)]
pub struct AutomationQueue {
    sender: mpsc::Sender<Lead>,
    stats: Arc<AutomationStats>,
}

impl AutomationQueue {
    /// Spawns the worker task. It exits once every queue handle is dropped
    /// and the channel has drained.
    pub fn start(engine: Arc<AutomationEngine>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Lead>(capacity.max(1));
        let stats = Arc::new(AutomationStats::default());

        let worker_stats = stats.clone();
        let handle = tokio::spawn(async move {
            tracing::info!("Automation worker started (capacity {})", capacity.max(1));

            while let Some(lead) = receiver.recv().await {
                match engine.run(&lead).await {
                    Ok(report) => {
                        worker_stats.succeeded.fetch_add(1, Ordering::Relaxed);
                        worker_stats
                            .rule_failures
                            .fetch_add(report.failed as u64, Ordering::Relaxed);
                        tracing::debug!(
                            "Automation for lead {}: {} evaluated, {} matched, {} failed",
                            lead.id,
                            report.evaluated,
                            report.matched,
                            report.failed
                        );
                    }
                    Err(e) => {
                        worker_stats.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!("Automation run failed for lead {}: {:#}", lead.id, e);
                    }
                }
            }

            tracing::info!("Automation worker stopped");
        });

        (Self { sender, stats }, handle)
    }

    /// Queues a lead without waiting. Returns `false` when it was dropped.
    pub fn enqueue(&self, lead: Lead) -> bool {
        match self.sender.try_send(lead) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(lead)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Automation queue full, skipping rules for lead {}", lead.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(lead)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Automation worker is gone, skipping lead {}", lead.id);
                false
            }
        }
    }

    pub fn stats(&self) -> AutomationStatsSnapshot {
        self.stats.snapshot()
    }
}
