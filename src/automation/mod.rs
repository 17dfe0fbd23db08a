//! Post-intake automation: admin-defined rules evaluated against each new
//! lead on a background worker.

pub mod actions;
pub mod condition;
pub mod engine;
pub mod worker;

pub use engine::{AutomationEngine, RunReport};
pub use worker::{AutomationQueue, AutomationStatsSnapshot};
