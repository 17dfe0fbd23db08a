//! Riva Lead Pipeline Library
//!
//! Lead capture and distribution for the Riva marketing site: validated lead
//! intake with fan-out to active clients, post-intake automation rules, the
//! rate-limited lead-magnet download gateway and the email-verified signup
//! activation flow with Stripe billing.
//!
//! # Modules
//!
//! - `assets`: Static file store for the lead-magnet PDF.
//! - `auth`: Bearer secret checks for admin and cron endpoints.
//! - `automation`: Rule conditions, actions, engine and background worker.
//! - `billing`: Billing provider trait and Stripe client.
//! - `circuit_breaker`: Circuit breaker for outbound providers.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Postgres implementations of the store traits.
//! - `distribution`: Lead fan-out to active clients.
//! - `download_tokens`: Single-email download tokens.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `intake`: Lead submission pipeline.
//! - `mailer`: Email provider trait and Brevo client.
//! - `models`: Core data models.
//! - `pages`: HTML result pages and email bodies.
//! - `rate_limiter`: Sliding-window per-identity limits.
//! - `store`: Storage traits.
//! - `validation`: Input validation and normalization.
//! - `verification`: Signup verification and activation.

pub mod assets;
pub mod auth;
pub mod automation;
pub mod billing;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod distribution;
pub mod download_tokens;
pub mod errors;
pub mod handlers;
pub mod intake;
pub mod mailer;
pub mod models;
pub mod pages;
pub mod rate_limiter;
pub mod store;
pub mod validation;
pub mod verification;
