//! Infrastructure layer modules
//!
//! Shared components used by every dispatcher:
//! - `auth`: JWT validation and caller identity
//! - `config`: Application configuration and settings
//! - `error`: Errors surfaced to direct callers
//! - `metrics`: Prometheus metrics helpers
//! - `postgres`: PostgreSQL connection pool
//! - `redis`: Reconnection backoff for the queue trigger

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod postgres;
pub mod redis;
