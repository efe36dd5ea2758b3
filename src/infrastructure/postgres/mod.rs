//! PostgreSQL persistence module.
//!
//! Provides the connection pool shared by the store backends.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
