//! Redis connection support
//!
//! - `ReconnectBackoff`: delays between subscription attempts of the queue trigger

mod backoff;

pub use backoff::ReconnectBackoff;
