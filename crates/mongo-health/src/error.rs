//! Error types for check registration
//!
//! Only configuration faults live here. Anything that goes wrong while
//! actually probing the dependency is converted into an unhealthy
//! [`HealthCheckResult`](crate::result::HealthCheckResult) instead of an
//! `Err`, so a health check can never fail its caller.

/// Result type for registration operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Configuration faults raised at registration time
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection string was empty or blank
    #[error("connection string must not be empty")]
    EmptyConnectionString,

    /// Connection string failed to parse
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Client settings were rejected by the driver
    #[error("invalid client settings: {0}")]
    InvalidSettings(String),
}
