//! Health verdict types shared by every check

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Health status reported by a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Dependency is reachable and usable
    Healthy,
    /// Dependency is failing but the registration downgraded the severity
    Degraded,
    /// Dependency is unreachable or in an unusable state
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Captured fault retained on a failed result for structured logging.
pub type CheckFault = Arc<dyn std::error::Error + Send + Sync>;

/// Result of one check evaluation
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Health status
    pub status: HealthStatus,
    /// Human-readable diagnostic, prefixed with the check's registered name
    pub description: String,
    /// Original fault when the cause was an error rather than a semantic
    /// mismatch
    pub error: Option<CheckFault>,
}

impl HealthCheckResult {
    /// Create a healthy result
    pub fn healthy(description: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            description: description.into(),
            error: None,
        }
    }

    /// Create an unhealthy result
    pub fn unhealthy(description: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            description: description.into(),
            error: None,
        }
    }

    /// Attach the fault that caused this result
    pub fn with_fault(mut self, fault: CheckFault) -> Self {
        self.error = Some(fault);
        self
    }
}
