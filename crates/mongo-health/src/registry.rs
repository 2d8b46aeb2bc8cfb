//! Named health-check registry
//!
//! The minimal hosting surface a registration attaches to. An exposure layer
//! (HTTP endpoint, RPC service) calls [`HealthRegistry::run`] once per
//! incoming probe request and serializes the report; the registry itself
//! holds no mutable state and is safe to share behind an `Arc`.

use crate::result::{HealthCheckResult, HealthStatus};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A registered health check
///
/// Implementations must never fail the caller; every failure mode is folded
/// into the returned result.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Evaluate the dependency once, under the registered `name`
    async fn check(&self, name: &str, cancellation: CancellationToken) -> HealthCheckResult;
}

/// One named registration: check plus reporting policy
pub struct HealthRegistration {
    name: String,
    failure_status: Option<HealthStatus>,
    tags: Vec<String>,
    check: Arc<dyn HealthCheck>,
}

impl HealthRegistration {
    /// Register `check` under `name`
    pub fn new(name: impl Into<String>, check: Arc<dyn HealthCheck>) -> Self {
        Self {
            name: name.into(),
            failure_status: None,
            tags: Vec::new(),
            check,
        }
    }

    /// Status reported when the check fails, overriding the registry default
    pub fn with_failure_status(mut self, status: HealthStatus) -> Self {
        self.failure_status = Some(status);
        self
    }

    /// Classification tags attached to the report entry
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Registered name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered tags
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl fmt::Debug for HealthRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthRegistration")
            .field("name", &self.name)
            .field("failure_status", &self.failure_status)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Registry of named health checks
#[derive(Debug)]
pub struct HealthRegistry {
    checks: Vec<HealthRegistration>,
    default_failure_status: HealthStatus,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Create an empty registry reporting failures as unhealthy
    pub fn new() -> Self {
        Self {
            checks: Vec::new(),
            default_failure_status: HealthStatus::Unhealthy,
        }
    }

    /// Status reported for failing checks without a per-registration override
    pub fn with_default_failure_status(mut self, status: HealthStatus) -> Self {
        self.default_failure_status = status;
        self
    }

    /// Add a registration, returning the registry for chaining
    ///
    /// Duplicate names are not policed here; they show up as duplicate
    /// entries in the report.
    pub fn add(mut self, registration: HealthRegistration) -> Self {
        debug!(check = %registration.name, tags = ?registration.tags, "registered health check");
        self.checks.push(registration);
        self
    }

    /// Registered checks, in registration order
    pub fn registrations(&self) -> &[HealthRegistration] {
        &self.checks
    }

    /// Number of registered checks
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every registered check concurrently and aggregate the report
    ///
    /// A failing check reports its registration's failure status (default:
    /// the registry's). The aggregate is the worst status of any entry; an
    /// empty registry is healthy.
    pub async fn run(&self, cancellation: CancellationToken) -> HealthReport {
        let probes = self.checks.iter().map(|registration| {
            let cancellation = cancellation.clone();
            async move {
                let result = registration.check.check(&registration.name, cancellation).await;
                let status = if result.status == HealthStatus::Healthy {
                    HealthStatus::Healthy
                } else {
                    registration
                        .failure_status
                        .unwrap_or(self.default_failure_status)
                };
                if status != HealthStatus::Healthy {
                    warn!(
                        check = %registration.name,
                        status = %status,
                        description = %result.description,
                        "health check failed"
                    );
                }
                HealthReportEntry {
                    name: registration.name.clone(),
                    status,
                    description: result.description,
                    tags: registration.tags.clone(),
                }
            }
        });

        let entries = join_all(probes).await;
        let status = entries
            .iter()
            .map(|entry| entry.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        HealthReport { status, entries }
    }
}

/// Aggregated outcome of one registry run
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Worst status of any entry
    pub status: HealthStatus,
    /// Per-check outcomes, in registration order
    pub entries: Vec<HealthReportEntry>,
}

/// Outcome of a single registered check
#[derive(Debug, Clone, Serialize)]
pub struct HealthReportEntry {
    /// Registered name
    pub name: String,
    /// Reported status after severity clamping
    pub status: HealthStatus,
    /// Diagnostic description produced by the check
    pub description: String,
    /// Registered tags
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticCheck {
        status: HealthStatus,
    }

    #[async_trait]
    impl HealthCheck for StaticCheck {
        async fn check(&self, name: &str, _cancellation: CancellationToken) -> HealthCheckResult {
            match self.status {
                HealthStatus::Healthy => HealthCheckResult::healthy(format!("{name}: ok")),
                _ => HealthCheckResult::unhealthy(format!("{name}: down")),
            }
        }
    }

    fn healthy_check() -> Arc<dyn HealthCheck> {
        Arc::new(StaticCheck {
            status: HealthStatus::Healthy,
        })
    }

    fn failing_check() -> Arc<dyn HealthCheck> {
        Arc::new(StaticCheck {
            status: HealthStatus::Unhealthy,
        })
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let report = HealthRegistry::new().run(CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.entries.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_is_worst_entry() {
        let registry = HealthRegistry::new()
            .add(HealthRegistration::new("a", healthy_check()))
            .add(HealthRegistration::new("b", failing_check()));

        let report = registry.run(CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].status, HealthStatus::Healthy);
        assert_eq!(report.entries[1].status, HealthStatus::Unhealthy);
        assert_eq!(report.entries[1].description, "b: down");
    }

    #[tokio::test]
    async fn test_failure_status_override_clamps_to_degraded() {
        let registry = HealthRegistry::new().add(
            HealthRegistration::new("b", failing_check())
                .with_failure_status(HealthStatus::Degraded),
        );

        let report = registry.run(CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.entries[0].status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_registry_default_failure_status() {
        let registry = HealthRegistry::new()
            .with_default_failure_status(HealthStatus::Degraded)
            .add(HealthRegistration::new("b", failing_check()));

        let report = registry.run(CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_override_never_upgrades_a_healthy_check() {
        let registry = HealthRegistry::new().add(
            HealthRegistration::new("a", healthy_check())
                .with_failure_status(HealthStatus::Degraded),
        );

        let report = registry.run(CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_report_serializes_to_json() {
        let registry = HealthRegistry::new().add(
            HealthRegistration::new("mongo", healthy_check())
                .with_tags(vec!["db".to_string(), "ready".to_string()]),
        );

        let report = registry.run(CancellationToken::new()).await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["entries"][0]["name"], "mongo");
        assert_eq!(json["entries"][0]["tags"][0], "db");
    }

    #[test]
    fn test_duplicate_names_are_not_policed() {
        let registry = HealthRegistry::new()
            .add(HealthRegistration::new("same", healthy_check()))
            .add(HealthRegistration::new("same", failing_check()));
        assert_eq!(registry.len(), 2);
    }
}
