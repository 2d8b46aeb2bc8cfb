//! # MongoDB health checks
//!
//! Liveness/readiness checks for a MongoDB deployment:
//! - One-shot `{ ping: 1 }` probe with loose `ok` interpretation (1.0 and 1
//!   are both success)
//! - Cluster connection-state cross-reference after a successful ping
//! - Five construction shapes (connection string, parsed descriptor, client,
//!   database, client settings) converging on one evaluator
//! - Fluent registration into a named registry with severity overrides and
//!   tags
//!
//! A check never fails its caller: driver errors, malformed replies and
//! disconnected topologies all come back as unhealthy results with a
//! diagnostic description.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod check;
pub mod error;
pub mod register;
pub mod registry;
pub mod result;
pub mod topology;

pub use check::{MongoHandle, MongoHealthCheck, DEFAULT_PROBE_TIMEOUT};
pub use error::{Error, Result};
pub use register::{MongoCheckOptions, MongoHealthCheckExt, DEFAULT_CHECK_NAME};
pub use registry::{
    HealthCheck, HealthRegistration, HealthRegistry, HealthReport, HealthReportEntry,
};
pub use result::{CheckFault, HealthCheckResult, HealthStatus};
pub use topology::{ClusterState, TopologyWatch};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::check::{MongoHandle, MongoHealthCheck, DEFAULT_PROBE_TIMEOUT};
    pub use crate::error::{Error, Result};
    pub use crate::register::{MongoCheckOptions, MongoHealthCheckExt, DEFAULT_CHECK_NAME};
    pub use crate::registry::{
        HealthCheck, HealthRegistration, HealthRegistry, HealthReport, HealthReportEntry,
    };
    pub use crate::result::{CheckFault, HealthCheckResult, HealthStatus};
    pub use crate::topology::{ClusterState, TopologyWatch};
}
