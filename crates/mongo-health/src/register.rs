//! Registration entry points for MongoDB checks
//!
//! Five construction shapes, one registration primitive: whatever the caller
//! holds (raw connection string, parsed descriptor, client, database or
//! client settings) funnels into [`MongoHealthCheck`] and attaches to the
//! registry under a name, optional failure severity and optional tags.

use crate::check::MongoHealthCheck;
use crate::error::Result;
use crate::registry::{HealthRegistration, HealthRegistry};
use crate::result::HealthStatus;
use async_trait::async_trait;
use mongodb::options::{ClientOptions, ConnectionString};
use mongodb::{Client, Database};
use std::sync::Arc;
use std::time::Duration;

/// Name a MongoDB check registers under when none is given
pub const DEFAULT_CHECK_NAME: &str = "MongoDb";

/// Registration options shared by every entry point
///
/// All fields are optional: the name defaults to [`DEFAULT_CHECK_NAME`], tags
/// default to empty, the failure status defers to the registry's default and
/// the probe timeout to [`DEFAULT_PROBE_TIMEOUT`](crate::DEFAULT_PROBE_TIMEOUT).
#[derive(Debug, Clone, Default)]
pub struct MongoCheckOptions {
    name: Option<String>,
    failure_status: Option<HealthStatus>,
    tags: Vec<String>,
    timeout: Option<Duration>,
}

impl MongoCheckOptions {
    /// Create options with every field defaulted
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under this name instead of [`DEFAULT_CHECK_NAME`]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Report this status instead of the registry default when the check fails
    pub fn failure_status(mut self, status: HealthStatus) -> Self {
        self.failure_status = Some(status);
        self
    }

    /// Add one classification tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add classification tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Bound each probe round-trip
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fluent registration of MongoDB checks on a [`HealthRegistry`]
#[async_trait]
pub trait MongoHealthCheckExt: Sized {
    /// Register a check against an already-open logical database
    fn add_mongo_database(self, database: Database, options: MongoCheckOptions) -> Self;

    /// Register a check against an existing client's default database
    fn add_mongo_client(self, client: &Client, options: MongoCheckOptions) -> Self;

    /// Register a check that builds its own client from settings
    fn add_mongo_settings(self, settings: ClientOptions, options: MongoCheckOptions)
        -> Result<Self>;

    /// Register a check against a parsed connection descriptor
    async fn add_mongo_connection_string(
        self,
        descriptor: ConnectionString,
        options: MongoCheckOptions,
    ) -> Result<Self>;

    /// Register a check against a raw connection string
    ///
    /// An empty or malformed string is a configuration fault raised here, at
    /// registration, never deferred to the first probe.
    fn add_mongo_uri(self, uri: &str, options: MongoCheckOptions) -> Result<Self>;
}

#[async_trait]
impl MongoHealthCheckExt for HealthRegistry {
    fn add_mongo_database(self, database: Database, options: MongoCheckOptions) -> Self {
        add_mongo_check(self, MongoHealthCheck::from_database(database), options)
    }

    fn add_mongo_client(self, client: &Client, options: MongoCheckOptions) -> Self {
        add_mongo_check(self, MongoHealthCheck::from_client(client), options)
    }

    fn add_mongo_settings(
        self,
        settings: ClientOptions,
        options: MongoCheckOptions,
    ) -> Result<Self> {
        Ok(add_mongo_check(
            self,
            MongoHealthCheck::from_settings(settings)?,
            options,
        ))
    }

    async fn add_mongo_connection_string(
        self,
        descriptor: ConnectionString,
        options: MongoCheckOptions,
    ) -> Result<Self> {
        Ok(add_mongo_check(
            self,
            MongoHealthCheck::from_connection_string(descriptor).await?,
            options,
        ))
    }

    fn add_mongo_uri(self, uri: &str, options: MongoCheckOptions) -> Result<Self> {
        Ok(add_mongo_check(
            self,
            MongoHealthCheck::from_uri(uri)?,
            options,
        ))
    }
}

/// The single registration primitive every entry point funnels through
fn add_mongo_check(
    registry: HealthRegistry,
    check: MongoHealthCheck,
    options: MongoCheckOptions,
) -> HealthRegistry {
    let MongoCheckOptions {
        name,
        failure_status,
        tags,
        timeout,
    } = options;

    let check = match timeout {
        Some(timeout) => check.with_timeout(timeout),
        None => check,
    };

    let mut registration = HealthRegistration::new(
        name.unwrap_or_else(|| DEFAULT_CHECK_NAME.to_string()),
        Arc::new(check),
    )
    .with_tags(tags);
    if let Some(status) = failure_status {
        registration = registration.with_failure_status(status);
    }
    registry.add(registration)
}
