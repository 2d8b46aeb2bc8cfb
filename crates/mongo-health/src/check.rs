//! MongoDB liveness evaluation

use crate::error::{Error, Result};
use crate::registry::HealthCheck;
use crate::result::HealthCheckResult;
use crate::topology::{ClusterState, TopologyWatch};
use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, ConnectionString};
use mongodb::{Client, Database};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Database the probe runs against when the connection string names none
const DEFAULT_DATABASE: &str = "admin";

/// Default bound on a single probe round-trip
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Driver surface the evaluator needs from the dependency client
///
/// One liveness command plus a read-only view of the cluster connection
/// state. Production code wraps a resolved [`Database`]; tests substitute a
/// mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MongoHandle: Send + Sync {
    /// Run `{ ping: 1 }` against the logical database and return the raw
    /// reply document
    async fn ping(&self) -> mongodb::error::Result<Document>;

    /// Cluster connection state as last observed by the driver
    ///
    /// Only consulted after a successful ping. Handles built from
    /// caller-supplied clients cannot observe driver topology and report
    /// [`ClusterState::Connected`]; a completed ping implies the driver
    /// selected a server.
    fn cluster_state(&self) -> ClusterState;
}

/// Production handle: a resolved logical database plus, when this crate built
/// the client itself, a topology watch fed by its SDAM events.
struct DriverHandle {
    database: Database,
    topology: Option<TopologyWatch>,
}

#[async_trait]
impl MongoHandle for DriverHandle {
    async fn ping(&self) -> mongodb::error::Result<Document> {
        self.database.run_command(doc! { "ping": 1 }).await
    }

    fn cluster_state(&self) -> ClusterState {
        match &self.topology {
            Some(watch) => watch.state(),
            None => ClusterState::Connected,
        }
    }
}

/// What the evaluator was constructed from
enum CheckSource {
    /// Handle resolved at construction time
    Eager(DriverHandle),
    /// Raw connection string, validated eagerly, resolved at first probe
    Deferred {
        uri: String,
        handle: OnceCell<DriverHandle>,
    },
}

/// MongoDB liveness check
///
/// Immutable once constructed and safe to share across concurrent probes; the
/// only state it carries is the resolved handle (or the descriptor to resolve
/// one from) and the probe timeout. All construction paths converge on the
/// same evaluation: ping, interpret the `ok` field, cross-reference the
/// cluster state.
pub struct MongoHealthCheck {
    source: CheckSource,
    timeout: Duration,
}

impl MongoHealthCheck {
    /// Check an already-open logical database
    ///
    /// Preferred when the application holds a configured handle: the probe
    /// reuses the caller's pooling, auth and instrumentation.
    pub fn from_database(database: Database) -> Self {
        Self::eager(DriverHandle {
            database,
            topology: None,
        })
    }

    /// Check the default database of an existing client, falling back to
    /// `admin` when the connection string names none
    pub fn from_client(client: &Client) -> Self {
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        Self::eager(DriverHandle {
            database,
            topology: None,
        })
    }

    /// Build a dedicated client from settings and check its default database
    pub fn from_settings(mut settings: ClientOptions) -> Result<Self> {
        let watch = TopologyWatch::new();
        settings.sdam_event_handler = Some(watch.event_handler());
        let client =
            Client::with_options(settings).map_err(|e| Error::InvalidSettings(e.to_string()))?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        Ok(Self::eager(DriverHandle {
            database,
            topology: Some(watch),
        }))
    }

    /// Build a dedicated client from a parsed connection descriptor
    pub async fn from_connection_string(descriptor: ConnectionString) -> Result<Self> {
        let settings = ClientOptions::parse(descriptor)
            .await
            .map_err(|e| Error::InvalidConnectionString(e.to_string()))?;
        Self::from_settings(settings)
    }

    /// Check the deployment a raw connection string points at
    ///
    /// The string is parsed eagerly so a malformed value surfaces as a
    /// configuration fault at registration rather than as a false unhealthy
    /// probe. Full resolution (SRV lookup, option validation, client
    /// construction) is deferred to the first probe and cached; a failed
    /// resolution is reported unhealthy and retried on the next probe.
    pub fn from_uri(uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(Error::EmptyConnectionString);
        }
        ConnectionString::parse(&uri).map_err(|e| Error::InvalidConnectionString(e.to_string()))?;
        Ok(Self {
            source: CheckSource::Deferred {
                uri,
                handle: OnceCell::new(),
            },
            timeout: DEFAULT_PROBE_TIMEOUT,
        })
    }

    /// Override the probe timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn eager(handle: DriverHandle) -> Self {
        Self {
            source: CheckSource::Eager(handle),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Evaluate the dependency once
    ///
    /// Never fails its caller: every driver error, malformed reply and
    /// disconnected topology becomes an unhealthy result whose description is
    /// prefixed with `name`. The probe is bounded by both the supplied
    /// cancellation token and the configured timeout.
    pub async fn check(&self, name: &str, cancellation: CancellationToken) -> HealthCheckResult {
        tokio::select! {
            _ = cancellation.cancelled() => {
                warn!(check = name, "probe cancelled");
                HealthCheckResult::unhealthy(format!("{name}: probe cancelled"))
            }
            probed = timeout(self.timeout, self.probe(name)) => match probed {
                Ok(result) => result,
                Err(_) => {
                    warn!(check = name, timeout_ms = self.timeout.as_millis() as u64, "probe timed out");
                    HealthCheckResult::unhealthy(format!(
                        "{name}: probe timed out after {:?}",
                        self.timeout
                    ))
                }
            }
        }
    }

    async fn probe(&self, name: &str) -> HealthCheckResult {
        let handle = match self.resolve().await {
            Ok(handle) => handle,
            Err(error) => return probe_fault(name, error),
        };
        evaluate(name, handle).await
    }

    /// Resolve the handle, lazily creating the client for deferred sources
    async fn resolve(&self) -> mongodb::error::Result<&DriverHandle> {
        match &self.source {
            CheckSource::Eager(handle) => Ok(handle),
            CheckSource::Deferred { uri, handle } => {
                handle
                    .get_or_try_init(|| async {
                        debug!("resolving deferred connection string");
                        let mut settings = ClientOptions::parse(uri.as_str()).await?;
                        let watch = TopologyWatch::new();
                        settings.sdam_event_handler = Some(watch.event_handler());
                        let client = Client::with_options(settings)?;
                        let database = client
                            .default_database()
                            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
                        Ok(DriverHandle {
                            database,
                            topology: Some(watch),
                        })
                    })
                    .await
            }
        }
    }
}

impl fmt::Debug for MongoHealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            CheckSource::Eager(_) => "eager",
            CheckSource::Deferred { .. } => "deferred",
        };
        f.debug_struct("MongoHealthCheck")
            .field("source", &source)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl HealthCheck for MongoHealthCheck {
    async fn check(&self, name: &str, cancellation: CancellationToken) -> HealthCheckResult {
        MongoHealthCheck::check(self, name, cancellation).await
    }
}

/// One probe against a resolved handle
async fn evaluate<H>(name: &str, handle: &H) -> HealthCheckResult
where
    H: MongoHandle + ?Sized,
{
    match handle.ping().await {
        Ok(reply) => classify(name, &reply, handle.cluster_state()),
        Err(error) => probe_fault(name, error),
    }
}

/// Decision procedure over the raw reply and the cluster snapshot
fn classify(name: &str, reply: &Document, state: ClusterState) -> HealthCheckResult {
    if !ping_ok(reply) {
        // Transport succeeded but the server did not acknowledge; embed the
        // whole reply so the operator can see what it actually said.
        warn!(check = name, reply = %reply, "ping not acknowledged");
        return HealthCheckResult::unhealthy(format!("{name}: {reply}"));
    }
    match state {
        ClusterState::Connected => {
            debug!(check = name, "ping acknowledged, cluster connected");
            HealthCheckResult::healthy(format!("{name}: ClusterState::Connected"))
        }
        ClusterState::Disconnected => {
            // A lone ping can race a stale topology view, e.g. a stale
            // secondary; trust the broader cluster snapshot.
            warn!(check = name, "ping acknowledged but cluster disconnected");
            HealthCheckResult::unhealthy(format!("{name}: ClusterState::Disconnected"))
        }
    }
}

/// The server encodes `ok` as 1.0 or 1 depending on version and topology;
/// both are success. Floating-point equality is epsilon-bounded.
fn ping_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Bson::Double(ok)) => (ok - 1.0).abs() < f64::EPSILON,
        Some(Bson::Int32(ok)) => *ok == 1,
        Some(Bson::Int64(ok)) => *ok == 1,
        _ => false,
    }
}

fn probe_fault(name: &str, error: mongodb::error::Error) -> HealthCheckResult {
    warn!(check = name, error = %error, "probe failed");
    HealthCheckResult::unhealthy(format!("{name}: {error}")).with_fault(Arc::new(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::HealthStatus;
    use std::time::Instant;

    fn connected_mock(reply: Document) -> MockMongoHandle {
        let mut mock = MockMongoHandle::new();
        mock.expect_ping().returning(move || Ok(reply.clone()));
        mock.expect_cluster_state()
            .return_const(ClusterState::Connected);
        mock
    }

    #[test]
    fn test_ping_ok_encodings() {
        assert!(ping_ok(&doc! { "ok": 1.0 }));
        assert!(ping_ok(&doc! { "ok": 1_i32 }));
        assert!(ping_ok(&doc! { "ok": 1_i64 }));

        assert!(!ping_ok(&doc! { "ok": 0.0 }));
        assert!(!ping_ok(&doc! { "ok": 0_i32 }));
        assert!(!ping_ok(&doc! { "ok": "1" }));
        assert!(!ping_ok(&doc! {}));
    }

    #[test]
    fn test_classify_connected_is_healthy() {
        let result = classify("Mongo", &doc! { "ok": 1.0 }, ClusterState::Connected);
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(result.description.starts_with("Mongo:"));
        assert!(result.description.contains("Connected"));
    }

    #[test]
    fn test_classify_disconnected_is_unhealthy_despite_ok_ping() {
        let result = classify("Mongo", &doc! { "ok": 1.0 }, ClusterState::Disconnected);
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.description.contains("Disconnected"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_classify_bad_reply_embeds_document() {
        let reply = doc! { "ok": 0.0, "errmsg": "not primary" };
        let result = classify("Mongo", &reply, ClusterState::Connected);
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.description.starts_with("Mongo:"));
        assert!(result.description.contains("errmsg"));
        assert!(result.description.contains("not primary"));
    }

    #[tokio::test]
    async fn test_evaluate_double_and_int_ok_are_equivalent() {
        let double = evaluate("Mongo", &connected_mock(doc! { "ok": 1.0 })).await;
        let int = evaluate("Mongo", &connected_mock(doc! { "ok": 1_i32 })).await;
        assert_eq!(double.status, HealthStatus::Healthy);
        assert_eq!(int.status, double.status);
        assert_eq!(int.description, double.description);
    }

    #[tokio::test]
    async fn test_evaluate_driver_error_is_captured_not_thrown() {
        let mut mock = MockMongoHandle::new();
        mock.expect_ping().returning(|| {
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out").into())
        });

        let result = evaluate("Mongo", &mock).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.description.starts_with("Mongo:"));
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_evaluate_skips_topology_on_bad_reply() {
        // cluster_state must not be consulted when the ping is not ok
        let mut mock = MockMongoHandle::new();
        mock.expect_ping().returning(|| Ok(doc! { "ok": 0.0 }));
        mock.expect_cluster_state().never();

        let result = evaluate("Mongo", &mock).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_from_uri_rejects_empty_string() {
        assert!(matches!(
            MongoHealthCheck::from_uri(""),
            Err(Error::EmptyConnectionString)
        ));
        assert!(matches!(
            MongoHealthCheck::from_uri("   "),
            Err(Error::EmptyConnectionString)
        ));
    }

    #[test]
    fn test_from_uri_rejects_malformed_string() {
        assert!(matches!(
            MongoHealthCheck::from_uri("not-a-connection-string"),
            Err(Error::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn test_from_uri_accepts_valid_string() {
        assert!(MongoHealthCheck::from_uri("mongodb://localhost:27017").is_ok());
    }

    /// Bind a listener that accepts but never speaks the wire protocol, so a
    /// probe against it hangs until cancelled or timed out.
    async fn silent_server() -> (tokio::net::TcpListener, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let uri = format!("mongodb://{addr}/?serverSelectionTimeoutMS=30000");
        (listener, uri)
    }

    #[tokio::test]
    async fn test_check_times_out_against_silent_server() {
        let (_listener, uri) = silent_server().await;
        let check = MongoHealthCheck::from_uri(uri)
            .unwrap()
            .with_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let result = check.check("Mongo", CancellationToken::new()).await;

        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.description.contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_check_returns_promptly_when_cancelled_mid_probe() {
        let (_listener, uri) = silent_server().await;
        let check = MongoHealthCheck::from_uri(uri)
            .unwrap()
            .with_timeout(Duration::from_secs(30));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = check.check("Mongo", token).await;

        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.description.contains("cancelled"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_short_circuits() {
        let (_listener, uri) = silent_server().await;
        let check = MongoHealthCheck::from_uri(uri).unwrap();

        let token = CancellationToken::new();
        token.cancel();

        let result = check.check("Mongo", token).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.description.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_all_construction_shapes_verdicts_converge() {
        // Every shape points at the same unreachable target; the verdict
        // status must be identical regardless of how the check was built.
        let (_listener, uri) = silent_server().await;

        let settings = ClientOptions::parse(uri.as_str()).await.unwrap();
        let client = Client::with_options(settings.clone()).unwrap();
        let database = client.database("admin");
        let descriptor = ConnectionString::parse(&uri).unwrap();

        let timeout = Duration::from_millis(200);
        let checks = vec![
            MongoHealthCheck::from_uri(uri.as_str()).unwrap(),
            MongoHealthCheck::from_connection_string(descriptor)
                .await
                .unwrap(),
            MongoHealthCheck::from_settings(settings).unwrap(),
            MongoHealthCheck::from_client(&client),
            MongoHealthCheck::from_database(database),
        ];

        for check in checks {
            let result = check
                .with_timeout(timeout)
                .check("Mongo", CancellationToken::new())
                .await;
            assert_eq!(result.status, HealthStatus::Unhealthy);
            assert!(result.description.starts_with("Mongo:"));
        }
    }
}
