use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::BrokerSettings;
use crate::error::BackendError;
use crate::sink::RecordSink;
use crate::topic::TopicCreateRequest;

/// Per-topic result of a creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicCreateResult {
    pub topic: String,
    pub result: Result<(), BackendError>,
}

/// Administrative side of a broker connection.
pub trait ClusterAdmin: Send + Sync {
    /// Names of every topic the cluster currently knows about.
    fn list_topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BackendError>> + Send + '_>>;

    /// Issue one creation request for all `requests`.
    ///
    /// The outer `Err` means the request as a whole failed; per-topic
    /// failures (e.g. `ErrorKind::AlreadyExists`) come back as results.
    fn create_topics(
        &self,
        requests: &[TopicCreateRequest],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TopicCreateResult>, BackendError>> + Send + '_>>;
}

/// Opens admin and publishing connections to a broker cluster.
///
/// Implementations must fail with `ErrorKind::Connection` when the cluster
/// cannot be reached, instead of deferring the failure to the first request.
pub trait BrokerConnector: Send + Sync {
    #[allow(clippy::type_complexity)]
    fn connect_admin(
        &self,
        settings: &BrokerSettings,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ClusterAdmin>, BackendError>> + Send + '_>>;

    #[allow(clippy::type_complexity)]
    fn connect_sink(
        &self,
        settings: &BrokerSettings,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn RecordSink>, BackendError>> + Send + '_>>;
}
