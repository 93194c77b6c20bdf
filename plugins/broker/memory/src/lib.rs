use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;

use herald_api::admin::{BrokerConnector, ClusterAdmin, TopicCreateResult};
use herald_api::config::BrokerSettings;
use herald_api::error::BackendError;
use herald_api::record::{DeliveryReport, OutboundRecord};
use herald_api::sink::{DeliveryFuture, RecordSink};
use herald_api::topic::TopicCreateRequest;

// ═══════════════════════════════════════════════════════════════
//  MemoryBrokerConfig
// ═══════════════════════════════════════════════════════════════

fn default_broker_count() -> u32 {
    1
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryBrokerConfig {
    /// Simulated cluster size; replication factors above it are rejected.
    #[serde(default = "default_broker_count")]
    pub broker_count: u32,
    /// Create unknown topics (one partition) on first publish.
    #[serde(default)]
    pub auto_create_topics: bool,
    /// Delay before each record is acknowledged.
    #[serde(default)]
    pub delivery_delay_ms: u64,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            broker_count: default_broker_count(),
            auto_create_topics: false,
            delivery_delay_ms: 0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Topic state
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    pub payload: Option<Vec<u8>>,
    pub timestamp_ms: i64,
}

/// Snapshot of a topic's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    pub num_partitions: u32,
    pub replication_factor: u32,
    pub config: BTreeMap<String, String>,
}

struct MemoryTopic {
    info: TopicInfo,
    partitions: Vec<Vec<StoredRecord>>,
}

impl MemoryTopic {
    fn new(info: TopicInfo) -> Self {
        let partitions = (0..info.num_partitions).map(|_| Vec::new()).collect();
        Self { info, partitions }
    }

    fn append(&mut self, record: OutboundRecord) -> DeliveryReport {
        let partition = partition_for(&record.key, self.partitions.len());
        let log = &mut self.partitions[partition];
        let offset = log.len() as i64;
        log.push(StoredRecord {
            partition: partition as i32,
            offset,
            key: record.key,
            payload: record.payload,
            timestamp_ms: record.timestamp_ms,
        });
        DeliveryReport {
            topic: record.topic,
            partition: partition as i32,
            offset,
            timestamp_ms: Some(record.timestamp_ms),
        }
    }
}

fn partition_for(key: &[u8], partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBroker
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct Counters {
    admin_connections: AtomicUsize,
    sink_connections: AtomicUsize,
    metadata_requests: AtomicUsize,
    create_requests: AtomicUsize,
    sink_closes: AtomicUsize,
    open_sinks: AtomicUsize,
}

struct Inner {
    config: MemoryBrokerConfig,
    topics: RwLock<HashMap<String, MemoryTopic>>,
    reachable: AtomicBool,
    creation_failures: std::sync::Mutex<HashMap<String, BackendError>>,
    requests: std::sync::Mutex<Vec<TopicCreateRequest>>,
    admin_delay: std::sync::Mutex<Duration>,
    close_failure: std::sync::Mutex<Option<BackendError>>,
    counters: Counters,
}

/// In-process broker cluster. Cheap to clone; clones share state.
///
/// Acts as its own connector, admin client and sink, and counts every
/// request so callers can check what went over the "wire".
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryBrokerConfig::default())
    }
}

impl MemoryBroker {
    pub fn new(config: MemoryBrokerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                topics: RwLock::new(HashMap::new()),
                reachable: AtomicBool::new(true),
                creation_failures: std::sync::Mutex::new(HashMap::new()),
                requests: std::sync::Mutex::new(Vec::new()),
                admin_delay: std::sync::Mutex::new(Duration::ZERO),
                close_failure: std::sync::Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    /// Create a topic directly, bypassing the admin API and its counters.
    pub async fn seed_topic(&self, name: &str, num_partitions: u32, replication_factor: u32) {
        let info = TopicInfo {
            name: name.to_string(),
            num_partitions: num_partitions.max(1),
            replication_factor,
            config: BTreeMap::new(),
        };
        self.inner
            .topics
            .write()
            .await
            .insert(name.to_string(), MemoryTopic::new(info));
    }

    /// Make every later connect and request fail with a connection error.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make creation of `topic` fail with `error`.
    pub fn fail_creation(&self, topic: &str, error: BackendError) {
        lock(&self.inner.creation_failures).insert(topic.to_string(), error);
    }

    /// Stall every later metadata and creation request by `delay`.
    pub fn set_admin_delay(&self, delay: Duration) {
        *lock(&self.inner.admin_delay) = delay;
    }

    /// Make every later sink close fail with `error`.
    pub fn fail_close(&self, error: BackendError) {
        *lock(&self.inner.close_failure) = Some(error);
    }

    pub async fn topic(&self, name: &str) -> Option<TopicInfo> {
        self.inner.topics.read().await.get(name).map(|t| t.info.clone())
    }

    pub async fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.topics.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// All records of a topic, ordered by partition then offset.
    pub async fn records(&self, topic: &str) -> Vec<StoredRecord> {
        match self.inner.topics.read().await.get(topic) {
            Some(t) => t.partitions.iter().flatten().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Every creation request received, in order.
    pub fn create_requests(&self) -> Vec<TopicCreateRequest> {
        lock(&self.inner.requests).clone()
    }

    pub fn metadata_request_count(&self) -> usize {
        self.inner.counters.metadata_requests.load(Ordering::SeqCst)
    }

    pub fn create_request_count(&self) -> usize {
        self.inner.counters.create_requests.load(Ordering::SeqCst)
    }

    pub fn admin_connection_count(&self) -> usize {
        self.inner.counters.admin_connections.load(Ordering::SeqCst)
    }

    pub fn sink_connection_count(&self) -> usize {
        self.inner.counters.sink_connections.load(Ordering::SeqCst)
    }

    pub fn sink_close_count(&self) -> usize {
        self.inner.counters.sink_closes.load(Ordering::SeqCst)
    }

    /// Sink connections handed out and not yet dropped.
    pub fn open_sink_count(&self) -> usize {
        self.inner.counters.open_sinks.load(Ordering::SeqCst)
    }

    async fn admin_round_trip(&self) -> Result<(), BackendError> {
        let delay = *lock(&self.inner.admin_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.inner.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::connection("memory broker is unreachable"))
        }
    }
}

fn lock<T>(m: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    async fn create(&self, request: &TopicCreateRequest) -> Result<(), BackendError> {
        if let Some(e) = lock(&self.creation_failures).get(&request.name) {
            return Err(e.clone());
        }
        if request.num_partitions == 0 {
            return Err(BackendError::admin("number of partitions must be larger than 0"));
        }
        if request.replication_factor == 0 || request.replication_factor > self.config.broker_count {
            return Err(BackendError::admin(format!(
                "replication factor {} is invalid for {} available brokers",
                request.replication_factor, self.config.broker_count
            )));
        }

        let mut topics = self.topics.write().await;
        if topics.contains_key(&request.name) {
            return Err(BackendError::already_exists(format!(
                "topic '{}' already exists",
                request.name
            )));
        }
        let info = TopicInfo {
            name: request.name.clone(),
            num_partitions: request.num_partitions,
            replication_factor: request.replication_factor,
            config: request.config.clone(),
        };
        topics.insert(request.name.clone(), MemoryTopic::new(info));
        Ok(())
    }

    async fn append(&self, record: OutboundRecord) -> Result<DeliveryReport, BackendError> {
        let mut topics = self.topics.write().await;
        if !topics.contains_key(&record.topic) {
            if !self.config.auto_create_topics {
                return Err(BackendError::unknown_topic(format!(
                    "unknown topic '{}'",
                    record.topic
                )));
            }
            let info = TopicInfo {
                name: record.topic.clone(),
                num_partitions: 1,
                replication_factor: 1,
                config: BTreeMap::new(),
            };
            topics.insert(record.topic.clone(), MemoryTopic::new(info));
        }
        match topics.get_mut(&record.topic) {
            Some(topic) => Ok(topic.append(record)),
            None => Err(BackendError::unknown_topic(format!("unknown topic '{}'", record.topic))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Backend trait impls
// ═══════════════════════════════════════════════════════════════

impl ClusterAdmin for MemoryBroker {
    fn list_topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.admin_round_trip().await?;
            self.inner.counters.metadata_requests.fetch_add(1, Ordering::SeqCst);
            Ok(self.inner.topics.read().await.keys().cloned().collect())
        })
    }

    fn create_topics(
        &self,
        requests: &[TopicCreateRequest],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TopicCreateResult>, BackendError>> + Send + '_>> {
        let requests = requests.to_vec();
        Box::pin(async move {
            self.admin_round_trip().await?;
            self.inner.counters.create_requests.fetch_add(1, Ordering::SeqCst);
            lock(&self.inner.requests).extend(requests.iter().cloned());

            let mut results = Vec::with_capacity(requests.len());
            for request in &requests {
                results.push(TopicCreateResult {
                    topic: request.name.clone(),
                    result: self.inner.create(request).await,
                });
            }
            Ok(results)
        })
    }
}

impl RecordSink for MemoryBroker {
    fn send(&self, record: OutboundRecord) -> Result<DeliveryFuture, BackendError> {
        self.check_reachable()?;
        let inner = self.inner.clone();
        let delay = Duration::from_millis(inner.config.delivery_delay_ms);
        Ok(Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            inner.append(record).await
        }))
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.inner.counters.sink_closes.fetch_add(1, Ordering::SeqCst);
            match lock(&self.inner.close_failure).clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

/// One sink connection. Counted as open until dropped.
struct MemorySink {
    broker: MemoryBroker,
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        self.broker.inner.counters.open_sinks.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RecordSink for MemorySink {
    fn send(&self, record: OutboundRecord) -> Result<DeliveryFuture, BackendError> {
        self.broker.send(record)
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        self.broker.flush()
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        self.broker.close()
    }
}

impl BrokerConnector for MemoryBroker {
    fn connect_admin(
        &self,
        _settings: &BrokerSettings,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ClusterAdmin>, BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.check_reachable()?;
            self.inner.counters.admin_connections.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(self.clone()) as Arc<dyn ClusterAdmin>)
        })
    }

    fn connect_sink(
        &self,
        _settings: &BrokerSettings,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn RecordSink>, BackendError>> + Send + '_>> {
        Box::pin(async move {
            self.check_reachable()?;
            self.inner.counters.sink_connections.fetch_add(1, Ordering::SeqCst);
            self.inner.counters.open_sinks.fetch_add(1, Ordering::SeqCst);
            let sink = MemorySink { broker: self.clone() };
            Ok(Arc::new(sink) as Arc<dyn RecordSink>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_api::error::ErrorKind;

    fn request(name: &str, partitions: u32, replicas: u32) -> TopicCreateRequest {
        TopicCreateRequest {
            name: name.to_string(),
            num_partitions: partitions,
            replication_factor: replicas,
            config: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn second_creation_reports_already_exists() {
        let broker = MemoryBroker::default();
        let first = broker.create_topics(&[request("clicks", 2, 1)]).await.unwrap();
        assert_eq!(first[0].result, Ok(()));

        let second = broker.create_topics(&[request("clicks", 2, 1)]).await.unwrap();
        let err = second[0].result.clone().unwrap_err();
        assert!(err.is(ErrorKind::AlreadyExists), "{err}");
        assert_eq!(broker.topic_names().await, vec!["clicks".to_string()]);
        assert_eq!(broker.create_request_count(), 2);
    }

    #[tokio::test]
    async fn replication_factor_is_bounded_by_cluster_size() {
        let broker = MemoryBroker::new(MemoryBrokerConfig {
            broker_count: 2,
            ..Default::default()
        });
        let results = broker
            .create_topics(&[request("ok", 1, 2), request("too-wide", 1, 3)])
            .await
            .unwrap();
        assert_eq!(results[0].result, Ok(()));
        assert!(results[1].result.as_ref().unwrap_err().is(ErrorKind::Admin));
    }

    #[tokio::test]
    async fn records_land_in_key_partition_with_increasing_offsets() {
        let broker = MemoryBroker::default();
        broker.seed_topic("arrivals", 4, 1).await;

        let mut reports = Vec::new();
        for ts in 0..3 {
            let record = OutboundRecord {
                topic: "arrivals".into(),
                key: b"station-7".to_vec(),
                payload: Some(vec![ts as u8]),
                timestamp_ms: ts,
            };
            reports.push(broker.send(record).unwrap().await.unwrap());
        }

        assert!(reports.iter().all(|r| r.partition == reports[0].partition));
        assert_eq!(reports.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(broker.records("arrivals").await.len(), 3);
    }

    #[tokio::test]
    async fn unknown_topic_fails_delivery_unless_auto_created() {
        let record = OutboundRecord {
            topic: "weather".into(),
            key: vec![1],
            payload: None,
            timestamp_ms: 0,
        };

        let strict = MemoryBroker::default();
        let err = strict.send(record.clone()).unwrap().await.unwrap_err();
        assert!(err.is(ErrorKind::UnknownTopic));

        let lenient = MemoryBroker::new(MemoryBrokerConfig {
            auto_create_topics: true,
            ..Default::default()
        });
        let report = lenient.send(record).unwrap().await.unwrap();
        assert_eq!(report.offset, 0);
        assert_eq!(lenient.topic("weather").await.unwrap().num_partitions, 1);
    }

    #[tokio::test]
    async fn unreachable_broker_refuses_connections() {
        let broker = MemoryBroker::default();
        broker.set_reachable(false);
        let settings = BrokerSettings::new("memory://");
        assert!(broker.connect_admin(&settings).await.is_err());
        let err = broker.connect_sink(&settings).await.err().unwrap();
        assert!(err.is(ErrorKind::Connection));
        assert_eq!(broker.admin_connection_count(), 0);
    }

    #[tokio::test]
    async fn sink_connection_is_open_until_dropped() {
        let broker = MemoryBroker::default();
        let sink = broker.connect_sink(&BrokerSettings::new("memory://")).await.unwrap();
        assert_eq!(broker.open_sink_count(), 1);

        sink.close().await.unwrap();
        assert_eq!(broker.open_sink_count(), 1);
        drop(sink);
        assert_eq!(broker.open_sink_count(), 0);
        assert_eq!(broker.sink_close_count(), 1);
    }

    #[tokio::test]
    async fn close_failure_is_reported_by_the_sink() {
        let broker = MemoryBroker::default();
        broker.fail_close(BackendError::delivery("flush queue stuck"));
        let sink = broker.connect_sink(&BrokerSettings::new("memory://")).await.unwrap();

        let err = sink.close().await.unwrap_err();
        assert!(err.is(ErrorKind::Delivery), "{err}");
    }

    #[tokio::test]
    async fn admin_delay_stalls_metadata_requests() {
        let broker = MemoryBroker::default();
        broker.set_admin_delay(Duration::from_secs(30));

        let slow = tokio::time::timeout(Duration::from_millis(50), broker.list_topics()).await;
        assert!(slow.is_err());

        broker.set_admin_delay(Duration::ZERO);
        assert!(broker.list_topics().await.unwrap().is_empty());
    }
}
