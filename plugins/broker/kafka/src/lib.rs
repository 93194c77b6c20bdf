use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;

use herald_api::admin::{BrokerConnector, ClusterAdmin, TopicCreateResult};
use herald_api::config::BrokerSettings;
use herald_api::error::{BackendError, ErrorKind};
use herald_api::record::{DeliveryReport, OutboundRecord};
use herald_api::sink::{DeliveryFuture, RecordSink};
use herald_api::topic::TopicCreateRequest;

/// Opens Kafka admin clients and producers via librdkafka.
#[derive(Debug, Default, Clone, Copy)]
pub struct KafkaConnector;

pub(crate) fn client_config(settings: &BrokerSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", &settings.bootstrap_servers);
    for (k, v) in &settings.properties {
        config.set(k, v);
    }
    config
}

fn kafka_err(kind: ErrorKind, what: &str, e: KafkaError) -> BackendError {
    BackendError::new(kind, format!("kafka {what}: {e}"))
}

fn join_err(e: tokio::task::JoinError) -> BackendError {
    BackendError::connection(format!("kafka worker task failed: {e}"))
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Map a per-record delivery failure onto the shared error kinds.
pub(crate) fn delivery_kind(code: Option<RDKafkaErrorCode>) -> ErrorKind {
    match code {
        Some(RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic) => ErrorKind::UnknownTopic,
        Some(RDKafkaErrorCode::MessageTimedOut | RDKafkaErrorCode::RequestTimedOut) => ErrorKind::Timeout,
        _ => ErrorKind::Delivery,
    }
}

pub(crate) fn creation_kind(code: RDKafkaErrorCode) -> ErrorKind {
    match code {
        RDKafkaErrorCode::TopicAlreadyExists => ErrorKind::AlreadyExists,
        RDKafkaErrorCode::RequestTimedOut | RDKafkaErrorCode::OperationTimedOut => ErrorKind::Timeout,
        _ => ErrorKind::Admin,
    }
}

// ═══════════════════════════════════════════════════════════════
//  Admin
// ═══════════════════════════════════════════════════════════════

/// Topic names fetched while connecting, served to the first listing.
#[derive(Default)]
struct ConnectListing(Mutex<Option<Vec<String>>>);

impl ConnectListing {
    fn fill(&self, names: Vec<String>) {
        *lock(&self.0) = Some(names);
    }

    fn take(&self) -> Option<Vec<String>> {
        lock(&self.0).take()
    }
}

pub struct KafkaAdmin {
    client: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
    listing: ConnectListing,
}

impl KafkaAdmin {
    async fn topic_names(&self) -> Result<Vec<String>, BackendError> {
        let client = self.client.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || {
            let metadata = client
                .inner()
                .fetch_metadata(None, timeout)
                .map_err(|e| kafka_err(ErrorKind::Connection, "metadata", e))?;
            Ok(metadata.topics().iter().map(|t| t.name().to_string()).collect())
        })
        .await
        .map_err(join_err)?
    }
}

impl ClusterAdmin for KafkaAdmin {
    fn list_topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, BackendError>> + Send + '_>> {
        Box::pin(async move {
            match self.listing.take() {
                Some(names) => Ok(names),
                None => self.topic_names().await,
            }
        })
    }

    fn create_topics(
        &self,
        requests: &[TopicCreateRequest],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TopicCreateResult>, BackendError>> + Send + '_>> {
        let requests = requests.to_vec();
        Box::pin(async move {
            let new_topics: Vec<NewTopic<'_>> = requests
                .iter()
                .map(|r| {
                    r.config.iter().fold(
                        NewTopic::new(
                            &r.name,
                            r.num_partitions as i32,
                            TopicReplication::Fixed(r.replication_factor as i32),
                        ),
                        |topic, (k, v)| topic.set(k, v),
                    )
                })
                .collect();
            let options = AdminOptions::new().operation_timeout(Some(self.timeout));

            let results = self
                .client
                .create_topics(new_topics.iter(), &options)
                .await
                .map_err(|e| kafka_err(ErrorKind::Admin, "create topics", e))?;

            Ok(results
                .into_iter()
                .map(|r| match r {
                    Ok(topic) => TopicCreateResult { topic, result: Ok(()) },
                    Err((topic, code)) => TopicCreateResult {
                        result: Err(BackendError::new(creation_kind(code), format!("topic '{topic}': {code}"))),
                        topic,
                    },
                })
                .collect())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sink
// ═══════════════════════════════════════════════════════════════

/// Producer connection. `None` once closed.
pub struct KafkaSink {
    producer: Mutex<Option<Arc<FutureProducer>>>,
    timeout: Duration,
}

impl KafkaSink {
    fn producer(&self) -> Result<Arc<FutureProducer>, BackendError> {
        lock(&self.producer)
            .clone()
            .ok_or_else(|| BackendError::delivery("kafka producer is closed"))
    }
}

impl RecordSink for KafkaSink {
    fn send(&self, record: OutboundRecord) -> Result<DeliveryFuture, BackendError> {
        let producer = self.producer()?;
        let mut outgoing = FutureRecord::<[u8], [u8]>::to(&record.topic)
            .key(record.key.as_slice())
            .timestamp(record.timestamp_ms);
        if let Some(payload) = record.payload.as_deref() {
            outgoing = outgoing.payload(payload);
        }

        let delivery = producer
            .send_result(outgoing)
            .map_err(|(e, _)| kafka_err(delivery_kind(e.rdkafka_error_code()), "enqueue", e))?;

        let topic = record.topic.clone();
        let timestamp = record.timestamp_ms;
        Ok(Box::pin(async move {
            match delivery.await {
                Ok(Ok((partition, offset))) => Ok(DeliveryReport {
                    topic,
                    partition,
                    offset,
                    timestamp_ms: Some(timestamp),
                }),
                Ok(Err((e, _))) => Err(kafka_err(delivery_kind(e.rdkafka_error_code()), "delivery", e)),
                Err(_) => Err(BackendError::delivery("kafka delivery was cancelled")),
            }
        }))
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        let producer = self.producer();
        let timeout = self.timeout;
        Box::pin(async move {
            let producer = producer?;
            tokio::task::spawn_blocking(move || producer.flush(timeout))
                .await
                .map_err(join_err)?
                .map_err(|e| kafka_err(ErrorKind::Delivery, "flush", e))
        })
    }

    /// Flush what is queued, then destroy the producer and its threads.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), BackendError>> + Send + '_>> {
        let producer = lock(&self.producer).take();
        let timeout = self.timeout;
        Box::pin(async move {
            let Some(producer) = producer else {
                return Ok(());
            };
            // Dropping the last handle joins librdkafka's threads, so do it off the runtime.
            tokio::task::spawn_blocking(move || {
                let flushed = producer.flush(timeout);
                drop(producer);
                flushed
            })
            .await
            .map_err(join_err)?
            .map_err(|e| kafka_err(ErrorKind::Delivery, "flush on close", e))
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Connector
// ═══════════════════════════════════════════════════════════════

impl BrokerConnector for KafkaConnector {
    fn connect_admin(
        &self,
        settings: &BrokerSettings,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ClusterAdmin>, BackendError>> + Send + '_>> {
        let settings = settings.clone();
        Box::pin(async move {
            let client: AdminClient<DefaultClientContext> = client_config(&settings)
                .create()
                .map_err(|e| kafka_err(ErrorKind::Config, "admin client", e))?;
            let admin = KafkaAdmin {
                client: Arc::new(client),
                timeout: settings.request_timeout,
                listing: ConnectListing::default(),
            };
            // librdkafka connects lazily; a metadata round trip proves the cluster answers.
            let names = admin.topic_names().await?;
            admin.listing.fill(names);
            tracing::debug!(bootstrap_servers = %settings.bootstrap_servers, "kafka admin connected");
            Ok(Arc::new(admin) as Arc<dyn ClusterAdmin>)
        })
    }

    fn connect_sink(
        &self,
        settings: &BrokerSettings,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn RecordSink>, BackendError>> + Send + '_>> {
        let settings = settings.clone();
        Box::pin(async move {
            let mut config = client_config(&settings);
            config.set("message.timeout.ms", settings.delivery_timeout.as_millis().to_string());
            let producer: FutureProducer = config
                .create()
                .map_err(|e| kafka_err(ErrorKind::Config, "producer", e))?;
            let producer = Arc::new(producer);

            let client = producer.clone();
            let timeout = settings.request_timeout;
            tokio::task::spawn_blocking(move || client.client().fetch_metadata(None, timeout).map(|_| ()))
                .await
                .map_err(join_err)?
                .map_err(|e| kafka_err(ErrorKind::Connection, "metadata", e))?;

            tracing::debug!(bootstrap_servers = %settings.bootstrap_servers, "kafka producer connected");
            Ok(Arc::new(KafkaSink {
                producer: Mutex::new(Some(producer)),
                timeout: settings.delivery_timeout,
            }) as Arc<dyn RecordSink>)
        })
    }
}
