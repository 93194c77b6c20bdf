use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio_util::task::TaskTracker;

use herald_api::error::BackendError;
use herald_api::record::{DeliveryReport, OutboundRecord};
use herald_api::schema::{Codec, SchemaDefinition, SchemaPair, SchemaRegistry, SubjectKind, frame, subject_name};
use herald_api::sink::RecordSink;
use herald_api::time::TimeSource;

use crate::config::ClientSettings;
use crate::context::Backends;
use crate::error::ProducerError;

/// A codec plus the registry id its schema was registered under.
struct BoundSchema {
    codec: Arc<dyn Codec>,
    schema_id: u32,
}

impl BoundSchema {
    fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, BackendError> {
        let datum = self.codec.encode(value)?;
        Ok(frame(self.schema_id, &datum))
    }
}

/// Connections owned by an open handle.
struct Clients {
    sink: Arc<dyn RecordSink>,
    // Held so the registry connection lives until the handle is closed.
    _registry: Arc<dyn SchemaRegistry>,
}

/// Publishing client bound to one topic and one schema pair.
///
/// Owns its broker sink and schema registry client until [`close`](Self::close),
/// which drops both. Closing twice is a no-op.
pub struct ProducerHandle {
    topic: String,
    key: BoundSchema,
    value: Option<BoundSchema>,
    /// `None` once released. Publishing holds this lock from the closed
    /// check until its delivery is tracked.
    clients: std::sync::Mutex<Option<Clients>>,
    clock: Arc<dyn TimeSource>,
    deliveries: TaskTracker,
    delivery_timeout: Duration,
    close_timeout: Duration,
    closed: AtomicBool,
    /// `true` once the sink has been released.
    released: Mutex<bool>,
}

impl std::fmt::Debug for ProducerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerHandle")
            .field("topic", &self.topic)
            .field("key_schema_id", &self.key.schema_id)
            .field("value_schema_id", &self.value.as_ref().map(|v| v.schema_id))
            .field("in_flight", &self.deliveries.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ProducerHandle {
    /// Build codecs, register both schemas and open the broker sink.
    ///
    /// Every failure here is fatal: an unreachable broker or registry yields
    /// `ProducerError::Connection`, a rejected schema `ProducerError::Schema`.
    pub async fn connect(
        topic: &str,
        settings: &ClientSettings,
        schemas: &SchemaPair,
        backends: &Backends,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, ProducerError> {
        let key_codec = backends
            .codecs
            .create(schemas.key())
            .map_err(|e| ProducerError::Schema(e.with_context(format!("key schema of '{topic}'"))))?;
        let value_codec = schemas
            .value()
            .map(|s| backends.codecs.create(s))
            .transpose()
            .map_err(|e| ProducerError::Schema(e.with_context(format!("value schema of '{topic}'"))))?;

        let timeout = settings.admin_timeout;
        let registry = within(timeout, "schema registry connect", backends.registry.connect(&settings.schema_registry_url))
            .await?
            .map_err(|e| ProducerError::Connection(e.with_context(&settings.schema_registry_url)))?;

        let key_id = register(&*registry, topic, SubjectKind::Key, schemas.key(), timeout).await?;
        let value_id = match schemas.value() {
            Some(schema) => Some(register(&*registry, topic, SubjectKind::Value, schema, timeout).await?),
            None => None,
        };

        let sink = within(timeout, "broker connect", backends.broker.connect_sink(&settings.broker))
            .await?
            .map_err(|e| ProducerError::Connection(e.with_context(&settings.broker.bootstrap_servers)))?;

        tracing::info!(
            topic = %topic,
            key_schema_id = key_id,
            value_schema_id = ?value_id,
            "producer connected"
        );

        Ok(Self {
            topic: topic.to_string(),
            key: BoundSchema {
                codec: key_codec,
                schema_id: key_id,
            },
            value: value_codec.zip(value_id).map(|(codec, schema_id)| BoundSchema { codec, schema_id }),
            clients: std::sync::Mutex::new(Some(Clients {
                sink,
                _registry: registry,
            })),
            clock,
            deliveries: TaskTracker::new(),
            delivery_timeout: settings.delivery_timeout,
            close_timeout: settings.close_timeout,
            closed: AtomicBool::new(false),
            released: Mutex::new(false),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Deliveries still waiting for a broker acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.deliveries.len()
    }

    fn clients(&self) -> MutexGuard<'_, Option<Clients>> {
        match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(topic = %self.topic, "producer client lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn closed_error(&self) -> ProducerError {
        ProducerError::Closed {
            topic: self.topic.clone(),
        }
    }

    fn sink(&self) -> Result<Arc<dyn RecordSink>, ProducerError> {
        match &*self.clients() {
            Some(clients) if !self.is_closed() => Ok(clients.sink.clone()),
            _ => Err(self.closed_error()),
        }
    }

    /// Encode and enqueue one record.
    ///
    /// Encoding failures are returned right away and nothing is sent. The
    /// broker's verdict arrives through the returned [`DeliveryHandle`], which
    /// may be awaited or dropped. Must be called within a Tokio runtime.
    pub fn publish(
        &self,
        key: &serde_json::Value,
        value: Option<&serde_json::Value>,
    ) -> Result<DeliveryHandle, ProducerError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let key_bytes = self
            .key
            .encode(key)
            .map_err(|e| ProducerError::Serialization(e.with_context("key")))?;
        let payload = match (value, &self.value) {
            (None, _) => None,
            (Some(v), Some(bound)) => Some(
                bound
                    .encode(v)
                    .map_err(|e| ProducerError::Serialization(e.with_context("value")))?,
            ),
            (Some(_), None) => {
                return Err(ProducerError::Serialization(BackendError::serialization(format!(
                    "topic '{}' has no value schema bound",
                    self.topic
                ))));
            }
        };

        let record = OutboundRecord {
            topic: self.topic.clone(),
            key: key_bytes,
            payload,
            timestamp_ms: self.clock.now_millis(),
        };

        // `close` flips `closed` under this lock, so a record that gets past
        // the check is tracked before close starts draining.
        let clients = self.clients();
        let sink = match &*clients {
            Some(clients) if !self.is_closed() => &clients.sink,
            _ => return Err(self.closed_error()),
        };
        let enqueued = sink.send(record);
        let (tx, rx) = oneshot::channel();
        let topic = self.topic.clone();
        let timeout = self.delivery_timeout;
        self.deliveries.spawn(async move {
            let result = match enqueued {
                Ok(delivery) => match tokio::time::timeout(timeout, delivery).await {
                    Ok(Ok(report)) => Ok(report),
                    Ok(Err(e)) => Err(ProducerError::Delivery(e)),
                    Err(_) => Err(ProducerError::Timeout {
                        operation: "delivery",
                        after: timeout,
                    }),
                },
                Err(e) => Err(ProducerError::Delivery(e.with_context("enqueue"))),
            };
            if let Err(Err(e)) = tx.send(result) {
                tracing::warn!(topic = %topic, error = %e, "delivery failed with nobody awaiting it");
            }
        });
        drop(clients);

        Ok(DeliveryHandle {
            topic: self.topic.clone(),
            rx,
        })
    }

    /// Push out everything the sink has buffered.
    pub async fn flush(&self) -> Result<(), ProducerError> {
        let sink = self.sink()?;
        within(self.delivery_timeout, "flush", sink.flush())
            .await?
            .map_err(ProducerError::Delivery)
    }

    /// Stop accepting records, drain in-flight deliveries and release the
    /// sink and registry clients.
    ///
    /// Close stops waiting for deliveries still pending after the close
    /// timeout and releases the sink anyway. Release failures are logged and
    /// returned once; later calls return `Ok(())`.
    pub async fn close(&self) -> Result<(), ProducerError> {
        let mut released = self.released.lock().await;
        if *released {
            return Ok(());
        }

        let sink = {
            let clients = self.clients();
            self.closed.store(true, Ordering::Release);
            self.deliveries.close();
            clients.as_ref().map(|c| c.sink.clone())
        };
        let Some(sink) = sink else {
            *released = true;
            return Ok(());
        };
        tracing::info!(topic = %self.topic, in_flight = self.deliveries.len(), "closing producer");

        let mut failure = None;
        match tokio::time::timeout(self.close_timeout, sink.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(topic = %self.topic, error = %e, "flush on close failed");
                failure = Some(e);
            }
            Err(_) => {
                tracing::warn!(topic = %self.topic, after = ?self.close_timeout, "flush on close timed out");
            }
        }

        if tokio::time::timeout(self.close_timeout, self.deliveries.wait()).await.is_err() {
            tracing::warn!(
                topic = %self.topic,
                abandoned = self.deliveries.len(),
                "abandoning in-flight deliveries"
            );
        }

        let clients = self.clients().take();
        if let Err(e) = sink.close().await {
            tracing::error!(topic = %self.topic, error = %e, "failed to release producer");
            failure.get_or_insert(e);
        }
        drop(clients);
        drop(sink);
        *released = true;

        match failure {
            Some(e) => Err(ProducerError::Close(e)),
            None => {
                tracing::info!(topic = %self.topic, "producer closed");
                Ok(())
            }
        }
    }
}

/// Deferred broker confirmation for one published record.
#[derive(Debug)]
pub struct DeliveryHandle {
    topic: String,
    rx: oneshot::Receiver<Result<DeliveryReport, ProducerError>>,
}

impl DeliveryHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn wait(self) -> Result<DeliveryReport, ProducerError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(ProducerError::Delivery(BackendError::delivery(format!(
                "delivery confirmation for '{}' was dropped",
                self.topic
            )))),
        }
    }

    /// Like [`wait`](Self::wait), giving up after `after`.
    pub async fn wait_timeout(self, after: Duration) -> Result<DeliveryReport, ProducerError> {
        tokio::time::timeout(after, self.wait())
            .await
            .map_err(|_| ProducerError::Timeout {
                operation: "delivery wait",
                after,
            })?
    }
}

impl IntoFuture for DeliveryHandle {
    type Output = Result<DeliveryReport, ProducerError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

async fn within<T>(after: Duration, operation: &'static str, fut: impl Future<Output = T>) -> Result<T, ProducerError> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| ProducerError::Timeout { operation, after })
}

async fn register(
    registry: &dyn SchemaRegistry,
    topic: &str,
    kind: SubjectKind,
    schema: &SchemaDefinition,
    timeout: Duration,
) -> Result<u32, ProducerError> {
    let subject = subject_name(topic, kind);
    within(timeout, "schema registration", registry.register(&subject, schema))
        .await?
        .map_err(|e| ProducerError::from_registry(e.with_context(format!("subject '{subject}'"))))
}
