use std::sync::Arc;

use herald_api::admin::BrokerConnector;
use herald_api::schema::{CodecFactory, RegistryConnector, SchemaPair};
use herald_api::time::{SystemClock, TimeSource};
use herald_api::topic::TopicDescriptor;

use crate::config::ClientSettings;
use crate::error::ProducerError;
use crate::producer::Producer;
use crate::provision::{ProvisionOutcome, TopicProvisioner};
use crate::registry::TopicRegistry;

/// Backend implementations a context connects through.
#[derive(Clone)]
pub struct Backends {
    pub broker: Arc<dyn BrokerConnector>,
    pub registry: Arc<dyn RegistryConnector>,
    pub codecs: Arc<dyn CodecFactory>,
}

impl Backends {
    pub fn new(
        broker: Arc<dyn BrokerConnector>,
        registry: Arc<dyn RegistryConnector>,
        codecs: Arc<dyn CodecFactory>,
    ) -> Self {
        Self {
            broker,
            registry,
            codecs,
        }
    }
}

/// Everything producers of one deployment share: settings, backends,
/// the topic registry and the provisioner.
///
/// Usually one per process. Contexts never share registries unless one is
/// passed in explicitly via [`ProducerContextBuilder::registry`].
pub struct ProducerContext {
    settings: ClientSettings,
    backends: Backends,
    registry: Arc<TopicRegistry>,
    provisioner: TopicProvisioner,
    clock: Arc<dyn TimeSource>,
}

impl std::fmt::Debug for ProducerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerContext")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("provisioner", &self.provisioner)
            .finish()
    }
}

impl ProducerContext {
    pub fn builder(settings: ClientSettings, backends: Backends) -> ProducerContextBuilder {
        ProducerContextBuilder {
            settings,
            backends,
            registry: None,
            clock: None,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    pub fn provisioner(&self) -> &TopicProvisioner {
        &self.provisioner
    }

    pub fn clock(&self) -> &Arc<dyn TimeSource> {
        &self.clock
    }

    /// Descriptor for `name` using the configured defaults.
    pub fn descriptor(&self, name: &str) -> Result<TopicDescriptor, ProducerError> {
        self.settings.descriptor(name)
    }

    /// Provision `descriptor` unless this context already tried.
    pub async fn ensure_topic(&self, descriptor: &TopicDescriptor) -> ProvisionOutcome {
        let (outcome, attempted) = self
            .registry
            .provision_once(descriptor.name(), || self.provisioner.ensure_topic(descriptor))
            .await;
        if !attempted {
            tracing::debug!(topic = %descriptor.name(), outcome = ?outcome, "topic already provisioned by this process");
        }
        outcome
    }

    /// Provision several topics, one after another.
    pub async fn ensure_topics(&self, descriptors: &[TopicDescriptor]) -> Vec<(String, ProvisionOutcome)> {
        let mut outcomes = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let outcome = self.ensure_topic(descriptor).await;
            outcomes.push((descriptor.name().to_string(), outcome));
        }
        outcomes
    }

    pub async fn producer(&self, descriptor: TopicDescriptor, schemas: SchemaPair) -> Result<Producer, ProducerError> {
        Producer::new(self, descriptor, schemas).await
    }
}

pub struct ProducerContextBuilder {
    settings: ClientSettings,
    backends: Backends,
    registry: Option<Arc<TopicRegistry>>,
    clock: Option<Arc<dyn TimeSource>>,
}

impl ProducerContextBuilder {
    /// Share an existing registry instead of starting from an empty one.
    pub fn registry(mut self, registry: Arc<TopicRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> ProducerContext {
        let provisioner = TopicProvisioner::new(
            self.backends.broker.clone(),
            self.settings.broker.clone(),
            self.settings.admin_timeout,
        );
        ProducerContext {
            provisioner,
            registry: self.registry.unwrap_or_default(),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            settings: self.settings,
            backends: self.backends,
        }
    }
}
