use std::sync::Arc;

use herald_api::schema::SchemaPair;
use herald_api::time::TimeSource;
use herald_api::topic::TopicDescriptor;

use crate::context::ProducerContext;
use crate::error::ProducerError;
use crate::handle::{DeliveryHandle, ProducerHandle};
use crate::provision::ProvisionOutcome;

/// Base for domain producers: a topic that has been provisioned (or at
/// least attempted) plus a connected, schema-bound publishing handle.
pub struct Producer {
    descriptor: TopicDescriptor,
    schemas: SchemaPair,
    provisioning: ProvisionOutcome,
    handle: ProducerHandle,
    clock: Arc<dyn TimeSource>,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("descriptor", &self.descriptor)
            .field("provisioning", &self.provisioning)
            .field("handle", &self.handle)
            .finish()
    }
}

impl Producer {
    /// Provision the topic once per context, then connect the handle.
    ///
    /// A failed provisioning attempt does not stop construction; it is
    /// logged and kept in [`provisioning`](Self::provisioning). Connection
    /// and schema failures do.
    pub async fn new(
        ctx: &ProducerContext,
        descriptor: TopicDescriptor,
        schemas: SchemaPair,
    ) -> Result<Self, ProducerError> {
        let provisioning = ctx.ensure_topic(&descriptor).await;
        let handle = ProducerHandle::connect(
            descriptor.name(),
            ctx.settings(),
            &schemas,
            ctx.backends(),
            ctx.clock().clone(),
        )
        .await?;

        Ok(Self {
            descriptor,
            schemas,
            provisioning,
            handle,
            clock: ctx.clock().clone(),
        })
    }

    pub fn topic(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &TopicDescriptor {
        &self.descriptor
    }

    pub fn schemas(&self) -> &SchemaPair {
        &self.schemas
    }

    /// What provisioning established when this producer was built.
    pub fn provisioning(&self) -> &ProvisionOutcome {
        &self.provisioning
    }

    pub fn handle(&self) -> &ProducerHandle {
        &self.handle
    }

    /// Epoch milliseconds, for record keys and timestamps.
    pub fn time_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn publish(
        &self,
        key: &serde_json::Value,
        value: Option<&serde_json::Value>,
    ) -> Result<DeliveryHandle, ProducerError> {
        self.handle.publish(key, value)
    }

    pub async fn close(&self) -> Result<(), ProducerError> {
        self.handle.close().await
    }
}
