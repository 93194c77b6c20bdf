use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use herald_api::admin::BrokerConnector;
use herald_api::config::BrokerSettings;
use herald_api::error::{BackendError, ErrorKind};
use herald_api::topic::TopicDescriptor;

use crate::error::ProvisionError;

/// What a provisioning attempt established about a topic.
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    /// The broker already had the topic (listed, or reported on creation).
    AlreadyExists,
    /// The topic was created with the requested configuration.
    Created,
    /// The attempt failed; the topic may or may not exist.
    Failed(ProvisionError),
    /// Marked seen without any attempt.
    Assumed,
}

impl ProvisionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ProvisionOutcome::Failed(_))
    }

    /// Escalate a failed attempt into an error.
    pub fn into_result(self) -> Result<Self, ProvisionError> {
        match self {
            ProvisionOutcome::Failed(e) => Err(e),
            other => Ok(other),
        }
    }
}

/// Makes sure a topic exists before anything is published to it.
///
/// Failures are logged and reported through [`ProvisionOutcome::Failed`],
/// never returned as errors, and never retried.
pub struct TopicProvisioner {
    connector: Arc<dyn BrokerConnector>,
    settings: BrokerSettings,
    timeout: Duration,
}

impl std::fmt::Debug for TopicProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicProvisioner")
            .field("bootstrap_servers", &self.settings.bootstrap_servers)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TopicProvisioner {
    /// `timeout` bounds each network step (connect, metadata, creation) separately.
    pub fn new(connector: Arc<dyn BrokerConnector>, settings: BrokerSettings, timeout: Duration) -> Self {
        Self {
            connector,
            settings,
            timeout,
        }
    }

    pub async fn ensure_topic(&self, descriptor: &TopicDescriptor) -> ProvisionOutcome {
        match self.try_ensure(descriptor).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(topic = %descriptor.name(), error = %e, "failed to provision topic");
                ProvisionOutcome::Failed(e)
            }
        }
    }

    async fn try_ensure(&self, descriptor: &TopicDescriptor) -> Result<ProvisionOutcome, ProvisionError> {
        let name = descriptor.name();

        let admin = self
            .bounded("admin connect", self.connector.connect_admin(&self.settings))
            .await?
            .map_err(ProvisionError::Connection)?;

        let existing = self
            .bounded("topic metadata", admin.list_topics())
            .await?
            .map_err(ProvisionError::Metadata)?;
        if existing.iter().any(|t| t == name) {
            tracing::info!(topic = %name, "topic exists");
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        let request = descriptor.create_request();
        tracing::debug!(
            topic = %name,
            partitions = request.num_partitions,
            replicas = request.replication_factor,
            config = ?request.config,
            "creating topic"
        );
        let results = self
            .bounded("topic creation", admin.create_topics(std::slice::from_ref(&request)))
            .await?
            .map_err(ProvisionError::Creation)?;

        let mut outcome = None;
        for created in results {
            let this = match created.result {
                Ok(()) => {
                    tracing::info!(topic = %created.topic, "confirmed topic creation");
                    Ok(ProvisionOutcome::Created)
                }
                Err(e) if e.is(ErrorKind::AlreadyExists) => {
                    tracing::info!(topic = %created.topic, "topic created concurrently elsewhere");
                    Ok(ProvisionOutcome::AlreadyExists)
                }
                Err(e) => Err(ProvisionError::Creation(e)),
            };
            if created.topic == name {
                outcome = Some(this);
            } else if let Err(e) = this {
                tracing::error!(topic = %created.topic, error = %e, "failed to create topic");
            }
        }

        outcome.unwrap_or_else(|| {
            Err(ProvisionError::Creation(BackendError::admin(format!(
                "broker returned no creation result for '{name}'"
            ))))
        })
    }

    async fn bounded<T>(&self, operation: &'static str, fut: impl Future<Output = T>) -> Result<T, ProvisionError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ProvisionError::Timeout {
                operation,
                after: self.timeout,
            })
    }
}
