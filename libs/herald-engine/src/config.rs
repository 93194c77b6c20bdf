use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use herald_api::config::BrokerSettings;
use herald_api::topic::TopicDescriptor;

use crate::error::ProducerError;

/// Root configuration, parsed from TOML.
///
/// Broker and schema registry addresses have no defaults; every deployment
/// names its own.
#[derive(Debug, Clone, Deserialize)]
pub struct HeraldConfig {
    /// Initial broker endpoints used to discover the cluster.
    pub bootstrap_servers: String,

    /// Schema registry endpoint (http or https).
    pub schema_registry_url: String,

    /// Partition count for topics without an explicit one.
    #[serde(default = "default_count")]
    pub num_partitions: u32,

    /// Replication factor for topics without an explicit one.
    #[serde(default = "default_count")]
    pub num_replicas: u32,

    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: u64,

    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    /// Extra broker client properties, passed through untouched.
    #[serde(default)]
    pub broker_properties: BTreeMap<String, String>,

    /// Overrides/additions applied on top of the retention defaults.
    #[serde(default)]
    pub topic_config: BTreeMap<String, String>,

    /// Topics to provision up front.
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
}

fn default_count() -> u32 {
    1
}

fn default_admin_timeout_ms() -> u64 {
    5_000
}

fn default_delivery_timeout_ms() -> u64 {
    30_000
}

fn default_close_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default)]
    pub num_partitions: Option<u32>,
    #[serde(default)]
    pub num_replicas: Option<u32>,
    /// Per-topic overrides, applied after `topic_config`.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

impl HeraldConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProducerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProducerError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&content).map_err(|e| e.with_context(path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, ProducerError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ProducerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProducerError> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(ProducerError::Config("bootstrap_servers must not be empty".into()));
        }
        if self.schema_registry_url.trim().is_empty() {
            return Err(ProducerError::Config("schema_registry_url must not be empty".into()));
        }
        if self.num_partitions == 0 || self.num_replicas == 0 {
            return Err(ProducerError::Config(
                "num_partitions and num_replicas must be positive".into(),
            ));
        }
        if self.admin_timeout_ms == 0 || self.delivery_timeout_ms == 0 || self.close_timeout_ms == 0 {
            return Err(ProducerError::Config("timeouts must be positive".into()));
        }
        // Surface bad topic entries at load time rather than at first use.
        self.descriptors()?;
        Ok(())
    }

    pub fn client_settings(&self) -> ClientSettings {
        let mut broker = BrokerSettings::new(&self.bootstrap_servers)
            .with_request_timeout(Duration::from_millis(self.admin_timeout_ms))
            .with_delivery_timeout(Duration::from_millis(self.delivery_timeout_ms));
        broker.properties = self.broker_properties.clone();

        ClientSettings {
            broker,
            schema_registry_url: self.schema_registry_url.clone(),
            num_partitions: self.num_partitions,
            num_replicas: self.num_replicas,
            topic_config: self.topic_config.clone(),
            admin_timeout: Duration::from_millis(self.admin_timeout_ms),
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
        }
    }

    /// Descriptors for every `[[topics]]` entry.
    pub fn descriptors(&self) -> Result<Vec<TopicDescriptor>, ProducerError> {
        self.topics
            .iter()
            .map(|t| {
                TopicDescriptor::builder(&t.name)
                    .partitions(t.num_partitions.unwrap_or(self.num_partitions))
                    .replicas(t.num_replicas.unwrap_or(self.num_replicas))
                    .configs(self.topic_config.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    .configs(t.config.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    .build()
                    .map_err(ProducerError::from)
            })
            .collect()
    }
}

/// Resolved connection settings handed to every producer constructor.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub broker: BrokerSettings,
    pub schema_registry_url: String,
    pub num_partitions: u32,
    pub num_replicas: u32,
    pub topic_config: BTreeMap<String, String>,
    /// Bounds each provisioning step and each registry/broker connect.
    pub admin_timeout: Duration,
    /// Bounds waiting for a single delivery confirmation.
    pub delivery_timeout: Duration,
    /// Bounds flushing and draining in-flight deliveries on close.
    pub close_timeout: Duration,
}

impl ClientSettings {
    pub fn new(bootstrap_servers: impl Into<String>, schema_registry_url: impl Into<String>) -> Self {
        let admin_timeout = Duration::from_millis(default_admin_timeout_ms());
        let delivery_timeout = Duration::from_millis(default_delivery_timeout_ms());
        Self {
            broker: BrokerSettings::new(bootstrap_servers)
                .with_request_timeout(admin_timeout)
                .with_delivery_timeout(delivery_timeout),
            schema_registry_url: schema_registry_url.into(),
            num_partitions: default_count(),
            num_replicas: default_count(),
            topic_config: BTreeMap::new(),
            admin_timeout,
            delivery_timeout,
            close_timeout: Duration::from_millis(default_close_timeout_ms()),
        }
    }

    pub fn with_admin_timeout(mut self, timeout: Duration) -> Self {
        self.admin_timeout = timeout;
        self.broker.request_timeout = timeout;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self.broker.delivery_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Descriptor for `name` with the configured default partitions,
    /// replicas and topic config overrides.
    pub fn descriptor(&self, name: &str) -> Result<TopicDescriptor, ProducerError> {
        TopicDescriptor::builder(name)
            .partitions(self.num_partitions)
            .replicas(self.num_replicas)
            .configs(self.topic_config.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .build()
            .map_err(ProducerError::from)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use herald_api::topic::{CLEANUP_POLICY, COMPRESSION_TYPE};

    const MINIMAL: &str = r#"
        bootstrap_servers = "PLAINTEXT://localhost:9092"
        schema_registry_url = "http://localhost:8081"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = HeraldConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.num_partitions, 1);
        assert_eq!(config.num_replicas, 1);
        assert_eq!(config.admin_timeout_ms, 5_000);
        assert!(config.topics.is_empty());

        let settings = config.client_settings();
        assert_eq!(settings.broker.bootstrap_servers, "PLAINTEXT://localhost:9092");
        assert_eq!(settings.broker.request_timeout, Duration::from_secs(5));
        assert_eq!(settings.close_timeout, Duration::from_secs(10));

        let topic = settings.descriptor("arrivals").unwrap();
        assert_eq!(topic.num_partitions(), 1);
        assert_eq!(topic.config().get(CLEANUP_POLICY), Some("delete"));
    }

    #[test]
    fn addresses_are_required() {
        let err = HeraldConfig::parse(r#"bootstrap_servers = "localhost:9092""#).unwrap_err();
        assert!(matches!(err, ProducerError::Config(ref m) if m.contains("schema_registry_url")), "{err}");

        let err = HeraldConfig::parse(
            r#"
            bootstrap_servers = " "
            schema_registry_url = "http://localhost:8081"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ProducerError::Config(_)));
    }

    #[test]
    fn topic_entries_layer_over_global_overrides() {
        let config = HeraldConfig::parse(
            r#"
            bootstrap_servers = "localhost:9092"
            schema_registry_url = "http://localhost:8081"
            num_replicas = 2

            [broker_properties]
            "client.id" = "herald"

            [topic_config]
            "compression.type" = "zstd"

            [[topics]]
            name = "clicks"
            num_partitions = 3

            [topics.config]
            "compression.type" = "snappy"
            "retention.ms" = "86400000"

            [[topics]]
            name = "weather"
            "#,
        )
        .unwrap();

        let settings = config.client_settings();
        assert_eq!(settings.broker.properties["client.id"], "herald");

        let topics = config.descriptors().unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].name(), "clicks");
        assert_eq!(topics[0].num_partitions(), 3);
        assert_eq!(topics[0].num_replicas(), 2);
        assert_eq!(topics[0].config().get(COMPRESSION_TYPE), Some("snappy"));
        assert_eq!(topics[0].config().get("retention.ms"), Some("86400000"));
        assert_eq!(topics[1].num_partitions(), 1);
        assert_eq!(topics[1].config().get(COMPRESSION_TYPE), Some("zstd"));
    }

    #[test]
    fn invalid_topic_entry_fails_validation() {
        let err = HeraldConfig::parse(
            r#"
            bootstrap_servers = "localhost:9092"
            schema_registry_url = "http://localhost:8081"

            [[topics]]
            name = "clicks"
            num_partitions = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ProducerError::Config(ref m) if m.contains("num_partitions")), "{err}");
    }

    #[test]
    fn load_reads_file_and_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = HeraldConfig::load(file.path()).unwrap();
        assert_eq!(config.schema_registry_url, "http://localhost:8081");

        let err = HeraldConfig::load("/nonexistent/herald.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/herald.toml"), "{err}");
    }
}
